//! Staging → cleaned records
//!
//! 1. `purchase_date` is parsed as `%d/%m/%y`; anything else becomes `None`.
//! 2. Price, quantity and order total must be numeric or the row is dropped.
//! 3. Remaining gaps are filled: gender, product name and shipping region
//!    become [`UNKNOWN`], age becomes 0.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use std::str::FromStr;
use sqlx::PgConnection;
use tracing::{debug, info, instrument, warn};

use super::error::{EtlError, Result, Stage};
use super::models::{CleanedRecord, RawRecord, StagingRecord, UNKNOWN};

/// Source date format: day/month/two-digit year
pub const PURCHASE_DATE_FORMAT: &str = "%d/%m/%y";

const SELECT_STAGING: &str = r#"
    SELECT staging_id, order_id, purchase_date, customer_id, customer_gender,
           customer_age, product_category, product_name, product_price, quantity,
           order_total, payment_method, shipping_region
    FROM temp_orders
    ORDER BY staging_id
"#;

pub fn parse_purchase_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), PURCHASE_DATE_FORMAT).ok()
}

/// Fractional digits kept for prices and order totals
pub const DECIMAL_SCALE: i64 = 4;

/// Finite decimal rounded to [`DECIMAL_SCALE`] places, or `None`
pub fn parse_decimal(value: &str) -> Option<BigDecimal> {
    let value = value.trim();
    if !value.parse::<f64>().is_ok_and(f64::is_finite) {
        return None;
    }
    BigDecimal::from_str(value).ok().map(|d| d.round(DECIMAL_SCALE))
}

/// Whole number written either as an integer or as an integral float (`"7.0"`)
pub fn parse_integral(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// Why a staging row did not make it into the cleaned set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    InvalidOrderId,
    InvalidCustomerId,
    MissingCategory,
    InvalidPrice,
    InvalidQuantity,
    InvalidOrderTotal,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidOrderId => "order_id is not an integer",
            DropReason::InvalidCustomerId => "customer_id is not an integer",
            DropReason::MissingCategory => "product_category is missing",
            DropReason::InvalidPrice => "product_price is not numeric",
            DropReason::InvalidQuantity => "quantity is not a whole number",
            DropReason::InvalidOrderTotal => "order_total is not numeric",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn text_or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Clean one record. Pure; no logging.
pub fn clean_record(raw: &RawRecord) -> std::result::Result<CleanedRecord, DropReason> {
    let purchase_date = raw.purchase_date.as_deref().and_then(parse_purchase_date);

    let product_price = raw
        .product_price
        .as_deref()
        .and_then(parse_decimal)
        .ok_or(DropReason::InvalidPrice)?;
    let quantity = raw
        .quantity
        .as_deref()
        .and_then(parse_integral)
        .and_then(|q| i32::try_from(q).ok())
        .ok_or(DropReason::InvalidQuantity)?;
    let order_total = raw
        .order_total
        .as_deref()
        .and_then(parse_decimal)
        .ok_or(DropReason::InvalidOrderTotal)?;

    let order_id = raw
        .order_id
        .as_deref()
        .and_then(parse_integral)
        .ok_or(DropReason::InvalidOrderId)?;
    let customer_id = raw
        .customer_id
        .as_deref()
        .and_then(parse_integral)
        .ok_or(DropReason::InvalidCustomerId)?;
    let product_category = raw
        .product_category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(DropReason::MissingCategory)?
        .to_string();

    let customer_age = raw
        .customer_age
        .as_deref()
        .and_then(parse_integral)
        .and_then(|age| i32::try_from(age).ok())
        .unwrap_or(0);

    let payment_method = raw
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Ok(CleanedRecord {
        order_id,
        purchase_date,
        customer_id,
        customer_gender: text_or_unknown(raw.customer_gender.as_deref()),
        customer_age,
        product_category,
        product_name: text_or_unknown(raw.product_name.as_deref()),
        product_price,
        quantity,
        order_total,
        payment_method,
        shipping_region: text_or_unknown(raw.shipping_region.as_deref()),
    })
}

/// Cleaned records plus what was lost on the way
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanOutcome {
    pub records: Vec<CleanedRecord>,
    /// Rows removed, in staging order
    pub dropped: Vec<(i64, DropReason)>,
    /// Kept rows whose purchase date did not parse
    pub undated: usize,
}

impl CleanOutcome {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// Clean staging rows in order. Each dropped row is logged as a row error.
pub fn clean_records(rows: &[StagingRecord]) -> CleanOutcome {
    let mut outcome = CleanOutcome {
        records: Vec::with_capacity(rows.len()),
        ..Default::default()
    };

    for row in rows {
        match clean_record(&row.raw) {
            Ok(record) => {
                if record.purchase_date.is_none() {
                    debug!(staging_id = row.staging_id, "Unparseable purchase date");
                    outcome.undated += 1;
                }
                outcome.records.push(record);
            },
            Err(reason) => {
                let row_number = usize::try_from(row.staging_id).unwrap_or_default();
                warn!(
                    staging_id = row.staging_id,
                    error = %EtlError::row(row_number, reason),
                    "Row dropped during cleaning"
                );
                outcome.dropped.push((row.staging_id, reason));
            },
        }
    }

    outcome
}

/// Reads `temp_orders` back and cleans it
#[derive(Debug, Clone, Copy, Default)]
pub struct Cleaner;

impl Cleaner {
    pub fn new() -> Self {
        Self
    }

    /// Every staging row, in insertion order
    pub async fn fetch_staging(&self, conn: &mut PgConnection) -> Result<Vec<StagingRecord>> {
        sqlx::query_as::<_, StagingRecord>(SELECT_STAGING)
            .fetch_all(conn)
            .await
            .map_err(|e| EtlError::batch(Stage::Cleaning, e))
    }

    #[instrument(skip_all)]
    pub async fn clean_staging(&self, conn: &mut PgConnection) -> Result<CleanOutcome> {
        let rows = self.fetch_staging(conn).await?;
        let outcome = clean_records(&rows);

        info!(
            staged = rows.len(),
            cleaned = outcome.records.len(),
            dropped = outcome.dropped_count(),
            undated = outcome.undated,
            "Cleaning complete"
        );

        Ok(outcome)
    }
}
