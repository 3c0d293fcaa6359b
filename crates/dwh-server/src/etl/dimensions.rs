//! Dimension loaders
//!
//! Each loader projects its columns out of the cleaned records, drops rows
//! where those columns are missing, deduplicates on the natural key (last
//! occurrence wins) and upserts the result in a single transaction.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, Postgres};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

use super::error::{EtlError, Result, Stage};
use super::models::{CleanedRecord, CustomerRow, DateRow, PaymentRow, ProductRow, RegionRow, UNKNOWN};
use super::upsert::{upsert_rows, UpsertRow};
use super::DEFAULT_BATCH_SIZE;

/// Calendar quarter of a month (1-12)
pub fn quarter_of(month: u32) -> u32 {
    1 + (month.saturating_sub(1)) / 3
}

pub fn date_row(date: NaiveDate) -> DateRow {
    DateRow {
        full_date: date,
        year: date.year(),
        quarter: quarter_of(date.month()) as i32,
        month: date.month() as i32,
        day: date.day() as i32,
        day_of_week: date.format("%A").to_string(),
    }
}

pub fn customer_rows(records: &[CleanedRecord]) -> Vec<CustomerRow> {
    let mut by_id = BTreeMap::new();
    for r in records {
        by_id.insert(
            r.customer_id,
            CustomerRow {
                customer_id: r.customer_id,
                gender: r.customer_gender.clone(),
                age: r.customer_age,
            },
        );
    }
    by_id.into_values().collect()
}

/// Products named [`UNKNOWN`] are not reified
pub fn product_rows(records: &[CleanedRecord]) -> Vec<ProductRow> {
    let mut products = BTreeMap::new();
    for r in records.iter().filter(|r| r.product_name != UNKNOWN) {
        let row = ProductRow {
            category: r.product_category.clone(),
            product_name: r.product_name.clone(),
        };
        products.insert(row.clone(), row);
    }
    products.into_values().collect()
}

pub fn date_rows(records: &[CleanedRecord]) -> Vec<DateRow> {
    let mut dates = BTreeMap::new();
    for date in records.iter().filter_map(|r| r.purchase_date) {
        dates.insert(date, date_row(date));
    }
    dates.into_values().collect()
}

pub fn payment_rows(records: &[CleanedRecord]) -> Vec<PaymentRow> {
    let mut methods = BTreeMap::new();
    for method in records.iter().filter_map(|r| r.payment_method.as_ref()) {
        methods.insert(
            method.clone(),
            PaymentRow {
                method_name: method.clone(),
            },
        );
    }
    methods.into_values().collect()
}

pub fn region_rows(records: &[CleanedRecord]) -> Vec<RegionRow> {
    let mut regions = BTreeMap::new();
    for r in records {
        regions.insert(
            r.shipping_region.clone(),
            RegionRow {
                region_name: r.shipping_region.clone(),
            },
        );
    }
    regions.into_values().collect()
}

impl UpsertRow for CustomerRow {
    const COLUMNS: usize = 3;
    const INSERT: &'static str = "INSERT INTO dim_customers (customer_id, gender, age) ";
    const ON_CONFLICT: &'static str = " ON CONFLICT (customer_id) DO UPDATE SET \
        gender = EXCLUDED.gender, age = EXCLUDED.age";

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>) {
        b.push_bind(self.customer_id)
            .push_bind(&self.gender)
            .push_bind(self.age);
    }
}

impl UpsertRow for ProductRow {
    const COLUMNS: usize = 2;
    const INSERT: &'static str = "INSERT INTO dim_products (category, product_name) ";
    // No-op update so the conflicting row is still counted as affected
    const ON_CONFLICT: &'static str = " ON CONFLICT (category, product_name) DO UPDATE SET \
        category = EXCLUDED.category";

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>) {
        b.push_bind(&self.category).push_bind(&self.product_name);
    }
}

impl UpsertRow for DateRow {
    const COLUMNS: usize = 6;
    const INSERT: &'static str =
        "INSERT INTO dim_dates (full_date, year, quarter, month, day, day_of_week) ";
    const ON_CONFLICT: &'static str = " ON CONFLICT (full_date) DO UPDATE SET \
        year = EXCLUDED.year, quarter = EXCLUDED.quarter, month = EXCLUDED.month, \
        day = EXCLUDED.day, day_of_week = EXCLUDED.day_of_week";

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>) {
        b.push_bind(self.full_date)
            .push_bind(self.year)
            .push_bind(self.quarter)
            .push_bind(self.month)
            .push_bind(self.day)
            .push_bind(&self.day_of_week);
    }
}

impl UpsertRow for PaymentRow {
    const COLUMNS: usize = 1;
    const INSERT: &'static str = "INSERT INTO dim_payments (method_name) ";
    const ON_CONFLICT: &'static str =
        " ON CONFLICT (method_name) DO UPDATE SET method_name = EXCLUDED.method_name";

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>) {
        b.push_bind(&self.method_name);
    }
}

impl UpsertRow for RegionRow {
    const COLUMNS: usize = 1;
    const INSERT: &'static str = "INSERT INTO dim_shipping_regions (region_name) ";
    const ON_CONFLICT: &'static str =
        " ON CONFLICT (region_name) DO UPDATE SET region_name = EXCLUDED.region_name";

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>) {
        b.push_bind(&self.region_name);
    }
}

/// Per-loader result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionStats {
    pub stage: Stage,
    /// Distinct natural keys derived from the cleaned records
    pub candidates: usize,
    pub upserted: u64,
}

/// Loads the five dimension tables from cleaned records
#[derive(Debug, Clone)]
pub struct DimensionLoader {
    batch_size: usize,
}

impl Default for DimensionLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl DimensionLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    async fn load<T: UpsertRow>(
        &self,
        conn: &mut PgConnection,
        stage: Stage,
        rows: Vec<T>,
    ) -> Result<DimensionStats> {
        let candidates = rows.len();
        if candidates == 0 {
            info!(%stage, "No dimension candidates, skipping");
            return Ok(DimensionStats {
                stage,
                candidates,
                upserted: 0,
            });
        }

        match upsert_rows(conn, &rows, self.batch_size).await {
            Ok(upserted) => {
                info!(%stage, candidates, upserted, "Dimension loaded");
                Ok(DimensionStats {
                    stage,
                    candidates,
                    upserted,
                })
            },
            Err(e) => {
                let err = EtlError::batch(stage, e);
                error!(%stage, error = %err, "Dimension load rolled back");
                Err(err)
            },
        }
    }

    #[instrument(skip_all)]
    pub async fn load_customers(
        &self,
        conn: &mut PgConnection,
        records: &[CleanedRecord],
    ) -> Result<DimensionStats> {
        self.load(conn, Stage::Customers, customer_rows(records)).await
    }

    #[instrument(skip_all)]
    pub async fn load_products(
        &self,
        conn: &mut PgConnection,
        records: &[CleanedRecord],
    ) -> Result<DimensionStats> {
        self.load(conn, Stage::Products, product_rows(records)).await
    }

    #[instrument(skip_all)]
    pub async fn load_dates(
        &self,
        conn: &mut PgConnection,
        records: &[CleanedRecord],
    ) -> Result<DimensionStats> {
        self.load(conn, Stage::Dates, date_rows(records)).await
    }

    #[instrument(skip_all)]
    pub async fn load_payments(
        &self,
        conn: &mut PgConnection,
        records: &[CleanedRecord],
    ) -> Result<DimensionStats> {
        self.load(conn, Stage::Payments, payment_rows(records)).await
    }

    #[instrument(skip_all)]
    pub async fn load_shipping_regions(
        &self,
        conn: &mut PgConnection,
        records: &[CleanedRecord],
    ) -> Result<DimensionStats> {
        self.load(conn, Stage::ShippingRegions, region_rows(records)).await
    }

    /// Run all five loaders in sequence. A failure in one does not stop the
    /// others; the caller decides what a failed stage means.
    pub async fn load_all(
        &self,
        conn: &mut PgConnection,
        records: &[CleanedRecord],
    ) -> Vec<(Stage, Result<DimensionStats>)> {
        vec![
            (Stage::Customers, self.load_customers(conn, records).await),
            (Stage::Products, self.load_products(conn, records).await),
            (Stage::Dates, self.load_dates(conn, records).await),
            (Stage::Payments, self.load_payments(conn, records).await),
            (Stage::ShippingRegions, self.load_shipping_regions(conn, records).await),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use proptest::prelude::*;

    fn record(order_id: i64, customer_id: i64, name: &str, date: Option<NaiveDate>) -> CleanedRecord {
        CleanedRecord {
            order_id,
            purchase_date: date,
            customer_id,
            customer_gender: "F".into(),
            customer_age: 30,
            product_category: "Electronics".into(),
            product_name: name.into(),
            product_price: BigDecimal::from(500),
            quantity: 1,
            order_total: BigDecimal::from(500),
            payment_method: Some("Card".into()),
            shipping_region: "North".into(),
        }
    }

    #[test]
    fn test_quarter_of_month() {
        assert_eq!(quarter_of(1), 1);
        assert_eq!(quarter_of(3), 1);
        assert_eq!(quarter_of(4), 2);
        assert_eq!(quarter_of(9), 3);
        assert_eq!(quarter_of(12), 4);
    }

    #[test]
    fn test_date_row_attributes() {
        let row = date_row(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(row.year, 2024);
        assert_eq!(row.quarter, 1);
        assert_eq!(row.month, 3);
        assert_eq!(row.day, 1);
        assert_eq!(row.day_of_week, "Friday");
    }

    #[test]
    fn test_customers_last_occurrence_wins() {
        let mut second = record(2, 7, "Phone", None);
        second.customer_age = 31;
        let rows = customer_rows(&[record(1, 7, "Phone", None), second, record(3, 8, "Phone", None)]);

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            CustomerRow {
                customer_id: 7,
                gender: "F".into(),
                age: 31
            }
        );
    }

    #[test]
    fn test_unknown_products_excluded() {
        let rows = product_rows(&[
            record(1, 7, "Phone", None),
            record(2, 7, UNKNOWN, None),
            record(3, 8, "Phone", None),
        ]);
        assert_eq!(
            rows,
            vec![ProductRow {
                category: "Electronics".into(),
                product_name: "Phone".into()
            }]
        );
    }

    #[test]
    fn test_dates_skip_missing_and_dedupe() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1);
        let rows = date_rows(&[record(1, 7, "Phone", day), record(2, 7, "Phone", None), record(3, 7, "Phone", day)]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_payments_skip_missing_method() {
        let mut cash = record(2, 7, "Phone", None);
        cash.payment_method = Some("Cash".into());
        let mut none = record(3, 7, "Phone", None);
        none.payment_method = None;

        let names: Vec<_> = payment_rows(&[record(1, 7, "Phone", None), cash, none])
            .into_iter()
            .map(|p| p.method_name)
            .collect();
        assert_eq!(names, vec!["Card", "Cash"]);
    }

    #[test]
    fn test_unknown_region_is_still_a_region() {
        let mut unknown = record(2, 7, "Phone", None);
        unknown.shipping_region = UNKNOWN.into();
        let rows = region_rows(&[record(1, 7, "Phone", None), unknown]);
        assert_eq!(rows.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_quarter_in_range_and_monotonic(month in 1u32..=12) {
            let q = quarter_of(month);
            prop_assert!((1..=4).contains(&q));
            prop_assert_eq!(q, (month + 2) / 3);
        }
    }
}
