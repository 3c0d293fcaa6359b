//! Fact loader
//!
//! Surrogate keys are resolved against in-memory copies of the dimension
//! tables, read once per run after the dimension loaders have committed. A
//! record missing any of its five references is skipped, never partially
//! written.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, Postgres};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, error, info, instrument};

use super::error::{EtlError, Result, Stage};
use super::models::{CleanedRecord, FactRow};
use super::upsert::{upsert_rows, UpsertRow};
use super::DEFAULT_BATCH_SIZE;

/// Natural key → surrogate key maps for every dimension
#[derive(Debug, Clone, Default)]
pub struct LookupMaps {
    pub dates: HashMap<NaiveDate, i64>,
    pub products: HashMap<(String, String), i64>,
    pub payments: HashMap<String, i64>,
    pub regions: HashMap<String, i64>,
    /// Customer ids double as surrogate keys; only existence is checked
    pub customers: HashSet<i64>,
}

impl LookupMaps {
    /// Read all five dimension tables
    pub async fn load(conn: &mut PgConnection) -> std::result::Result<Self, sqlx::Error> {
        let dates = sqlx::query_as::<_, (NaiveDate, i64)>("SELECT full_date, date_id FROM dim_dates")
            .fetch_all(&mut *conn)
            .await?;
        let products = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT category, product_name, product_id FROM dim_products",
        )
        .fetch_all(&mut *conn)
        .await?;
        let payments = sqlx::query_as::<_, (String, i64)>(
            "SELECT method_name, payment_method_id FROM dim_payments",
        )
        .fetch_all(&mut *conn)
        .await?;
        let regions = sqlx::query_as::<_, (String, i64)>(
            "SELECT region_name, shipping_region_id FROM dim_shipping_regions",
        )
        .fetch_all(&mut *conn)
        .await?;
        let customers = sqlx::query_scalar::<_, i64>("SELECT customer_id FROM dim_customers")
            .fetch_all(&mut *conn)
            .await?;

        let maps = Self {
            dates: dates.into_iter().collect(),
            products: products
                .into_iter()
                .map(|(category, name, id)| ((category, name), id))
                .collect(),
            payments: payments.into_iter().collect(),
            regions: regions.into_iter().collect(),
            customers: customers.into_iter().collect(),
        };

        debug!(
            dates = maps.dates.len(),
            products = maps.products.len(),
            payments = maps.payments.len(),
            regions = maps.regions.len(),
            customers = maps.customers.len(),
            "Loaded dimension lookups"
        );

        Ok(maps)
    }

    /// Resolve one record, or say which reference is missing (first failure wins)
    pub fn resolve(&self, record: &CleanedRecord) -> std::result::Result<FactRow, SkipReason> {
        let date = record.purchase_date.ok_or(SkipReason::MissingDate)?;
        let date_id = *self.dates.get(&date).ok_or(SkipReason::UnknownDate)?;

        if !self.customers.contains(&record.customer_id) {
            return Err(SkipReason::UnknownCustomer);
        }

        let product_id = *self
            .products
            .get(&(record.product_category.clone(), record.product_name.clone()))
            .ok_or(SkipReason::UnknownProduct)?;
        let payment_method_id = *record
            .payment_method
            .as_ref()
            .and_then(|method| self.payments.get(method))
            .ok_or(SkipReason::UnknownPayment)?;
        let shipping_region_id = *self
            .regions
            .get(&record.shipping_region)
            .ok_or(SkipReason::UnknownRegion)?;

        Ok(FactRow {
            order_id: record.order_id,
            date_id,
            customer_id: record.customer_id,
            product_id,
            payment_method_id,
            shipping_region_id,
            price: record.product_price.clone(),
            quantity: record.quantity,
            order_total: record.order_total.clone(),
        })
    }
}

/// Why a cleaned record produced no fact row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingDate,
    UnknownDate,
    UnknownCustomer,
    UnknownProduct,
    UnknownPayment,
    UnknownRegion,
}

/// Resolved fact rows, one per order id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactResolution {
    pub rows: Vec<FactRow>,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Records that repeated an order id already seen in this run
    pub duplicates: usize,
}

impl FactResolution {
    pub fn skipped_count(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Resolve every record; later records with the same order id replace earlier ones
pub fn resolve_facts(records: &[CleanedRecord], maps: &LookupMaps) -> FactResolution {
    let mut by_order = BTreeMap::new();
    let mut resolution = FactResolution::default();

    for record in records {
        match maps.resolve(record) {
            Ok(row) => {
                if by_order.insert(row.order_id, row).is_some() {
                    resolution.duplicates += 1;
                }
            },
            Err(reason) => {
                debug!(order_id = record.order_id, ?reason, "Fact row skipped");
                *resolution.skipped.entry(reason).or_default() += 1;
            },
        }
    }

    resolution.rows = by_order.into_values().collect();
    resolution
}

impl UpsertRow for FactRow {
    const COLUMNS: usize = 9;
    const INSERT: &'static str = "INSERT INTO fact_orders (order_id, date_id, customer_id, \
        product_id, payment_method_id, shipping_region_id, price, quantity, order_total) ";
    const ON_CONFLICT: &'static str = " ON CONFLICT (order_id) DO UPDATE SET \
        date_id = EXCLUDED.date_id, customer_id = EXCLUDED.customer_id, \
        product_id = EXCLUDED.product_id, payment_method_id = EXCLUDED.payment_method_id, \
        shipping_region_id = EXCLUDED.shipping_region_id, price = EXCLUDED.price, \
        quantity = EXCLUDED.quantity, order_total = EXCLUDED.order_total";

    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>) {
        b.push_bind(self.order_id)
            .push_bind(self.date_id)
            .push_bind(self.customer_id)
            .push_bind(self.product_id)
            .push_bind(self.payment_method_id)
            .push_bind(self.shipping_region_id)
            .push_bind(&self.price)
            .push_bind(self.quantity)
            .push_bind(&self.order_total);
    }
}

/// Fact stage result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FactStats {
    pub inserted: u64,
    pub skipped: usize,
    pub skip_reasons: BTreeMap<SkipReason, usize>,
    pub duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct FactLoader {
    batch_size: usize,
}

impl Default for FactLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl FactLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Resolve and upsert fact rows. The whole upsert commits or rolls back
    /// as one transaction.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn load(&self, conn: &mut PgConnection, records: &[CleanedRecord]) -> Result<FactStats> {
        let maps = LookupMaps::load(conn)
            .await
            .map_err(|e| EtlError::batch(Stage::Facts, e))?;
        let resolution = resolve_facts(records, &maps);

        let inserted = match upsert_rows(conn, &resolution.rows, self.batch_size).await {
            Ok(n) => n,
            Err(e) => {
                let err = EtlError::batch(Stage::Facts, e);
                error!(
                    error = %err,
                    attempted = resolution.rows.len(),
                    "Fact load rolled back"
                );
                return Err(err);
            },
        };

        let stats = FactStats {
            inserted,
            skipped: resolution.skipped_count(),
            skip_reasons: resolution.skipped,
            duplicates: resolution.duplicates,
        };

        info!(
            inserted = stats.inserted,
            skipped = stats.skipped,
            duplicates = stats.duplicates,
            "Facts loaded"
        );

        Ok(stats)
    }
}
