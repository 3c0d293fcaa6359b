//! Staging writer for `temp_orders`
//!
//! Rows missing any of the required columns are skipped. Valid rows are
//! inserted one at a time, each behind a savepoint so a single bad row rolls
//! back alone, and committed in chunks of `batch_size`. If the chunk itself
//! breaks (savepoint handling or commit fails) the remaining rows are abandoned
//! and only the uncommitted chunk is lost.

use serde::Serialize;
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::{error, info, instrument, warn};

use super::error::{EtlError, Result, Stage};
use super::models::{RawRecord, REQUIRED_COLUMNS};
use super::DEFAULT_BATCH_SIZE;
use dwh_common::DwhError;

const INSERT_STAGING_ROW: &str = r#"
    INSERT INTO temp_orders (
        order_id, purchase_date, customer_id, customer_gender, customer_age,
        product_category, product_name, product_price, quantity, order_total,
        payment_method, shipping_region
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
"#;

/// What happens to rows left in `temp_orders` by earlier runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingPolicy {
    /// Empty the staging table before writing; reruns stay idempotent
    #[default]
    Truncate,
    /// Keep earlier rows; the cleaner sees every run's input
    Append,
}

impl std::str::FromStr for StagingPolicy {
    type Err = DwhError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "truncate" => Ok(StagingPolicy::Truncate),
            "append" => Ok(StagingPolicy::Append),
            _ => Err(DwhError::invalid_env("ETL_STAGING_POLICY", s, "truncate|append")),
        }
    }
}

impl std::fmt::Display for StagingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagingPolicy::Truncate => write!(f, "truncate"),
            StagingPolicy::Append => write!(f, "append"),
        }
    }
}

/// Row range (1-based, inclusive) that was being written when a chunk failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagingAbort {
    pub first_row: usize,
    pub last_row: usize,
    pub reason: String,
}

/// Outcome of one staging pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagingStats {
    pub total: usize,
    pub inserted: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
    pub aborted: Option<StagingAbort>,
}

/// First required column that is missing or blank, if any
pub fn missing_required(row: &RawRecord) -> Option<&'static str> {
    REQUIRED_COLUMNS
        .into_iter()
        .find(|column| row.get(column).map_or(true, |v| v.trim().is_empty()))
}

/// Writes raw rows into `temp_orders`
#[derive(Debug, Clone)]
pub struct StagingWriter {
    policy: StagingPolicy,
    batch_size: usize,
}

impl Default for StagingWriter {
    fn default() -> Self {
        Self::new(StagingPolicy::default(), DEFAULT_BATCH_SIZE)
    }
}

impl StagingWriter {
    pub fn new(policy: StagingPolicy, batch_size: usize) -> Self {
        Self {
            policy,
            batch_size: batch_size.max(1),
        }
    }

    /// Stage `rows`. Row numbers in logs and in [`StagingAbort`] are 1-based
    /// positions in `rows`.
    ///
    /// Returns `Err` only when the staging table cannot be prepared; chunk
    /// failures are reported through [`StagingStats::aborted`].
    #[instrument(skip_all, fields(rows = rows.len(), policy = %self.policy))]
    pub async fn write(&self, conn: &mut PgConnection, rows: &[RawRecord]) -> Result<StagingStats> {
        if self.policy == StagingPolicy::Truncate {
            sqlx::query("TRUNCATE TABLE temp_orders RESTART IDENTITY")
                .execute(&mut *conn)
                .await
                .map_err(|e| EtlError::batch(Stage::Staging, e))?;
        }

        let mut stats = StagingStats {
            total: rows.len(),
            ..Default::default()
        };

        let valid: Vec<(usize, &RawRecord)> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| (index + 1, row))
            .filter(|(row_number, row)| match missing_required(row) {
                Some(column) => {
                    warn!(row = row_number, column, "Row skipped: required value missing");
                    stats.skipped_invalid += 1;
                    false
                },
                None => true,
            })
            .collect();

        for chunk in valid.chunks(self.batch_size) {
            if let Err(abort) = self.write_chunk(conn, chunk, &mut stats).await {
                error!(
                    first_row = abort.first_row,
                    last_row = abort.last_row,
                    reason = %abort.reason,
                    "Staging aborted; uncommitted rows rolled back"
                );
                stats.aborted = Some(abort);
                break;
            }
        }

        info!(
            inserted = stats.inserted,
            skipped_invalid = stats.skipped_invalid,
            failed = stats.failed,
            aborted = stats.aborted.is_some(),
            "Staging complete"
        );

        Ok(stats)
    }

    /// Insert one chunk in its own transaction. On success the chunk's rows are
    /// added to `stats.inserted`.
    async fn write_chunk(
        &self,
        conn: &mut PgConnection,
        chunk: &[(usize, &RawRecord)],
        stats: &mut StagingStats,
    ) -> std::result::Result<(), StagingAbort> {
        let first_row = chunk.first().map(|(n, _)| *n).unwrap_or_default();
        let abort = |last_row: usize, err: &sqlx::Error| StagingAbort {
            first_row,
            last_row,
            reason: err.to_string(),
        };

        let mut tx = conn.begin().await.map_err(|e| abort(first_row, &e))?;
        let mut pending = 0;
        let mut failed = 0;

        for &(row_number, row) in chunk {
            if let Err(e) = sqlx::query("SAVEPOINT staging_row").execute(&mut *tx).await {
                rollback_quietly(tx).await;
                return Err(abort(row_number, &e));
            }

            match insert_row(&mut tx, row).await {
                Ok(()) => {
                    if let Err(e) = sqlx::query("RELEASE SAVEPOINT staging_row")
                        .execute(&mut *tx)
                        .await
                    {
                        rollback_quietly(tx).await;
                        return Err(abort(row_number, &e));
                    }
                    pending += 1;
                },
                Err(e) => {
                    if let Err(rollback_err) = sqlx::query("ROLLBACK TO SAVEPOINT staging_row")
                        .execute(&mut *tx)
                        .await
                    {
                        rollback_quietly(tx).await;
                        return Err(abort(row_number, &rollback_err));
                    }
                    warn!(
                        row = row_number,
                        error = %EtlError::row(row_number, &e),
                        "Row insert failed, skipped"
                    );
                    failed += 1;
                },
            }
        }

        let last_row = chunk.last().map(|(n, _)| *n).unwrap_or(first_row);
        tx.commit().await.map_err(|e| abort(last_row, &e))?;

        stats.inserted += pending;
        stats.failed += failed;
        Ok(())
    }
}

async fn insert_row(tx: &mut Transaction<'_, Postgres>, row: &RawRecord) -> sqlx::Result<()> {
    sqlx::query(INSERT_STAGING_ROW)
        .bind(row.order_id.as_deref())
        .bind(row.purchase_date.as_deref())
        .bind(row.customer_id.as_deref())
        .bind(row.customer_gender.as_deref())
        .bind(row.customer_age.as_deref())
        .bind(row.product_category.as_deref())
        .bind(row.product_name.as_deref())
        .bind(row.product_price.as_deref())
        .bind(row.quantity.as_deref())
        .bind(row.order_total.as_deref())
        .bind(row.payment_method.as_deref())
        .bind(row.shipping_region.as_deref())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn rollback_quietly(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "Rollback of staging chunk failed");
    }
}
