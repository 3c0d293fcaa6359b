//! ETL error taxonomy
//!
//! Only [`EtlError::Load`] and [`EtlError::Connection`] end a run. Row errors are
//! logged and counted inside the stage that produced them, and batch errors
//! roll back one stage's transaction and are recorded in the pipeline report.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Pipeline stage, used for logging and failure reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Staging,
    Cleaning,
    Customers,
    Products,
    Dates,
    Payments,
    ShippingRegions,
    Facts,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Staging => "staging",
            Stage::Cleaning => "cleaning",
            Stage::Customers => "customers",
            Stage::Products => "products",
            Stage::Dates => "dates",
            Stage::Payments => "payments",
            Stage::ShippingRegions => "shipping_regions",
            Stage::Facts => "facts",
        }
    }

    /// Table written (or read, for cleaning) by the stage
    pub fn table(&self) -> Option<&'static str> {
        match self {
            Stage::Load => None,
            Stage::Staging | Stage::Cleaning => Some("temp_orders"),
            Stage::Customers => Some("dim_customers"),
            Stage::Products => Some("dim_products"),
            Stage::Dates => Some("dim_dates"),
            Stage::Payments => Some("dim_payments"),
            Stage::ShippingRegions => Some("dim_shipping_regions"),
            Stage::Facts => Some("fact_orders"),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for the ETL run
#[derive(Debug, Error)]
pub enum EtlError {
    /// Source file unreadable or malformed
    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// One row failed validation, coercion, or insert
    #[error("Row {row} rejected: {reason}")]
    Row { row: usize, reason: String },

    /// A stage's bulk operation failed and was rolled back
    #[error("{stage} batch failed: {source}")]
    Batch {
        stage: Stage,
        #[source]
        source: sqlx::Error,
    },

    /// The store is unreachable
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),
}

impl EtlError {
    pub fn load(path: &Path, reason: impl ToString) -> Self {
        Self::Load {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn row(row: usize, reason: impl ToString) -> Self {
        Self::Row {
            row,
            reason: reason.to_string(),
        }
    }

    /// Wrap a stage failure, escalating to [`EtlError::Connection`] when the
    /// underlying cause is a lost or unavailable connection
    pub fn batch(stage: Stage, source: sqlx::Error) -> Self {
        if is_connection_error(&source) {
            Self::Connection(source)
        } else {
            Self::Batch { stage, source }
        }
    }

    /// Load and connection failures abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::Load { .. } | EtlError::Connection(_))
    }
}

/// Errors that mean the store cannot be reached, as opposed to a bad statement
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_escalates_connection_errors() {
        let err = EtlError::batch(Stage::Products, sqlx::Error::PoolTimedOut);
        assert!(matches!(err, EtlError::Connection(_)));
        assert!(err.is_fatal());

        let err = EtlError::batch(Stage::Products, sqlx::Error::RowNotFound);
        assert!(matches!(err, EtlError::Batch { stage: Stage::Products, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_load_and_row_messages() {
        let err = EtlError::load(Path::new("orders.csv"), "missing column order_id");
        assert_eq!(err.to_string(), "Failed to load orders.csv: missing column order_id");
        assert!(err.is_fatal());

        let err = EtlError::row(4, "product_price is not numeric");
        assert_eq!(err.to_string(), "Row 4 rejected: product_price is not numeric");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_stage_tables() {
        assert_eq!(Stage::ShippingRegions.table(), Some("dim_shipping_regions"));
        assert_eq!(Stage::Load.table(), None);
        assert_eq!(Stage::Facts.to_string(), "facts");
    }
}
