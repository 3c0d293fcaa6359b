// Order warehouse ETL
//
// Moves e-commerce order rows from a CSV export into the star schema:
// - Load: read the CSV into raw records (loader)
// - Stage: validate and persist raw rows into temp_orders (staging)
// - Clean: read staging back, coerce types and fill defaults (cleaner)
// - Dimensions: upsert customers, products, dates, payments, regions (dimensions)
// - Facts: resolve surrogate keys and upsert fact_orders (facts)
//
// Every stage owns its transaction. A failed stage is rolled back and logged
// without aborting its siblings; only load and connection failures end a run.

pub mod cleaner;
pub mod dimensions;
pub mod error;
pub mod facts;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod staging;
pub mod upsert;

pub use cleaner::{CleanOutcome, Cleaner};
pub use dimensions::{DimensionLoader, DimensionStats};
pub use error::{EtlError, Result, Stage};
pub use facts::{FactLoader, FactStats, LookupMaps, SkipReason};
pub use loader::load_csv;
pub use models::{CleanedRecord, FactRow, RawRecord, StagingRecord, UNKNOWN};
pub use pipeline::{EtlPipeline, PipelineReport};
pub use staging::{StagingPolicy, StagingStats, StagingWriter};

/// Rows per multi-row INSERT statement
pub const DEFAULT_BATCH_SIZE: usize = 1000;
