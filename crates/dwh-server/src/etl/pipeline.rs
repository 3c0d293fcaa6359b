//! Pipeline orchestration
//!
//! Stages run strictly in order on one connection handed in by the caller.
//! A stage that fails is recorded in the report and the run moves on; only a
//! load failure or a lost connection returns `Err`.

use serde::Serialize;
use sqlx::PgConnection;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use super::cleaner::{CleanOutcome, Cleaner};
use super::dimensions::{DimensionLoader, DimensionStats};
use super::error::{EtlError, Result, Stage};
use super::facts::{FactLoader, FactStats};
use super::loader::load_csv;
use super::models::RawRecord;
use super::staging::{StagingStats, StagingWriter};
use crate::config::EtlConfig;

/// A stage that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningStats {
    pub staged: usize,
    pub cleaned: usize,
    pub dropped: usize,
    pub undated: usize,
}

impl From<&CleanOutcome> for CleaningStats {
    fn from(outcome: &CleanOutcome) -> Self {
        Self {
            staged: outcome.records.len() + outcome.dropped_count(),
            cleaned: outcome.records.len(),
            dropped: outcome.dropped_count(),
            undated: outcome.undated,
        }
    }
}

/// Per-stage results of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub loaded: usize,
    pub staging: Option<StagingStats>,
    pub cleaning: Option<CleaningStats>,
    pub dimensions: Vec<DimensionStats>,
    pub facts: Option<FactStats>,
    pub failed_stages: Vec<StageFailure>,
    pub elapsed_ms: u64,
}

impl PipelineReport {
    /// Every stage completed
    pub fn is_complete(&self) -> bool {
        self.failed_stages.is_empty()
    }

    fn fail(&mut self, stage: Stage, error: impl ToString) {
        self.failed_stages.push(StageFailure {
            stage,
            error: error.to_string(),
        });
    }
}

/// Runs load → stage → clean → dimensions → facts
#[derive(Debug, Clone)]
pub struct EtlPipeline {
    config: EtlConfig,
}

impl EtlPipeline {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Read the configured source file off the async runtime
    pub async fn load(&self) -> Result<Vec<RawRecord>> {
        let path = self.config.csv_file_path.clone();
        let source = path.clone();
        tokio::task::spawn_blocking(move || load_csv(&path))
            .await
            .map_err(|e| EtlError::load(&source, format!("loader task failed: {e}")))?
    }

    /// Load the file and run every stage
    pub async fn run(&self, conn: &mut PgConnection) -> Result<PipelineReport> {
        let raw = self.load().await?;
        self.run_loaded(conn, raw).await
    }

    /// Run every stage over rows that were already loaded
    #[instrument(skip_all, fields(rows = raw.len(), source = %self.config.csv_file_path.display()))]
    pub async fn run_loaded(&self, conn: &mut PgConnection, raw: Vec<RawRecord>) -> Result<PipelineReport> {
        let started = Instant::now();
        let mut report = PipelineReport {
            loaded: raw.len(),
            ..Default::default()
        };

        let writer = StagingWriter::new(self.config.staging_policy, self.config.batch_size);
        match writer.write(conn, &raw).await {
            Ok(stats) => {
                if let Some(abort) = &stats.aborted {
                    report.fail(
                        Stage::Staging,
                        format!("rows {}..={} rolled back: {}", abort.first_row, abort.last_row, abort.reason),
                    );
                }
                report.staging = Some(stats);
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(error = %e, "Staging failed");
                report.fail(Stage::Staging, e);
            },
        }
        drop(raw);

        let outcome = match Cleaner::new().clean_staging(conn).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(error = %e, "Cleaning failed, nothing left to load");
                report.fail(Stage::Cleaning, e);
                report.elapsed_ms = elapsed_ms(started);
                return Ok(report);
            },
        };
        report.cleaning = Some(CleaningStats::from(&outcome));

        let dimensions = DimensionLoader::new(self.config.batch_size);
        for (stage, result) in dimensions.load_all(conn, &outcome.records).await {
            match result {
                Ok(stats) => report.dimensions.push(stats),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => report.fail(stage, e),
            }
        }

        match FactLoader::new(self.config.batch_size).load(conn, &outcome.records).await {
            Ok(stats) => report.facts = Some(stats),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => report.fail(Stage::Facts, e),
        }

        report.elapsed_ms = elapsed_ms(started);

        if report.is_complete() {
            info!(
                loaded = report.loaded,
                cleaned = outcome.records.len(),
                facts = report.facts.as_ref().map_or(0, |f| f.inserted),
                elapsed_ms = report.elapsed_ms,
                "ETL run complete"
            );
        } else {
            let failed: Vec<&str> = report.failed_stages.iter().map(|f| f.stage.as_str()).collect();
            warn!(
                failed = ?failed,
                elapsed_ms = report.elapsed_ms,
                "ETL run finished with failed stages"
            );
        }

        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
