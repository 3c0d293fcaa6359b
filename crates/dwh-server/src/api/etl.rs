//! `GET /call_etl`: run the whole pipeline synchronously
//!
//! The response only says whether the run happened. Per-stage results go to
//! the log.

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info};

use super::response::MessageResponse;
use super::AppState;
use crate::etl::{EtlError, PipelineReport};

pub const ETL_SUCCESS_MESSAGE: &str = "ETL completed successfully";
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load the CSV file";
pub const CONNECTION_ERROR_MESSAGE: &str = "Database connection error";

pub async fn call_etl(State(state): State<AppState>) -> (StatusCode, Json<MessageResponse>) {
    match run(&state).await {
        Ok(report) => {
            info!(
                complete = report.is_complete(),
                failed_stages = report.failed_stages.len(),
                elapsed_ms = report.elapsed_ms,
                "ETL triggered over HTTP finished"
            );
            (StatusCode::OK, Json(MessageResponse::new(ETL_SUCCESS_MESSAGE)))
        },
        Err(e) => {
            error!(error = %e, "ETL run aborted");
            let message = match e {
                EtlError::Load { .. } => LOAD_ERROR_MESSAGE,
                _ => CONNECTION_ERROR_MESSAGE,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(MessageResponse::new(message)))
        },
    }
}

/// The file is read before a connection is taken from the pool
async fn run(state: &AppState) -> Result<PipelineReport, EtlError> {
    let raw = state.etl.load().await?;
    let mut conn = state.db.acquire().await.map_err(EtlError::Connection)?;
    state.etl.run_loaded(&mut conn, raw).await
}
