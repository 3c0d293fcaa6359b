//! DWH Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error type and logging setup for the order warehouse workspace.
//!
//! - **Error Handling**: [`DwhError`] and the [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use dwh_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> dwh_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{DwhError, Result};
