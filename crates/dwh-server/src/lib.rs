//! DWH Server Library
//!
//! Batch ETL for an e-commerce order warehouse, plus the HTTP and CLI
//! surfaces around it.
//!
//! # Overview
//!
//! - **ETL** (`etl`): CSV → `temp_orders` staging → cleaning → five dimension
//!   tables → `fact_orders`, each stage in its own transaction
//! - **Insights** (`insights`): read-only reports over the star schema
//! - **API** (`api`): `GET /call_etl`, `GET /health`, `GET /insights/*`
//! - **Database** (`db`): pool creation, health check, migrations
//! - **Configuration** (`config`): environment-based, `.env` aware
//!
//! # Example
//!
//! ```no_run
//! use dwh_server::{config::Config, db, etl::EtlPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let mut conn = pool.acquire().await?;
//!     let report = EtlPipeline::new(config.etl).run(&mut conn).await?;
//!     println!("{} fact rows", report.facts.map_or(0, |f| f.inserted));
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod etl;
pub mod insights;
pub mod middleware;

pub use error::AppError;
