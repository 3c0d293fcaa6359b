//! Read-only reports over the finished warehouse
//!
//! `queries` fetches joined order rows, `analysis` turns them into report
//! structs, and `routes` serves them under `/insights`.

pub mod analysis;
pub mod queries;
pub mod routes;

pub use queries::{fetch_order_views, OrderView};
