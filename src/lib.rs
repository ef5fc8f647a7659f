//! Purchase records for a small inventory system: listing with derived
//! totals, filtering, sorting, and the transaction that records a purchase
//! together with its providers, products and stock batches.

pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod logging;
pub mod migrate;
pub mod purchases;
pub mod session;
pub mod time;

pub use error::{AppError, AppResult};
