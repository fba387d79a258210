//! HTTP build-cache service for memoization records.
//!
//! This crate provides the remote-service API:
//! - Point lookup with preventive pinning
//! - AddContentHashList (add-or-get, or forced overwrite)
//! - Record-level compare-exchange
//! - Selector enumeration in three shapes
//! - Health and Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
