#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! FieldHQ API server library
//!
//! HTTP surface over the lifecycle engine: the authenticated cron entry
//! point plus the subscription mutation routes.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
