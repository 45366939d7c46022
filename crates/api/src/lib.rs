// API crate clippy configuration
#![allow(clippy::too_many_arguments)] // Audit entries carry full request context
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! KnightCall Admin API Library
//!
//! Server components for the KnightCall admin console: authentication,
//! organization management, credits and subscriptions.

pub mod audit;
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod routes;
pub mod security;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
