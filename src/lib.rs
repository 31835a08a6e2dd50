//! BookHub Backend Library
//!
//! This library provides the core functionality for the BookHub backend:
//! the book catalog, community and subscription services, admin access
//! control, database management and the REST API.

pub mod api;
pub mod auth;
pub mod cache;
pub mod core;
pub mod db;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::{ApiProfiler, AppError, Config};
pub use cache::CacheManager;
pub use db::DatabaseManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = anyhow::Result<T>;
