//! Core business logic module
//!
//! This module provides the core application layer including:
//! - Business logic services
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system
//! - Pagination of list endpoints
//! - Audit trail of admin activity
//! - API profiling

pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod pagination;
pub mod profiler;
pub mod services;
pub mod utils;

pub use audit::{Activity, ActivityType, AuditLogger, AuthAttempt};
pub use config::Config;
pub use error::{AppError, ErrorResponse, Result};
pub use logging::Logger;
pub use pagination::{Page, PageParams, Pagination};
pub use profiler::ApiProfiler;
pub use services::{BookService, CatalogService, ReviewService, SubscriptionService};
