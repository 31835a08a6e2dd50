//! REST API module
//!
//! This module provides the HTTP server and REST API endpoints including:
//! - Public catalog and user routes under `/api/v1`
//! - Admin routes under `/api/v1/admin`
//! - Request tracing, profiling, rate limiting and security headers

pub mod server;
pub mod routes;
pub mod middleware;
pub mod handlers;
pub mod models;

pub use server::ApiServer;
pub use crate::core::error::ErrorResponse;
pub use middleware::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
