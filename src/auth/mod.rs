//! Authentication module
//!
//! This module provides authentication functionality including:
//! - User registration and login, admin login sessions
//! - JWT token generation and validation
//! - Password hashing and verification, failed-login lockout
//! - Authentication middleware and role-based permission checks

pub mod bootstrap;
pub mod handlers;
pub mod jwt;
pub mod lockout;
pub mod middleware;
pub mod models;
pub mod password;
pub mod permissions;

pub use bootstrap::ensure_bootstrap_admin;
pub use jwt::{generate_token, validate_token, Claims, TokenKind};
pub use lockout::LoginGuard;
pub use middleware::{authenticate_admin, authenticate_user, AdminUser, AuthUser};
pub use password::{hash_password, verify_password};
pub use permissions::PermissionChecker;
