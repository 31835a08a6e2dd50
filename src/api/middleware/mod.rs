pub mod client;
pub mod profiling;
pub mod rate_limit;
pub mod security;
pub mod trace;

pub use client::*;
pub use profiling::*;
pub use rate_limit::*;
pub use security::*;
pub use trace::*;
