//! Admission control and response hardening.

pub mod client_key;
pub mod headers;
pub mod rate_limit;

pub use client_key::{ForwardedHeaderMode, ForwardedHeaders, client_key};
pub use rate_limit::{DEFAULT_LIMITER_SWEEP_INTERVAL, RateLimitConfig, RateLimiter};
