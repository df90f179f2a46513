//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from ReqGate,
//! allowing users to import them with a single `use reqgate::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::client::Client;
pub use crate::error::ReqGateError;
pub use crate::request::Request;
pub use crate::response::Response;

// Middleware
pub use crate::middleware::{handler_fn, middleware_fn, BoxHandler, Handler, Middleware};
pub use crate::middlewares::{debug_logger, random_user_agent, referer_filler};

// Governance
pub use crate::limiters::{
    delay_limiter, filter_limiter, parallelism_limiter, rate_limiter, DelayRule, FilterRule,
    LimiterMiddleware, ParallelismRule, RateRule,
};
pub use crate::matchers::HostPattern;
pub use crate::storage::LimitScope;

// Transport
pub use crate::transport::{Exchange, HttpExchange, MockExchange};

// Configuration
pub use crate::config::ClientConfig;

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{init_tracing, TelemetryConfig};
