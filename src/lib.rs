//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! ReqGate - Composable HTTP Client with Request Governance
//!
//! Wraps a basic HTTP exchange in a chain of middlewares and provides a
//! governance subsystem that filters, delays, rate-limits, and caps the
//! concurrency of outbound requests based on host-matching rules.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use reqgate::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`Client`] - Middleware chain plus the `execute` entry point
//! - [`Request`] / [`Response`] - Values passed along the chain
//! - [`ReqGateError`] - Error types
//!
//! ## Limiters
//!
//! - [`limiters::filter_limiter`] - Allow or deny hosts
//! - [`limiters::delay_limiter`] - Minimum spacing between requests
//! - [`limiters::rate_limiter`] - Fixed-window requests per second
//! - [`limiters::parallelism_limiter`] - Maximum concurrent requests
//!
//! ## Builtin Middlewares
//!
//! - [`middlewares::random_user_agent`] - Random browser `User-Agent`
//! - [`middlewares::referer_filler`] - Fill a missing `Referer` with the target origin
//! - [`middlewares::debug_logger`] - Request/response summaries at `debug` level
//!
//! # Examples
//!
//! ```rust
//! use reqgate::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::with_exchange(Arc::new(MockExchange::new()));
//!
//!     client
//!         .use_middleware(Arc::new(
//!             filter_limiter(false, vec![FilterRule::deny(HostPattern::glob("*.ads.com"))])
//!                 .unwrap(),
//!         ))
//!         .use_middleware(Arc::new(
//!             delay_limiter(
//!                 LimitScope::PerHost,
//!                 vec![DelayRule::new(HostPattern::any(), Duration::from_millis(10))],
//!             )
//!             .unwrap(),
//!         ));
//!
//!     let resp = client.execute(Request::get("http://example.com")).await;
//!     assert!(resp.is_success());
//!
//!     let resp = client.execute(Request::get("http://x.ads.com")).await;
//!     assert!(resp.is_rejected());
//! }
//! ```
//!
//! # Features
//!
//! - **Ordered middleware chain**: the first registered middleware sees the request first
//! - **Host rules**: glob (case-insensitive) or regular expression matching
//! - **Global or per-host state**: created lazily, shared across concurrent callers
//! - **Deadlines**: `Request::timeout` bounds every limiter wait and the network exchange
//! - **Configuration**: YAML/TOML with humantime durations
//! - **Logging**: `tracing` events, subscriber setup behind the `telemetry` feature

pub mod prelude;

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod factory;
pub mod limiters;
pub mod matchers;
pub mod middleware;
pub mod middlewares;
pub mod request;
pub mod response;
pub mod storage;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;

// 重新导出常用类型
pub use client::{default_client, execute, Client, ClientStats, ClientStatsSnapshot};
pub use config::{ClientConfig, FilterConfig, GovernanceConfig, ScopedRules};
pub use error::{BoxError, ReqGateError};
pub use factory::LimiterFactory;
pub use limiters::{
    delay_limiter, filter_limiter, parallelism_limiter, rate_limiter, LimiterMiddleware,
    LimiterStatsSnapshot,
};
pub use matchers::{HostMatcher, HostPattern};
pub use middleware::{handler_fn, middleware_fn, BoxHandler, Handler, Middleware};
pub use middlewares::{debug_logger, random_user_agent, referer_filler};
pub use request::{Request, ResponseCallback};
pub use response::Response;
pub use storage::{LimitScope, LimiterKey, StateStore};
pub use transport::{Exchange, HttpExchange, MockExchange, TransportConfig};
