//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for ReqGate.
//!
//! All magic numbers used by the governance core and the HTTP transport
//! are defined here with their purpose and usage context.

use std::time::Duration;

// ============================================================================
// Matcher Constants
// ============================================================================

/// Maximum length of a glob or regular expression host pattern.
///
/// Longer patterns are rejected at rule compilation time.
pub const MAX_PATTERN_LEN: usize = 1000;

// ============================================================================
// Rate Limiter Constants
// ============================================================================

/// Refill period of the fixed-window rate limiter (1 second).
///
/// Every period each known key is reset to its full `rate`.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Transport Constants
// ============================================================================

/// Maximum number of redirects followed by the HTTP exchange.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Host used to resolve relative request targets such as `/path` or `:8080/path`.
pub const DEFAULT_LOCAL_HOST: &str = "127.0.0.1";

/// Default `User-Agent` of the HTTP exchange.
pub const DEFAULT_USER_AGENT: &str = concat!("reqgate/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Builtin Middleware Constants
// ============================================================================

/// Browser user agents picked by the random user-agent middleware.
pub const BROWSER_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.2; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
];

// ============================================================================
// Telemetry Constants
// ============================================================================

/// Default log level used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";
