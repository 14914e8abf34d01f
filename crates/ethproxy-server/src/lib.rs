//! HTTP boundary for the eth-proxy service.
//!
//! Translates the REST/JSON surface into [`ethproxy_pool::NodePool`]
//! operations and back:
//!
//! - [`handlers`] - per-route parameter validation, bounded upstream calls,
//!   domain-error-to-status translation
//! - [`middleware`] - request observability (log line + Prometheus counters
//!   per request, response body capture at debug level)
//! - [`metrics`] - Prometheus recorder installation and the `/metrics` route
//! - [`service`] - router assembly and the start/stop lifecycle

pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod service;

pub use service::{router, AppState, Service};
