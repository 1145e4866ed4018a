//! Observability port
//!
//! A narrow sink the pipeline records into, so the core stays free of any
//! metrics backend. The gateway binary wires a Prometheus-backed
//! implementation; everything else defaults to [`NoopMetrics`].

use std::sync::Arc;

/// Per-request counters the pipeline emits.
pub trait MetricsSink: Send + Sync {
    /// One finished request, labelled by provider kind, action and status.
    fn record_request(&self, provider: &str, action: &str, status: u16);

    /// Bytes moved through the gateway; `direction` is "in" or "out".
    fn record_bytes(&self, direction: &str, bytes: u64);

    /// A request denied by the rate limiter.
    fn record_rate_limited(&self);

    /// A structured error record, labelled by wire code.
    fn record_error(&self, code: &str);
}

/// Sink that drops every sample.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_request(&self, _provider: &str, _action: &str, _status: u16) {}
    fn record_bytes(&self, _direction: &str, _bytes: u64) {}
    fn record_rate_limited(&self) {}
    fn record_error(&self, _code: &str) {}
}

/// Shared sink handle as carried in the request context.
pub type SharedMetrics = Arc<dyn MetricsSink>;
