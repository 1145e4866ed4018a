//! Prometheus metrics for the gateway
//!
//! One registry for the process, exposed as text exposition on `/metrics`
//! and recorded into through the core `MetricsSink` port.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use sluice_core::metrics::MetricsSink;

/// Central metrics registry for the gateway process.
pub struct GatewayMetrics {
    registry: Registry,
    /// Counter: finished requests by (provider, action, status)
    pub requests_total: IntCounterVec,
    /// Counter: bytes proxied through the gateway by direction
    pub transfer_bytes_total: IntCounterVec,
    /// Counter: requests denied by the rate limiter
    pub rate_limited_total: IntCounter,
    /// Counter: structured errors by wire code
    pub errors_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("sluice".to_string()), None)?;

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Finished HTTP requests"),
            &["provider", "action", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let transfer_bytes_total = IntCounterVec::new(
            Opts::new("transfer_bytes_total", "Bytes proxied through the gateway"),
            &["direction"],
        )?;
        registry.register(Box::new(transfer_bytes_total.clone()))?;

        let rate_limited_total = IntCounter::new(
            "rate_limited_total",
            "Requests denied by the rate limiter",
        )?;
        registry.register(Box::new(rate_limited_total.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Request errors by wire code"),
            &["code"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            transfer_bytes_total,
            rate_limited_total,
            errors_total,
        })
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsSink for GatewayMetrics {
    fn record_request(&self, provider: &str, action: &str, status: u16) {
        self.requests_total
            .with_label_values(&[provider, action, &status.to_string()])
            .inc();
    }

    fn record_bytes(&self, direction: &str, bytes: u64) {
        self.transfer_bytes_total
            .with_label_values(&[direction])
            .inc_by(bytes);
    }

    fn record_rate_limited(&self) {
        self.rate_limited_total.inc();
    }

    fn record_error(&self, code: &str) {
        self.errors_total.with_label_values(&[code]).inc();
    }
}
