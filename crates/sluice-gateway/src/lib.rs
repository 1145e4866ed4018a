//! HTTP pipeline for the sluice storage gateway.
//!
//! [`handler`] implements the v1 request flow over the core ports;
//! [`server`] is the hyper accept loop; the remaining modules cover query
//! normalisation, response shaping, Prometheus metrics and the webhook
//! notifier. The `sluiced` binary wires everything from configuration.

pub mod handler;
pub mod metrics;
pub mod query;
pub mod response;
pub mod server;
pub mod webhook;

pub use handler::Gateway;
pub use metrics::GatewayMetrics;
pub use server::GatewayServer;
pub use webhook::WebhookNotifier;
