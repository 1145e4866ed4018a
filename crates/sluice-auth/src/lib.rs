//! Auth handler implementations for the sluice gateway: a table-driven
//! static handler for dev and tests, and an HTTP client for a remote auth
//! provider.

pub mod remote;
pub mod static_auth;

pub use remote::RemoteAuth;
pub use static_auth::StaticAuth;
