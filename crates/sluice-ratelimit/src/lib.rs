//! Fixed-window, per-credential rate limiting for the sluice gateway.
//!
//! Counters live in a pluggable [`store::CounterStore`] (in-memory or
//! SQLite) so the window survives across gateway processes when needed.

pub mod limiter;
pub mod store;

pub use limiter::{classify, derive_key, CredentialClass, FixedWindowLimiter, LimitDecision};
pub use store::{CounterStore, MemoryCounterStore, SqliteCounterStore, WindowCount};
