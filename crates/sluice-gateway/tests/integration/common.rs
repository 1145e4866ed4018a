//! Shared test helpers: gateway spawning and ZIP inspection.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sluice_auth::StaticAuth;
use sluice_core::config::Config;
use sluice_core::notify::NoopNotifier;
use sluice_gateway::{Gateway, GatewayMetrics, GatewayServer};
use sluice_providers::{MemStoreFactory, ProviderRegistry};
use sluice_ratelimit::FixedWindowLimiter;

/// A running gateway bound to an ephemeral port; shuts down on drop.
pub struct TestGateway {
    pub base: String,
    pub client: reqwest::Client,
    shutdown: CancellationToken,
}

impl TestGateway {
    pub fn url(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.base)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A gateway with the in-memory provider, open auth and no rate limit.
pub fn default_gateway() -> Gateway {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(MemStoreFactory::new("memstore")));
    gateway_with(registry, Config::default())
}

pub fn gateway_with(registry: ProviderRegistry, config: Config) -> Gateway {
    Gateway {
        config,
        registry,
        auth: Arc::new(StaticAuth::allow_all()),
        limiter: FixedWindowLimiter::disabled(),
        notifier: Arc::new(NoopNotifier),
        metrics: Arc::new(GatewayMetrics::new().unwrap()),
    }
}

/// Binds and serves `gateway`, returning a handle with a client that does
/// not follow redirects (so 302s stay observable).
pub async fn spawn(gateway: Gateway) -> TestGateway {
    let state = Arc::new(gateway);
    let server = GatewayServer::bind(state, "127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));

    TestGateway {
        base: format!("http://{addr}"),
        client: reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap(),
        shutdown,
    }
}

pub async fn spawn_default() -> TestGateway {
    spawn(default_gateway()).await
}

// ============================================================================
// Minimal ZIP reader for asserting archive contents
// ============================================================================

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Parses a stored-entry archive into (name, bytes) pairs via the central
/// directory, verifying each entry's CRC on the way.
pub fn unzip(buf: &[u8]) -> Vec<(String, Vec<u8>)> {
    let eocd = buf.len() - 22;
    assert_eq!(read_u32(buf, eocd), 0x0605_4b50, "missing end record");
    let count = read_u16(buf, eocd + 10) as usize;
    let mut at = read_u32(buf, eocd + 16) as usize;

    let mut entries = Vec::new();
    for _ in 0..count {
        assert_eq!(read_u32(buf, at), 0x0201_4b50, "bad central header");
        let crc = read_u32(buf, at + 16);
        let size = read_u32(buf, at + 24) as usize;
        let name_len = read_u16(buf, at + 28) as usize;
        let header_offset = read_u32(buf, at + 42) as usize;
        let name = String::from_utf8(buf[at + 46..at + 46 + name_len].to_vec()).unwrap();

        let local_name_len = read_u16(buf, header_offset + 26) as usize;
        let local_extra_len = read_u16(buf, header_offset + 28) as usize;
        let data_start = header_offset + 30 + local_name_len + local_extra_len;
        let data = buf[data_start..data_start + size].to_vec();
        assert_eq!(crc32fast::hash(&data), crc, "crc mismatch for {name}");

        entries.push((name, data));
        at += 46 + name_len;
    }
    entries
}
