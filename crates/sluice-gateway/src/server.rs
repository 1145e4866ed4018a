//! HTTP server loop
//!
//! Binds a TCP listener, serves each connection on its own task, and
//! stops accepting when the shutdown token fires. In-flight requests are
//! owned by their connection tasks and finish (or are dropped by the
//! client) independently.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handler::{handle_request, Gateway};

pub struct GatewayServer {
    state: Arc<Gateway>,
    listener: TcpListener,
}

impl GatewayServer {
    /// Binds the listener. `listen` may use port 0 to let the OS pick.
    pub async fn bind(state: Arc<Gateway>, listen: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Self { state, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until the shutdown token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = %self.listener.local_addr()?, "gateway listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let io = TokioIo::new(stream);
                    let state = Arc::clone(&self.state);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            let client_ip = Some(peer.ip().to_string());
                            async move {
                                Ok::<_, Infallible>(handle_request(state, req, client_ip).await)
                            }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            // Client disconnects mid-stream land here; they
                            // are routine, not failures.
                            debug!(error = %err, "connection ended with error");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    info!("gateway shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
