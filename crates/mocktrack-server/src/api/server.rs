//! HTTP server: accept loop over the router.

use crate::api::router::route_request;
use crate::api::AppContext;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// The mock server bound to a local address.
pub struct ApiServer {
    listener: TcpListener,
    ctx: Arc<AppContext>,
}

impl ApiServer {
    /// Bind the listener. Fails fast (port in use, bad address) so the
    /// caller can exit non-zero before serving anything.
    pub async fn bind(addr: SocketAddr, ctx: Arc<AppContext>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(ApiServer { listener, ctx })
    }

    /// The actual bound address, useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the task is dropped or the process shuts down.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        info!("mocktrack listening on http://{}", self.local_addr()?);

        loop {
            let (stream, _) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let ctx = Arc::clone(&self.ctx);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let ctx = Arc::clone(&ctx);
                    async move { route_request(req, ctx).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("connection error: {}", e);
                }
            });
        }
    }
}
