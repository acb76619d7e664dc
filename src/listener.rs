//! The one concrete network transport this crate ships: a plain TCP accept loop driving one
//! [`Connection`] per socket.

use std::sync::Arc;

use tokio::net::TcpListener as TokioTcpListener;

use crate::app::Application;
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::limits::ServerLimits;
use crate::transport::SplitTransport;

pub struct Listener {
    config: ServerConfig,
    limits: ServerLimits,
    app: Arc<dyn Application>,
}

impl Listener {
    pub fn new(config: ServerConfig, limits: ServerLimits, app: Arc<dyn Application>) -> Self {
        Self { config, limits, app }
    }

    /// Binds the configured host/port and drives connections until the listener errors.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TokioTcpListener::bind(&addr).await?;
        tracing::warn!("Running protocol server on {addr}");

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let local_addr = stream.local_addr()?;
            let _ = stream.set_nodelay(true);

            let limits = self.limits.clone();
            let app = self.app.clone();
            let idle_timeout = limits.idle_timeout();

            tokio::spawn(async move {
                tracing::info!(%peer_addr, "connection accepted");
                let (read_half, write_half) = stream.into_split();
                let transport = SplitTransport::new(read_half, write_half, local_addr, peer_addr);
                let connection = Connection::new(Box::new(transport), limits, app);

                // Bounds the whole connection lifetime rather than resetting on each byte; a
                // per-read idle reset would need `Connection::drive` to expose its own ticks.
                match tokio::time::timeout(idle_timeout, connection.drive()).await {
                    Ok(()) => tracing::info!(%peer_addr, "connection closed"),
                    Err(_) => tracing::info!(%peer_addr, "connection idle timeout"),
                }
            });
        }
    }
}
