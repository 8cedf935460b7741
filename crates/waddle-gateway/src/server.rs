//! TCP accept loop feeding the session manager.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, info_span, warn};
use waddle_session::{OtelStats, SessionManager};

use crate::commands::CommandHandler;
use crate::config::GatewayConfig;
use crate::transport::LinesConnection;

/// Build the manager the gateway serves, wired to the line command handler.
pub fn build_manager(config: &GatewayConfig) -> Arc<SessionManager> {
    let settings = config.session_manager();
    Arc::new_cyclic(|manager| {
        SessionManager::new(settings)
            .with_stats(OtelStats::new())
            .with_inbound_handler(Arc::new(CommandHandler::new(manager.clone())))
    })
}

/// Gateway server instance.
pub struct GatewayServer {
    config: GatewayConfig,
    listener: TcpListener,
    manager: Arc<SessionManager>,
}

impl GatewayServer {
    /// Bind the listen address.
    pub async fn bind(config: GatewayConfig, manager: Arc<SessionManager>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        Ok(Self {
            config,
            listener,
            manager,
        })
    }

    /// The bound address, useful when listening on port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then close every session.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        info!(addr = %self.local_addr()?, "Gateway listening");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let span = info_span!(
                "gateway.connection.accept",
                client_ip = %peer_addr,
                transport = "tcp",
            );
            span.in_scope(|| {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(error = %e, "Failed to set TCP_NODELAY");
                }
                let connection =
                    LinesConnection::new(stream, self.config.max_frame_len).with_peer(peer_addr);
                self.manager.connect(connection);
            });
        }

        info!(sessions = self.manager.session_count(), "Gateway shutting down");
        self.manager.shutdown();
        Ok(())
    }
}

/// Resolve on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
