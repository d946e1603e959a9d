//! Broker server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::AppState;
use super::router::create_router;
use crate::config::Config;
use crate::{Error, Result};

/// The HTTP broker: configuration plus the components built from it
pub struct Broker {
    config: Config,
    state: Arc<AppState>,
}

impl Broker {
    /// Build all components; fails on any configuration fault
    pub fn new(config: Config) -> Result<Self> {
        let state = AppState::with_seeded_store(&config)?;

        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    /// Shared state, e.g. for embedding the router elsewhere
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.bind_addr()?;
        let app = create_router(Arc::clone(&self.state));

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("HAUTH v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!("  GET  http://{addr}/cookie?origin=<uri>");
        info!("  GET  http://{addr}/token[?messageId=<id>&origin=<uri>]");
        info!("  GET  http://{addr}/token/external[?messageId=<id>&origin=<uri>]");
        info!(
            subnets = self.state.classifier.blocks().len(),
            expires_in = ?self.config.token.expires_in,
            cookie_max_age = ?self.config.cookie.max_age_secs,
            "Token service ready"
        );
        if self.config.server.trust_forwarded_for {
            warn!("Client addresses are taken from X-Forwarded-For; deploy behind a trusted proxy only");
        }
        if !self.config.cookie.secure {
            warn!("Access cookies are not marked Secure");
        }
        info!("============================================================");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
