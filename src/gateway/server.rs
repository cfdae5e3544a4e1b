//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::auth::ResolvedAuthConfig;
use super::router::create_router;
use crate::config::Config;
use crate::{Error, Result};

/// Authenticating HTTP front
pub struct Gateway {
    config: Config,
    auth_config: Arc<ResolvedAuthConfig>,
}

impl Gateway {
    /// Build all trust state from configuration.
    ///
    /// # Errors
    ///
    /// Fails if any configured key material cannot be parsed.
    pub fn new(config: Config) -> Result<Self> {
        let auth_config = Arc::new(ResolvedAuthConfig::from_config(&config.auth)?);

        Ok(Self {
            config,
            auth_config,
        })
    }

    /// Run the gateway until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(Arc::clone(&self.auth_config));
        let listener = TcpListener::bind(addr).await?;

        let auth = &self.config.auth;
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            issuers = auth.issuers.len(),
            allowed_issuers = auth.allowed_issuers.len(),
            audiences = auth.allowed_audiences.len(),
            service_tokens = auth.service_tokens.len(),
            clock_skew_secs = auth.clock_skew.as_secs(),
            "Authentication ready"
        );
        if auth.allowed_issuers.is_empty() && auth.service_tokens.is_empty() {
            warn!("No issuers and no service tokens configured - every request will be rejected");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
