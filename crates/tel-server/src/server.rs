use std::sync::Arc;

use tel_store::DirectoryAnchorSink;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::data::DataDir;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// HTTP front end for one ledger.
pub struct TelServer {
    config: ServerConfig,
    state: AppState,
}

impl TelServer {
    /// Open the ledger under `config.data_dir`.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let ledger = DataDir::new(&config.data_dir)
            .open_ledger(config.sync_mode, config.ledger.clone())?;
        let anchor = Arc::new(DirectoryAnchorSink::new(config.anchor_dir()));
        Ok(Self {
            config,
            state: AppState { ledger, anchor },
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            entries = self.state.ledger.len(),
            "tel server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tel_crypto::SigningKey;

    #[test]
    fn open_requires_signing_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            TelServer::open(config),
            Err(ServerError::KeyMaterial(_))
        ));
    }

    #[test]
    fn open_and_build_router() {
        let dir = tempfile::tempdir().unwrap();
        DataDir::new(dir.path())
            .write_signing_key(&SigningKey::generate(), false)
            .unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let server = TelServer::open(config).unwrap();
        assert!(server.state().ledger.is_empty());
        assert_eq!(server.config().anchor_dir(), dir.path().join("anchors"));
        let _router = server.router();
    }
}
