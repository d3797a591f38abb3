use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tel_ledger::LedgerConfig;
use tel_store::SyncMode;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Holds `ledger.wal`, `signing.key` and `keyring.json`.
    pub data_dir: PathBuf,
    pub sync_mode: SyncMode,
    /// Where `POST /v1/anchor` writes bundles. Defaults to
    /// `<data_dir>/anchors`.
    pub anchor_dir: Option<PathBuf>,
    pub ledger: LedgerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8470)),
            data_dir: PathBuf::from("./tel-data"),
            sync_mode: SyncMode::default(),
            anchor_dir: None,
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn anchor_dir(&self) -> PathBuf {
        self.anchor_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("anchors"))
    }
}
