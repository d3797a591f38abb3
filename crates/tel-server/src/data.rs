use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tel_crypto::{KeyRing, LocalSigner, SigningKey};
use tel_ledger::{AuditLedger, LedgerConfig};
use tel_store::{SyncMode, WalEntryStore};
use tracing::info;

use crate::error::{ServerError, ServerResult};

pub const WAL_FILE: &str = "ledger.wal";
pub const SIGNING_KEY_FILE: &str = "signing.key";
pub const KEY_RING_FILE: &str = "keyring.json";

/// On-disk layout of one ledger deployment.
#[derive(Clone, Debug)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn wal_path(&self) -> PathBuf {
        self.root.join(WAL_FILE)
    }

    pub fn signing_key_path(&self) -> PathBuf {
        self.root.join(SIGNING_KEY_FILE)
    }

    pub fn key_ring_path(&self) -> PathBuf {
        self.root.join(KEY_RING_FILE)
    }

    pub fn load_signing_key(&self) -> ServerResult<SigningKey> {
        let path = self.signing_key_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ServerError::KeyMaterial(format!(
                    "no signing key at {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        SigningKey::from_hex(text.trim())
            .map_err(|e| ServerError::KeyMaterial(format!("{}: {e}", path.display())))
    }

    /// Write the signing key. Refuses to replace an existing key unless
    /// `replace` is set.
    pub fn write_signing_key(&self, key: &SigningKey, replace: bool) -> ServerResult<()> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.signing_key_path();
        if path.exists() && !replace {
            return Err(ServerError::KeyMaterial(format!(
                "{} already exists",
                path.display()
            )));
        }
        write_atomic(&path, format!("{}\n", key.to_hex()).as_bytes(), 0o600)
    }

    pub fn load_key_ring(&self) -> ServerResult<Option<KeyRing>> {
        let path = self.key_ring_path();
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ServerError::KeyMaterial(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_key_ring(&self, keys: &KeyRing) -> ServerResult<()> {
        std::fs::create_dir_all(&self.root)?;
        let bytes = serde_json::to_vec_pretty(keys)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        write_atomic(&self.key_ring_path(), &bytes, 0o644)
    }

    /// Open the ledger stored here, signing with `signing.key`.
    ///
    /// If the key is not the latest in `keyring.json` it is registered as a
    /// rotation and the updated ring is written back before returning.
    pub fn open_ledger(&self, sync: SyncMode, config: LedgerConfig) -> ServerResult<AuditLedger> {
        std::fs::create_dir_all(&self.root)?;
        let key = self.load_signing_key()?;
        let stored_ring = self.load_key_ring()?;
        let store = Arc::new(WalEntryStore::open(&self.wal_path(), sync)?);

        let mut builder =
            AuditLedger::builder(store, Arc::new(LocalSigner::new(key))).config(config);
        if let Some(ring) = stored_ring.clone() {
            builder = builder.key_ring(ring);
        }
        let ledger = builder.open()?;

        let ring = ledger.key_ring();
        if stored_ring.as_ref() != Some(&ring) {
            self.save_key_ring(&ring)?;
            info!(path = %self.key_ring_path().display(), epochs = ring.len(), "updated key ring");
        }
        Ok(ledger)
    }
}

/// Write `bytes` to a sibling temp file created with `mode`, sync it, then
/// rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> ServerResult<()> {
    let tmp = path.with_extension("tmp");
    // A stale temp file may carry looser permissions than `mode`.
    match std::fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        assert!(matches!(
            data.load_signing_key(),
            Err(ServerError::KeyMaterial(_))
        ));
        assert!(data.load_key_ring().unwrap().is_none());
    }

    #[test]
    fn key_roundtrip_and_no_silent_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        let key = SigningKey::generate();
        data.write_signing_key(&key, false).unwrap();
        assert_eq!(data.load_signing_key().unwrap().to_hex(), key.to_hex());

        assert!(data.write_signing_key(&SigningKey::generate(), false).is_err());
        data.write_signing_key(&SigningKey::generate(), true).unwrap();
        assert_ne!(data.load_signing_key().unwrap().to_hex(), key.to_hex());
    }

    #[tokio::test]
    async fn replacing_the_key_rotates_on_next_open() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        data.write_signing_key(&SigningKey::generate(), false).unwrap();

        {
            let ledger = data.open_ledger(SyncMode::EveryWrite, LedgerConfig::default()).unwrap();
            ledger.append(crate::testing::draft("first")).await.unwrap();
        }
        assert_eq!(data.load_key_ring().unwrap().unwrap().len(), 1);

        data.write_signing_key(&SigningKey::generate(), true).unwrap();
        let ledger = data.open_ledger(SyncMode::EveryWrite, LedgerConfig::default()).unwrap();
        ledger.append(crate::testing::draft("second")).await.unwrap();

        assert_eq!(data.load_key_ring().unwrap().unwrap().len(), 2);
        assert!(ledger.verify(None, None).await.unwrap().valid);
    }

    #[cfg(unix)]
    #[test]
    fn signing_key_is_owner_only_and_leaves_no_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        data.write_signing_key(&SigningKey::generate(), false).unwrap();
        data.write_signing_key(&SigningKey::generate(), true).unwrap();

        let mode = std::fs::metadata(data.signing_key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!data.signing_key_path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn ledger_is_single_writer_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDir::new(dir.path());
        data.write_signing_key(&SigningKey::generate(), false).unwrap();

        let ledger = data.open_ledger(SyncMode::EveryWrite, LedgerConfig::default()).unwrap();
        let err = data
            .open_ledger(SyncMode::EveryWrite, LedgerConfig::default())
            .unwrap_err();
        assert!(matches!(err, ServerError::Store(tel_store::StoreError::Locked { .. })));

        ledger.append(crate::testing::draft("only")).await.unwrap();
        drop(ledger);
        let reopened = data.open_ledger(SyncMode::EveryWrite, LedgerConfig::default()).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
