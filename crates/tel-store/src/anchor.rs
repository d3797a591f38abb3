use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tel_types::Digest;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Address of an anchored document: BLAKE3 of its exact bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(Digest);

impl ContentId {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Digest::of(bytes))
    }

    pub fn digest(&self) -> Digest {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl std::fmt::Debug for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentId({})", self.0.short_hex())
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// External immutable store that ledger snapshots are published to.
///
/// `put` must be idempotent: the same bytes always yield the same
/// [`ContentId`], and storing them twice is not an error.
#[async_trait]
pub trait AnchorSink: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> StoreResult<ContentId>;
}

/// Anchor sink holding documents in memory.
#[derive(Debug, Default)]
pub struct MemoryAnchorSink {
    objects: RwLock<BTreeMap<ContentId, Vec<u8>>>,
}

impl MemoryAnchorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ContentId) -> StoreResult<Option<Vec<u8>>> {
        let objects = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(objects.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnchorSink for MemoryAnchorSink {
    async fn put(&self, bytes: &[u8]) -> StoreResult<ContentId> {
        let id = ContentId::of(bytes);
        let mut objects = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        objects.entry(id).or_insert_with(|| bytes.to_vec());
        Ok(id)
    }
}

/// Anchor sink writing one file per document, named by content ID.
///
/// Files are written under a temporary name and renamed into place, so a
/// reader never observes a partially written document.
#[derive(Debug, Clone)]
pub struct DirectoryAnchorSink {
    dir: PathBuf,
}

impl DirectoryAnchorSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a document with `id` is stored at.
    pub fn path_for(&self, id: &ContentId) -> PathBuf {
        self.dir.join(format!("{}.json", id.to_hex()))
    }

    /// Read back an anchored document, checking its content ID.
    pub async fn get(&self, id: &ContentId) -> StoreResult<Option<Vec<u8>>> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if ContentId::of(&bytes) != *id {
            return Err(StoreError::Corrupt {
                offset: 0,
                reason: format!("anchored document {id} does not match its content ID"),
            });
        }
        Ok(Some(bytes))
    }
}

#[async_trait]
impl AnchorSink for DirectoryAnchorSink {
    async fn put(&self, bytes: &[u8]) -> StoreResult<ContentId> {
        let id = ContentId::of(bytes);
        let target = self.path_for(&id);
        if tokio::fs::try_exists(&target).await? {
            debug!(content_id = %id, "anchor already present");
            return Ok(id);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(".{}.tmp", id.to_hex()));
        tokio::fs::write(&tmp, bytes).await?;
        let file = tokio::fs::File::open(&tmp).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp, &target).await?;

        debug!(content_id = %id, path = %target.display(), bytes = bytes.len(), "anchored document");
        Ok(id)
    }
}
