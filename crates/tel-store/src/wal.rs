use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tel_types::LedgerEntry;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::EntryStore;

/// Flush/sync strategy for the entry log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append. An entry is on stable storage before the
    /// ledger acknowledges it.
    #[default]
    EveryWrite,
    /// Flush to the OS only. Faster; a power loss can drop recent entries.
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Largest payload accepted when reading a record back.
const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

struct WalInner {
    file: File,
    /// Byte offset of each record, indexed by sequence number.
    offsets: Vec<u64>,
    /// Offset one past the last complete record.
    end: u64,
}

/// Append-only entry log in a single file.
///
/// On-disk format, one record per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON-encoded LedgerEntry)]
/// ```
///
/// Opening scans the file front to back and builds an offset index. A final
/// record cut short (short header or short payload) is the signature of a
/// crash mid-append; it is logged and truncated away. A record that is
/// complete on disk but fails its CRC or cannot be decoded is reported as
/// [`StoreError::Corrupt`] wherever it sits, so a damaged entry is never
/// dropped from the log.
///
/// The file is held under an exclusive advisory lock for the life of the
/// store. A second open of the same path, in this process or another,
/// fails with [`StoreError::Locked`].
pub struct WalEntryStore {
    path: PathBuf,
    sync_mode: SyncMode,
    inner: Mutex<WalInner>,
}

impl WalEntryStore {
    /// Open (or create) the log at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive().map_err(|e| {
            warn!(path = %path.display(), error = %e, "entry log is held by another writer");
            StoreError::Locked {
                path: path.to_path_buf(),
            }
        })?;

        let (offsets, end) = scan(&mut file)?;
        let file_len = file.metadata()?.len();
        if end < file_len {
            warn!(
                path = %path.display(),
                valid_bytes = end,
                file_len,
                "torn record at end of entry log; truncating"
            );
            file.set_len(end)?;
            file.sync_all()?;
        }

        info!(path = %path.display(), entries = offsets.len(), "opened entry log");
        Ok(Self {
            path: path.to_path_buf(),
            sync_mode,
            inner: Mutex::new(WalInner { file, offsets, end }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, WalInner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Walk every record, returning the offset index and the end of the last
/// intact record.
fn scan(file: &mut File) -> StoreResult<(Vec<u64>, u64)> {
    let file_len = file.metadata()?.len();
    let mut offsets = Vec::new();
    let mut offset = 0u64;
    file.seek(SeekFrom::Start(0))?;

    while offset < file_len {
        if offset + HEADER_SIZE > file_len {
            break;
        }
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let (length, expected_crc) = parse_header(&header);

        let record_end = offset + HEADER_SIZE + u64::from(length);
        if record_end > file_len {
            break;
        }
        if length == 0 || length > MAX_RECORD_LEN {
            return Err(StoreError::Corrupt {
                offset,
                reason: format!("implausible record length {length}"),
            });
        }

        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload)?;

        if crc32fast::hash(&payload) != expected_crc {
            return Err(StoreError::Corrupt {
                offset,
                reason: "CRC mismatch".into(),
            });
        }

        let entry = decode(&payload, offset)?;
        let expected = offsets.len() as u64;
        if entry.sequence_number != expected {
            return Err(StoreError::Corrupt {
                offset,
                reason: format!(
                    "record holds sequence {}, expected {expected}",
                    entry.sequence_number
                ),
            });
        }

        offsets.push(offset);
        offset = record_end;
    }

    debug!(records = offsets.len(), valid_bytes = offset, "entry log scan complete");
    Ok((offsets, offset))
}

fn parse_header(header: &[u8; HEADER_SIZE as usize]) -> (u32, u32) {
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (length, crc)
}

fn decode(payload: &[u8], offset: u64) -> StoreResult<LedgerEntry> {
    serde_json::from_slice(payload).map_err(|e| StoreError::Corrupt {
        offset,
        reason: format!("undecodable record: {e}"),
    })
}

fn write_frame(file: &mut File, offset: u64, frame: &[u8], sync_mode: SyncMode) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(frame)?;
    file.flush()?;
    match sync_mode {
        SyncMode::EveryWrite => file.sync_data(),
        SyncMode::OsDefault => Ok(()),
    }
}

fn read_record(file: &mut File, offset: u64) -> StoreResult<LedgerEntry> {
    file.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut header)?;
    let (length, expected_crc) = parse_header(&header);
    if length > MAX_RECORD_LEN {
        return Err(StoreError::Corrupt {
            offset,
            reason: format!("record length {length} exceeds limit"),
        });
    }
    let mut payload = vec![0u8; length as usize];
    file.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != expected_crc {
        return Err(StoreError::Corrupt {
            offset,
            reason: "CRC mismatch".into(),
        });
    }
    decode(&payload, offset)
}

impl EntryStore for WalEntryStore {
    fn append(&self, entry: &LedgerEntry) -> StoreResult<()> {
        let payload =
            serde_json::to_vec(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_RECORD_LEN)
            .ok_or_else(|| StoreError::Serialization(format!("entry of {} bytes too large", payload.len())))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut inner = self.lock()?;
        let expected = inner.offsets.len() as u64;
        if entry.sequence_number != expected {
            return Err(StoreError::SequenceGap {
                expected,
                found: entry.sequence_number,
            });
        }

        let offset = inner.end;
        if let Err(e) = write_frame(&mut inner.file, offset, &frame, self.sync_mode) {
            // Drop whatever part of the frame reached the file.
            if let Err(rollback) = inner.file.set_len(offset) {
                warn!(offset, error = %rollback, "failed to roll back partial record");
            }
            return Err(e.into());
        }

        inner.offsets.push(offset);
        inner.end = offset + frame.len() as u64;
        debug!(
            sequence = entry.sequence_number,
            offset,
            len = payload.len(),
            "entry log append"
        );
        Ok(())
    }

    fn get(&self, sequence: u64) -> StoreResult<Option<LedgerEntry>> {
        let mut inner = self.lock()?;
        let Some(offset) = usize::try_from(sequence)
            .ok()
            .and_then(|i| inner.offsets.get(i))
            .copied()
        else {
            return Ok(None);
        };
        read_record(&mut inner.file, offset).map(Some)
    }

    fn read_range(&self, start: u64, end: u64) -> StoreResult<Vec<LedgerEntry>> {
        let mut inner = self.lock()?;
        let len = inner.offsets.len() as u64;
        if start >= len || start > end {
            return Ok(Vec::new());
        }
        let end = end.min(len - 1);
        let offsets: Vec<u64> = inner.offsets[start as usize..=end as usize].to_vec();
        offsets
            .into_iter()
            .map(|offset| read_record(&mut inner.file, offset))
            .collect()
    }

    fn len(&self) -> StoreResult<u64> {
        Ok(self.lock()?.offsets.len() as u64)
    }
}

impl std::fmt::Debug for WalEntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalEntryStore")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}
