//! Durable record backends: full-snapshot load / save.
//!
//! On-disk format is one JSON document:
//! `{ "version": 1, "revision": N, "checksum": "<blake3>", "incidents": [...] }`.
//! The checksum covers the compact JSON encoding of `incidents`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;
use crate::types::Incident;

pub const FORMAT_VERSION: u32 = 1;

/// Full ordered collection at one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
  pub revision: u64,
  pub incidents: Vec<Incident>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
  version: u32,
  revision: u64,
  checksum: String,
  incidents: Vec<Incident>,
}

/// Persistence target for the whole collection.
///
/// `save` must either replace the previous record completely or leave it
/// untouched. Saves with a lower revision than one already written are dropped.
pub trait Backend: Send + Sync + 'static {
  /// `Ok(None)` when no record exists yet. Undecodable data is `Corrupt`.
  fn load(&self) -> Result<Option<Snapshot>, StoreError>;

  fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

  /// Set a corrupt record aside before the store starts over empty.
  fn discard_corrupt(&self) -> Result<(), StoreError> {
    Ok(())
  }
}

fn checksum(incidents: &[Incident]) -> Result<String, serde_json::Error> {
  let body = serde_json::to_vec(incidents)?;
  Ok(blake3::hash(&body).to_hex().to_string())
}

pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, StoreError> {
  let envelope = Envelope {
    version: FORMAT_VERSION,
    revision: snapshot.revision,
    checksum: checksum(&snapshot.incidents)?,
    incidents: snapshot.incidents.clone(),
  };
  let mut bytes = serde_json::to_vec_pretty(&envelope)?;
  bytes.push(b'\n');
  Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Snapshot, StoreError> {
  let envelope: Envelope =
    serde_json::from_slice(bytes).map_err(|e| StoreError::corrupt(format!("json: {}", e)))?;
  if envelope.version != FORMAT_VERSION {
    return Err(StoreError::corrupt(format!(
      "unsupported format version {}",
      envelope.version
    )));
  }
  let actual = checksum(&envelope.incidents)?;
  if actual != envelope.checksum {
    return Err(StoreError::corrupt("checksum mismatch"));
  }
  Ok(Snapshot {
    revision: envelope.revision,
    incidents: envelope.incidents,
  })
}

/// Returns false when `revision` is older than what was last written.
fn admit(last_written: &Option<u64>, revision: u64) -> bool {
  match last_written {
    Some(last) if revision < *last => {
      debug!(revision, last = *last, "dropping stale snapshot");
      false
    }
    _ => true,
  }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// Single JSON file, replaced atomically via temp file + rename.
#[derive(Debug)]
pub struct FileBackend {
  path: PathBuf,
  last_written: Mutex<Option<u64>>,
}

impl FileBackend {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      last_written: Mutex::new(None),
    }
  }

  fn dir(&self) -> &Path {
    match self.path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p,
      _ => Path::new("."),
    }
  }

  /// Where `discard_corrupt` moves a bad record.
  pub fn corrupt_path(&self) -> PathBuf {
    let mut name = self
      .path
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_default();
    name.push(".corrupt");
    self.path.with_file_name(name)
  }

  fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
    let dir = self.dir();
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&self.path).map_err(|e| e.error)?;
    Ok(())
  }
}

impl Backend for FileBackend {
  fn load(&self) -> Result<Option<Snapshot>, StoreError> {
    let bytes = match fs::read(&self.path) {
      Ok(b) => b,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => {
        return Err(StoreError::corrupt(format!(
          "unreadable {}: {}",
          self.path.display(),
          e
        )))
      }
    };
    let snapshot = decode(&bytes)?;
    *self.last_written.lock() = Some(snapshot.revision);
    Ok(Some(snapshot))
  }

  fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = encode(snapshot).map_err(|e| StoreError::persistence(e.to_string()))?;
    // Held across the write: saves to the one file are serialized.
    let mut last = self.last_written.lock();
    if !admit(&last, snapshot.revision) {
      return Ok(());
    }
    self.write_atomic(&bytes).map_err(|e| {
      StoreError::persistence(format!("write {}: {}", self.path.display(), e))
    })?;
    *last = Some(snapshot.revision);
    Ok(())
  }

  fn discard_corrupt(&self) -> Result<(), StoreError> {
    let target = self.corrupt_path();
    match fs::rename(&self.path, &target) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(StoreError::persistence(format!(
        "move {} aside: {}",
        self.path.display(),
        e
      ))),
    }
  }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Keeps the encoded record in memory. Same format and revision rules as
/// `FileBackend`; useful for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
  inner: Mutex<MemoryRecord>,
}

#[derive(Debug, Default)]
struct MemoryRecord {
  bytes: Option<Vec<u8>>,
  last_written: Option<u64>,
  writes: u64,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start from raw bytes, e.g. a deliberately damaged record.
  pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      inner: Mutex::new(MemoryRecord {
        bytes: Some(bytes.into()),
        ..MemoryRecord::default()
      }),
    }
  }

  pub fn bytes(&self) -> Option<Vec<u8>> {
    self.inner.lock().bytes.clone()
  }

  /// Number of saves that reached the record.
  pub fn writes(&self) -> u64 {
    self.inner.lock().writes
  }
}

impl Backend for MemoryBackend {
  fn load(&self) -> Result<Option<Snapshot>, StoreError> {
    let mut inner = self.inner.lock();
    let snapshot = match &inner.bytes {
      Some(b) => decode(b)?,
      None => return Ok(None),
    };
    inner.last_written = Some(snapshot.revision);
    Ok(Some(snapshot))
  }

  fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = encode(snapshot).map_err(|e| StoreError::persistence(e.to_string()))?;
    let mut inner = self.inner.lock();
    if !admit(&inner.last_written, snapshot.revision) {
      return Ok(());
    }
    inner.bytes = Some(bytes);
    inner.last_written = Some(snapshot.revision);
    inner.writes += 1;
    Ok(())
  }

  fn discard_corrupt(&self) -> Result<(), StoreError> {
    self.inner.lock().bytes = None;
    Ok(())
  }
}
