//! Durable storage for the user's preferred ranking order.
//!
//! The ranking is persisted as a single comma-joined id list. It is
//! read back at startup and discarded silently when it no longer parses
//! or no longer matches the catalog. Saving is best-effort: callers log
//! a failure and continue.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::types::OptionId;

/// Persistence seam for the ranking slot.
pub trait RankingStore: Send + Sync {
    /// Persist the ordered id sequence.
    fn save(&self, ids: &[OptionId]) -> io::Result<()>;

    /// Read the previously persisted sequence, if any.
    ///
    /// Returns `Ok(None)` when no ranking has been saved yet or when the
    /// stored value does not parse as an id list.
    fn load(&self) -> io::Result<Option<Vec<OptionId>>>;
}

/// File-backed ranking slot.
pub struct FileRankingStore {
    path: PathBuf,
}

impl FileRankingStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RankingStore for FileRankingStore {
    fn save(&self, ids: &[OptionId]) -> io::Result<()> {
        std::fs::write(&self.path, encode_ids(ids))
    }

    fn load(&self) -> io::Result<Option<Vec<OptionId>>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(decode_ids(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// In-memory ranking slot, used in tests and as a no-op stand-in.
#[derive(Default)]
pub struct MemoryRankingStore {
    slot: Mutex<Option<Vec<OptionId>>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RankingStore for MemoryRankingStore {
    fn save(&self, ids: &[OptionId]) -> io::Result<()> {
        *self.slot.lock().expect("ranking slot lock poisoned") = Some(ids.to_vec());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<Vec<OptionId>>> {
        Ok(self.slot.lock().expect("ranking slot lock poisoned").clone())
    }
}

fn encode_ids(ids: &[OptionId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined id list. Any non-integer element invalidates
/// the whole value.
fn decode_ids(text: &str) -> Option<Vec<OptionId>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split(',')
        .map(|part| part.trim().parse::<OptionId>().ok())
        .collect()
}
