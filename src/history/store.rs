//! File-backed latency history.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::window::push_sample;

/// History error types.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-target latency samples, oldest first.
///
/// Loaded once at the start of a run and saved once at the end. The store
/// is owned by a single writer for the duration of the run.
#[derive(Debug, Default)]
pub struct HistoryStore {
    path: PathBuf,
    entries: BTreeMap<String, Vec<f64>>,
}

impl HistoryStore {
    /// Create an empty store backed by `path` without reading it.
    pub fn empty<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    /// Load persisted history.
    ///
    /// A missing, unreadable or corrupt file is a cold start, never an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut store = Self::empty(path);

        match std::fs::read(path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(entries) => store.entries = entries,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt history at {}: {}", path.display(), e)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No history at {}, starting cold", path.display());
            }
            Err(e) => tracing::warn!("Cannot read history at {}: {}", path.display(), e),
        }

        store
    }

    /// Append a sample for `name` and return the trimmed window.
    pub fn record(&mut self, name: &str, latency: f64) -> &[f64] {
        let samples = self.entries.entry(name.to_string()).or_default();
        push_sample(samples, latency);
        samples
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    #[cfg(test)]
    pub fn insert(&mut self, name: &str, samples: Vec<f64>) {
        self.entries.insert(name.to_string(), samples);
    }

    /// Persist the full mapping, replacing whatever was there.
    ///
    /// Writes to a sibling temp file and renames it into place so readers
    /// never observe a partial file.
    pub fn save(&self) -> Result<(), HistoryError> {
        let data = serde_json::to_vec(&self.entries)?;
        write_atomic(&self.path, &data)?;
        Ok(())
    }
}

/// Write `data` to `path` via a temp file in the same directory.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let result = std::fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&tmp, path));

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}
