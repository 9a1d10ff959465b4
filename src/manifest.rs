//! Progress manifest: which sources have already been reconstructed.
//!
//! Orchestration lives outside the engine; this is the small capability it
//! injects so reruns can skip finished work. Keys are opaque strings (see
//! `SourceMetadata::manifest_key`).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};

/// Outcome recorded for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManifestStatus {
    Done,
    Failed { reason: String },
}

/// Progress tracking capability.
pub trait ProgressManifest: Send + Sync {
    /// True once `mark_done` was recorded for `key`.
    fn is_done(&self, key: &str) -> bool;

    fn mark_done(&self, key: &str) -> Result<()>;

    /// Record a failure; a later `mark_done` overrides it.
    fn mark_failed(&self, key: &str, reason: &str) -> Result<()>;

    fn status(&self, key: &str) -> Option<ManifestStatus>;
}

/// Process-local manifest.
#[derive(Debug, Default)]
pub struct InMemoryManifest {
    entries: Mutex<BTreeMap<String, ManifestStatus>>,
}

impl InMemoryManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ProgressManifest for InMemoryManifest {
    fn is_done(&self, key: &str) -> bool {
        matches!(self.entries.lock().get(key), Some(ManifestStatus::Done))
    }

    fn mark_done(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), ManifestStatus::Done);
        Ok(())
    }

    fn mark_failed(&self, key: &str, reason: &str) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            ManifestStatus::Failed {
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    fn status(&self, key: &str) -> Option<ManifestStatus> {
        self.entries.lock().get(key).cloned()
    }
}

/// Durable manifest backed by a JSON file.
///
/// The whole map is rewritten on every mark through a temp file and rename,
/// so a crash leaves either the old or the new file, never a partial one.
#[derive(Debug)]
pub struct JsonFileManifest {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ManifestStatus>>,
}

impl JsonFileManifest {
    /// Open a manifest, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let json = fs::read_to_string(&path)?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };

        log::debug!(
            "opened manifest {} with {} entries",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist first, then commit in memory: a failed write leaves the
    /// key exactly as it was.
    fn update(&self, key: &str, status: ManifestStatus) -> Result<()> {
        // Held across the write so concurrent marks serialize
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), status);

        let json = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.path, &json)?;
        *entries = next;
        Ok(())
    }
}

impl ProgressManifest for JsonFileManifest {
    fn is_done(&self, key: &str) -> bool {
        matches!(self.entries.lock().get(key), Some(ManifestStatus::Done))
    }

    fn mark_done(&self, key: &str) -> Result<()> {
        self.update(key, ManifestStatus::Done)
    }

    fn mark_failed(&self, key: &str, reason: &str) -> Result<()> {
        self.update(
            key,
            ManifestStatus::Failed {
                reason: reason.to_string(),
            },
        )
    }

    fn status(&self, key: &str) -> Option<ManifestStatus> {
        self.entries.lock().get(key).cloned()
    }
}

/// Write bytes to a file via a synced temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        ReconError::generic(format!(
            "failed to rename {} to {}: {e}",
            temp_path.display(),
            path.display()
        ))
    })
}

/// Which manifest implementation to use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ManifestConfig {
    #[default]
    InMemory,
    JsonFile { path: PathBuf },
}

impl ManifestConfig {
    pub fn build(&self) -> Result<Box<dyn ProgressManifest>> {
        match self {
            ManifestConfig::InMemory => Ok(Box::new(InMemoryManifest::new())),
            ManifestConfig::JsonFile { path } => Ok(Box::new(JsonFileManifest::open(path)?)),
        }
    }
}
