use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::scanner::Fingerprint;

pub const DEFAULT_LEDGER_FILE: &str = ".upload.json";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read ledger {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to persist ledger {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode ledger: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "mtime_ns")]
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub file_id: Option<String>,
    /// False while the file exists remotely but is not yet attached to the
    /// knowledge collection.
    #[serde(default = "default_linked")]
    pub linked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<String>,
}

fn default_linked() -> bool {
    true
}

impl FileRecord {
    pub fn uploaded(fingerprint: Fingerprint, file_id: String, display_name: String) -> Self {
        Self {
            fingerprint,
            file_id: Some(file_id),
            linked: false,
            display_name: Some(display_name),
            synced_at: now_rfc3339(),
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.linked = true;
        self
    }
}

/// Durable map from absolute local path to what was last pushed for it.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    records: BTreeMap<String, FileRecord>,
    dirty: bool,
}

impl Ledger {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Loads the ledger at `path`. A missing file yields an empty ledger; an
    /// unreadable or malformed one is logged, moved aside and also treated
    /// as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_records(&path) {
            Ok(Some(records)) => {
                tracing::info!(path = %path.display(), records = records.len(), "ledger loaded");
                Self {
                    path,
                    records,
                    dirty: false,
                }
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no ledger yet, starting empty");
                Self::empty(path)
            }
            Err(err) => {
                tracing::error!(error = %err, "ledger unusable, starting empty");
                if matches!(err, LedgerError::Corrupt { .. }) {
                    match quarantine_corrupt_file(&path) {
                        Ok(moved) => {
                            tracing::warn!(to = %moved.display(), "corrupt ledger quarantined")
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to quarantine corrupt ledger")
                        }
                    }
                }
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary sibling used by [`Ledger::save`].
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(&ledger_key(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(&ledger_key(path))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(Path::new)
    }

    pub fn path_for_file_id(&self, file_id: &str) -> Option<PathBuf> {
        self.records
            .iter()
            .find(|(_, record)| record.file_id.as_deref() == Some(file_id))
            .map(|(key, _)| PathBuf::from(key))
    }

    pub fn upsert(&mut self, path: &Path, record: FileRecord) {
        self.records.insert(ledger_key(path), record);
        self.dirty = true;
    }

    /// Records a successful in-place content replacement.
    pub fn update_fingerprint(&mut self, path: &Path, fingerprint: Fingerprint) -> bool {
        let Some(record) = self.records.get_mut(&ledger_key(path)) else {
            return false;
        };
        record.fingerprint = fingerprint;
        record.synced_at = now_rfc3339();
        self.dirty = true;
        true
    }

    pub fn mark_linked(&mut self, path: &Path) -> bool {
        let Some(record) = self.records.get_mut(&ledger_key(path)) else {
            return false;
        };
        record.linked = true;
        record.synced_at = now_rfc3339();
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        let removed = self.records.remove(&ledger_key(path));
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Writes the ledger next to its target and renames it into place so a
    /// crash leaves either the previous or the new snapshot on disk.
    pub fn save(&mut self) -> Result<(), LedgerError> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        atomic_write(&self.path, &json).map_err(|source| LedgerError::Persist {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        Ok(())
    }

    /// Saves only when something changed since the last successful save.
    pub fn persist_if_dirty(&mut self) -> Result<bool, LedgerError> {
        if !self.dirty {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}

/// The scanner only yields UTF-8 paths, so the lossy conversion is exact
/// for every tracked file.
pub fn ledger_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn read_records(path: &Path) -> Result<Option<BTreeMap<String, FileRecord>>, LedgerError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|source| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path_for(path);
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
    Ok(())
}

fn quarantine_corrupt_file(path: &Path) -> io::Result<PathBuf> {
    let stamp = OffsetDateTime::now_utc().unix_timestamp();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string());
    let target = path.with_file_name(format!("{name}.corrupt.{stamp}"));
    fs::rename(path, &target)?;
    Ok(target)
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
