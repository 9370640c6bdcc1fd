use std::collections::{BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to walk {path:?}: {source}")]
    Walk {
        path: Option<PathBuf>,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to stat {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Ledger keys are UTF-8, so such paths cannot be tracked.
    #[error("path is not valid UTF-8: {path:?}")]
    NonUtf8 { path: PathBuf },
}

impl ScanError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ScanError::Walk { path, .. } => path.as_deref(),
            ScanError::Metadata { path, .. } | ScanError::NonUtf8 { path } => Some(path.as_path()),
        }
    }
}

/// Modification time in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0);
        Self(nanos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
}

/// Lowercase extension allow-list; empty means every file is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: Option<BTreeSet<String>>,
}

impl ExtensionFilter {
    pub fn allow_all() -> Self {
        Self { allowed: None }
    }

    pub fn from_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: BTreeSet<String> = items
            .into_iter()
            .map(|item| {
                item.as_ref()
                    .trim()
                    .trim_start_matches('.')
                    .to_ascii_lowercase()
            })
            .filter(|item| !item.is_empty())
            .collect();
        if allowed.is_empty() {
            Self::allow_all()
        } else {
            Self {
                allowed: Some(allowed),
            }
        }
    }

    /// Parses a comma separated list such as `"md, txt,.PDF"`.
    pub fn parse(value: &str) -> Self {
        Self::from_list(value.split(','))
    }

    pub fn allowed(&self) -> Option<&BTreeSet<String>> {
        self.allowed.as_ref()
    }

    pub fn matches(&self, path: &Path) -> bool {
        match &self.allowed {
            None => true,
            Some(allowed) => allowed.contains(&extension_of(path)),
        }
    }
}

/// Text after the final dot of the file name, lowercased; empty if none.
pub fn extension_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    filter: ExtensionFilter,
    excluded: HashSet<PathBuf>,
}

impl Scanner {
    /// `root` is made absolute so every yielded path is absolute as well.
    pub fn new(root: &Path, filter: ExtensionFilter) -> io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
            filter,
            excluded: HashSet::new(),
        })
    }

    /// Never yield `path`, e.g. the ledger file living inside the scan root.
    pub fn exclude(mut self, path: &Path) -> Self {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let canonical = path
            .parent()
            .and_then(|parent| std::fs::canonicalize(parent).ok())
            .zip(path.file_name())
            .map(|(parent, name)| parent.join(name));
        self.excluded.insert(path);
        if let Some(canonical) = canonical {
            self.excluded.insert(canonical);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &ExtensionFilter {
        &self.filter
    }

    /// Lazily walks the whole tree. Calling it again restarts the walk.
    pub fn scan(&self) -> impl Iterator<Item = Result<ScannedFile, ScanError>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(source) => {
                        return Some(Err(ScanError::Walk {
                            path: source.path().map(Path::to_path_buf),
                            source,
                        }));
                    }
                };
                if !entry.file_type().is_file() {
                    return None;
                }
                let path = entry.path();
                if self.excluded.contains(path) || !self.filter.matches(path) {
                    return None;
                }
                if path.to_str().is_none() {
                    return Some(Err(ScanError::NonUtf8 {
                        path: path.to_path_buf(),
                    }));
                }
                let modified = entry
                    .metadata()
                    .map_err(io::Error::from)
                    .and_then(|meta| meta.modified());
                Some(match modified {
                    Ok(modified) => Ok(ScannedFile {
                        path: path.to_path_buf(),
                        fingerprint: Fingerprint::from_system_time(modified),
                    }),
                    Err(source) => Err(ScanError::Metadata {
                        path: path.to_path_buf(),
                        source,
                    }),
                })
            })
    }
}
