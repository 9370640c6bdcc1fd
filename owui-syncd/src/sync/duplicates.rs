use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::gateway::RemoteFile;
use super::ledger::Ledger;
use super::naming::{NAME_JOINER, basename};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub file_id: String,
    pub display_name: String,
    /// Local path that produced the remote file; `None` for remote copies
    /// no ledger record accounts for.
    pub owner: Option<PathBuf>,
}

/// Remote files grouped by the basename of the local file they came from.
/// Within a group the most recent upload is last.
#[derive(Debug, Default)]
pub struct DuplicateBasenameIndex {
    entries: HashMap<String, Vec<DuplicateEntry>>,
}

impl DuplicateBasenameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from a collection listing, recovering owners from
    /// the ledger by file id.
    pub fn seed<I>(files: I, ledger: &Ledger) -> Self
    where
        I: IntoIterator<Item = RemoteFile>,
    {
        let mut index = Self::new();
        for file in files {
            let owner = ledger.path_for_file_id(&file.file_id);
            let key = match &owner {
                Some(owner) => basename(owner),
                None => basename_from_display_name(&file.display_name),
            };
            index.entries.entry(key).or_default().push(DuplicateEntry {
                file_id: file.file_id,
                display_name: file.display_name,
                owner,
            });
        }
        // Put ledger-owned entries last so they count as the latest upload.
        for group in index.entries.values_mut() {
            group.sort_by_key(|entry| entry.owner.is_some());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self, basename: &str) -> Option<&DuplicateEntry> {
        self.entries.get(basename).and_then(|group| group.last())
    }

    pub fn record(
        &mut self,
        basename: &str,
        file_id: String,
        display_name: String,
        owner: PathBuf,
    ) {
        let group = self.entries.entry(basename.to_string()).or_default();
        group.retain(|entry| entry.file_id != file_id);
        group.push(DuplicateEntry {
            file_id,
            display_name,
            owner: Some(owner),
        });
    }

    pub fn remove_file_id(&mut self, file_id: &str) -> Option<DuplicateEntry> {
        let mut removed = None;
        self.entries.retain(|_, group| {
            if let Some(pos) = group.iter().position(|entry| entry.file_id == file_id) {
                removed = Some(group.remove(pos));
            }
            !group.is_empty()
        });
        removed
    }

    /// Entries sharing `candidate`'s basename that a new upload of
    /// `candidate` under `display_name` replaces: ownerless remote copies
    /// carrying that same display name, and copies whose owner is a
    /// different path that is no longer live. Ownerless files under any
    /// other name were not produced for this path and are left alone.
    pub fn superseded_by<F>(
        &self,
        candidate: &Path,
        display_name: &str,
        is_live: F,
    ) -> Vec<DuplicateEntry>
    where
        F: Fn(&Path) -> bool,
    {
        let Some(group) = self.entries.get(&basename(candidate)) else {
            return Vec::new();
        };
        group
            .iter()
            .filter(|entry| match &entry.owner {
                None => entry.display_name == display_name,
                Some(owner) => owner != candidate && !is_live(owner),
            })
            .cloned()
            .collect()
    }

    /// Earlier uploads of `owner` other than `keep`.
    pub fn replaced_for(&self, owner: &Path, keep: &str) -> Vec<DuplicateEntry> {
        let Some(group) = self.entries.get(&basename(owner)) else {
            return Vec::new();
        };
        group
            .iter()
            .filter(|entry| entry.owner.as_deref() == Some(owner) && entry.file_id != keep)
            .cloned()
            .collect()
    }
}

/// Both naming policies end a display name with the local basename.
/// Basenames that themselves contain the joiner are cut short.
fn basename_from_display_name(display_name: &str) -> String {
    display_name
        .rsplit(NAME_JOINER)
        .next()
        .filter(|tail| !tail.is_empty())
        .unwrap_or(display_name)
        .to_string()
}
