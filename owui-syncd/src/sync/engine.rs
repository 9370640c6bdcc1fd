use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::duplicates::{DuplicateBasenameIndex, DuplicateEntry};
use super::gateway::{GatewayError, RemoteContentGateway, mime_type_for};
use super::ledger::{FileRecord, Ledger};
use super::naming::{NameResolver, NamingPolicy, basename};
use super::scanner::{ScannedFile, Scanner};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Error)]
#[error("unknown update strategy: {0} (expected \"reupload\" or \"content-update\")")]
pub struct UnknownStrategy(String);

/// What to do with a file whose fingerprint changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStrategy {
    /// Upload a fresh remote file and link it.
    #[default]
    Reupload,
    /// Replace content of the existing remote file, re-uploading only when
    /// that is unsupported or fails.
    ContentUpdate,
}

impl UpdateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::Reupload => "reupload",
            UpdateStrategy::ContentUpdate => "content-update",
        }
    }
}

impl FromStr for UpdateStrategy {
    type Err = UnknownStrategy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reupload" | "re-upload" => Ok(UpdateStrategy::Reupload),
            "content-update" | "content_update" | "update" => Ok(UpdateStrategy::ContentUpdate),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub naming: NamingPolicy,
    pub update_strategy: UpdateStrategy,
    pub evict_duplicates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Unchanged,
    /// Uploaded, but attaching it to the collection has not succeeded yet.
    PendingLink,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Created { file_id: String },
    Unchanged,
    Relinked,
    ContentUpdated,
    Recreated { file_id: String },
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub created: usize,
    pub unchanged: usize,
    pub relinked: usize,
    pub content_updated: usize,
    pub recreated: usize,
    pub evicted: usize,
    pub failed: usize,
    pub scan_errors: usize,
    pub persisted: bool,
    pub cancelled: bool,
}

impl CycleReport {
    fn count(&mut self, outcome: &TransitionOutcome) {
        match outcome {
            TransitionOutcome::Created { .. } => self.created += 1,
            TransitionOutcome::Unchanged => self.unchanged += 1,
            TransitionOutcome::Relinked => self.relinked += 1,
            TransitionOutcome::ContentUpdated => self.content_updated += 1,
            TransitionOutcome::Recreated { .. } => self.recreated += 1,
            TransitionOutcome::Failed => self.failed += 1,
        }
    }

    /// Number of files whose remote state changed this cycle.
    pub fn changed(&self) -> usize {
        self.created + self.relinked + self.content_updated + self.recreated
    }
}

/// Drives local files into the remote collection. Owns the ledger and the
/// duplicate index; every ledger mutation follows a successful remote call.
pub struct ReconcileEngine<G> {
    gateway: G,
    scanner: Scanner,
    resolver: NameResolver,
    ledger: Ledger,
    duplicates: Option<DuplicateBasenameIndex>,
    config: EngineConfig,
}

impl<G: RemoteContentGateway> ReconcileEngine<G> {
    pub fn new(gateway: G, scanner: Scanner, ledger: Ledger, config: EngineConfig) -> Self {
        let resolver = NameResolver::new(scanner.root(), config.naming);
        let duplicates = config.evict_duplicates.then(DuplicateBasenameIndex::new);
        Self {
            gateway,
            scanner,
            resolver,
            ledger,
            duplicates,
            config,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn duplicates(&self) -> Option<&DuplicateBasenameIndex> {
        self.duplicates.as_ref()
    }

    /// Rebuilds the duplicate index from the remote listing. No-op unless
    /// duplicate eviction is enabled. On failure the index stays as it was.
    pub async fn seed_duplicates(&mut self) -> Result<usize, GatewayError> {
        if !self.config.evict_duplicates {
            return Ok(0);
        }
        let files = self.gateway.list_collection_files().await?;
        let index = DuplicateBasenameIndex::seed(files, &self.ledger);
        let seeded = index.len();
        self.duplicates = Some(index);
        tracing::info!(files = seeded, "duplicate index seeded from collection listing");
        Ok(seeded)
    }

    pub fn classify(&self, file: &ScannedFile) -> Classification {
        let Some(record) = self.ledger.get(&file.path) else {
            return Classification::New;
        };
        if record.file_id.is_none() {
            return Classification::New;
        }
        match (record.fingerprint == file.fingerprint, record.linked) {
            (true, true) => Classification::Unchanged,
            (true, false) => Classification::PendingLink,
            (false, _) => Classification::Modified,
        }
    }

    /// One full scan-and-reconcile pass, then a ledger save if anything
    /// changed. Cancellation is honored between files.
    pub async fn run_one_cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();
        let scanner = self.scanner.clone();

        for item in scanner.scan() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let file = match item {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping path for this cycle");
                    report.scan_errors += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let outcome = match self.reconcile_file(&file, &mut report).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    log_failure(&file.path, &err);
                    TransitionOutcome::Failed
                }
            };
            report.count(&outcome);
        }

        match self.ledger.persist_if_dirty() {
            Ok(saved) => report.persisted = saved,
            Err(err) => {
                tracing::error!(error = %err, "ledger save failed, will retry next cycle");
            }
        }
        report
    }

    async fn reconcile_file(
        &mut self,
        file: &ScannedFile,
        report: &mut CycleReport,
    ) -> Result<TransitionOutcome, EngineError> {
        match self.classify(file) {
            Classification::Unchanged => Ok(TransitionOutcome::Unchanged),
            Classification::PendingLink => self.relink(file).await,
            Classification::New => {
                tracing::info!(path = %file.path.display(), "new file");
                let content = read_content(&file.path).await?;
                let file_id = self.create_and_link(file, None, content, report).await?;
                Ok(TransitionOutcome::Created { file_id })
            }
            Classification::Modified => {
                tracing::info!(path = %file.path.display(), "modified file");
                self.apply_modification(file, report).await
            }
        }
    }

    async fn relink(&mut self, file: &ScannedFile) -> Result<TransitionOutcome, EngineError> {
        let Some(file_id) = self
            .ledger
            .get(&file.path)
            .and_then(|record| record.file_id.clone())
        else {
            return Ok(TransitionOutcome::Unchanged);
        };
        self.gateway.link_to_collection(&file_id).await?;
        self.ledger.mark_linked(&file.path);
        tracing::info!(path = %file.path.display(), file_id, "linked previously uploaded file");
        self.retire_replaced(&file.path, &file_id).await;
        Ok(TransitionOutcome::Relinked)
    }

    async fn apply_modification(
        &mut self,
        file: &ScannedFile,
        report: &mut CycleReport,
    ) -> Result<TransitionOutcome, EngineError> {
        let Some(record) = self.ledger.get(&file.path).cloned() else {
            return Err(EngineError::Read {
                path: file.path.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "ledger record vanished"),
            });
        };
        let content = read_content(&file.path).await?;

        if self.config.update_strategy == UpdateStrategy::ContentUpdate
            && self.gateway.supports_content_update()
            && let Some(file_id) = record.file_id.as_deref()
        {
            match self.gateway.update_file_content(file_id, content.clone()).await {
                Ok(()) => {
                    self.ledger.update_fingerprint(&file.path, file.fingerprint);
                    tracing::info!(path = %file.path.display(), file_id, "remote content replaced");
                    // The new content is already remote. A failed link leaves
                    // the record pending instead of uploading another copy.
                    if !record.linked {
                        self.gateway.link_to_collection(file_id).await?;
                        self.ledger.mark_linked(&file.path);
                    }
                    return Ok(TransitionOutcome::ContentUpdated);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %file.path.display(),
                        file_id,
                        error = %err,
                        "content replacement failed, uploading a new copy"
                    );
                }
            }
        }

        // A known path keeps the name it was first given.
        let file_id = self
            .create_and_link(file, record.display_name.clone(), content, report)
            .await?;
        Ok(TransitionOutcome::Recreated { file_id })
    }

    /// Evicts superseded duplicates (when enabled), uploads, links, and
    /// commits the record. `known_name` is reused as is; without one the
    /// name is resolved. A successful create whose link fails is still
    /// recorded, unlinked, so the next cycle only links.
    async fn create_and_link(
        &mut self,
        file: &ScannedFile,
        known_name: Option<String>,
        content: Vec<u8>,
        report: &mut CycleReport,
    ) -> Result<String, EngineError> {
        let display_name = match known_name {
            Some(name) => name,
            None => self.resolver.resolve(&file.path, self.ledger.paths()),
        };
        report.evicted += self.evict_superseded(&file.path, &display_name).await?;

        let mime_type = mime_type_for(&file.path);
        let file_id = self
            .gateway
            .create_file(&display_name, content, mime_type)
            .await?;
        tracing::info!(
            path = %file.path.display(),
            display_name,
            file_id,
            "uploaded"
        );
        if let Some(index) = self.duplicates.as_mut() {
            index.record(
                &basename(&file.path),
                file_id.clone(),
                display_name.clone(),
                file.path.clone(),
            );
        }

        let record = FileRecord::uploaded(file.fingerprint, file_id.clone(), display_name);
        if let Err(err) = self.gateway.link_to_collection(&file_id).await {
            self.ledger.upsert(&file.path, record);
            return Err(err.into());
        }
        self.ledger.upsert(&file.path, record.confirmed());
        tracing::info!(path = %file.path.display(), file_id, "linked to collection");

        self.retire_replaced(&file.path, &file_id).await;
        Ok(file_id)
    }

    async fn evict_superseded(
        &mut self,
        path: &Path,
        display_name: &str,
    ) -> Result<usize, GatewayError> {
        let Some(index) = self.duplicates.as_ref() else {
            return Ok(0);
        };
        let stale = index.superseded_by(path, display_name, Path::exists);
        let mut evicted = 0;
        for entry in stale {
            tracing::info!(
                path = %path.display(),
                file_id = %entry.file_id,
                owner = ?entry.owner,
                "duplicate basename, retiring superseded remote file"
            );
            self.retire(&entry).await?;
            if let Some(owner) = &entry.owner {
                self.ledger.remove(owner);
            }
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Best effort: earlier uploads of `path` left behind by re-uploads.
    async fn retire_replaced(&mut self, path: &Path, keep: &str) {
        let Some(index) = self.duplicates.as_ref() else {
            return;
        };
        for entry in index.replaced_for(path, keep) {
            if let Err(err) = self.retire(&entry).await {
                tracing::warn!(
                    path = %path.display(),
                    file_id = %entry.file_id,
                    error = %err,
                    "failed to retire replaced remote file"
                );
            }
        }
    }

    /// Unlinks and deletes a remote file, then forgets it. A file that is
    /// already gone counts as retired.
    async fn retire(&mut self, entry: &DuplicateEntry) -> Result<(), GatewayError> {
        match self.gateway.unlink_from_collection(&entry.file_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        match self.gateway.delete_file(&entry.file_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        if let Some(index) = self.duplicates.as_mut() {
            index.remove_file_id(&entry.file_id);
        }
        Ok(())
    }
}

async fn read_content(path: &Path) -> Result<Vec<u8>, EngineError> {
    tokio::fs::read(path).await.map_err(|source| EngineError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn log_failure(path: &Path, err: &EngineError) {
    match err {
        EngineError::Gateway(GatewayError::RemoteRejected {
            operation,
            status,
            body,
            retryable,
        }) => tracing::error!(
            path = %path.display(),
            %operation,
            status = ?status,
            body = %body,
            retryable,
            "remote rejected transition"
        ),
        other => tracing::error!(path = %path.display(), error = %other, "transition failed"),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
