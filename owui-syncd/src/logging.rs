use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub const DEFAULT_LOG_FILE: &str = "/tmp/openwebui_watcher.log";

pub fn log_file_from_env() -> PathBuf {
    std::env::var("OWUI_LOG_FILE")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

/// Installs the global subscriber: stderr always, plus `log_file` in
/// append mode when it can be opened. `RUST_LOG` overrides the `info`
/// default. Returns whether the file is being written.
pub fn init(log_file: &Path) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);
    match open_log_file(log_file) {
        Ok(file) => {
            let _ = builder
                .with_writer(io::stderr.and(Mutex::new(file)))
                .try_init();
            true
        }
        Err(err) => {
            let _ = builder.with_writer(io::stderr).try_init();
            tracing::warn!(
                path = %log_file.display(),
                error = %err,
                "log file unavailable, logging to stderr only"
            );
            false
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
