use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use owui_core::OpenWebUiClient;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::sync::engine::{CycleReport, EngineConfig, ReconcileEngine, UpdateStrategy};
use crate::sync::gateway::OpenWebUiGateway;
use crate::sync::ledger::{DEFAULT_LEDGER_FILE, Ledger};
use crate::sync::naming::NamingPolicy;
use crate::sync::scanner::{ExtensionFilter, Scanner};

const DEFAULT_SCAN_DIR: &str = ".";
const DEFAULT_SYNC_PERIOD_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct DaemonConfig {
    pub api_url: String,
    pub api_key: String,
    pub knowledge_id: String,
    pub scan_root: PathBuf,
    pub ledger_path: PathBuf,
    pub extensions: ExtensionFilter,
    pub sync_period: Duration,
    pub request_timeout: Duration,
    pub engine: EngineConfig,
}

impl fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("knowledge_id", &self.knowledge_id)
            .field("scan_root", &self.scan_root)
            .field("ledger_path", &self.ledger_path)
            .field("extensions", &self.extensions)
            .field("sync_period", &self.sync_period)
            .field("request_timeout", &self.request_timeout)
            .field("engine", &self.engine)
            .finish()
    }
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Only the three
    /// connection variables are required; everything else falls back to a
    /// default, with a warning when a value is present but unusable.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = required(&lookup, "OPENWEBUI_API_URL")?;
        let api_key = required(&lookup, "OPENWEBUI_API_KEY")?;
        let knowledge_id = required(&lookup, "OPENWEBUI_KNOWLEDGE_ID")?;

        let home = dirs::home_dir();
        let scan_root = lookup("OWUI_SCAN_DIR")
            .map(|value| expand_with_home(&value, home.as_deref()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCAN_DIR));
        let ledger_path = lookup("OWUI_LEDGER_PATH")
            .map(|value| expand_with_home(&value, home.as_deref()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE));
        let extensions = lookup("ALLOWED_FILE_EXTENSIONS")
            .map(|value| ExtensionFilter::parse(&value))
            .unwrap_or_else(ExtensionFilter::allow_all);
        let sync_period = Duration::from_secs(read_u64(
            lookup("OWUI_SYNC_PERIOD_SECS"),
            DEFAULT_SYNC_PERIOD_SECS,
        ));
        let request_timeout = Duration::from_secs(read_u64(
            lookup("OWUI_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));
        let engine = EngineConfig {
            naming: read_parsed::<NamingPolicy>("OWUI_NAMING_POLICY", lookup("OWUI_NAMING_POLICY")),
            update_strategy: read_parsed::<UpdateStrategy>(
                "OWUI_UPDATE_STRATEGY",
                lookup("OWUI_UPDATE_STRATEGY"),
            ),
            evict_duplicates: read_bool(lookup("OWUI_EVICT_DUPLICATES"), false),
        };

        Ok(Self {
            api_url,
            api_key,
            knowledge_id,
            scan_root,
            ledger_path,
            extensions,
            sync_period,
            request_timeout,
            engine,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: ReconcileEngine<OpenWebUiGateway>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.scan_root)
            .await
            .with_context(|| format!("failed to create scan root at {:?}", config.scan_root))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build http client")?;
        let client = OpenWebUiClient::with_http(http, &config.api_url, config.api_key.clone())
            .context("invalid OPENWEBUI_API_URL")?;
        let gateway = OpenWebUiGateway::new(client, config.knowledge_id.clone());

        let ledger = Ledger::load(&config.ledger_path);
        let scanner = Scanner::new(&config.scan_root, config.extensions.clone())
            .with_context(|| format!("scan root is unusable: {:?}", config.scan_root))?
            .exclude(ledger.path())
            .exclude(&ledger.temp_path());

        let mut engine = ReconcileEngine::new(gateway, scanner, ledger, config.engine);
        if let Err(err) = engine.seed_duplicates().await {
            tracing::warn!(
                error = %err,
                "could not list collection, duplicate index starts empty"
            );
        }

        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> &ReconcileEngine<OpenWebUiGateway> {
        &self.engine
    }

    pub async fn run_once(&mut self) -> CycleReport {
        let report = self.engine.run_one_cycle(&CancellationToken::new()).await;
        log_cycle(&report);
        report
    }

    /// Runs a cycle every `sync_period` until Ctrl-C. A cycle in progress
    /// stops at the next file boundary and still saves the ledger.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(
            scan_root = %self.config.scan_root.display(),
            ledger = %self.config.ledger_path.display(),
            knowledge_id = %self.config.knowledge_id,
            naming = self.config.engine.naming.as_str(),
            update_strategy = self.config.engine.update_strategy.as_str(),
            evict_duplicates = self.config.engine.evict_duplicates,
            period_secs = self.config.sync_period.as_secs(),
            "watcher started"
        );

        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("shutdown requested"),
                Err(err) => tracing::error!(error = %err, "failed waiting for shutdown signal"),
            }
            signal_cancel.cancel();
        });

        let mut ticker = tokio::time::interval(self.config.sync_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let report = self.engine.run_one_cycle(&cancel).await;
            log_cycle(&report);
            if report.cancelled {
                break;
            }
        }

        signal_handle.abort();
        tracing::info!("watcher stopped");
        Ok(())
    }
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
