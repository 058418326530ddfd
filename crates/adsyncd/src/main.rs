// # adsyncd - Campaign Sync Daemon
//
// Thin integration layer over adsync-core:
// 1. Reads configuration from environment variables
// 2. Initializes tracing and the runtime
// 3. Registers connectors and builds the orchestrator
// 4. Syncs every ad in the ads file, then waits for SIGTERM/SIGINT
//
// No sync, retry or mapping logic lives here.
//
// ## Configuration
//
// - `ADSYNC_CONFIG`: Path to the JSON sync configuration (connectors, limits)
// - `ADSYNC_ADS`: Path to a JSON array of unified ads to sync
// - `ADSYNC_CREDENTIALS`: Path to a JSON array of seed credentials
// - `ADSYNC_STATE_PATH`: Binding state file (default `/var/lib/adsync/bindings.json`)
// - `ADSYNC_CREDENTIALS_STATE_PATH`: Credential state file holding refreshed
//   tokens (default `/var/lib/adsync/credentials.json`)
//
// Seed credentials are only stored for (user, platform) pairs the credential
// state file does not already hold, so refreshed tokens win across restarts.
// Remove the pair from the state file to reseed it.
// - `ADSYNC_PLATFORMS`: Comma-separated platforms to target (default: all configured)
// - `ADSYNC_LOG_LEVEL`: trace, debug, info, warn or error (default `info`)
//
// ## Example
//
// ```bash
// export ADSYNC_CONFIG=/etc/adsync/config.json
// export ADSYNC_ADS=/etc/adsync/ads.json
// export ADSYNC_CREDENTIALS=/etc/adsync/credentials.json
// export ADSYNC_STATE_PATH=/var/lib/adsync/bindings.json
// export ADSYNC_CREDENTIALS_STATE_PATH=/var/lib/adsync/credentials.json
//
// adsyncd
// ```

use adsync_core::model::{Credential, Platform, UnifiedAd};
use adsync_core::state::{FileBindingStore, FileCredentialStore, MemoryMetricsStore};
use adsync_core::{ConnectorRegistry, Stores, SyncConfig, SyncEvent, SyncOrchestrator};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_STATE_PATH: &str = "/var/lib/adsync/bindings.json";
const DEFAULT_CREDENTIALS_STATE_PATH: &str = "/var/lib/adsync/credentials.json";

/// Bound on the graceful part of shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes, following systemd conventions
#[derive(Debug, Clone, Copy)]
enum AdsyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<AdsyncExitCode> for ExitCode {
    fn from(code: AdsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings from the environment
struct Settings {
    config_path: PathBuf,
    ads_path: PathBuf,
    credentials_path: PathBuf,
    state_path: PathBuf,
    credentials_state_path: PathBuf,
    platforms: Vec<Platform>,
    log_level: String,
}

impl Settings {
    fn from_env() -> Result<Self> {
        let platforms = env::var("ADSYNC_PLATFORMS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Platform>().map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()
            .context("ADSYNC_PLATFORMS is invalid")?;

        Ok(Self {
            config_path: required_path("ADSYNC_CONFIG")?,
            ads_path: required_path("ADSYNC_ADS")?,
            credentials_path: required_path("ADSYNC_CREDENTIALS")?,
            state_path: env::var("ADSYNC_STATE_PATH")
                .unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string())
                .into(),
            credentials_state_path: env::var("ADSYNC_CREDENTIALS_STATE_PATH")
                .unwrap_or_else(|_| DEFAULT_CREDENTIALS_STATE_PATH.to_string())
                .into(),
            platforms,
            log_level: env::var("ADSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        for (var, path) in [
            ("ADSYNC_CONFIG", &self.config_path),
            ("ADSYNC_ADS", &self.ads_path),
            ("ADSYNC_CREDENTIALS", &self.credentials_path),
        ] {
            if !path.is_file() {
                anyhow::bail!("{} points at {}, which is not a file", var, path.display());
            }
        }

        if self.state_path.as_os_str().is_empty() {
            anyhow::bail!("ADSYNC_STATE_PATH cannot be empty");
        }

        if self.credentials_state_path.as_os_str().is_empty() {
            anyhow::bail!("ADSYNC_CREDENTIALS_STATE_PATH cannot be empty");
        }

        if self.credentials_state_path == self.state_path {
            anyhow::bail!("ADSYNC_CREDENTIALS_STATE_PATH must differ from ADSYNC_STATE_PATH");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ADSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn tracing_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn required_path(var: &str) -> Result<PathBuf> {
    env::var(var)
        .map(PathBuf::from)
        .with_context(|| format!("{} is required", var))
}

/// Everything read from disk before the runtime starts
struct Inputs {
    config: SyncConfig,
    ads: Vec<UnifiedAd>,
    credentials: Vec<Credential>,
}

impl Inputs {
    fn load(settings: &Settings) -> Result<Self> {
        let config: SyncConfig = read_json(&settings.config_path)?;
        config.validate().context("Sync configuration is invalid")?;
        if config.connectors.is_empty() {
            anyhow::bail!("{} configures no connectors", settings.config_path.display());
        }

        Ok(Self {
            config,
            ads: read_json(&settings.ads_path)?,
            credentials: read_json(&settings.credentials_path)?,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AdsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return AdsyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.tracing_level())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AdsyncExitCode::ConfigError.into();
    }

    let inputs = match Inputs::load(&settings) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return AdsyncExitCode::ConfigError.into();
        }
    };

    info!(
        ads = inputs.ads.len(),
        connectors = inputs.config.connectors.len(),
        "Starting adsyncd"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AdsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(settings, inputs).await {
            Ok(()) => AdsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                AdsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn connector_registry() -> ConnectorRegistry {
    let registry = ConnectorRegistry::new();

    #[cfg(feature = "google")]
    adsync_connector_google::register(&registry);

    #[cfg(feature = "facebook")]
    adsync_connector_facebook::register(&registry);

    info!(connectors = ?registry.list_connectors(), "Registered connectors");
    registry
}

async fn run_daemon(settings: Settings, inputs: Inputs) -> Result<()> {
    let connectors = connector_registry()
        .build_set(&inputs.config.connectors)
        .context("Failed to build connectors")?;

    let credentials = Arc::new(FileCredentialStore::new(&settings.credentials_state_path).await?);
    for credential in &inputs.credentials {
        if !credentials.seed(credential).await? {
            info!(key = %credential.key(), "Keeping stored credential over seed");
        }
    }
    let stores = Stores {
        bindings: Arc::new(FileBindingStore::new(&settings.state_path).await?),
        credentials,
        metrics: Arc::new(MemoryMetricsStore::new()),
    };

    let (orchestrator, mut events) = SyncOrchestrator::new(&inputs.config, connectors, stores)?;
    let orchestrator = Arc::new(orchestrator);

    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let mut syncs = JoinSet::new();
    for ad in inputs.ads {
        let orchestrator = orchestrator.clone();
        let platforms = settings.platforms.clone();
        syncs.spawn(async move { orchestrator.sync(&ad, &platforms).await });
    }

    let mut shutdown = std::pin::pin!(wait_for_shutdown());
    let received = loop {
        tokio::select! {
            joined = syncs.join_next(), if !syncs.is_empty() => {
                match joined {
                    Some(Ok(result)) => info!(
                        ad_id = %result.ad_id(),
                        succeeded = result.successes().count(),
                        failed = result.failures().count(),
                        "Ad synced"
                    ),
                    Some(Err(e)) => warn!("Sync task failed: {}", e),
                    None => {}
                }
                if syncs.is_empty() {
                    info!("All ads synced; waiting for shutdown signal");
                }
            }
            received = &mut shutdown => break received?,
        }
    };

    info!("Received {}, shutting down", received);
    orchestrator.shutdown().await?;

    // cancelled syncs settle promptly once the root token fires
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while syncs.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Syncs still running after {:?}; aborting", SHUTDOWN_TIMEOUT);
        syncs.abort_all();
    }

    // the event channel closes once the last orchestrator handle is gone
    drop(syncs);
    drop(orchestrator);
    if tokio::time::timeout(Duration::from_secs(1), event_log)
        .await
        .is_err()
    {
        warn!("Event log did not drain");
    }
    info!("adsyncd stopped");
    Ok(())
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::PlatformFailed {
            ad_id,
            platform,
            kind,
            message,
            attempts,
            ..
        } => warn!(%ad_id, %platform, %kind, attempts, "Platform sync failed: {}", message),
        SyncEvent::FieldsDropped {
            ad_id,
            platform,
            fields,
        } => warn!(%ad_id, %platform, ?fields, "Fields not representable on platform"),
        other => info!(event = ?other, "Sync event"),
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C on platforms without Unix signals
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
