// # sobossd - SoBoss Daemon
//
// Thin integration layer: everything that decides what happens when a
// device comes or goes lives in soboss-core.
//
// The sobossd daemon is responsible for:
// 1. Reading daemon settings from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the config source, event bus, probe and speaker directory
// 4. Running the device registry until a shutdown signal arrives
//
// ## Configuration
//
// Device and speaker configuration lives in JSON files (see
// `soboss_core::FileConfigSource`). The daemon itself reads:
//
// - `SOBOSS_CONFIG_DIR`: Directory with the section files (default `./config`)
// - `SOBOSS_ENV`: Environment layer to merge (default `production`)
// - `SOBOSS_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
//
// ## Playback endpoints
//
// No discovery backend ships with the daemon, so its speaker directory stays
// empty and action lists only log the speakers they cannot resolve. An
// application that talks to real speakers embeds soboss-core and fills
// `soboss_core::SpeakerDirectory` before handing it to `DeviceContext::new`.
//
// ## Example
//
// ```bash
// export SOBOSS_CONFIG_DIR=/etc/soboss
// export SOBOSS_ENV=production
// export SOBOSS_LOG_LEVEL=debug
//
// sobossd
// ```

use anyhow::Result;
use soboss_core::{
    ConfigSource, DeviceContext, DeviceRegistry, EventBus, FileConfigSource, LogEventHandler,
    ReachabilityProbe, SpeakerDirectory,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time the registry gets to finish its current round after cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings
struct Config {
    config_dir: PathBuf,
    environment: String,
    log_level: String,
}

impl Config {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_dir: env::var("SOBOSS_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./config")),
            environment: env::var("SOBOSS_ENV").unwrap_or_else(|_| "production".to_string()),
            log_level: env::var("SOBOSS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        if !self.config_dir.is_dir() {
            anyhow::bail!(
                "SOBOSS_CONFIG_DIR does not exist or is not a directory: {}",
                self.config_dir.display()
            );
        }

        if self.environment.trim().is_empty() {
            anyhow::bail!("SOBOSS_ENV cannot be empty");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SOBOSS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting sobossd {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Config directory: {} (environment: {})",
        config.config_dir.display(),
        config.environment
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) if is_configuration(&e) => {
                error!("Startup failed: {:#}", e);
                DaemonExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DaemonExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn is_configuration(e: &anyhow::Error) -> bool {
    e.downcast_ref::<soboss_core::Error>()
        .is_some_and(soboss_core::Error::is_configuration)
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let source = Arc::new(
        FileConfigSource::new(&config.config_dir).with_environment(config.environment.clone()),
    );

    // Fail fast on a broken configuration before anything is spawned
    let initial = source.snapshot().await?;
    initial.validate()?;
    info!(
        "Configuration loaded: {} generic device(s), {} speaker mapping(s)",
        initial.generic_devices.len(),
        initial.sonos.speakers.len()
    );

    let bus = Arc::new(EventBus::new());
    bus.subscribe(Arc::new(LogEventHandler));

    let speakers = SpeakerDirectory::new();
    warn!("No playback discovery backend linked; action lists resolve against an empty speaker directory");

    let probe = reachability_probe()?;
    info!("Using {} reachability probe", probe.probe_name());

    let context = DeviceContext::new(Arc::clone(&bus), probe, Arc::new(speakers));
    let registry = Arc::new(DeviceRegistry::new(source, context));

    let cancel = CancellationToken::new();
    let mut handle = tokio::spawn({
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        async move { registry.run(cancel).await }
    });

    info!("Daemon initialized successfully");

    tokio::select! {
        result = &mut handle => {
            // The registry only returns on its own when the initial load fails
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(anyhow::anyhow!("Device registry task failed: {}", e)),
            };
        }
        signal = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", signal?);
        }
    }

    info!("Shutting down daemon");
    cancel.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => anyhow::bail!("Device registry task failed: {}", e),
        Err(_) => warn!("Device registry did not stop within {:?}", SHUTDOWN_GRACE),
    }

    Ok(())
}

#[cfg(feature = "ping")]
fn reachability_probe() -> Result<Arc<dyn ReachabilityProbe>> {
    Ok(Arc::new(soboss_probe_ping::PingProbe::new()))
}

#[cfg(not(feature = "ping"))]
fn reachability_probe() -> Result<Arc<dyn ReachabilityProbe>> {
    anyhow::bail!("No reachability probe compiled in. Rebuild with the 'ping' feature")
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
