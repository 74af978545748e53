//! # Cell Logger
//!
//! Logs GSM cells together with the GPS fix and uploads the logs.
//!
//! ```text
//! cell-logger [run|upload] [--config PATH]
//! ```
//!
//! - `run` (default): sample every `scan_interval_s` seconds until Ctrl+C,
//!   then write whatever is still buffered.
//! - `upload`: send every pending log file once and print the counts.
//!
//! The modem, GPS and lease service are simulated on this host.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use cell_logger::capability::simulated::{SimulatedLease, SimulatedPosition, SimulatedRadio};
use cell_logger::capability::RadioCapability;
use cell_logger::config::{self, Config};
use cell_logger::events::EventBus;
use cell_logger::logbuf::{self, DeviceIdentity, LogBuffer, SharedLogBuffer};
use cell_logger::position::PositionSource;
use cell_logger::radio::{spawn_radio_inbox, RadioEvent, RadioState};
use cell_logger::sampler::CellSampler;
use cell_logger::scheduler::{PluginRegistry, Scheduler};
use cell_logger::upload::{ReqwestTransport, UploadCoordinator};

/// Log file written next to the configuration
const LOG_FILE_NAME: &str = "cell-logger.log";

#[derive(Debug, Parser)]
#[command(name = "cell-logger")]
#[command(version, about = "Log GSM cells with the GPS fix and upload the logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (created with defaults when missing)
    #[arg(long, short, global = true, env = "CELL_LOGGER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Sample until Ctrl+C, then write what is still buffered (default)
    Run,
    /// Send every pending log file once and print the counts
    Upload,
}

impl Cli {
    fn selected_command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }

    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::default_config_path)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();

    // Fatal: the collector credentials have no default
    let (config, origin) = Config::load_or_init(&config_path)
        .with_context(|| format!("cannot load configuration {}", config_path.display()))?;
    std::fs::create_dir_all(&config.general.app_dir)?;

    // Console plus file logging
    let file_appender = tracing_appender::rolling::never(&config.general.app_dir, LOG_FILE_NAME);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    info!("Cell Logger v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_path.display());
    origin.log(&config_path);

    let events = EventBus::default();
    let radio_capability = Arc::new(SimulatedRadio::default());

    let device_info = radio_capability.get_device_info().unwrap_or_else(|e| {
        warn!("Device info unavailable: {}", e);
        Default::default()
    });
    let identity = DeviceIdentity::from_device_info(
        &device_info,
        &config.device.software_id,
        &config.device.software_version,
    );
    let buffer: SharedLogBuffer = logbuf::shared(LogBuffer::new(
        identity.header(),
        config.flush_policy(),
        config.general.logs_dir.clone(),
        events.clone(),
    ));

    match cli.selected_command() {
        Commands::Run => run(config, events, radio_capability, buffer).await,
        Commands::Upload => upload(config, events, buffer).await,
    }
}

async fn run(
    config: Config,
    events: EventBus,
    radio_capability: Arc<SimulatedRadio>,
    buffer: SharedLogBuffer,
) -> Result<()> {
    let radio = Arc::new(RadioState::new(radio_capability.clone(), events.clone()));
    let (inbox, inbox_task) = spawn_radio_inbox(Arc::clone(&radio));
    match radio_capability.get_status() {
        Ok(status) => {
            let _ = inbox.send(RadioEvent::NetworkStatus(status));
        }
        Err(e) => warn!("Initial network status unavailable: {}", e),
    }

    let sampler = Arc::new(
        CellSampler::new(
            radio,
            PositionSource::new(Arc::new(SimulatedPosition::default())),
            buffer,
            config.speed_limits(),
            Duration::from_secs(config.general.scan_interval_s),
            Arc::new(SimulatedLease::default()),
            events.clone(),
        )
        .with_directories(vec![
            config.general.app_dir.clone(),
            config.general.logs_dir.clone(),
            config.general.processed_logs_dir.clone(),
        ]),
    );

    let mut registry = PluginRegistry::new();
    registry.register(sampler.clone());
    let failed = registry.init_all().await;
    if !failed.is_empty() {
        bail!("plugin initialisation failed: {}", failed.join(", "));
    }

    let scheduler = Scheduler::new(sampler.clone(), events);
    scheduler.start();
    info!("Logging every {} s, press Ctrl+C to exit", config.general.scan_interval_s);

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    scheduler.stop_and_wait().await;
    drop(inbox);
    if let Err(e) = inbox_task.await {
        warn!("Radio inbox task ended abnormally: {}", e);
    }

    if let Err(e) = sampler.shutdown_flush().await {
        error!("Final flush failed: {}", e);
        return Err(e.into());
    }
    info!("Bye");
    Ok(())
}

async fn upload(config: Config, events: EventBus, buffer: SharedLogBuffer) -> Result<()> {
    std::fs::create_dir_all(&config.general.logs_dir)?;
    std::fs::create_dir_all(&config.general.processed_logs_dir)?;

    let transport = Arc::new(ReqwestTransport::new()?);
    let coordinator = UploadCoordinator::new(
        transport,
        buffer,
        config.general.processed_logs_dir.clone(),
        config.upload.clone(),
        events,
    );

    let report = coordinator.upload_pending().await?;
    println!(
        "{} of {} file(s) uploaded ({} duplicate(s), {} failed)",
        report.uploaded, report.total, report.duplicates, report.failed
    );
    if !report.all_succeeded {
        warn!("Some files could not be uploaded and stay pending");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["cell-logger"]).unwrap();
        assert_eq!(cli.selected_command(), Commands::Run);
        assert_eq!(cli.config_path(), config::default_config_path());
    }

    #[test]
    fn test_upload_with_config() {
        let cli = Cli::try_parse_from(["cell-logger", "upload", "--config", "/tmp/logger.toml"]).unwrap();
        assert_eq!(cli.selected_command(), Commands::Upload);
        assert_eq!(cli.config_path(), PathBuf::from("/tmp/logger.toml"));
    }

    #[test]
    fn test_short_config_before_subcommand() {
        let cli = Cli::try_parse_from(["cell-logger", "-c", "/tmp/logger.toml", "run"]).unwrap();
        assert_eq!(cli.selected_command(), Commands::Run);
        assert_eq!(cli.config_path(), PathBuf::from("/tmp/logger.toml"));
    }

    #[test]
    fn test_config_without_path_fails() {
        assert!(Cli::try_parse_from(["cell-logger", "--config"]).is_err());
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        assert!(Cli::try_parse_from(["cell-logger", "frobnicate"]).is_err());
    }
}
