// # wemod - Wemo Scheduling Daemon
//
// Thin integration layer over wemo-core. Discovery, solar caching and job
// firing all live in the library; this binary only:
//
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Wires the UPnP protocol, subnet detection and solar lookups into the core
// 4. Runs the daemon or a one-shot command
//
// ## Commands
//
// - `wemod` / `wemod run`: scheduler, periodic discovery and liveness checks
// - `wemod scan`: one discovery pass, then list devices
// - `wemod on|off|toggle|state|setup-code <NAME>`: act on one device
// - `wemod solar`: today's sunrise and sunset
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Storage
// - `WEMO_DATA_DIR`: Directory for `schedules.json`, `settings.json` and `wemod.lock`
//
// ### Discovery
// - `WEMO_SCAN_CIDR`: Fixed subnet instead of interface detection
// - `WEMO_SCAN_INTERFACE`: Restrict detection to one interface
// - `WEMO_SCAN_CONCURRENCY`: Probe pool size (1-1024)
// - `WEMO_PROBE_TIMEOUT_MS`: Per-probe timeout (50-10000)
// - `WEMO_CONTROL_PORT`: Port probed on every host
// - `WEMO_QUICK_DISCOVERY`: SSDP before the deep scan (true/false)
// - `WEMO_RESCAN_INTERVAL_SECS`: Periodic discovery (60-86400)
// - `WEMO_LIVENESS_INTERVAL_SECS`: Liveness checks (1-3600)
//
// ### Scheduler
// - `WEMO_TICK_INTERVAL_SECS`: Tick interval (1-59)
// - `WEMO_ACTION_TIMEOUT_SECS`: Device action bound (1-120)
// - `WEMO_LAT` / `WEMO_LNG`: Fixed coordinates for sunrise/sunset
//
// ### Logging
// - `WEMO_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export WEMO_SCAN_CIDR=192.168.1.0/24
// export WEMO_LAT=40.71
// export WEMO_LNG=-74.01
//
// wemod
// ```

mod commands;
mod config;
mod daemon;
mod lock;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use crate::commands::DeviceCommand;
use crate::config::Config;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WemoExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WemoExitCode> for ExitCode {
    fn from(code: WemoExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser)]
#[command(name = "wemod")]
#[command(author, version, about = "Discovery and scheduling daemon for Wemo smart plugs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the scheduler with periodic discovery (default)
    Run,

    /// Discover devices once and list them
    Scan,

    /// Switch a device on
    On { name: String },

    /// Switch a device off
    Off { name: String },

    /// Flip a device and print its new state
    Toggle { name: String },

    /// Print whether a device is on
    State { name: String },

    /// Print a device's HomeKit setup code
    SetupCode { name: String },

    /// Print today's sunrise and sunset
    Solar,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WemoExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return WemoExitCode::ConfigError.into();
    }

    let agent_config = match config.agent_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return WemoExitCode::ConfigError.into();
        }
    };

    let log_level = config.level().unwrap_or(tracing::Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WemoExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WemoExitCode::RuntimeError.into();
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    let result = rt.block_on(async {
        match command {
            Command::Run => {
                info!("Starting wemod daemon");
                info!("Data directory: {}", agent_config.storage.data_dir.display());
                daemon::run_daemon(agent_config).await
            }
            Command::Scan => commands::scan(&agent_config).await,
            Command::On { name } => commands::device(&agent_config, &name, DeviceCommand::On).await,
            Command::Off { name } => {
                commands::device(&agent_config, &name, DeviceCommand::Off).await
            }
            Command::Toggle { name } => {
                commands::device(&agent_config, &name, DeviceCommand::Toggle).await
            }
            Command::State { name } => {
                commands::device(&agent_config, &name, DeviceCommand::State).await
            }
            Command::SetupCode { name } => {
                commands::device(&agent_config, &name, DeviceCommand::SetupCode).await
            }
            Command::Solar => commands::solar(&agent_config).await,
        }
    });

    match result {
        Ok(()) => WemoExitCode::CleanShutdown.into(),
        Err(e) => {
            error!("{:#}", e);
            WemoExitCode::RuntimeError.into()
        }
    }
}
