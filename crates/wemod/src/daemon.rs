//! Component wiring and the long-running daemon

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use wemo_core::discovery::TcpProber;
use wemo_core::traits::{DeviceDirectory, StaticSubnetResolver, SubnetResolver};
use wemo_core::{
    AgentConfig, Clock, Discovery, DeviceRegistry, EngineEvent, FileScheduleStore,
    FileSettingsStore, SchedulerEngine, SolarProvider, SystemClock,
};
use wemo_device::{SsdpDiscovery, UpnpProtocol};
use wemo_solar::{IpInfoLocator, SunriseSunsetClient};
use wemo_subnet::InterfaceSubnetResolver;

use crate::lock::InstanceLock;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long a tick in progress may take to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Everything both the daemon and the one-shot commands need
pub struct Components {
    pub discovery: Arc<Discovery>,
    pub solar: Arc<SolarProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    /// Build discovery and solar lookups from configuration
    pub async fn build(config: &AgentConfig) -> Result<Self> {
        let protocol = UpnpProtocol::new(config.scan.identify_timeout());
        let registry = DeviceRegistry::new(Arc::new(protocol.clone()));

        let resolver: Arc<dyn SubnetResolver> = match config.scan.cidr {
            Some(cidr) => {
                info!("Scanning fixed subnet {}", cidr);
                Arc::new(StaticSubnetResolver(cidr))
            }
            None => Arc::new(InterfaceSubnetResolver::new(config.scan.interface.clone())),
        };

        let mut discovery =
            Discovery::from_config(registry, resolver, Arc::new(TcpProber), &config.scan);
        if config.scan.quick_discovery {
            let ssdp = SsdpDiscovery::new(protocol, config.scan.quick_discovery_timeout());
            discovery = discovery.with_quick_discovery(Arc::new(ssdp));
        }

        let settings = FileSettingsStore::new(config.storage.settings_path())
            .await
            .context("Cannot open settings store")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let solar = SolarProvider::new(
            Arc::new(IpInfoLocator::new(config.solar.geolocation_timeout())),
            Arc::new(SunriseSunsetClient::new(config.solar.fetch_timeout())),
            Arc::new(settings),
            Arc::clone(&clock),
            &config.solar,
        );

        Ok(Self {
            discovery: Arc::new(discovery),
            solar: Arc::new(solar),
            clock,
        })
    }
}

/// Run the daemon until SIGTERM/SIGINT
pub async fn run_daemon(config: AgentConfig) -> Result<()> {
    let _lock = InstanceLock::acquire(config.storage.lock_path())?;

    let components = Components::build(&config).await?;
    let store = FileScheduleStore::new(config.storage.schedule_path())
        .await
        .context("Cannot open schedule store")?;
    info!("Schedules: {}", store.path().display());

    let directory: Arc<dyn DeviceDirectory> = components.discovery.clone();
    let (engine, events) = SchedulerEngine::new(
        Arc::new(store),
        directory,
        components.solar.clone(),
        Arc::clone(&components.clock),
        &config.scheduler,
    )?;

    let background = [
        tokio::spawn(log_events(events)),
        spawn_discovery_loop(
            Arc::clone(&components.discovery),
            config.scan.rescan_interval(),
        ),
        spawn_liveness_loop(
            Arc::clone(&components.discovery),
            config.scan.liveness_interval(),
        ),
    ];

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let engine_run = engine.run_with_shutdown(Some(shutdown_rx));
    tokio::pin!(engine_run);

    let result = tokio::select! {
        result = &mut engine_run => {
            warn!("Scheduler exited without a shutdown signal");
            result.map_err(anyhow::Error::from)
        }
        received = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", received?);
            let _ = shutdown_tx.send(());
            match timeout(SHUTDOWN_GRACE, &mut engine_run).await {
                Ok(result) => result.map_err(anyhow::Error::from),
                Err(_) => Err(anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_GRACE)),
            }
        }
    };

    components.discovery.cancel();
    for task in background {
        task.abort();
    }

    info!("Shutting down daemon");
    result
}

fn spawn_discovery_loop(discovery: Arc<Discovery>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match discovery.discover().await {
                Ok(report) if report.aborted => debug!("Periodic discovery superseded"),
                Ok(_) => debug!(
                    "Periodic discovery done, {} devices known",
                    discovery.registry().len().await
                ),
                Err(e) => warn!("Discovery pass failed: {}", e),
            }
        }
    })
}

fn spawn_liveness_loop(discovery: Arc<Discovery>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first discovery pass has
        // nothing to check yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = discovery.check_liveness().await;
            if report.unreachable > 0 {
                info!("{} devices unreachable", report.unreachable);
            }
        }
    })
}

async fn log_events(events: mpsc::Receiver<EngineEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        match event {
            EngineEvent::Started { jobs } => info!("Scheduler running with {} jobs", jobs),
            EngineEvent::JobFired { job_id, device, action } => {
                debug!("Event: job {} fired {:?} on {}", job_id, action, device)
            }
            EngineEvent::ActionFailed { job_id, device, error } => {
                debug!("Event: job {} failed on {}: {}", job_id, device, error)
            }
            EngineEvent::DeviceNotFound { job_id, device } => {
                debug!("Event: job {} has no device {}", job_id, device)
            }
            EngineEvent::PersistFailed { job_id, error } => {
                debug!("Event: job {} not persisted: {}", job_id, error)
            }
            EngineEvent::TickFailed { error } => error!("Scheduler tick failed: {}", error),
            EngineEvent::Stopped { reason } => info!("Scheduler stopped: {}", reason),
        }
    }
}

/// Wait for SIGTERM or SIGINT
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

/// Wait for Ctrl-C
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
