//! Discovery coordinator
//!
//! One discovery pass runs these steps in order:
//!
//! ```text
//! QuickDiscovery ──┐
//!                  ├──► DeviceRegistry::merge
//! SubnetResolver ──► PortScanner ──► DeviceIdentifier ──┘
//! ```
//!
//! Quick results are merged first, deep results second, so the address the
//! deep scan saw wins on a name collision.
//!
//! ## Superseding
//!
//! Only one pass does useful work at a time. Starting a pass cancels the
//! token of the pass in flight; that pass returns a partial report with
//! `aborted = true` and its responsive hosts are not identified.

pub mod identifier;
pub mod scanner;

pub use identifier::DeviceIdentifier;
pub use scanner::{PortScanner, ProbeOutcome, Prober, ScanReport, TcpProber};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::ScanConfig;
use crate::registry::{DeviceRegistry, DiscoverySource, MergeSummary};
use crate::traits::{DeviceDirectory, DeviceHandle, DeviceProtocol, QuickDiscovery, SubnetResolver};

/// Outcome of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Devices reported by quick discovery
    pub quick_found: usize,
    /// Deep scan summary, if the scan ran
    pub scan: Option<ScanReport>,
    /// Responsive hosts identified as devices
    pub identified: usize,
    /// Combined registry changes
    pub merged: MergeSummary,
    /// A newer pass cancelled this one
    pub aborted: bool,
}

/// Outcome of one liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub reachable: usize,
    pub unreachable: usize,
}

pub struct Discovery {
    registry: DeviceRegistry,
    resolver: Arc<dyn SubnetResolver>,
    quick: Option<Arc<dyn QuickDiscovery>>,
    scanner: PortScanner,
    identifier: DeviceIdentifier,
    current: Mutex<Option<(u64, CancellationToken)>>,
    next_pass: AtomicU64,
}

impl Discovery {
    pub fn new(
        registry: DeviceRegistry,
        resolver: Arc<dyn SubnetResolver>,
        scanner: PortScanner,
        identifier: DeviceIdentifier,
    ) -> Self {
        Self {
            registry,
            resolver,
            quick: None,
            scanner,
            identifier,
            current: Mutex::new(None),
            next_pass: AtomicU64::new(1),
        }
    }

    /// Build a coordinator from configuration
    ///
    /// The identifier uses the registry's protocol.
    pub fn from_config(
        registry: DeviceRegistry,
        resolver: Arc<dyn SubnetResolver>,
        prober: Arc<dyn Prober>,
        config: &ScanConfig,
    ) -> Self {
        let protocol: Arc<dyn DeviceProtocol> = Arc::clone(registry.protocol());
        let scanner = PortScanner::from_config(prober, config);
        let identifier = DeviceIdentifier::from_config(protocol, config);
        Self::new(registry, resolver, scanner, identifier)
    }

    pub fn with_quick_discovery(mut self, quick: Arc<dyn QuickDiscovery>) -> Self {
        self.quick = Some(quick);
        self
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Run one discovery pass, cancelling any pass still in flight
    ///
    /// # Returns
    ///
    /// - `Ok(DiscoveryReport)`: Pass finished or was superseded (`aborted`)
    /// - `Err(Error::NoRouteDetected)`: No subnet to scan; quick results are
    ///   already merged
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        let guard = self.begin_pass();
        let result = self.run_pass(&guard.token).await;
        if let Ok(report) = &result {
            tracing::info!(
                "Discovery pass {} {}: {} quick, {} identified, {} new, {} updated",
                guard.id,
                if report.aborted { "superseded" } else { "finished" },
                report.quick_found,
                report.identified,
                report.merged.added,
                report.merged.updated
            );
        }
        result
    }

    /// Cancel the pass in flight, if any
    pub fn cancel(&self) {
        if let Some((_, token)) = self.lock_current().take() {
            token.cancel();
        }
    }

    async fn run_pass(&self, cancel: &CancellationToken) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        if let Some(quick) = &self.quick {
            match quick.discover().await {
                Ok(found) => {
                    report.quick_found = found.len();
                    let summary = self.registry.merge(DiscoverySource::Quick, found).await;
                    add_summary(&mut report.merged, summary);
                }
                Err(e) => tracing::warn!("Quick discovery failed: {}", e),
            }
        }

        if cancel.is_cancelled() {
            report.aborted = true;
            return Ok(report);
        }

        let cidr = self.resolver.resolve()?;
        let scan = self.scanner.scan(cidr, cancel).await?;

        if scan.aborted {
            tracing::warn!(
                "Scan of {} superseded after {} of {} hosts",
                scan.cidr,
                scan.probed,
                PortScanner::host_count(&scan.cidr)
            );
            report.aborted = true;
            report.scan = Some(scan);
            return Ok(report);
        }

        let descriptors = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            found = self.identifier.identify_all(scan.responsive.clone()) => Some(found),
        };

        match descriptors {
            Some(found) => {
                report.identified = found.len();
                let summary = self.registry.merge(DiscoverySource::Deep, found).await;
                add_summary(&mut report.merged, summary);
            }
            None => {
                tracing::warn!("Identification superseded for {}", scan.cidr);
                report.aborted = true;
            }
        }

        report.scan = Some(scan);
        Ok(report)
    }

    /// Probe every known device's control address and update reachability
    pub async fn check_liveness(&self) -> LivenessReport {
        let devices = self.registry.snapshot().await;
        let scanner = &self.scanner;

        let results: Vec<(String, bool)> = stream::iter(devices)
            .map(move |device| async move {
                let outcome = scanner.probe_address(device.address()).await;
                (device.descriptor.name, outcome == ProbeOutcome::Open)
            })
            .buffer_unordered(self.scanner.concurrency())
            .collect()
            .await;

        let mut report = LivenessReport::default();
        for (name, reachable) in results {
            if reachable {
                report.reachable += 1;
            } else {
                report.unreachable += 1;
            }
            self.registry.set_reachable(&name, reachable).await;
        }

        tracing::debug!(
            "Liveness: {} reachable, {} unreachable",
            report.reachable,
            report.unreachable
        );
        report
    }

    fn begin_pass(&self) -> PassGuard<'_> {
        let id = self.next_pass.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();

        if let Some((previous, old)) = self.lock_current().replace((id, token.clone())) {
            tracing::info!("Discovery pass {} supersedes pass {}", id, previous);
            old.cancel();
        }

        PassGuard {
            owner: self,
            id,
            token,
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Clears the in-flight slot when a pass ends, even if its future is dropped
struct PassGuard<'a> {
    owner: &'a Discovery,
    id: u64,
    token: CancellationToken,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.owner.lock_current();
        if matches!(current.as_ref(), Some((id, _)) if *id == self.id) {
            *current = None;
        }
    }
}

fn add_summary(total: &mut MergeSummary, summary: MergeSummary) {
    total.added += summary.added;
    total.updated += summary.updated;
}

#[async_trait]
impl DeviceDirectory for Discovery {
    async fn resolve(&self, name: &str) -> Option<Arc<dyn DeviceHandle>> {
        self.registry.resolve(name).await
    }

    async fn rediscover(&self) -> Result<()> {
        self.discover().await.map(|_| ())
    }
}
