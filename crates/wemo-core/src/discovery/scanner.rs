// # Parallel Port Scanner
//
// Sweeps every host address of an IPv4 subnet with a TCP connect to one
// control port.
//
// ## Resource Bounds
//
// - At most `concurrency` probes are in flight (`buffer_unordered`)
// - Each probe is cut off after `probe_timeout`
// - Wall time is roughly `ceil(hosts / concurrency) * probe_timeout`
// - Subnets larger than `max_hosts` are refused up front
//
// The scan owns no detached tasks. Cancelling the token, or dropping the
// scan future, drops every in-flight probe with it.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ipnet::Ipv4Net;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::{Error, Result};

/// Result of probing one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Connection accepted
    Open,
    /// Connection refused or failed
    Closed,
    /// No answer within the probe timeout
    TimedOut,
}

/// Reachability check for one address
///
/// The scanner applies the timeout; implementations only attempt the
/// connection.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: SocketAddrV4) -> ProbeOutcome;
}

/// Plain TCP connect probe
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: SocketAddrV4) -> ProbeOutcome {
        match TcpStream::connect(target).await {
            Ok(_stream) => ProbeOutcome::Open,
            Err(e) => {
                tracing::trace!("Probe {} failed: {}", target, e);
                ProbeOutcome::Closed
            }
        }
    }
}

/// Summary of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub cidr: Ipv4Net,
    /// Probes that completed (any outcome)
    pub probed: usize,
    /// Hosts with the control port open, in completion order
    pub responsive: Vec<Ipv4Addr>,
    /// The scan was cancelled before every host was probed
    pub aborted: bool,
    pub elapsed: Duration,
}

/// Bounded-concurrency TCP sweep
pub struct PortScanner {
    prober: Arc<dyn Prober>,
    port: u16,
    probe_timeout: Duration,
    concurrency: usize,
    max_hosts: usize,
}

impl PortScanner {
    /// Create a scanner
    ///
    /// # Parameters
    ///
    /// - `prober`: Connection attempt implementation
    /// - `port`: Control port to probe
    /// - `probe_timeout`: Per-host time bound
    /// - `concurrency`: Maximum probes in flight (clamped to at least 1)
    pub fn new(prober: Arc<dyn Prober>, port: u16, probe_timeout: Duration, concurrency: usize) -> Self {
        Self {
            prober,
            port,
            probe_timeout,
            concurrency: concurrency.max(1),
            max_hosts: 4096,
        }
    }

    pub fn from_config(prober: Arc<dyn Prober>, config: &ScanConfig) -> Self {
        Self::new(
            prober,
            config.control_port,
            config.probe_timeout(),
            config.max_concurrency,
        )
        .with_max_hosts(config.max_hosts)
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of host addresses `cidr` contains
    ///
    /// Network and broadcast addresses are excluded, except for /31 and /32
    /// where every address is a host.
    pub fn host_count(cidr: &Ipv4Net) -> u64 {
        let total = 1u64 << (32 - u32::from(cidr.prefix_len()));
        if cidr.prefix_len() >= 31 {
            total
        } else {
            total - 2
        }
    }

    /// Probe every host of `cidr`
    ///
    /// # Returns
    ///
    /// - `Ok(ScanReport)`: Completed or cancelled sweep; `aborted` tells which
    /// - `Err(Error::InvalidInput)`: Subnet larger than `max_hosts`
    pub async fn scan(&self, cidr: Ipv4Net, cancel: &CancellationToken) -> Result<ScanReport> {
        let cidr = cidr.trunc();
        let hosts = Self::host_count(&cidr);
        if hosts > self.max_hosts as u64 {
            return Err(Error::invalid_input(format!(
                "{} has {} hosts, more than the limit of {}",
                cidr, hosts, self.max_hosts
            )));
        }

        tracing::info!(
            "Scanning {} ({} hosts) on port {} with {} workers",
            cidr,
            hosts,
            self.port,
            self.concurrency
        );

        let started = Instant::now();
        let port = self.port;
        let probe_timeout = self.probe_timeout;
        let prober = Arc::clone(&self.prober);

        let mut probes = std::pin::pin!(
            stream::iter(cidr.hosts())
                .map(move |ip| {
                    let prober = Arc::clone(&prober);
                    async move {
                        let target = SocketAddrV4::new(ip, port);
                        let outcome = timeout(probe_timeout, prober.probe(target))
                            .await
                            .unwrap_or(ProbeOutcome::TimedOut);
                        (ip, outcome)
                    }
                })
                .buffer_unordered(self.concurrency)
        );

        let mut responsive = Vec::new();
        let mut probed = 0;
        let mut aborted = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    aborted = true;
                    break;
                }

                next = probes.next() => match next {
                    Some((ip, outcome)) => {
                        probed += 1;
                        if outcome == ProbeOutcome::Open {
                            tracing::debug!("{}:{} is open", ip, port);
                            responsive.push(ip);
                        }
                    }
                    None => break,
                },
            }
        }

        let report = ScanReport {
            cidr,
            probed,
            responsive,
            aborted,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Scan of {} {}: {} probed, {} responsive in {:?}",
            report.cidr,
            if report.aborted { "aborted" } else { "finished" },
            report.probed,
            report.responsive.len(),
            report.elapsed
        );

        Ok(report)
    }

    /// Probe a single address with the scanner's timeout
    ///
    /// IPv6 addresses are reported as closed.
    pub async fn probe_address(&self, address: SocketAddr) -> ProbeOutcome {
        match address {
            SocketAddr::V4(target) => timeout(self.probe_timeout, self.prober.probe(target))
                .await
                .unwrap_or(ProbeOutcome::TimedOut),
            SocketAddr::V6(_) => ProbeOutcome::Closed,
        }
    }
}
