//! Device identification
//!
//! A responsive control port only says "something listens here". The
//! identifier asks the device protocol for a description on each candidate
//! port in priority order and keeps the first one that parses.

use futures::stream::{self, StreamExt};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::ScanConfig;
use crate::traits::{DeviceDescriptor, DeviceProtocol};
use crate::{Error, Result};

pub struct DeviceIdentifier {
    protocol: Arc<dyn DeviceProtocol>,
    ports: Vec<u16>,
    timeout: Duration,
    concurrency: usize,
}

impl DeviceIdentifier {
    /// Create an identifier
    ///
    /// # Parameters
    ///
    /// - `protocol`: Fetches and parses descriptions
    /// - `ports`: Description ports, highest priority first
    /// - `timeout`: Bound for each description attempt
    pub fn new(protocol: Arc<dyn DeviceProtocol>, ports: Vec<u16>, timeout: Duration) -> Self {
        Self {
            protocol,
            ports,
            timeout,
            concurrency: 16,
        }
    }

    pub fn from_config(protocol: Arc<dyn DeviceProtocol>, config: &ScanConfig) -> Self {
        Self::new(
            protocol,
            config.description_ports.clone(),
            config.identify_timeout(),
        )
        .with_concurrency(config.identify_concurrency)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Identify one host
    ///
    /// Stops at the first port that yields a valid descriptor; later ports
    /// are not tried.
    pub async fn identify(&self, ip: Ipv4Addr) -> Result<DeviceDescriptor> {
        let mut last_error = String::from("no description ports configured");

        for port in &self.ports {
            let address = SocketAddr::from((ip, *port));
            match timeout(self.timeout, self.protocol.describe(address)).await {
                Ok(Ok(descriptor)) => {
                    tracing::debug!("Identified {} as {}", address, descriptor.name);
                    return Ok(descriptor);
                }
                Ok(Err(e)) => {
                    tracing::trace!("No description at {}: {}", address, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::trace!("Description at {} timed out", address);
                    last_error = format!("timed out after {:?}", self.timeout);
                }
            }
        }

        let first_port = self.ports.first().copied().unwrap_or(0);
        Err(Error::identify_failed(
            SocketAddr::from((ip, first_port)),
            last_error,
        ))
    }

    /// Identify many hosts concurrently, dropping the ones that fail
    pub async fn identify_all(&self, hosts: Vec<Ipv4Addr>) -> Vec<DeviceDescriptor> {
        stream::iter(hosts)
            .map(|ip| self.identify(ip))
            .buffer_unordered(self.concurrency)
            .filter_map(|result| async move {
                match result {
                    Ok(descriptor) => Some(descriptor),
                    Err(e) => {
                        tracing::debug!("Dropping host: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DeviceHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers only on the listed ports and records every attempt
    struct PortMapProtocol {
        answers_on: Vec<u16>,
        hang_on: Vec<u16>,
        attempts: Mutex<Vec<SocketAddr>>,
    }

    #[async_trait]
    impl DeviceProtocol for PortMapProtocol {
        fn protocol_name(&self) -> &'static str {
            "port-map"
        }

        async fn describe(&self, address: SocketAddr) -> Result<DeviceDescriptor> {
            self.attempts.lock().unwrap().push(address);
            if self.hang_on.contains(&address.port()) {
                std::future::pending::<()>().await;
            }
            if self.answers_on.contains(&address.port()) {
                Ok(DeviceDescriptor::new(format!("plug-{}", address.port()), address))
            } else {
                Err(Error::http("connection refused"))
            }
        }

        fn connect(&self, _descriptor: &DeviceDescriptor) -> Result<Arc<dyn DeviceHandle>> {
            Err(Error::Other("not used".to_string()))
        }
    }

    fn identifier(answers_on: Vec<u16>, hang_on: Vec<u16>) -> (DeviceIdentifier, Arc<PortMapProtocol>) {
        let protocol = Arc::new(PortMapProtocol {
            answers_on,
            hang_on,
            attempts: Mutex::new(Vec::new()),
        });
        let identifier = DeviceIdentifier::new(
            protocol.clone(),
            vec![49153, 49152, 49154],
            Duration::from_millis(200),
        );
        (identifier, protocol)
    }

    #[tokio::test]
    async fn falls_back_to_next_port() {
        let (identifier, protocol) = identifier(vec![49152, 49154], vec![]);
        let descriptor = identifier.identify(Ipv4Addr::new(10, 0, 0, 5)).await.unwrap();

        assert_eq!(descriptor.name, "plug-49152");
        let ports: Vec<u16> = protocol.attempts.lock().unwrap().iter().map(|a| a.port()).collect();
        assert_eq!(ports, vec![49153, 49152]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_port_times_out_then_falls_back() {
        let (identifier, _protocol) = identifier(vec![49152], vec![49153]);
        let descriptor = identifier.identify(Ipv4Addr::new(10, 0, 0, 5)).await.unwrap();

        assert_eq!(descriptor.name, "plug-49152");
    }

    #[tokio::test]
    async fn all_ports_failing_is_identify_failed() {
        let (identifier, _protocol) = identifier(vec![], vec![]);
        let result = identifier.identify(Ipv4Addr::new(10, 0, 0, 5)).await;

        assert!(matches!(result, Err(Error::IdentifyFailed { .. })));
    }

    #[tokio::test]
    async fn identify_all_drops_failures() {
        let hosts = vec![Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 6)];

        let (answering, _protocol) = identifier(vec![49153], vec![]);
        assert_eq!(answering.identify_all(hosts.clone()).await.len(), 2);

        let (silent, _protocol) = identifier(vec![], vec![]);
        assert!(silent.identify_all(hosts).await.is_empty());
    }
}
