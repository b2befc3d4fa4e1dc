// # Device Registry
//
// Single owner of everything discovery has learned, keyed by device name.
//
// ## Locking
//
// The map sits behind a tokio `RwLock`. Every critical section is a plain
// map operation; network I/O (describing, probing, switching) always happens
// outside the lock, so a stuck device never stalls a scan or a lookup.
//
// ## Merge Rule
//
// Quick discovery and the deep scan can report the same device. On a name
// collision the newest observation's address, capabilities and attributes
// win; `first_seen` is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::{DeviceDescriptor, DeviceHandle, DeviceProtocol};

/// How a device was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// Broadcast discovery
    Quick,
    /// Unicast subnet sweep
    Deep,
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub descriptor: DeviceDescriptor,
    /// Source of the most recent observation
    pub source: DiscoverySource,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Result of the most recent liveness check
    pub reachable: bool,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn address(&self) -> SocketAddr {
        self.descriptor.address
    }
}

/// Outcome of one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Names seen for the first time
    pub added: usize,
    /// Names already known (address may have changed)
    pub updated: usize,
}

/// Name-keyed device map shared by discovery and the scheduler
///
/// Cloning is cheap; clones share the same map.
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, Device>>>,
    protocol: Arc<dyn DeviceProtocol>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("protocol", &self.protocol.protocol_name())
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// Create an empty registry
    ///
    /// # Parameters
    ///
    /// - `protocol`: Builds handles for resolved devices
    pub fn new(protocol: Arc<dyn DeviceProtocol>) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            protocol,
        }
    }

    pub fn protocol(&self) -> &Arc<dyn DeviceProtocol> {
        &self.protocol
    }

    /// Upsert a batch of observations
    pub async fn merge(
        &self,
        source: DiscoverySource,
        descriptors: Vec<DeviceDescriptor>,
    ) -> MergeSummary {
        let now = Utc::now();
        let mut summary = MergeSummary::default();
        let mut devices = self.devices.write().await;

        for descriptor in descriptors {
            match devices.get_mut(&descriptor.name) {
                Some(existing) => {
                    if existing.descriptor.address != descriptor.address {
                        tracing::info!(
                            "Device {} moved {} -> {}",
                            descriptor.name,
                            existing.descriptor.address,
                            descriptor.address
                        );
                    }
                    existing.descriptor = descriptor;
                    existing.source = source;
                    existing.last_seen = now;
                    existing.reachable = true;
                    summary.updated += 1;
                }
                None => {
                    tracing::info!(
                        "New device {} at {} ({:?})",
                        descriptor.name,
                        descriptor.address,
                        source
                    );
                    devices.insert(
                        descriptor.name.clone(),
                        Device {
                            descriptor,
                            source,
                            first_seen: now,
                            last_seen: now,
                            reachable: true,
                        },
                    );
                    summary.added += 1;
                }
            }
        }

        summary
    }

    /// Point-in-time copy of every device, sorted by name
    pub async fn snapshot(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        devices
    }

    pub async fn get(&self, name: &str) -> Option<Device> {
        self.devices.read().await.get(name).cloned()
    }

    /// Build a transient control handle for a device
    ///
    /// The lock is released before the handle is built.
    pub async fn resolve(&self, name: &str) -> Option<Arc<dyn DeviceHandle>> {
        let descriptor = self.get(name).await?.descriptor;
        match self.protocol.connect(&descriptor) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Cannot build handle for {}: {}", name, e);
                None
            }
        }
    }

    /// Record a liveness result
    ///
    /// A positive result also refreshes `last_seen`. Unknown names are ignored.
    pub async fn set_reachable(&self, name: &str, reachable: bool) {
        let mut devices = self.devices.write().await;
        if let Some(device) = devices.get_mut(name) {
            if device.reachable != reachable {
                tracing::info!(
                    "Device {} is now {}",
                    name,
                    if reachable { "reachable" } else { "unreachable" }
                );
            }
            device.reachable = reachable;
            if reachable {
                device.last_seen = Utc::now();
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SetupInfo;
    use crate::{Error, Result};
    use async_trait::async_trait;

    struct NamedHandle(String);

    #[async_trait]
    impl DeviceHandle for NamedHandle {
        fn name(&self) -> &str {
            &self.0
        }
        async fn on(&self) -> Result<()> {
            Ok(())
        }
        async fn off(&self) -> Result<()> {
            Ok(())
        }
        async fn get_state(&self) -> Result<bool> {
            Ok(false)
        }
        async fn get_setup_info(&self) -> Result<SetupInfo> {
            Ok(SetupInfo::default())
        }
    }

    struct StubProtocol;

    #[async_trait]
    impl DeviceProtocol for StubProtocol {
        fn protocol_name(&self) -> &'static str {
            "stub"
        }
        async fn describe(&self, address: SocketAddr) -> Result<DeviceDescriptor> {
            Err(Error::identify_failed(address, "stub"))
        }
        fn connect(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn DeviceHandle>> {
            Ok(Arc::new(NamedHandle(descriptor.name.clone())))
        }
    }

    fn descriptor(name: &str, addr: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(name, addr.parse().unwrap())
    }

    #[tokio::test]
    async fn merge_keeps_union_and_latest_address() {
        let registry = DeviceRegistry::new(Arc::new(StubProtocol));

        let first = registry
            .merge(
                DiscoverySource::Quick,
                vec![
                    descriptor("A", "10.0.0.2:49153"),
                    descriptor("B", "10.0.0.3:49153"),
                ],
            )
            .await;
        let second = registry
            .merge(
                DiscoverySource::Deep,
                vec![
                    descriptor("B", "10.0.0.9:49153"),
                    descriptor("C", "10.0.0.4:49153"),
                ],
            )
            .await;

        assert_eq!(first, MergeSummary { added: 2, updated: 0 });
        assert_eq!(second, MergeSummary { added: 1, updated: 1 });

        let snapshot = registry.snapshot().await;
        let names: Vec<&str> = snapshot.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let b = registry.get("B").await.unwrap();
        assert_eq!(b.address(), "10.0.0.9:49153".parse().unwrap());
        assert_eq!(b.source, DiscoverySource::Deep);
        assert!(b.first_seen <= b.last_seen);
    }

    #[tokio::test]
    async fn resolve_builds_handle_for_known_names_only() {
        let registry = DeviceRegistry::new(Arc::new(StubProtocol));
        registry
            .merge(DiscoverySource::Deep, vec![descriptor("Lamp", "10.0.0.2:49153")])
            .await;

        assert_eq!(registry.resolve("Lamp").await.unwrap().name(), "Lamp");
        assert!(registry.resolve("Heater").await.is_none());
    }

    #[tokio::test]
    async fn reachability_updates() {
        let registry = DeviceRegistry::new(Arc::new(StubProtocol));
        registry
            .merge(DiscoverySource::Deep, vec![descriptor("Lamp", "10.0.0.2:49153")])
            .await;

        registry.set_reachable("Lamp", false).await;
        assert!(!registry.get("Lamp").await.unwrap().reachable);

        // Rediscovery marks it reachable again
        registry
            .merge(DiscoverySource::Quick, vec![descriptor("Lamp", "10.0.0.2:49153")])
            .await;
        assert!(registry.get("Lamp").await.unwrap().reachable);

        registry.set_reachable("Nobody", true).await;
        assert_eq!(registry.len().await, 1);
    }
}
