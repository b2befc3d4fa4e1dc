// # Device Protocol Traits
//
// Defines how the core talks to smart plugs without knowing their wire
// protocol.
//
// ## Implementations
//
// - UPnP/SOAP (Wemo): `wemo-device` crate
//
// ## Usage
//
// ```rust,ignore
// use wemo_core::traits::DeviceProtocol;
//
// let descriptor = protocol.describe("192.168.1.40:49153".parse()?).await?;
// let plug = protocol.connect(&descriptor)?;
// plug.on().await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::Result;

/// Operations a device advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can be switched on and off
    PowerToggle,
    /// Reports its current power state
    StateQuery,
    /// Exposes pairing/setup information (e.g. a HomeKit setup code)
    SetupInfo,
}

/// Everything discovery learned about one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Human-assigned device name; the registry key
    pub name: String,
    /// Control endpoint (IP and port)
    pub address: SocketAddr,
    /// Supported operations
    pub capabilities: BTreeSet<Capability>,
    /// Protocol-specific details (udn, model, mac, firmware, control path)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
            capabilities: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style capability setter
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Pairing information read from a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupInfo {
    /// HomeKit setup code, when the device has one
    pub setup_code: Option<String>,
    /// Every other field the device returned
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// A live handle to one device
///
/// Handles are transient: the registry builds one per lookup, and callers
/// drop it when the action completes. Implementations must not hold any
/// registry lock.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Device name
    fn name(&self) -> &str;

    /// Switch the device on
    async fn on(&self) -> Result<()>;

    /// Switch the device off
    async fn off(&self) -> Result<()>;

    /// Current power state (`true` = on)
    async fn get_state(&self) -> Result<bool>;

    /// Flip the power state
    ///
    /// # Returns
    ///
    /// The new state (`true` = on)
    async fn toggle(&self) -> Result<bool> {
        if self.get_state().await? {
            self.off().await?;
            Ok(false)
        } else {
            self.on().await?;
            Ok(true)
        }
    }

    /// Read pairing/setup information
    async fn get_setup_info(&self) -> Result<SetupInfo>;
}

/// Trait for device protocol implementations
///
/// A protocol knows how to turn a network address into a descriptor and how
/// to build a handle from a descriptor. It does not track devices; that is
/// the registry's job.
#[async_trait]
pub trait DeviceProtocol: Send + Sync {
    /// Short protocol name for logs
    fn protocol_name(&self) -> &'static str;

    /// Fetch and parse the device description served at `address`
    ///
    /// # Returns
    ///
    /// - `Ok(DeviceDescriptor)`: The address serves a supported device
    /// - `Err(Error)`: Unreachable, timed out, or not a supported device
    async fn describe(&self, address: SocketAddr) -> Result<DeviceDescriptor>;

    /// Build a control handle for a described device
    fn connect(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn DeviceHandle>>;
}

/// Fast broadcast-based discovery (e.g. SSDP)
///
/// Quick discovery only sees the local broadcast domain and may miss
/// devices; the deep scan covers the gap.
#[async_trait]
pub trait QuickDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// Name-based device lookup used by the scheduler
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Resolve a device name to a live handle
    async fn resolve(&self, name: &str) -> Option<Arc<dyn DeviceHandle>>;

    /// Run one discovery pass to refresh the directory
    async fn rediscover(&self) -> Result<()>;
}
