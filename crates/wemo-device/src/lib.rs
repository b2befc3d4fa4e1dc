// # wemo-device
//
// Belkin Wemo support for wemo-core.
//
// ## Components
//
// - **UpnpProtocol**: Describes plugs from `setup.xml` and hands out handles
// - **UpnpHandle**: SOAP calls against the basic event service
// - **SsdpDiscovery**: Multicast M-SEARCH quick discovery
//
// ## Usage
//
// ```rust,no_run
// use std::sync::Arc;
// use std::time::Duration;
// use wemo_core::DeviceRegistry;
// use wemo_device::{SsdpDiscovery, UpnpProtocol};
//
// let protocol = UpnpProtocol::new(Duration::from_secs(5));
// let registry = Arc::new(DeviceRegistry::new(Arc::new(protocol.clone())));
// let quick = SsdpDiscovery::new(protocol, Duration::from_secs(3));
// ```

mod description;
mod protocol;
mod ssdp;
mod xml;

pub use description::{BASIC_EVENT_SERVICE, DEFAULT_CONTROL_PATH, DeviceDescription, attr};
pub use protocol::{DEFAULT_REQUEST_TIMEOUT, UpnpHandle, UpnpProtocol};
pub use ssdp::{SSDP_MULTICAST, SsdpDiscovery};
