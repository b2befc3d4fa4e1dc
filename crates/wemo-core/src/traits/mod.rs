//! Core traits for discovery and scheduling
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DeviceProtocol`]: Describe and control devices over their native protocol
//! - [`QuickDiscovery`]: Fast broadcast discovery on the local segment
//! - [`SubnetResolver`]: Detect the IPv4 range the deep scan should cover
//! - [`GeoLocator`] / [`SunTimesSource`]: External lookups behind the solar cache
//! - [`ScheduleStore`] / [`SettingsStore`]: Persistence for jobs and coordinates

pub mod device_protocol;
pub mod schedule_store;
pub mod solar_source;
pub mod subnet_resolver;

pub use device_protocol::{
    Capability, DeviceDescriptor, DeviceDirectory, DeviceHandle, DeviceProtocol, QuickDiscovery,
    SetupInfo,
};
pub use schedule_store::{ScheduleStore, SettingsStore};
pub use solar_source::{GeoCoordinates, GeoLocator, SolarTimes, SunTimesSource, SunTimesUtc};
pub use subnet_resolver::{StaticSubnetResolver, SubnetResolver};
