// # wemo-core
//
// Core library for discovering WiFi smart plugs and switching them on a
// schedule.
//
// ## Architecture Overview
//
// - **SubnetResolver**: Trait for detecting the local IPv4 range to scan
// - **PortScanner**: Bounded-concurrency TCP sweep of a subnet
// - **DeviceIdentifier**: Turns a responsive address into a device descriptor
// - **DeviceRegistry**: Name-keyed map of every device seen so far
// - **Discovery**: Runs quick discovery and the deep scan as one pass
// - **SolarProvider**: Once-per-day sunrise/sunset cache in local time
// - **SchedulerEngine**: Fixed-tick loop that fires jobs at most once per day
// - **ScheduleStore / SettingsStore**: Persistence contracts for jobs and coordinates
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Protocols, subnet detection and HTTP lookups
//    live in their own crates behind the traits defined here
// 2. **Failure Isolation**: A broken job, device or lookup never stops the tick
// 3. **Library-First**: The daemon and the one-shot CLI share this crate

pub mod clock;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod solar;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AgentConfig;
pub use discovery::{Discovery, DiscoveryReport};
pub use engine::{EngineEvent, SchedulerEngine, TickReport};
pub use error::{Error, Result};
pub use registry::{Device, DeviceRegistry, DiscoverySource};
pub use schedule::{Action, Job, SolarAnchor, SolarSnapshot, Trigger};
pub use solar::SolarProvider;
pub use state::{FileScheduleStore, FileSettingsStore, MemoryScheduleStore, MemorySettingsStore};
pub use traits::{
    DeviceDirectory, DeviceHandle, DeviceProtocol, QuickDiscovery, ScheduleStore, SettingsStore,
    SolarTimes, SubnetResolver,
};
