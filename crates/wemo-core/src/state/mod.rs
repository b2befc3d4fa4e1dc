// # Store Implementations
//
// This module provides implementations of the ScheduleStore and
// SettingsStore traits for different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileScheduleStore, FileSettingsStore};
pub use memory::{MemoryScheduleStore, MemorySettingsStore};
