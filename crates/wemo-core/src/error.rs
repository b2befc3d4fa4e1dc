//! Error types for smart-plug discovery and scheduling
//!
//! This module defines all error types used throughout the crate.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for wemo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for discovery and scheduling
#[derive(Error, Debug)]
pub enum Error {
    /// No usable IPv4 interface was found to derive a subnet from
    #[error("No route detected: {0}")]
    NoRouteDetected(String),

    /// A responsive host could not be identified as a supported device
    #[error("Identification failed for {address}: {message}")]
    IdentifyFailed {
        /// Address that was probed
        address: SocketAddr,
        /// Why the last description endpoint failed
        message: String,
    },

    /// Sunrise/sunset times could not be obtained
    #[error("Solar times unavailable: {0}")]
    SolarUnavailable(String),

    /// A device rejected or failed an action
    #[error("Device action failed ({device}): {message}")]
    DeviceAction {
        /// Device name
        device: String,
        /// Error message
        message: String,
    },

    /// Device not known to the registry
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Schedule or settings persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (geolocation, solar lookups, device control)
    #[error("HTTP error: {0}")]
    Http(String),

    /// An operation exceeded its time bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "no route detected" error
    pub fn no_route(msg: impl Into<String>) -> Self {
        Self::NoRouteDetected(msg.into())
    }

    /// Create an identification error
    pub fn identify_failed(address: SocketAddr, message: impl Into<String>) -> Self {
        Self::IdentifyFailed {
            address,
            message: message.into(),
        }
    }

    /// Create a solar-unavailable error
    pub fn solar_unavailable(msg: impl Into<String>) -> Self {
        Self::SolarUnavailable(msg.into())
    }

    /// Create a device action error
    pub fn device_action(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceAction {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a "device not found" error
    pub fn device_not_found(name: impl Into<String>) -> Self {
        Self::DeviceNotFound(name.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
