//! Error types for the connection manager.
//!
//! This module defines all error types that can occur while locating a
//! device and connecting to it, including Bluetooth, configuration and
//! search errors.

use bluer::Address;
use thiserror::Error;

/// Main error type for the connection manager.
#[derive(Error, Debug)]
pub enum LinkError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Invalid device address: {0:?}")]
   InvalidAddress(String),

   #[error("Invalid name pattern: {0}")]
   InvalidPattern(#[from] regex::Error),

   #[error("Either a target address or a name pattern must be specified")]
   MissingCriterion,

   #[error("Failed to start discovery: {0}")]
   DiscoveryStartFailed(Box<LinkError>),

   #[error("Device not found")]
   DeviceNotFound,

   #[error("Failed to create device handle for {0}: {1}")]
   HandleCreationFailed(Address, Box<LinkError>),

   #[error("Connection attempt failed: {0}")]
   ConnectFailed(String),

   #[error("A search is already in progress")]
   AlreadySearching,

   #[error("Search cancelled")]
   Cancelled,

   #[error("Manager has been shut down")]
   ManagerShutdown,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `LinkError`.
pub type Result<T> = std::result::Result<T, LinkError>;
