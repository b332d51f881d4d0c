//! Bluetooth device acquisition and connection manager.
//!
//! Given an address or a name pattern, [`ConnectionManager`] finds the
//! device among the adapter's cached devices or through live discovery,
//! then keeps trying to connect to it in the background until it
//! succeeds.

pub mod bluetooth;
pub mod config;
pub mod error;

pub use bluetooth::{
   bluez::{BluezDevice, BluezRegistry},
   manager::{ConnectionManager, ConnectionState},
   matcher::DeviceMatcher,
   registry::{DeviceHandle, DeviceRegistry, DiscoveryEvent, DiscoveryGuard, DiscoverySession},
};
pub use config::{Config, SearchConfig};
pub use error::{LinkError, Result};
