//! Bluetooth device acquisition.
//!
//! This module provides device matching, the registry abstraction over
//! the adapter with its BlueZ implementation, and the connection manager
//! that ties them together.

pub mod address;
pub mod bluez;
pub mod manager;
pub mod matcher;
pub mod registry;
pub mod retry;

#[cfg(test)]
mod testing;
