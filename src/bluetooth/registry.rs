//! Device registry abstraction.
//!
//! The manager only sees devices through these traits: a registry that
//! enumerates cached devices and runs discovery sessions, and handles to
//! individual devices that can be connected.

use std::{fmt, future::Future};

use bluer::Address;
use tokio::sync::mpsc;

use crate::error::Result;

/// A change reported by a running discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
   /// A device appeared or its properties changed.
   Present(Address),
   /// A device went away.
   Removed(Address),
}

/// A single physical device.
pub trait DeviceHandle: Send + Sync + 'static {
   fn address(&self) -> Address;

   /// Display name, `None` when the device has not reported one.
   fn name(&self) -> impl Future<Output = Option<String>> + Send;

   /// Attempts one connection, resolving once it succeeded or failed.
   fn connect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Source of devices: the adapter cache and live discovery.
pub trait DeviceRegistry: Send + Sync + 'static {
   type Device: DeviceHandle;

   /// Name of the underlying adapter.
   fn name(&self) -> &str;

   fn set_powered(&self, powered: bool) -> impl Future<Output = Result<()>> + Send;

   /// Snapshot of all devices currently known to the adapter.
   fn cached_devices(&self) -> impl Future<Output = Result<Vec<Self::Device>>> + Send;

   /// Starts a discovery session. Discovery runs until the returned
   /// session is dropped or cancelled.
   fn start_discovery(&self) -> impl Future<Output = Result<DiscoverySession>> + Send;

   /// Materializes a handle for a device reported by discovery.
   fn device(&self, address: Address) -> Result<Self::Device>;
}

/// Runs its cancel action exactly once, on [`DiscoveryGuard::cancel`] or
/// on drop, whichever comes first.
pub struct DiscoveryGuard {
   cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl DiscoveryGuard {
   pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
      Self {
         cancel: Some(Box::new(cancel)),
      }
   }

   pub fn cancel(mut self) {
      self.fire();
   }

   fn fire(&mut self) {
      if let Some(cancel) = self.cancel.take() {
         cancel();
      }
   }
}

impl Drop for DiscoveryGuard {
   fn drop(&mut self) {
      self.fire();
   }
}

impl fmt::Debug for DiscoveryGuard {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("DiscoveryGuard")
         .field("active", &self.cancel.is_some())
         .finish()
   }
}

/// An active discovery session: the event stream plus the guard that
/// stops discovery once the session goes away.
#[derive(Debug)]
pub struct DiscoverySession {
   events: mpsc::Receiver<DiscoveryEvent>,
   guard: DiscoveryGuard,
}

impl DiscoverySession {
   pub const fn new(events: mpsc::Receiver<DiscoveryEvent>, guard: DiscoveryGuard) -> Self {
      Self { events, guard }
   }

   /// Next event in arrival order, `None` once the registry closed the
   /// stream.
   pub async fn next_event(&mut self) -> Option<DiscoveryEvent> {
      self.events.recv().await
   }

   /// Stops discovery now instead of on drop.
   pub fn cancel(self) {
      self.guard.cancel();
   }
}
