//! In-memory registry used by the manager tests.

use std::{
   collections::HashMap,
   io,
   sync::{
      Arc, Mutex,
      atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
   },
};

use bluer::Address;
use tokio::sync::mpsc;

use crate::{
   bluetooth::registry::{
      DeviceHandle, DeviceRegistry, DiscoveryEvent, DiscoveryGuard, DiscoverySession,
   },
   error::{LinkError, Result},
};

pub const fn addr(id: u8) -> Address {
   Address([0x00, 0x1A, 0x7D, 0x00, 0x00, id])
}

#[derive(Debug, Clone)]
pub struct FakeDevice {
   address: Address,
   name: Option<String>,
   remaining_failures: Arc<AtomicU32>,
   pub connect_attempts: Arc<AtomicU32>,
   pub name_reads: Arc<AtomicUsize>,
}

impl FakeDevice {
   pub fn new(id: u8, name: &str) -> Self {
      Self {
         address: addr(id),
         name: Some(name.to_string()),
         remaining_failures: Arc::default(),
         connect_attempts: Arc::default(),
         name_reads: Arc::default(),
      }
   }

   pub fn unnamed(id: u8) -> Self {
      Self {
         name: None,
         ..Self::new(id, "")
      }
   }

   /// Makes the next `count` connection attempts fail.
   pub fn failing(self, count: u32) -> Self {
      self.remaining_failures.store(count, Ordering::SeqCst);
      self
   }

   pub fn attempts(&self) -> u32 {
      self.connect_attempts.load(Ordering::SeqCst)
   }

   pub fn reads(&self) -> usize {
      self.name_reads.load(Ordering::SeqCst)
   }
}

impl DeviceHandle for FakeDevice {
   fn address(&self) -> Address {
      self.address
   }

   async fn name(&self) -> Option<String> {
      self.name_reads.fetch_add(1, Ordering::SeqCst);
      self.name.clone()
   }

   async fn connect(&self) -> Result<()> {
      self.connect_attempts.fetch_add(1, Ordering::SeqCst);
      let failed = self
         .remaining_failures
         .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
         .is_ok();
      if failed {
         Err(LinkError::ConnectFailed("device unreachable".into()))
      } else {
         Ok(())
      }
   }
}

#[derive(Debug, Default)]
pub struct FakeRegistry {
   cached: Vec<FakeDevice>,
   known: HashMap<Address, FakeDevice>,
   discovery: Mutex<Option<mpsc::Receiver<DiscoveryEvent>>>,
   cache_fails: bool,
   discovery_fails: bool,
   pub powered: AtomicBool,
   pub cache_scans: AtomicUsize,
   pub discovery_starts: AtomicUsize,
   pub discovery_cancels: Arc<AtomicUsize>,
}

impl FakeRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_cached(mut self, devices: impl IntoIterator<Item = FakeDevice>) -> Self {
      for device in devices {
         self.known.insert(device.address(), device.clone());
         self.cached.push(device);
      }
      self
   }

   /// Devices that discovery can resolve but that are not cached.
   pub fn with_discoverable(mut self, devices: impl IntoIterator<Item = FakeDevice>) -> Self {
      for device in devices {
         self.known.insert(device.address(), device);
      }
      self
   }

   /// Returns the sender feeding the next discovery session.
   pub fn with_discovery(self) -> (Self, mpsc::Sender<DiscoveryEvent>) {
      let (tx, rx) = mpsc::channel(16);
      *self.discovery.lock().unwrap() = Some(rx);
      (self, tx)
   }

   pub fn failing_cache(mut self) -> Self {
      self.cache_fails = true;
      self
   }

   pub fn failing_discovery(mut self) -> Self {
      self.discovery_fails = true;
      self
   }

   pub fn cancels(&self) -> usize {
      self.discovery_cancels.load(Ordering::SeqCst)
   }
}

impl DeviceRegistry for FakeRegistry {
   type Device = FakeDevice;

   fn name(&self) -> &str {
      "fake0"
   }

   async fn set_powered(&self, powered: bool) -> Result<()> {
      self.powered.store(powered, Ordering::SeqCst);
      Ok(())
   }

   async fn cached_devices(&self) -> Result<Vec<FakeDevice>> {
      self.cache_scans.fetch_add(1, Ordering::SeqCst);
      if self.cache_fails {
         return Err(io::Error::other("cache unavailable").into());
      }
      Ok(self.cached.clone())
   }

   async fn start_discovery(&self) -> Result<DiscoverySession> {
      self.discovery_starts.fetch_add(1, Ordering::SeqCst);
      if self.discovery_fails {
         return Err(io::Error::other("adapter busy").into());
      }

      // Without a prepared stream, discovery ends immediately.
      let events = self
         .discovery
         .lock()
         .unwrap()
         .take()
         .unwrap_or_else(|| mpsc::channel(1).1);

      let cancels = self.discovery_cancels.clone();
      let guard = DiscoveryGuard::new(move || {
         cancels.fetch_add(1, Ordering::SeqCst);
      });
      Ok(DiscoverySession::new(events, guard))
   }

   fn device(&self, address: Address) -> Result<FakeDevice> {
      self.known.get(&address).cloned().ok_or(LinkError::DeviceNotFound)
   }
}
