//! Bluetooth connection manager.
//!
//! This module locates the requested device, first among the devices the
//! adapter already knows and then through live discovery, and keeps
//! trying to connect to it until an attempt succeeds.

use std::{fmt, sync::Arc, time::Duration};

use bluer::Address;
use log::{debug, error, info, warn};
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;

use crate::{
   bluetooth::{
      matcher::DeviceMatcher,
      registry::{DeviceHandle, DeviceRegistry, DiscoveryEvent, DiscoverySession},
      retry,
   },
   config::SearchConfig,
   error::{LinkError, Result},
};

// === State Machine ===

/// Progress of the manager's single search.
///
/// `Connected`, `NotFound` and `Cancelled` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
   Idle,
   ScanningCache,
   ScanningDiscovery,
   Connecting(Address),
   Connected(Address),
   NotFound,
   Cancelled,
}

impl ConnectionState {
   pub const fn is_terminal(&self) -> bool {
      matches!(self, Self::Connected(_) | Self::NotFound | Self::Cancelled)
   }

   const fn is_scanning(&self) -> bool {
      matches!(self, Self::ScanningCache | Self::ScanningDiscovery)
   }
}

struct Shared<R> {
   registry: R,
   state: watch::Sender<ConnectionState>,
   cancel: CancellationToken,
}

// === Main Manager ===

/// Finds one device and connects to it.
///
/// Each manager runs at most one search. The handle is cheaply
/// cloneable; clones observe and control the same search.
pub struct ConnectionManager<R> {
   shared: Arc<Shared<R>>,
}

impl<R> Clone for ConnectionManager<R> {
   fn clone(&self) -> Self {
      Self {
         shared: self.shared.clone(),
      }
   }
}

impl<R> fmt::Debug for ConnectionManager<R> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ConnectionManager")
         .field("state", &*self.shared.state.borrow())
         .finish_non_exhaustive()
   }
}

impl<R: DeviceRegistry> ConnectionManager<R> {
   pub fn new(registry: R) -> Self {
      let (state, _) = watch::channel(ConnectionState::Idle);
      Self {
         shared: Arc::new(Shared {
            registry,
            state,
            cancel: CancellationToken::new(),
         }),
      }
   }

   pub fn registry(&self) -> &R {
      &self.shared.registry
   }

   pub fn adapter_name(&self) -> &str {
      self.shared.registry.name()
   }

   /// Powers the adapter on. Safe to call again after a failure.
   pub async fn power_on(&self) -> Result<()> {
      let name = self.adapter_name();
      if let Err(e) = self.shared.registry.set_powered(true).await {
         warn!("Failed to power on adapter {name}: {e}");
         return Err(e);
      }
      info!("Powered on adapter: {name}");
      Ok(())
   }

   pub fn state(&self) -> ConnectionState {
      *self.shared.state.borrow()
   }

   /// Receiver that observes every state change.
   pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
      self.shared.state.subscribe()
   }

   /// Locates the device described by `config` and starts connecting to
   /// it in the background.
   ///
   /// Returns as soon as a connection loop is running or discovery has
   /// been handed to the background, without waiting for the device to
   /// connect. Use [`Self::wait_for_connect`] for that.
   pub async fn search_and_connect(&self, config: SearchConfig) -> Result<()> {
      let matcher = DeviceMatcher::from_config(&config)?;
      let cooldown = config.retry_cooldown;
      self.shared.claim()?;

      info!("Searching device cache for {matcher}");
      match self.shared.scan_cache(&matcher).await {
         Ok(device) => return self.shared.spawn_connect(device, cooldown),
         Err(LinkError::DeviceNotFound) => {},
         Err(e) => {
            self.shared.reset();
            return Err(e);
         },
      }

      info!(
         "Device not in cache, starting discovery on {}",
         self.adapter_name()
      );
      let session = match self.shared.registry.start_discovery().await {
         Ok(session) => session,
         Err(e) => {
            error!("Failed to start discovery: {e}");
            self.shared.reset();
            return Err(LinkError::DiscoveryStartFailed(Box::new(e)));
         },
      };

      if !self
         .shared
         .transition(|s| *s == ConnectionState::ScanningCache, ConnectionState::ScanningDiscovery)
      {
         return Err(LinkError::Cancelled);
      }

      let shared = self.shared.clone();
      tokio::spawn(async move {
         shared.discover_and_connect(session, matcher, cooldown).await;
      });
      Ok(())
   }

   /// Waits until the search reaches a terminal state.
   ///
   /// Any number of callers may wait, concurrently or one after another;
   /// once the search finished every call returns immediately. Before a
   /// search is started this waits indefinitely.
   pub async fn wait_for_connect(&self) -> Result<Address> {
      let mut rx = self.shared.state.subscribe();
      let state = *rx
         .wait_for(ConnectionState::is_terminal)
         .await
         .map_err(|_| LinkError::ManagerShutdown)?;

      match state {
         ConnectionState::Connected(addr) => Ok(addr),
         ConnectionState::NotFound => Err(LinkError::DeviceNotFound),
         _ => Err(LinkError::Cancelled),
      }
   }

   /// Abandons the search, stopping discovery or the connection loop.
   ///
   /// Has no effect once the device is connected.
   pub fn cancel(&self) {
      if self.shared.transition(|s| !s.is_terminal(), ConnectionState::Cancelled) {
         self.shared.cancel.cancel();
      }
   }
}

impl<R: DeviceRegistry> Shared<R> {
   fn transition(&self, from: impl Fn(&ConnectionState) -> bool, to: ConnectionState) -> bool {
      self.state.send_if_modified(|state| {
         if !from(state) {
            return false;
         }
         debug!("Connection state: {state} -> {to}");
         *state = to;
         true
      })
   }

   /// Moves `Idle` to `ScanningCache`, rejecting a second search.
   fn claim(&self) -> Result<()> {
      let mut current = ConnectionState::Idle;
      let claimed = self.state.send_if_modified(|state| {
         current = *state;
         if *state != ConnectionState::Idle {
            return false;
         }
         *state = ConnectionState::ScanningCache;
         true
      });

      match current {
         _ if claimed => Ok(()),
         ConnectionState::Cancelled => Err(LinkError::Cancelled),
         _ => Err(LinkError::AlreadySearching),
      }
   }

   /// Returns a failed search to `Idle` so it can be started again.
   fn reset(&self) {
      self.transition(|s| *s == ConnectionState::ScanningCache, ConnectionState::Idle);
   }

   async fn evaluate(&self, device: &R::Device, matcher: &DeviceMatcher) -> bool {
      let addr = device.address();
      if !matcher.needs_name() {
         let matched = matcher.matches(addr, "");
         if matched {
            info!("Found requested device: (addr={addr})");
         } else {
            debug!("Found non-matching device: (addr={addr})");
         }
         return matched;
      }

      let name = device.name().await.unwrap_or_default();
      if matcher.matches(addr, &name) {
         info!("Found requested device: (addr={addr}, name={name:?})");
         true
      } else {
         debug!("Found non-matching device: (addr={addr}, name={name:?})");
         false
      }
   }

   /// First cached device accepted by `matcher`, in registry order.
   async fn scan_cache(&self, matcher: &DeviceMatcher) -> Result<R::Device> {
      let devices = self.registry.cached_devices().await?;
      debug!("Device cache holds {} device(s)", devices.len());

      for device in devices {
         if self.evaluate(&device, matcher).await {
            return Ok(device);
         }
      }
      Err(LinkError::DeviceNotFound)
   }

   /// First discovered device accepted by `matcher`, in arrival order.
   async fn scan_discovery(
      &self,
      session: &mut DiscoverySession,
      matcher: &DeviceMatcher,
   ) -> Result<R::Device> {
      loop {
         let event = select! {
            biased;
            () = self.cancel.cancelled() => return Err(LinkError::Cancelled),
            event = session.next_event() => event,
         };

         let addr = match event {
            Some(DiscoveryEvent::Present(addr)) => addr,
            Some(DiscoveryEvent::Removed(addr)) => {
               debug!("Ignoring removed device {addr}");
               continue;
            },
            None => return Err(LinkError::DeviceNotFound),
         };

         let device = match self.registry.device(addr) {
            Ok(device) => device,
            Err(e) => {
               let e = LinkError::HandleCreationFailed(addr, Box::new(e));
               warn!("{e}");
               continue;
            },
         };

         if self.evaluate(&device, matcher).await {
            return Ok(device);
         }
      }
   }

   async fn discover_and_connect(
      self: Arc<Self>,
      mut session: DiscoverySession,
      matcher: DeviceMatcher,
      cooldown: Duration,
   ) {
      let found = self.scan_discovery(&mut session, &matcher).await;
      // Discovery must be over before the connection loop starts.
      session.cancel();

      match found {
         Ok(device) => {
            if let Err(e) = self.spawn_connect(device, cooldown) {
               debug!("Not connecting to discovered device: {e}");
            }
         },
         Err(LinkError::DeviceNotFound) => {
            error!("Discovery ended without finding a device with {matcher}");
            self.transition(
               |s| *s == ConnectionState::ScanningDiscovery,
               ConnectionState::NotFound,
            );
         },
         Err(e) => {
            info!("Discovery stopped: {e}");
         },
      }
   }

   /// Hands `device` over to a new connection loop.
   fn spawn_connect(self: &Arc<Self>, device: R::Device, cooldown: Duration) -> Result<()> {
      let addr = device.address();
      if !self.transition(ConnectionState::is_scanning, ConnectionState::Connecting(addr)) {
         return Err(LinkError::Cancelled);
      }

      let shared = self.clone();
      tokio::spawn(async move {
         match retry::connect_until_success(&device, cooldown, &shared.cancel).await {
            Ok(_) => {
               shared.transition(
                  |s| *s == ConnectionState::Connecting(addr),
                  ConnectionState::Connected(addr),
               );
            },
            Err(e) => {
               info!("Stopped connecting to {addr}: {e}");
            },
         }
      });
      Ok(())
   }
}
