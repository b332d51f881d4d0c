//! BlueZ-backed device registry.
//!
//! Talks to bluetoothd through `bluer`. Discovery runs in a forwarding
//! task that owns the BlueZ event stream; dropping the stream is what
//! ends the discovery session on the adapter.

use std::pin::pin;

use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::stream::StreamExt;
use log::{debug, info};
use smol_str::SmolStr;
use tokio::{
   select,
   sync::{mpsc, oneshot},
};

use crate::{
   bluetooth::registry::{
      DeviceHandle, DeviceRegistry, DiscoveryEvent, DiscoveryGuard, DiscoverySession,
   },
   error::{LinkError, Result},
};

/// Discovery event buffer size
const DISCOVERY_BUFFER_SIZE: usize = 64;

/// Registry over a single BlueZ adapter.
pub struct BluezRegistry {
   _session: Session,
   adapter: Adapter,
   name: SmolStr,
}

impl BluezRegistry {
   /// Opens the adapter called `adapter_name`, or the system default.
   pub async fn open(adapter_name: Option<&str>) -> Result<Self> {
      let session = Session::new().await?;
      let adapter = match adapter_name {
         Some(name) => session.adapter(name)?,
         None => session.default_adapter().await?,
      };
      let name = SmolStr::new(adapter.name());
      info!("Using Bluetooth adapter: {name}");

      Ok(Self {
         _session: session,
         adapter,
         name,
      })
   }
}

impl DeviceRegistry for BluezRegistry {
   type Device = BluezDevice;

   fn name(&self) -> &str {
      &self.name
   }

   async fn set_powered(&self, powered: bool) -> Result<()> {
      if self.adapter.is_powered().await? == powered {
         return Ok(());
      }
      self.adapter.set_powered(powered).await?;
      Ok(())
   }

   async fn cached_devices(&self) -> Result<Vec<BluezDevice>> {
      self
         .adapter
         .device_addresses()
         .await?
         .into_iter()
         .map(|addr| self.device(addr))
         .collect()
   }

   async fn start_discovery(&self) -> Result<DiscoverySession> {
      let adapter = self.adapter.clone();
      let name = self.name.clone();
      let (event_tx, event_rx) = mpsc::channel(DISCOVERY_BUFFER_SIZE);
      let (ready_tx, ready_rx) = oneshot::channel();
      let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

      tokio::spawn(async move {
         let events = match adapter.discover_devices().await {
            Ok(events) => {
               let _ = ready_tx.send(Ok(()));
               events
            },
            Err(e) => {
               let _ = ready_tx.send(Err(e));
               return;
            },
         };
         let mut events = pin!(events);
         debug!("Discovery started on {name}");

         loop {
            let event = select! {
               _ = &mut stop_rx => break,
               event = events.next() => event,
            };
            let event = match event {
               Some(AdapterEvent::DeviceAdded(addr)) => DiscoveryEvent::Present(addr),
               Some(AdapterEvent::DeviceRemoved(addr)) => DiscoveryEvent::Removed(addr),
               Some(_) => continue,
               None => break,
            };
            if event_tx.send(event).await.is_err() {
               break;
            }
         }
         debug!("Discovery stopped on {name}");
      });

      ready_rx.await.map_err(|_| LinkError::ManagerShutdown)??;

      let guard = DiscoveryGuard::new(move || {
         let _ = stop_tx.send(());
      });
      Ok(DiscoverySession::new(event_rx, guard))
   }

   fn device(&self, address: Address) -> Result<BluezDevice> {
      Ok(BluezDevice(self.adapter.device(address)?))
   }
}

/// A device known to bluetoothd.
#[derive(Clone)]
pub struct BluezDevice(Device);

impl DeviceHandle for BluezDevice {
   fn address(&self) -> Address {
      self.0.address()
   }

   async fn name(&self) -> Option<String> {
      self.0.name().await.ok().flatten()
   }

   async fn connect(&self) -> Result<()> {
      self.0.connect().await?;
      Ok(())
   }
}
