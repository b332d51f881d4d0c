//! Bluetooth connection daemon
//!
//! Finds the device named in the configuration file, either among the
//! adapter's known devices or through discovery, and keeps trying to
//! connect to it until it succeeds.

use btlink::{BluezRegistry, Config, ConnectionManager, Result};
use log::info;
use tokio::{select, signal};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting btlink...");

   // Load configuration
   let mut config = Config::load()?;
   config.apply_env_overrides();
   let search = config.search_config();

   let registry = BluezRegistry::open(config.adapter.as_deref()).await?;
   let manager = ConnectionManager::new(registry);
   manager.power_on().await?;

   manager.search_and_connect(search).await?;

   select! {
      addr = manager.wait_for_connect() => {
         info!("Connected to {}", addr?);
      }
      res = signal::ctrl_c() => {
         res?;
         info!("Shutting down btlink...");
         manager.cancel();
      }
   }

   Ok(())
}
