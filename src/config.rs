//! Configuration management for the connection manager.
//!
//! This module handles loading and saving the daemon configuration from
//! disk, and defines the per-search [`SearchConfig`].

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Default wait between two failed connection attempts.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(2);

/// Criterion and retry policy for a single search.
///
/// Exactly one criterion is needed. When both are present the address
/// wins and the name pattern is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
   pub target_address: Option<String>,
   pub target_name_pattern: Option<String>,
   pub retry_cooldown: Duration,
}

impl Default for SearchConfig {
   fn default() -> Self {
      Self {
         target_address: None,
         target_name_pattern: None,
         retry_cooldown: DEFAULT_RETRY_COOLDOWN,
      }
   }
}

impl SearchConfig {
   /// Searches for the device with the given address.
   pub fn by_address(address: impl Into<String>) -> Self {
      Self {
         target_address: Some(address.into()),
         ..Self::default()
      }
   }

   /// Searches for the first device whose name matches `pattern`.
   pub fn by_name_pattern(pattern: impl Into<String>) -> Self {
      Self {
         target_name_pattern: Some(pattern.into()),
         ..Self::default()
      }
   }

   #[must_use]
   pub const fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
      self.retry_cooldown = cooldown;
      self
   }
}

/// Main configuration structure for the daemon.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
   /// Adapter to use, e.g. `hci0`. The system default when unset.
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub adapter: Option<String>,

   #[serde(default)]
   pub target: TargetConfig,
}

/// The device the daemon should connect to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TargetConfig {
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub address: Option<String>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub name_pattern: Option<String>,

   #[serde(default = "default_retry_cooldown_ms")]
   pub retry_cooldown_ms: u64,
}

const fn default_retry_cooldown_ms() -> u64 {
   DEFAULT_RETRY_COOLDOWN.as_millis() as u64
}

impl Default for TargetConfig {
   fn default() -> Self {
      Self {
         address: None,
         name_pattern: None,
         retry_cooldown_ms: default_retry_cooldown_ms(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the default there when
   /// the file does not exist yet.
   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   /// Saves the current configuration to `path`.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BTLINK_HOME") {
         PathBuf::from(home)
      } else if let Some(config_home) = dirs::config_dir() {
         config_home.join("btlink")
      } else {
         return Err(LinkError::ConfigDirNotFound);
      };

      Ok(config_dir.join("config.toml"))
   }

   /// Overrides file settings with `BTLINK_ADAPTER`, `BTLINK_ADDRESS` and
   /// `BTLINK_NAME_PATTERN` when set.
   pub fn apply_env_overrides(&mut self) {
      self.apply_overrides(|key| env::var(key).ok());
   }

   fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
      if let Some(adapter) = lookup("BTLINK_ADAPTER") {
         self.adapter = Some(adapter);
      }
      if let Some(address) = lookup("BTLINK_ADDRESS") {
         self.target.address = Some(address);
      }
      if let Some(pattern) = lookup("BTLINK_NAME_PATTERN") {
         self.target.name_pattern = Some(pattern);
      }
   }

   /// Builds the search this configuration describes.
   pub fn search_config(&self) -> SearchConfig {
      SearchConfig {
         target_address: self.target.address.clone(),
         target_name_pattern: self.target.name_pattern.clone(),
         retry_cooldown: Duration::from_millis(self.target.retry_cooldown_ms),
      }
   }
}
