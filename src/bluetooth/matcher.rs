//! Device matching for searches.
//!
//! A [`DeviceMatcher`] is built once per search and evaluated against
//! every device seen by either the cache scan or live discovery.

use std::fmt;

use bluer::Address;
use regex::Regex;

use crate::{
   bluetooth::address::normalize_address,
   config::SearchConfig,
   error::{LinkError, Result},
};

/// Predicate selecting the target device.
#[derive(Debug, Clone)]
pub enum DeviceMatcher {
   /// Matches the device with exactly this address, regardless of name.
   Address(Address),
   /// Matches any device whose name contains a match of the pattern.
   NamePattern(Regex),
}

impl DeviceMatcher {
   /// Builds the matcher for `config`.
   ///
   /// The address takes precedence when both criteria are given. Blank
   /// strings count as absent.
   pub fn from_config(config: &SearchConfig) -> Result<Self> {
      let present = |value: &Option<String>| {
         value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(str::to_owned)
      };

      if let Some(address) = present(&config.target_address) {
         return Ok(Self::Address(normalize_address(&address)?));
      }
      if let Some(pattern) = present(&config.target_name_pattern) {
         return Ok(Self::NamePattern(Regex::new(&pattern)?));
      }
      Err(LinkError::MissingCriterion)
   }

   pub fn matches(&self, address: Address, name: &str) -> bool {
      match self {
         Self::Address(target) => *target == address,
         Self::NamePattern(pattern) => pattern.is_match(name),
      }
   }

   /// Whether evaluating this matcher needs the device name.
   pub const fn needs_name(&self) -> bool {
      matches!(self, Self::NamePattern(_))
   }
}

impl fmt::Display for DeviceMatcher {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Address(addr) => write!(f, "address {addr}"),
         Self::NamePattern(pattern) => write!(f, "name matching /{pattern}/"),
      }
   }
}
