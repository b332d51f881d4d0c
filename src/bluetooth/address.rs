//! Bluetooth address normalization.

use bluer::Address;

use crate::error::{LinkError, Result};

/// Number of hex digits in a 48-bit device address.
const ADDRESS_DIGITS: usize = 12;

/// Parses a MAC address written in one of the common notations.
///
/// Accepted, in upper or lower case:
/// - six 2-digit groups joined by `:` or by `-` (`AA:BB:CC:DD:EE:FF`),
/// - three 4-digit groups joined by `.` (`aabb.ccdd.eeff`),
/// - the bare 12 digits (`AABBCCDDEEFF`), as printed by some vendor tools.
///
/// Separators must be used consistently; anything else is rejected.
pub fn normalize_address(raw: &str) -> Result<Address> {
   let invalid = || LinkError::InvalidAddress(raw.to_string());
   let trimmed = raw.trim();

   let separator = trimmed.chars().find(|c| !c.is_ascii_hexdigit());
   let (groups, width): (Vec<&str>, usize) = match separator {
      None => (vec![trimmed], ADDRESS_DIGITS),
      Some(sep @ (':' | '-')) => (trimmed.split(sep).collect(), 2),
      Some('.') => (trimmed.split('.').collect(), 4),
      Some(_) => return Err(invalid()),
   };

   if groups.len() * width != ADDRESS_DIGITS || groups.iter().any(|g| g.len() != width) {
      return Err(invalid());
   }

   let nibbles = groups
      .iter()
      .flat_map(|g| g.chars())
      .map(|c| c.to_digit(16).map(|d| d as u8))
      .collect::<Option<Vec<u8>>>()
      .ok_or_else(invalid)?;

   let mut octets = [0u8; 6];
   for (octet, pair) in octets.iter_mut().zip(nibbles.chunks_exact(2)) {
      *octet = (pair[0] << 4) | pair[1];
   }
   Ok(Address(octets))
}
