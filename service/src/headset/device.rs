//! Device descriptors observed on the radio.

use core::fmt;

use bluer::Address;
use serde_json::json;
use smol_str::SmolStr;

/// Pairing status of a device, as owned and reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BondState {
   None,
   Bonding,
   Bonded,
}

/// A remote device as seen by discovery.
///
/// The bond status is not cached here; it is always read from the platform
/// because it is owned there.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Device {
   address: Address,
   name: Option<SmolStr>,
}

impl Device {
   pub fn new(address: Address, name: impl Into<Option<SmolStr>>) -> Self {
      Self {
         address,
         name: name.into().filter(|n| !n.is_empty()),
      }
   }

   /// Gets the hardware address of the device.
   pub const fn address(&self) -> Address {
      self.address
   }

   /// Gets the advertised display name, if any.
   pub fn name(&self) -> Option<&str> {
      self.name.as_deref()
   }

   /// Name to show to a user, falling back to the address.
   pub fn display_name(&self) -> SmolStr {
      self
         .name
         .clone()
         .unwrap_or_else(|| SmolStr::new(self.address.to_string()))
   }

   pub fn to_json(&self) -> serde_json::Value {
      json!({
         "address": self.address.to_string(),
         "name": self.name.as_deref(),
      })
   }
}

impl fmt::Debug for Device {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match &self.name {
         Some(name) => write!(f, "{name} ({})", self.address),
         None => write!(f, "{}", self.address),
      }
   }
}

impl fmt::Display for Device {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Debug::fmt(self, f)
   }
}
