//! Capabilities the service needs from the radio platform.
//!
//! One `RadioAdapter` is created at startup and shared for the lifetime of
//! the process. Requests return as soon as they are dispatched; their
//! outcomes are reported out-of-band through listeners.

use std::future::Future;

use bluer::Address;

use crate::{
   error::Result,
   event::{BondChange, Listener, ProfileChange, ScanNotification},
   headset::device::BondState,
};

/// Pairing, profile and power control of a single radio adapter.
pub trait RadioAdapter: Send + Sync + 'static {
   /// Handle on the headset profile, acquired per connection attempt.
   type Profile: ProfileConnector;

   fn is_enabled(&self) -> impl Future<Output = Result<bool>> + Send;

   fn bond_state(&self, address: Address) -> impl Future<Output = Result<BondState>> + Send;

   /// Starts pairing; progress is reported as `BondChange` notifications.
   fn request_bond(&self, address: Address) -> impl Future<Output = Result<()>> + Send;

   /// Removes the bond. The call's own result is final.
   fn remove_bond(&self, address: Address) -> impl Future<Output = Result<()>> + Send;

   /// Registers a listener for bond-state changes of any device.
   fn bond_listener(&self) -> Result<Listener<BondChange>>;

   fn acquire_profile(&self) -> impl Future<Output = Result<Self::Profile>> + Send;

   fn release_profile(&self, profile: Self::Profile);

   /// Registers a listener for profile connection-state changes of any device.
   fn profile_listener(&self) -> Result<Listener<ProfileChange>>;
}

/// Connect/disconnect operations of an acquired profile handle.
pub trait ProfileConnector: Send + Sync + 'static {
   /// Starts a profile connection; progress is reported as `ProfileChange`
   /// notifications.
   fn connect(&self, address: Address) -> impl Future<Output = Result<()>> + Send;

   fn disconnect(&self, address: Address) -> impl Future<Output = Result<()>> + Send;
}

/// Device scanning.
pub trait ScanFacility: Send + Sync + 'static {
   fn start_scan(&self) -> impl Future<Output = Result<()>> + Send;

   fn stop_scan(&self) -> impl Future<Output = Result<()>> + Send;

   fn is_scanning(&self) -> bool;

   fn scan_listener(&self) -> Result<Listener<ScanNotification>>;
}
