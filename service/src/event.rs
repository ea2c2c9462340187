//! Out-of-band notifications produced by the radio platform.
//!
//! Pairing, profile connection and scanning all report their progress
//! through notifications rather than call returns. Each kind is fanned out
//! through a `NotificationHub`; holding a `Listener` is a registration and
//! dropping it unregisters.

use bluer::Address;
use smol_str::SmolStr;
use tokio::sync::broadcast;

use crate::{
   error::{HeadsetError, Result},
   headset::device::{BondState, Device},
};

/// Upper bound on platform listeners per hub; more means monitors leak.
pub const MAX_LISTENERS: usize = 16;

/// A bond-state transition reported for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondChange {
   pub address: Address,
   pub previous: BondState,
   pub current: BondState,
}

/// Connection state of the headset profile on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProfileState {
   Disconnected,
   Connecting,
   Connected,
   Disconnecting,
}

/// A profile connection-state transition reported for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileChange {
   pub address: Address,
   pub previous: ProfileState,
   pub current: ProfileState,
}

/// Raw notifications from the platform scan facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanNotification {
   Started,
   Stopped,
   Found(Device),
}

/// Typed discovery events published by the discovery monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
   Started,
   Stopped,
   DeviceFound(Device),
   Error(SmolStr),
}

/// Registration on a `NotificationHub`.
pub type Listener<T> = broadcast::Receiver<T>;

/// Multi-listener fan-out for one kind of notification.
///
/// Publishing never blocks; a listener that falls behind loses the oldest
/// notifications.
#[derive(Debug)]
pub struct NotificationHub<T> {
   tx: broadcast::Sender<T>,
}

impl<T: Clone> NotificationHub<T> {
   pub fn new(capacity: usize) -> Self {
      let (tx, _) = broadcast::channel(capacity.max(1));
      Self { tx }
   }

   /// Delivers `value` to every registered listener.
   pub fn publish(&self, value: T) {
      // No listeners is fine: nobody is waiting for this notification.
      let _ = self.tx.send(value);
   }

   pub fn subscribe(&self) -> Listener<T> {
      self.tx.subscribe()
   }

   /// Registers a platform listener, refusing once `MAX_LISTENERS` are live.
   pub fn register(&self) -> Result<Listener<T>> {
      if self.listener_count() >= MAX_LISTENERS {
         return Err(HeadsetError::ListenerDenied);
      }
      Ok(self.subscribe())
   }

   /// Number of live listeners.
   pub fn listener_count(&self) -> usize {
      self.tx.receiver_count()
   }
}
