//! Published connection state.
//!
//! There is exactly one live `ConnectionState`, held in a latest-wins
//! `watch` channel. Writers go through an `Attempt`, which carries the
//! generation of the operation that created it; once a newer operation has
//! started, publications from older attempts are discarded.

use std::sync::{
   Arc,
   atomic::{AtomicU64, Ordering},
};

use log::{debug, info};
use serde_json::json;
use tokio::sync::watch;

use crate::headset::device::Device;

/// Phase label carried by `ConnectionState::Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Phase {
   #[strum(serialize = "pairing")]
   Pairing,
   #[strum(serialize = "pairing in progress")]
   PairingInProgress,
   #[strum(serialize = "pairing successful")]
   Paired,
   #[strum(serialize = "connecting to device")]
   Connecting,
}

/// Failure label carried by `ConnectionState::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Failure {
   #[strum(serialize = "enable radio")]
   RadioDisabled,
   #[strum(serialize = "pairing failed")]
   PairingFailed,
   #[strum(serialize = "failed to connect")]
   ConnectFailed,
   #[strum(serialize = "failed to disconnect")]
   DisconnectFailed,
}

/// Externally observable state of the headset connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
   /// No device targeted.
   #[default]
   Idle,
   /// An attempt is in progress.
   Connecting(Phase),
   /// Profile link established.
   Connected(Device),
   /// Teardown in progress.
   Disconnecting,
   /// Bond cleanly removed.
   Disconnected(Device),
   /// The most recent attempt failed; the device is kept so it can be retried.
   Error(Device, Failure),
}

impl ConnectionState {
   /// Device the presentation layer can offer to retry, if any.
   pub const fn retry_target(&self) -> Option<&Device> {
      match self {
         Self::Error(device, _) => Some(device),
         _ => None,
      }
   }

   pub fn to_json(&self) -> serde_json::Value {
      match self {
         Self::Idle => json!({ "state": "idle" }),
         Self::Connecting(phase) => json!({ "state": "connecting", "message": phase.to_string() }),
         Self::Connected(device) => json!({ "state": "connected", "device": device.to_json() }),
         Self::Disconnecting => json!({ "state": "disconnecting" }),
         Self::Disconnected(device) => {
            json!({ "state": "disconnected", "device": device.to_json() })
         },
         Self::Error(device, failure) => json!({
            "state": "error",
            "device": device.to_json(),
            "message": failure.to_string(),
         }),
      }
   }
}

/// Single writer side of the connection state.
#[derive(Debug, Clone)]
pub struct StatePublisher {
   tx: Arc<watch::Sender<ConnectionState>>,
   generation: Arc<AtomicU64>,
}

impl StatePublisher {
   pub fn new() -> Self {
      let (tx, _) = watch::channel(ConnectionState::Idle);
      Self {
         tx: Arc::new(tx),
         generation: Arc::new(AtomicU64::new(0)),
      }
   }

   pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
      self.tx.subscribe()
   }

   /// Starts a new attempt, superseding every earlier one.
   pub fn begin_attempt(&self) -> Attempt {
      let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
      Attempt {
         publisher: self.clone(),
         generation,
      }
   }
}

impl Default for StatePublisher {
   fn default() -> Self {
      Self::new()
   }
}

/// Write access to the connection state for one connect/disconnect attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
   publisher: StatePublisher,
   generation: u64,
}

impl Attempt {
   pub const fn generation(&self) -> u64 {
      self.generation
   }

   pub fn is_current(&self) -> bool {
      self.publisher.generation.load(Ordering::Acquire) == self.generation
   }

   /// Publishes `state` unless a newer attempt has started.
   ///
   /// Returns whether the state was published.
   pub fn publish(&self, state: ConnectionState) -> bool {
      let generation = &self.publisher.generation;
      let published = self.publisher.tx.send_if_modified(|current| {
         if generation.load(Ordering::Acquire) != self.generation {
            return false;
         }
         *current = state.clone();
         true
      });

      if published {
         info!("Connection state [{}]: {state:?}", self.generation);
      } else {
         debug!(
            "Dropping state {state:?} from superseded attempt {}",
            self.generation
         );
      }
      published
   }
}

#[cfg(test)]
impl ConnectionState {
   /// Whether this is a rest state that only a new user action leaves.
   pub const fn is_settled(&self) -> bool {
      matches!(
         self,
         Self::Idle | Self::Connected(_) | Self::Disconnected(_) | Self::Error(..)
      )
   }
}
