//! Error types for the headset service.
//!
//! `HeadsetError` covers failures of the service plumbing (BlueZ, D-Bus,
//! configuration). Failures inside a connect or disconnect attempt are
//! classified by `AttemptError` and never escape the attempt: they are
//! turned into an `Error` connection state instead.

use bluer::Address;
use thiserror::Error;
use tokio::task::JoinError;

use crate::headset::state::Failure;

/// Main error type for the headset service.
#[derive(Error, Debug)]
pub enum HeadsetError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("D-Bus connection error: {0}")]
   DBusConnection(#[from] zbus::fdo::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Device not found: {0}")]
   DeviceNotFound(Address),

   #[error("Invalid device address: {0}")]
   InvalidAddress(String),

   #[error("Listener registration denied")]
   ListenerDenied,

   #[error("Profile not available")]
   ProfileUnavailable,

   #[error("Task panicked: {0}")]
   TaskPanicked(JoinError),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("No failed connection attempt to retry")]
   NothingToRetry,

   #[error("Manager has been shut down")]
   ManagerShutdown,

   #[error("Adapter not available")]
   AdapterNotAvailable,
}

/// Convenience type alias for Results with `HeadsetError`.
pub type Result<T> = std::result::Result<T, HeadsetError>;

/// Why a single connect or disconnect attempt ended without success.
#[derive(Error, Debug)]
pub enum AttemptError {
   #[error("radio adapter is disabled")]
   RadioDisabled,

   #[error("pairing was rejected or aborted")]
   PairingFailed,

   #[error("pairing did not complete within {0:?}")]
   PairingTimeout(std::time::Duration),

   #[error("profile connection did not resolve within {0:?}")]
   ConnectionTimeout(std::time::Duration),

   #[error("profile connection was refused")]
   ConnectionRefused,

   #[error("bond removal failed: {0}")]
   DisconnectFailed(HeadsetError),

   #[error("a newer request replaced this attempt")]
   Superseded,

   #[error("unexpected failure: {0}")]
   Unexpected(#[from] HeadsetError),
}

impl AttemptError {
   /// The user-facing failure this error is reported as.
   ///
   /// Unexpected errors are reported against the operation that was running,
   /// so the caller supplies the fallback.
   pub const fn failure(&self, fallback: Failure) -> Failure {
      match self {
         Self::RadioDisabled => Failure::RadioDisabled,
         Self::PairingFailed | Self::PairingTimeout(_) => Failure::PairingFailed,
         Self::ConnectionTimeout(_) | Self::ConnectionRefused => Failure::ConnectFailed,
         Self::DisconnectFailed(_) => Failure::DisconnectFailed,
         Self::Superseded | Self::Unexpected(_) => fallback,
      }
   }
}
