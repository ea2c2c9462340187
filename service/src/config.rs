//! Configuration management for the headset service.
//!
//! This module handles loading and saving configuration from disk,
//! including adapter selection, the headset profile and attempt timeouts.

use std::{env, fs, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
   bluetooth::discovery::DISCOVERY_BUFFER,
   error::{HeadsetError, Result},
   headset::profile::PROFILE_CONNECT_TIMEOUT,
};

/// Hands-Free unit role, advertised by headsets.
pub const HANDS_FREE_UUID: Uuid = Uuid::from_u128(0x0000111e_0000_1000_8000_00805f9b34fb);

/// Main configuration structure for the service.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
   /// Adapter name (e.g. `hci0`); the default adapter is used when unset.
   #[serde(default)]
   pub adapter: Option<String>,

   #[serde(default = "default_profile_uuid")]
   pub profile_uuid: Uuid,

   #[serde(default = "default_profile_connect_timeout")]
   pub profile_connect_timeout_ms: u64,

   /// Bonding is only resolved by bond-state notifications unless this is set.
   #[serde(default)]
   pub pairing_timeout_sec: Option<u64>,

   #[serde(default = "default_discovery_buffer")]
   pub discovery_buffer: usize,

   #[serde(default = "default_notification_buffer")]
   pub notification_buffer: usize,
}

const fn default_profile_uuid() -> Uuid {
   HANDS_FREE_UUID
}

const fn default_profile_connect_timeout() -> u64 {
   PROFILE_CONNECT_TIMEOUT.as_millis() as u64
}

const fn default_discovery_buffer() -> usize {
   DISCOVERY_BUFFER
}

const fn default_notification_buffer() -> usize {
   64
}

impl Default for Config {
   fn default() -> Self {
      Self {
         adapter: None,
         profile_uuid: default_profile_uuid(),
         profile_connect_timeout_ms: default_profile_connect_timeout(),
         pairing_timeout_sec: None,
         discovery_buffer: default_discovery_buffer(),
         notification_buffer: default_notification_buffer(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         let contents = fs::read_to_string(&config_path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save()?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      let config_path = Self::config_path()?;

      if let Some(parent) = config_path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(&config_path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("HEADSETD_HOME") {
         PathBuf::from(home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else {
         dirs::config_dir().ok_or(HeadsetError::ConfigDirNotFound)?
      };

      Ok(config_dir.join("headsetd").join("config.toml"))
   }

   pub const fn profile_connect_timeout(&self) -> Duration {
      Duration::from_millis(self.profile_connect_timeout_ms)
   }

   pub fn pairing_timeout(&self) -> Option<Duration> {
      self.pairing_timeout_sec.map(Duration::from_secs)
   }
}
