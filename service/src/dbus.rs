use std::{str::FromStr, sync::Arc};

use bluer::Address;
use log::info;
use zbus::{interface, object_server::SignalEmitter};

use crate::{
   bluetooth::bluez::BluezRadio, error::HeadsetError, headset::device::Device,
   session::HeadsetSession,
};

pub const MANAGER_PATH: &str = "/org/headsetd/manager";

pub struct HeadsetService {
   session: Arc<HeadsetSession<BluezRadio>>,
}

impl HeadsetService {
   pub const fn new(session: Arc<HeadsetSession<BluezRadio>>) -> Self {
      Self { session }
   }
}

fn parse_address(address: &str) -> zbus::fdo::Result<Address> {
   Address::from_str(address)
      .map_err(|_| HeadsetError::InvalidAddress(address.to_owned()))
      .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))
}

/// Renders a device list as the JSON array handed out over D-Bus.
pub fn devices_json<'a>(devices: impl IntoIterator<Item = &'a Device>) -> String {
   let devices: Vec<serde_json::Value> = devices.into_iter().map(Device::to_json).collect();
   serde_json::Value::Array(devices).to_string()
}

#[interface(name = "org.headsetd.Manager")]
impl HeadsetService {
   async fn toggle_discovery(&self) -> zbus::fdo::Result<bool> {
      self
         .session
         .toggle_discovery()
         .await
         .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
      Ok(true)
   }

   async fn connect(&self, address: String) -> zbus::fdo::Result<bool> {
      let addr = parse_address(&address)?;

      self
         .session
         .connect_address(addr)
         .await
         .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

      info!("Connect requested for {address}");
      Ok(true)
   }

   async fn disconnect(&self, address: String) -> zbus::fdo::Result<bool> {
      let addr = parse_address(&address)?;

      self
         .session
         .disconnect_address(addr)
         .await
         .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

      info!("Disconnect requested for {address}");
      Ok(true)
   }

   async fn retry(&self) -> zbus::fdo::Result<bool> {
      self
         .session
         .retry()
         .await
         .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
      Ok(true)
   }

   async fn get_devices(&self) -> String {
      devices_json(&self.session.device_snapshot())
   }

   async fn get_state(&self) -> String {
      self.session.current_state().to_json().to_string()
   }

   // Signals
   #[zbus(signal)]
   pub async fn connection_state_changed(
      emitter: &SignalEmitter<'_>,
      state: &str,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn device_found(
      emitter: &SignalEmitter<'_>,
      address: &str,
      name: &str,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn device_list_changed(
      emitter: &SignalEmitter<'_>,
      devices: &str,
   ) -> zbus::Result<()>;

   #[zbus(signal)]
   pub async fn discovery_state_changed(
      emitter: &SignalEmitter<'_>,
      discovering: bool,
   ) -> zbus::Result<()>;

   // Properties for polling-free updates
   #[zbus(property)]
   async fn discovering(&self) -> bool {
      self.session.is_discovering()
   }

   #[zbus(property)]
   async fn devices(&self) -> String {
      self.get_devices().await
   }

   #[zbus(property)]
   async fn state(&self) -> String {
      self.get_state().await
   }
}
