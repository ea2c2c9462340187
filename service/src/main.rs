//! Headset D-Bus Service
//!
//! This service discovers nearby Bluetooth devices, pairs with a selected
//! headset, connects its audio profile and tears the link down again,
//! publishing a single connection state over D-Bus.

use std::sync::Arc;

use log::{info, warn};
use tokio::{select, signal, sync::broadcast::error::RecvError};
use zbus::{Connection, connection};

use bluetooth::bluez::BluezRadio;
use dbus::{HeadsetService, MANAGER_PATH, devices_json};
use event::DiscoveryEvent;
use session::HeadsetSession;

mod bluetooth;
mod config;
mod dbus;
mod error;
mod event;
mod headset;
mod session;

use crate::{dbus::HeadsetServiceSignals, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting headsetd D-Bus service...");

   // Load configuration
   let config = config::Config::load()?;
   info!(
      "Loaded configuration (profile {}, connect timeout {:?})",
      config.profile_uuid,
      config.profile_connect_timeout()
   );

   // One radio handle for the lifetime of the process
   let bluez = bluer::Session::new().await?;
   let radio = Arc::new(BluezRadio::new(&bluez, &config).await?);
   info!("Bluetooth adapter {} ready", radio.name());

   let session = Arc::new(HeadsetSession::new(radio, &config));

   // Build D-Bus connection
   let connection = connection::Builder::session()?
      .name("org.headsetd")?
      .serve_at(MANAGER_PATH, HeadsetService::new(session.clone()))?
      .build()
      .await?;

   info!("headsetd D-Bus service started at org.headsetd");

   spawn_dispatcher(session.clone(), &connection).await?;

   // Wait for shutdown signal
   signal::ctrl_c().await?;
   info!("Shutting down headsetd...");
   session.shutdown().await;

   Ok(())
}

/// Forwards state changes and discoveries to D-Bus signals.
async fn spawn_dispatcher(
   session: Arc<HeadsetSession<BluezRadio>>,
   connection: &Connection,
) -> Result<()> {
   let iface = connection
      .object_server()
      .interface::<_, HeadsetService>(MANAGER_PATH)
      .await?;

   let mut state = session.state();
   let mut discovering = session.discovering();
   let mut devices = session.devices();
   let mut discovery = session.discovery_events();

   tokio::spawn(async move {
      loop {
         let result = select! {
             changed = state.changed() => {
                 if changed.is_err() {
                     break;
                 }
                 let json = state.borrow_and_update().to_json().to_string();
                 iface.connection_state_changed(&json).await
             }
             changed = devices.changed() => {
                 if changed.is_err() {
                     break;
                 }
                 let json = devices_json(devices.borrow_and_update().values());
                 iface.device_list_changed(&json).await
             }
             changed = discovering.changed() => {
                 if changed.is_err() {
                     break;
                 }
                 let on = *discovering.borrow_and_update();
                 iface.discovery_state_changed(on).await
             }
             event = discovery.recv() => match event {
                 Ok(DiscoveryEvent::DeviceFound(device)) => {
                     let address = device.address().to_string();
                     iface.device_found(&address, &device.display_name()).await
                 }
                 Ok(_) => Ok(()),
                 Err(RecvError::Lagged(n)) => {
                     warn!("Dispatcher missed {n} discovery events");
                     Ok(())
                 }
                 Err(RecvError::Closed) => break,
             },
         };
         if let Err(e) = result {
            warn!("Error dispatching signal: {e}");
         }
      }
   });

   Ok(())
}
