//! Presentation-facing facade.
//!
//! Ties discovery, the device directory and the connection manager together
//! and exposes what a front-end needs: three observables (connection state,
//! discovering flag, device list) and three actions (toggle discovery,
//! connect, disconnect).

use std::sync::Arc;

use bluer::Address;
use log::{debug, warn};
use tokio::{
   sync::{broadcast::error::RecvError, watch},
   task::JoinHandle,
};

use crate::{
   bluetooth::{
      discovery::DiscoveryMonitor,
      platform::{RadioAdapter, ScanFacility},
   },
   config::Config,
   error::{HeadsetError, Result},
   event::{DiscoveryEvent, Listener},
   headset::{
      device::Device,
      directory::{DeviceDirectory, DeviceList},
      orchestrator::{AttemptLimits, ConnectionManager},
      state::ConnectionState,
   },
};

pub struct HeadsetSession<R> {
   discovery: Arc<DiscoveryMonitor<R>>,
   directory: Arc<DeviceDirectory>,
   discovering: Arc<watch::Sender<bool>>,
   connections: ConnectionManager,
   observer: JoinHandle<()>,
}

impl<R: RadioAdapter + ScanFacility> HeadsetSession<R> {
   pub fn new(radio: Arc<R>, config: &Config) -> Self {
      let discovery = Arc::new(DiscoveryMonitor::new(radio.clone(), config.discovery_buffer));
      let directory = Arc::new(DeviceDirectory::new());
      let discovering = Arc::new(watch::Sender::new(false));
      let connections = ConnectionManager::new(radio, AttemptLimits::from(config));

      let observer = tokio::spawn(observe_discovery(
         discovery.subscribe(),
         directory.clone(),
         discovering.clone(),
      ));

      Self {
         discovery,
         directory,
         discovering,
         connections,
         observer,
      }
   }

   /// Starts discovery when idle, stops it when running.
   pub async fn toggle_discovery(&self) -> Result<()> {
      if *self.discovering.borrow() {
         self.discovery.stop().await
      } else {
         self.discovery.start().await
      }
   }

   /// Stops discovery and starts connecting to `device`.
   pub async fn connect(&self, device: Device) -> Result<()> {
      if let Err(e) = self.discovery.stop().await {
         warn!("Failed to stop discovery before connecting: {e}");
      }
      self.connections.connect(device).await
   }

   /// Connects to a device previously found by discovery.
   pub async fn connect_address(&self, address: Address) -> Result<()> {
      let device = self.lookup(address)?;
      self.connect(device).await
   }

   /// Connects again to the device of the last failed attempt.
   pub async fn retry(&self) -> Result<()> {
      let device = self
         .current_state()
         .retry_target()
         .cloned()
         .ok_or(HeadsetError::NothingToRetry)?;
      self.connect(device).await
   }

   pub async fn disconnect(&self, device: Device) -> Result<()> {
      self.connections.disconnect(device).await
   }

   /// Disconnects a device found by discovery or targeted by the current state.
   pub async fn disconnect_address(&self, address: Address) -> Result<()> {
      let device = self.lookup(address)?;
      self.disconnect(device).await
   }

   pub fn state(&self) -> watch::Receiver<ConnectionState> {
      self.connections.state()
   }

   pub fn current_state(&self) -> ConnectionState {
      self.connections.current_state()
   }

   pub fn discovering(&self) -> watch::Receiver<bool> {
      self.discovering.subscribe()
   }

   pub fn is_discovering(&self) -> bool {
      *self.discovering.borrow()
   }

   pub fn devices(&self) -> watch::Receiver<DeviceList> {
      self.directory.subscribe()
   }

   pub fn device_snapshot(&self) -> Vec<Device> {
      self.directory.snapshot()
   }

   pub fn discovery_events(&self) -> Listener<DiscoveryEvent> {
      self.discovery.subscribe()
   }

   /// Stops discovery and cancels every in-flight connection attempt.
   pub async fn shutdown(&self) {
      if let Err(e) = self.discovery.stop().await {
         warn!("Failed to stop discovery: {e}");
      }
      self.connections.shutdown().await;
      self.observer.abort();
   }

   fn lookup(&self, address: Address) -> Result<Device> {
      if let Some(device) = self.directory.get(address) {
         return Ok(device);
      }
      match self.current_state() {
         ConnectionState::Connected(device)
         | ConnectionState::Disconnected(device)
         | ConnectionState::Error(device, _)
            if device.address() == address =>
         {
            Ok(device)
         },
         _ => Err(HeadsetError::DeviceNotFound(address)),
      }
   }
}

impl<R> Drop for HeadsetSession<R> {
   fn drop(&mut self) {
      self.observer.abort();
   }
}

async fn observe_discovery(
   mut events: Listener<DiscoveryEvent>,
   directory: Arc<DeviceDirectory>,
   discovering: Arc<watch::Sender<bool>>,
) {
   loop {
      match events.recv().await {
         Ok(DiscoveryEvent::Started) => {
            directory.clear();
            discovering.send_replace(true);
         },
         Ok(DiscoveryEvent::Stopped) => {
            discovering.send_replace(false);
         },
         Ok(DiscoveryEvent::DeviceFound(device)) => {
            if directory.insert(device) {
               debug!("{} devices discovered", directory.len());
            }
         },
         Ok(DiscoveryEvent::Error(message)) => {
            warn!("Discovery error: {message}");
            discovering.send_replace(false);
         },
         Err(RecvError::Lagged(n)) => {
            warn!("Dropped {n} discovery events");
         },
         Err(RecvError::Closed) => break,
      }
   }
}
