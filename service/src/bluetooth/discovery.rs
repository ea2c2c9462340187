//! Discovery of nearby devices.
//!
//! Wraps the platform scan facility and republishes its notifications as a
//! typed `DiscoveryEvent` stream. The stream is multi-subscriber and does
//! not replay; a subscriber that falls behind loses the oldest events so
//! the scan never waits on a consumer.

use std::sync::Arc;

use log::{debug, error, info, warn};
use smol_str::format_smolstr;
use tokio::{
   sync::{Mutex, broadcast::error::RecvError},
   task::JoinHandle,
};

use crate::{
   bluetooth::platform::ScanFacility,
   error::Result,
   event::{DiscoveryEvent, Listener, NotificationHub, ScanNotification},
};

/// Default number of buffered discovery events per subscriber.
pub const DISCOVERY_BUFFER: usize = 30;

pub struct DiscoveryMonitor<S> {
   scanner: Arc<S>,
   events: Arc<NotificationHub<DiscoveryEvent>>,
   listener: Mutex<Option<JoinHandle<()>>>,
}

impl<S: ScanFacility> DiscoveryMonitor<S> {
   pub fn new(scanner: Arc<S>, buffer: usize) -> Self {
      Self {
         scanner,
         events: Arc::new(NotificationHub::new(buffer)),
         listener: Mutex::new(None),
      }
   }

   pub fn subscribe(&self) -> Listener<DiscoveryEvent> {
      self.events.subscribe()
   }

   /// Starts a scan, restarting it if one is already running.
   ///
   /// `Started` is published once the listener is registered and the scan
   /// is requested. If the platform refuses the listener, an `Error` event is
   /// published and no scan is requested.
   pub async fn start(&self) -> Result<()> {
      let mut listener = self.listener.lock().await;
      release(listener.take()).await;

      if self.scanner.is_scanning() {
         debug!("Discovery already running, restarting");
         if let Err(e) = self.scanner.stop_scan().await {
            warn!("Failed to cancel running discovery: {e}");
         }
      }

      let notifications = match self.scanner.scan_listener() {
         Ok(notifications) => notifications,
         Err(e) => {
            error!("Failed to register discovery listener: {e}");
            self.events.publish(DiscoveryEvent::Error(format_smolstr!("{e}")));
            return Err(e);
         },
      };
      *listener = Some(tokio::spawn(forward(notifications, self.events.clone())));

      if let Err(e) = self.scanner.start_scan().await {
         error!("Failed to start discovery: {e}");
         release(listener.take()).await;
         self.events.publish(DiscoveryEvent::Error(format_smolstr!("{e}")));
         return Err(e);
      }

      info!("Discovery started");
      self.events.publish(DiscoveryEvent::Started);
      Ok(())
   }

   /// Stops the running scan. Does nothing if no scan is running.
   pub async fn stop(&self) -> Result<()> {
      let mut listener = self.listener.lock().await;
      release(listener.take()).await;

      if !self.scanner.is_scanning() {
         debug!("Discovery not running");
         return Ok(());
      }

      self.scanner.stop_scan().await?;
      info!("Discovery stopped");
      self.events.publish(DiscoveryEvent::Stopped);
      Ok(())
   }
}

/// Cancels a listener task and waits until its registration is dropped.
async fn release(task: Option<JoinHandle<()>>) {
   if let Some(task) = task {
      task.abort();
      let _ = task.await;
   }
}

async fn forward(
   mut notifications: Listener<ScanNotification>,
   events: Arc<NotificationHub<DiscoveryEvent>>,
) {
   loop {
      match notifications.recv().await {
         Ok(ScanNotification::Found(device)) => {
            if device.name().is_some() {
               debug!("Discovered {device}");
               events.publish(DiscoveryEvent::DeviceFound(device));
            } else {
               debug!("Ignoring anonymous device {}", device.address());
            }
         },
         // Published by the monitor itself, once per start.
         Ok(ScanNotification::Started) => {},
         Ok(ScanNotification::Stopped) => {
            info!("Discovery finished");
            events.publish(DiscoveryEvent::Stopped);
            break;
         },
         Err(RecvError::Lagged(n)) => {
            warn!("Discovery listener missed {n} notifications");
         },
         Err(RecvError::Closed) => break,
      }
   }
}
