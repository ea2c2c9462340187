//! BlueZ implementation of the radio platform.
//!
//! BlueZ reports pairing and profile connections as the completion of a
//! D-Bus call. This adapter runs those calls in the background and turns
//! their progress into `BondChange` / `ProfileChange` notifications, so the
//! core sees the same out-of-band reporting on every platform.

use std::{collections::HashSet, pin::pin, sync::Arc};

use bluer::{Adapter, AdapterEvent, Address, Session, Uuid};
use futures::StreamExt;
use log::{debug, info, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::task::JoinHandle;

use crate::{
   bluetooth::platform::{ProfileConnector, RadioAdapter, ScanFacility},
   config::Config,
   error::{HeadsetError, Result},
   event::{
      BondChange, Listener, NotificationHub, ProfileChange, ProfileState, ScanNotification,
   },
   headset::device::{BondState, Device},
};

/// Radio adapter backed by a BlueZ adapter.
pub struct BluezRadio {
   adapter: Adapter,
   profile_uuid: Uuid,
   pairing: Arc<Mutex<HashSet<Address>>>,
   bond_hub: Arc<NotificationHub<BondChange>>,
   profile_hub: Arc<NotificationHub<ProfileChange>>,
   scan_hub: Arc<NotificationHub<ScanNotification>>,
   scan: Mutex<Option<JoinHandle<()>>>,
}

impl BluezRadio {
   pub async fn new(session: &Session, config: &Config) -> Result<Self> {
      let adapter = match &config.adapter {
         Some(name) => session.adapter(name)?,
         None => session.default_adapter().await?,
      };
      info!("Using adapter {}", adapter.name());

      Ok(Self {
         adapter,
         profile_uuid: config.profile_uuid,
         pairing: Arc::new(Mutex::new(HashSet::new())),
         bond_hub: Arc::new(NotificationHub::new(config.notification_buffer)),
         profile_hub: Arc::new(NotificationHub::new(config.notification_buffer)),
         scan_hub: Arc::new(NotificationHub::new(config.notification_buffer)),
         scan: Mutex::new(None),
      })
   }

   pub fn name(&self) -> &str {
      self.adapter.name()
   }
}

impl RadioAdapter for BluezRadio {
   type Profile = BluezProfile;

   async fn is_enabled(&self) -> Result<bool> {
      Ok(self.adapter.is_powered().await?)
   }

   async fn bond_state(&self, address: Address) -> Result<BondState> {
      if self.pairing.lock().contains(&address) {
         return Ok(BondState::Bonding);
      }
      let device = self.adapter.device(address)?;
      Ok(if device.is_paired().await? {
         BondState::Bonded
      } else {
         BondState::None
      })
   }

   async fn request_bond(&self, address: Address) -> Result<()> {
      let device = self.adapter.device(address)?;
      if !self.pairing.lock().insert(address) {
         debug!("Pairing with {address} already requested");
         return Ok(());
      }

      self.bond_hub.publish(BondChange {
         address,
         previous: BondState::None,
         current: BondState::Bonding,
      });

      let pairing = self.pairing.clone();
      let hub = self.bond_hub.clone();
      tokio::spawn(async move {
         let current = match device.pair().await {
            Ok(()) => BondState::Bonded,
            Err(e) => {
               warn!("Pairing with {address} failed: {e}");
               BondState::None
            },
         };
         pairing.lock().remove(&address);
         hub.publish(BondChange {
            address,
            previous: BondState::Bonding,
            current,
         });
      });
      Ok(())
   }

   async fn remove_bond(&self, address: Address) -> Result<()> {
      self.adapter.remove_device(address).await?;
      self.bond_hub.publish(BondChange {
         address,
         previous: BondState::Bonded,
         current: BondState::None,
      });
      Ok(())
   }

   fn bond_listener(&self) -> Result<Listener<BondChange>> {
      self.bond_hub.register()
   }

   async fn acquire_profile(&self) -> Result<BluezProfile> {
      if !self.adapter.is_powered().await? {
         return Err(HeadsetError::AdapterNotAvailable);
      }
      Ok(BluezProfile {
         adapter: self.adapter.clone(),
         uuid: self.profile_uuid,
         hub: self.profile_hub.clone(),
      })
   }

   fn release_profile(&self, profile: BluezProfile) {
      debug!("Released profile {} handle", profile.uuid);
   }

   fn profile_listener(&self) -> Result<Listener<ProfileChange>> {
      self.profile_hub.register()
   }
}

/// Headset profile handle on one adapter.
pub struct BluezProfile {
   adapter: Adapter,
   uuid: Uuid,
   hub: Arc<NotificationHub<ProfileChange>>,
}

impl ProfileConnector for BluezProfile {
   async fn connect(&self, address: Address) -> Result<()> {
      let device = self.adapter.device(address)?;
      if let Some(uuids) = device.uuids().await?
         && !uuids.contains(&self.uuid)
      {
         return Err(HeadsetError::ProfileUnavailable);
      }

      self.hub.publish(ProfileChange {
         address,
         previous: ProfileState::Disconnected,
         current: ProfileState::Connecting,
      });

      let uuid = self.uuid;
      let hub = self.hub.clone();
      tokio::spawn(async move {
         let current = match device.connect_profile(&uuid).await {
            Ok(()) => ProfileState::Connected,
            Err(e) => {
               warn!("Profile {uuid} connection to {address} failed: {e}");
               ProfileState::Disconnected
            },
         };
         hub.publish(ProfileChange {
            address,
            previous: ProfileState::Connecting,
            current,
         });
      });
      Ok(())
   }

   async fn disconnect(&self, address: Address) -> Result<()> {
      let device = self.adapter.device(address)?;
      self.hub.publish(ProfileChange {
         address,
         previous: ProfileState::Connected,
         current: ProfileState::Disconnecting,
      });
      let result = device.disconnect_profile(&self.uuid).await;
      self.hub.publish(ProfileChange {
         address,
         previous: ProfileState::Disconnecting,
         current: ProfileState::Disconnected,
      });
      Ok(result?)
   }
}

impl ScanFacility for BluezRadio {
   async fn start_scan(&self) -> Result<()> {
      let events = self.adapter.discover_devices().await?;
      let adapter = self.adapter.clone();
      let hub = self.scan_hub.clone();

      let task = tokio::spawn(async move {
         hub.publish(ScanNotification::Started);
         let mut events = pin!(events);
         while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
               continue;
            };
            let name = match adapter.device(address) {
               Ok(device) => device.name().await.ok().flatten(),
               Err(e) => {
                  debug!("Discovered {address} vanished: {e}");
                  continue;
               },
            };
            hub.publish(ScanNotification::Found(Device::new(
               address,
               name.map(SmolStr::from),
            )));
         }
         hub.publish(ScanNotification::Stopped);
      });

      if let Some(previous) = self.scan.lock().replace(task) {
         previous.abort();
      }
      Ok(())
   }

   async fn stop_scan(&self) -> Result<()> {
      let task = self.scan.lock().take();
      if let Some(task) = task {
         // Dropping the discovery stream ends the scan.
         task.abort();
         self.scan_hub.publish(ScanNotification::Stopped);
      }
      Ok(())
   }

   fn is_scanning(&self) -> bool {
      self
         .scan
         .lock()
         .as_ref()
         .is_some_and(|task| !task.is_finished())
   }

   fn scan_listener(&self) -> Result<Listener<ScanNotification>> {
      self.scan_hub.register()
   }
}
