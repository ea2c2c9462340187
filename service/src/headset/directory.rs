//! Deduplicated collection of devices seen during discovery.

use bluer::Address;
use indexmap::IndexMap;
use tokio::sync::watch;

use crate::headset::device::Device;

pub type DeviceList = IndexMap<Address, Device>;

/// Devices found by the current discovery session, in order of discovery.
///
/// Readers subscribe to a snapshot that is replaced on every change.
#[derive(Debug)]
pub struct DeviceDirectory {
   devices: watch::Sender<DeviceList>,
}

impl DeviceDirectory {
   pub fn new() -> Self {
      let (devices, _) = watch::channel(DeviceList::new());
      Self { devices }
   }

   /// Adds `device`, or refreshes its name if it is already known.
   ///
   /// Returns whether the device was not known before.
   pub fn insert(&self, device: Device) -> bool {
      let mut added = false;
      self.devices.send_if_modified(|devices| {
         match devices.get_mut(&device.address()) {
            Some(known) if *known == device => false,
            Some(known) => {
               *known = device;
               true
            },
            None => {
               devices.insert(device.address(), device);
               added = true;
               true
            },
         }
      });
      added
   }

   pub fn clear(&self) {
      self.devices.send_if_modified(|devices| {
         let had_devices = !devices.is_empty();
         devices.clear();
         had_devices
      });
   }

   pub fn get(&self, address: Address) -> Option<Device> {
      self.devices.borrow().get(&address).cloned()
   }

   pub fn snapshot(&self) -> Vec<Device> {
      self.devices.borrow().values().cloned().collect()
   }

   pub fn len(&self) -> usize {
      self.devices.borrow().len()
   }

   pub fn subscribe(&self) -> watch::Receiver<DeviceList> {
      self.devices.subscribe()
   }
}

impl Default for DeviceDirectory {
   fn default() -> Self {
      Self::new()
   }
}
