//! Scripted in-memory radio used by the unit tests.

use std::{
   collections::{HashMap, VecDeque},
   sync::{
      Arc,
      atomic::{AtomicBool, AtomicUsize, Ordering},
   },
};

use bluer::Address;
use parking_lot::Mutex;

use crate::{
   bluetooth::platform::{ProfileConnector, RadioAdapter, ScanFacility},
   error::{HeadsetError, Result},
   event::{
      BondChange, Listener, NotificationHub, ProfileChange, ProfileState, ScanNotification,
   },
   headset::device::{BondState, Device},
};

/// Bystander that produces notifications the monitors must ignore.
pub const OTHER: Address = Address([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);

/// Platform call as recorded by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
   RequestBond(Address),
   RemoveBond(Address),
   AcquireProfile,
   ReleaseProfile,
   ProfileConnect(Address),
   ProfileDisconnect(Address),
   StartScan,
   StopScan,
}

/// What happens after a pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondScript {
   Succeeds,
   Fails,
   Silent,
}

/// What happens after a profile connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScript {
   Connects,
   Refuses,
   Silent,
}

struct Inner {
   enabled: AtomicBool,
   deny_listeners: AtomicBool,
   fail_remove: AtomicBool,
   fail_profile_connect: AtomicBool,
   scanning: AtomicBool,
   held_profiles: AtomicUsize,
   bonds: Mutex<HashMap<Address, BondState>>,
   bond_reads: Mutex<VecDeque<BondState>>,
   bond_script: Mutex<BondScript>,
   profile_script: Mutex<ProfileScript>,
   calls: Mutex<Vec<Call>>,
   bond_hub: NotificationHub<BondChange>,
   profile_hub: NotificationHub<ProfileChange>,
   scan_hub: NotificationHub<ScanNotification>,
}

#[derive(Clone)]
pub struct FakeRadio(Arc<Inner>);

pub struct FakeProfile(Arc<Inner>);

impl FakeRadio {
   pub fn new() -> Self {
      Self(Arc::new(Inner {
         enabled: AtomicBool::new(true),
         deny_listeners: AtomicBool::new(false),
         fail_remove: AtomicBool::new(false),
         fail_profile_connect: AtomicBool::new(false),
         scanning: AtomicBool::new(false),
         held_profiles: AtomicUsize::new(0),
         bonds: Mutex::new(HashMap::new()),
         bond_reads: Mutex::new(VecDeque::new()),
         bond_script: Mutex::new(BondScript::Succeeds),
         profile_script: Mutex::new(ProfileScript::Connects),
         calls: Mutex::new(Vec::new()),
         bond_hub: NotificationHub::new(16),
         profile_hub: NotificationHub::new(16),
         scan_hub: NotificationHub::new(16),
      }))
   }

   pub fn set_enabled(&self, enabled: bool) {
      self.0.enabled.store(enabled, Ordering::Relaxed);
   }

   pub fn deny_listeners(&self, deny: bool) {
      self.0.deny_listeners.store(deny, Ordering::Relaxed);
   }

   pub fn fail_remove(&self, fail: bool) {
      self.0.fail_remove.store(fail, Ordering::Relaxed);
   }

   pub fn fail_profile_connect(&self, fail: bool) {
      self.0.fail_profile_connect.store(fail, Ordering::Relaxed);
   }

   pub fn set_bond(&self, address: Address, state: BondState) {
      self.0.bonds.lock().insert(address, state);
   }

   /// Answers the next `bond_state` reads from `states`, in order.
   pub fn queue_bond_reads(&self, states: impl IntoIterator<Item = BondState>) {
      self.0.bond_reads.lock().extend(states);
   }

   pub fn script_bond(&self, script: BondScript) {
      *self.0.bond_script.lock() = script;
   }

   pub fn script_profile(&self, script: ProfileScript) {
      *self.0.profile_script.lock() = script;
   }

   pub fn calls(&self) -> Vec<Call> {
      self.0.calls.lock().clone()
   }

   pub fn count(&self, call: Call) -> usize {
      self.0.calls.lock().iter().filter(|c| **c == call).count()
   }

   pub fn bond_listeners(&self) -> usize {
      self.0.bond_hub.listener_count()
   }

   pub fn profile_listeners(&self) -> usize {
      self.0.profile_hub.listener_count()
   }

   pub fn scan_listeners(&self) -> usize {
      self.0.scan_hub.listener_count()
   }

   pub fn held_profiles(&self) -> usize {
      self.0.held_profiles.load(Ordering::Relaxed)
   }

   pub fn emit_bond(&self, address: Address, previous: BondState, current: BondState) {
      self.0.bond_hub.publish(BondChange {
         address,
         previous,
         current,
      });
   }

   pub fn emit_profile(&self, address: Address, previous: ProfileState, current: ProfileState) {
      self.0.profile_hub.publish(ProfileChange {
         address,
         previous,
         current,
      });
   }

   pub fn emit_scan(&self, notification: ScanNotification) {
      self.0.scan_hub.publish(notification);
   }

   pub fn emit_found(&self, device: Device) {
      self.emit_scan(ScanNotification::Found(device));
   }

   fn record(&self, call: Call) {
      self.0.calls.lock().push(call);
   }

   fn listener<T: Clone>(&self, hub: &NotificationHub<T>) -> Result<Listener<T>> {
      if self.0.deny_listeners.load(Ordering::Relaxed) {
         return Err(HeadsetError::ListenerDenied);
      }
      hub.register()
   }
}

impl RadioAdapter for FakeRadio {
   type Profile = FakeProfile;

   async fn is_enabled(&self) -> Result<bool> {
      Ok(self.0.enabled.load(Ordering::Relaxed))
   }

   async fn bond_state(&self, address: Address) -> Result<BondState> {
      if let Some(state) = self.0.bond_reads.lock().pop_front() {
         return Ok(state);
      }
      Ok(self
         .0
         .bonds
         .lock()
         .get(&address)
         .copied()
         .unwrap_or(BondState::None))
   }

   async fn request_bond(&self, address: Address) -> Result<()> {
      self.record(Call::RequestBond(address));

      let script = *self.0.bond_script.lock();
      if script == BondScript::Silent {
         return Ok(());
      }

      self.emit_bond(OTHER, BondState::Bonding, BondState::Bonded);
      self.emit_bond(address, BondState::None, BondState::Bonding);
      match script {
         BondScript::Succeeds => {
            self.set_bond(address, BondState::Bonded);
            self.emit_bond(address, BondState::Bonding, BondState::Bonded);
         },
         BondScript::Fails => {
            self.emit_bond(address, BondState::Bonding, BondState::None);
         },
         BondScript::Silent => {},
      }
      Ok(())
   }

   async fn remove_bond(&self, address: Address) -> Result<()> {
      self.record(Call::RemoveBond(address));
      if self.0.fail_remove.load(Ordering::Relaxed) {
         return Err(HeadsetError::DeviceNotFound(address));
      }
      self.set_bond(address, BondState::None);
      Ok(())
   }

   fn bond_listener(&self) -> Result<Listener<BondChange>> {
      self.listener(&self.0.bond_hub)
   }

   async fn acquire_profile(&self) -> Result<FakeProfile> {
      self.record(Call::AcquireProfile);
      self.0.held_profiles.fetch_add(1, Ordering::Relaxed);
      Ok(FakeProfile(self.0.clone()))
   }

   fn release_profile(&self, profile: FakeProfile) {
      self.record(Call::ReleaseProfile);
      self.0.held_profiles.fetch_sub(1, Ordering::Relaxed);
      drop(profile);
   }

   fn profile_listener(&self) -> Result<Listener<ProfileChange>> {
      self.listener(&self.0.profile_hub)
   }
}

impl ProfileConnector for FakeProfile {
   async fn connect(&self, address: Address) -> Result<()> {
      let radio = FakeRadio(self.0.clone());
      radio.record(Call::ProfileConnect(address));
      if self.0.fail_profile_connect.load(Ordering::Relaxed) {
         return Err(HeadsetError::ProfileUnavailable);
      }

      let script = *self.0.profile_script.lock();
      if script == ProfileScript::Silent {
         return Ok(());
      }

      radio.emit_profile(OTHER, ProfileState::Connecting, ProfileState::Connected);
      radio.emit_profile(address, ProfileState::Disconnected, ProfileState::Connecting);
      let outcome = match script {
         ProfileScript::Connects => ProfileState::Connected,
         _ => ProfileState::Disconnected,
      };
      radio.emit_profile(address, ProfileState::Connecting, outcome);
      Ok(())
   }

   async fn disconnect(&self, address: Address) -> Result<()> {
      FakeRadio(self.0.clone()).record(Call::ProfileDisconnect(address));
      Ok(())
   }
}

impl ScanFacility for FakeRadio {
   async fn start_scan(&self) -> Result<()> {
      self.record(Call::StartScan);
      self.0.scanning.store(true, Ordering::Relaxed);
      self.emit_scan(ScanNotification::Started);
      Ok(())
   }

   async fn stop_scan(&self) -> Result<()> {
      self.record(Call::StopScan);
      self.0.scanning.store(false, Ordering::Relaxed);
      self.emit_scan(ScanNotification::Stopped);
      Ok(())
   }

   fn is_scanning(&self) -> bool {
      self.0.scanning.load(Ordering::Relaxed)
   }

   fn scan_listener(&self) -> Result<Listener<ScanNotification>> {
      self.listener(&self.0.scan_hub)
   }
}
