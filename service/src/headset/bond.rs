//! One-shot watcher for the pairing of a single device.

use std::time::Duration;

use bluer::Address;
use log::{debug, info, warn};
use tokio::{sync::broadcast::error::RecvError, time};

use crate::{
   bluetooth::platform::RadioAdapter,
   error::{AttemptError, Result},
   event::{BondChange, Listener},
   headset::device::BondState,
};

/// Listens for the bond-state changes of one device during one attempt.
///
/// The listener is registered on creation and released when the monitor is
/// dropped, which at the latest happens when `resolve` returns.
pub struct BondMonitor {
   target: Address,
   listener: Listener<BondChange>,
}

impl BondMonitor {
   /// Registers the listener. Must happen before the pairing request.
   pub fn register<R: RadioAdapter>(radio: &R, target: Address) -> Result<Self> {
      let listener = radio.bond_listener()?;
      debug!("Bond monitor registered for {target}");
      Ok(Self { target, listener })
   }

   /// Waits until the bond of the target resolves.
   ///
   /// `on_bonding` is invoked each time the target moves from `none` to
   /// `bonding`.
   /// Without a `limit` this only ends on a bond notification or when the
   /// platform stops delivering them.
   pub async fn resolve(
      mut self,
      limit: Option<Duration>,
      mut on_bonding: impl FnMut() + Send,
   ) -> std::result::Result<(), AttemptError> {
      let outcome = match limit {
         Some(limit) => time::timeout(limit, self.next_outcome(&mut on_bonding))
            .await
            .unwrap_or(Err(AttemptError::PairingTimeout(limit))),
         None => self.next_outcome(&mut on_bonding).await,
      };
      debug!("Bond monitor for {} released", self.target);
      outcome
   }

   async fn next_outcome(
      &mut self,
      on_bonding: &mut (impl FnMut() + Send),
   ) -> std::result::Result<(), AttemptError> {
      loop {
         let change = match self.listener.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(n)) => {
               warn!("Bond monitor for {} missed {n} notifications", self.target);
               continue;
            },
            Err(RecvError::Closed) => {
               warn!("Bond notifications ended before {} resolved", self.target);
               return Err(AttemptError::PairingFailed);
            },
         };
         if change.address != self.target {
            continue;
         }

         match (change.previous, change.current) {
            (_, BondState::Bonded) => {
               info!("Pairing with {} complete", self.target);
               return Ok(());
            },
            (BondState::None, BondState::Bonding) => {
               debug!("Pairing with {} in progress", self.target);
               on_bonding();
            },
            (_, BondState::Bonding) => {},
            (BondState::Bonding, BondState::None) => {
               warn!("Pairing with {} failed", self.target);
               return Err(AttemptError::PairingFailed);
            },
            (_, BondState::None) => {},
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::bluetooth::fake::{FakeRadio, OTHER};

   const TARGET: Address = Address([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

   #[tokio::test]
   async fn test_resolves_on_bonded_and_reports_progress() {
      let radio = FakeRadio::new();
      let monitor = BondMonitor::register(&radio, TARGET).unwrap();
      assert_eq!(radio.bond_listeners(), 1);

      radio.emit_bond(TARGET, BondState::None, BondState::Bonding);
      radio.emit_bond(TARGET, BondState::Bonding, BondState::Bonded);

      let mut progress = 0;
      let outcome = monitor.resolve(None, || progress += 1).await;
      assert!(outcome.is_ok());
      assert_eq!(progress, 1);
      assert_eq!(radio.bond_listeners(), 0);
   }

   #[tokio::test]
   async fn test_fails_when_bonding_falls_back_to_none() {
      let radio = FakeRadio::new();
      let monitor = BondMonitor::register(&radio, TARGET).unwrap();

      radio.emit_bond(TARGET, BondState::None, BondState::Bonding);
      radio.emit_bond(TARGET, BondState::Bonding, BondState::None);

      let outcome = monitor.resolve(None, || {}).await;
      assert!(matches!(outcome, Err(AttemptError::PairingFailed)));
      assert_eq!(radio.bond_listeners(), 0);
   }

   #[tokio::test]
   async fn test_ignores_other_devices() {
      let radio = FakeRadio::new();
      let monitor = BondMonitor::register(&radio, TARGET).unwrap();

      radio.emit_bond(OTHER, BondState::Bonding, BondState::None);
      radio.emit_bond(OTHER, BondState::Bonding, BondState::Bonded);
      // `none` without a preceding `bonding` is not a failure.
      radio.emit_bond(TARGET, BondState::Bonded, BondState::None);
      radio.emit_bond(TARGET, BondState::Bonding, BondState::Bonded);

      let mut progress = 0;
      assert!(monitor.resolve(None, || progress += 1).await.is_ok());
      assert_eq!(progress, 0);
   }

   #[tokio::test]
   async fn test_progress_only_reported_from_none() {
      let radio = FakeRadio::new();
      let monitor = BondMonitor::register(&radio, TARGET).unwrap();

      radio.emit_bond(TARGET, BondState::Bonded, BondState::Bonding);
      radio.emit_bond(TARGET, BondState::Bonding, BondState::Bonding);
      radio.emit_bond(TARGET, BondState::None, BondState::Bonding);
      radio.emit_bond(TARGET, BondState::Bonding, BondState::Bonded);

      let mut progress = 0;
      assert!(monitor.resolve(None, || progress += 1).await.is_ok());
      assert_eq!(progress, 1);
   }

   #[tokio::test(start_paused = true)]
   async fn test_optional_limit_times_out() {
      let radio = FakeRadio::new();
      let monitor = BondMonitor::register(&radio, TARGET).unwrap();

      let outcome = monitor.resolve(Some(Duration::from_secs(30)), || {}).await;
      assert!(matches!(outcome, Err(AttemptError::PairingTimeout(_))));
      assert_eq!(radio.bond_listeners(), 0);
   }

   #[test]
   fn test_denied_registration() {
      let radio = FakeRadio::new();
      radio.deny_listeners(true);
      assert!(BondMonitor::register(&radio, TARGET).is_err());
   }
}
