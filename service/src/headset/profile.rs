//! One-shot watcher for the headset profile connection of a single device.

use std::time::Duration;

use bluer::Address;
use log::{debug, warn};
use tokio::{sync::broadcast::error::RecvError, time};

use crate::{
   bluetooth::platform::RadioAdapter,
   error::Result,
   event::{Listener, ProfileChange, ProfileState},
};

/// Default bound on waiting for a profile connection to resolve.
pub const PROFILE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a profile connection attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOutcome {
   Connected,
   Disconnected,
   TimedOut,
}

/// Listens for the profile connection of one device during one attempt.
///
/// Only transitions out of `connecting` resolve the monitor.
pub struct ProfileMonitor {
   target: Address,
   listener: Listener<ProfileChange>,
}

impl ProfileMonitor {
   /// Registers the listener. Must happen before the connect is dispatched.
   pub fn register<R: RadioAdapter>(radio: &R, target: Address) -> Result<Self> {
      let listener = radio.profile_listener()?;
      debug!("Profile monitor registered for {target}");
      Ok(Self { target, listener })
   }

   /// Waits at most `limit` for the connection to resolve.
   ///
   /// The listener is released before this returns, whatever the outcome.
   pub async fn wait(mut self, limit: Duration) -> ProfileOutcome {
      let outcome = time::timeout(limit, self.next_outcome())
         .await
         .unwrap_or(ProfileOutcome::TimedOut);
      debug!(
         "Profile monitor for {} released: {outcome:?}",
         self.target
      );
      outcome
   }

   async fn next_outcome(&mut self) -> ProfileOutcome {
      loop {
         let change = match self.listener.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(n)) => {
               warn!("Profile monitor for {} missed {n} notifications", self.target);
               continue;
            },
            Err(RecvError::Closed) => {
               warn!("Profile notifications ended before {} resolved", self.target);
               return ProfileOutcome::Disconnected;
            },
         };
         if change.address != self.target || change.previous != ProfileState::Connecting {
            continue;
         }

         match change.current {
            ProfileState::Connected => return ProfileOutcome::Connected,
            ProfileState::Disconnected => return ProfileOutcome::Disconnected,
            ProfileState::Connecting | ProfileState::Disconnecting => {},
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
   async fn test_connected_after_connecting() {
      let radio = FakeRadio::new();
      let monitor = ProfileMonitor::register(&radio, TARGET).unwrap();

      radio.emit_profile(OTHER, ProfileState::Connecting, ProfileState::Disconnected);
      radio.emit_profile(TARGET, ProfileState::Disconnected, ProfileState::Connecting);
      radio.emit_profile(TARGET, ProfileState::Connecting, ProfileState::Connected);

      assert_eq!(
         monitor.wait(PROFILE_CONNECT_TIMEOUT).await,
         ProfileOutcome::Connected
      );
      assert_eq!(radio.profile_listeners(), 0);
   }

   #[tokio::test]
   async fn test_disconnected_after_connecting() {
      let radio = FakeRadio::new();
      let monitor = ProfileMonitor::register(&radio, TARGET).unwrap();

      // Not coming from `connecting`: ignored.
      radio.emit_profile(TARGET, ProfileState::Connected, ProfileState::Disconnected);
      radio.emit_profile(TARGET, ProfileState::Connecting, ProfileState::Disconnected);

      assert_eq!(
         monitor.wait(PROFILE_CONNECT_TIMEOUT).await,
         ProfileOutcome::Disconnected
      );
   }

   #[tokio::test(start_paused = true)]
   async fn test_times_out_and_unregisters() {
      let radio = FakeRadio::new();
      let monitor = ProfileMonitor::register(&radio, TARGET).unwrap();
      assert_eq!(radio.profile_listeners(), 1);

      let started = time::Instant::now();
      let outcome = monitor.wait(PROFILE_CONNECT_TIMEOUT).await;
      assert_eq!(outcome, ProfileOutcome::TimedOut);
      assert!(started.elapsed() >= PROFILE_CONNECT_TIMEOUT);
      assert_eq!(radio.profile_listeners(), 0);
   }

   #[tokio::test(start_paused = true)]
   async fn test_cancelled_wait_unregisters() {
      let radio = FakeRadio::new();
      let monitor = ProfileMonitor::register(&radio, TARGET).unwrap();

      let task = tokio::spawn(monitor.wait(PROFILE_CONNECT_TIMEOUT));
      tokio::task::yield_now().await;
      task.abort();
      assert!(task.await.unwrap_err().is_cancelled());
      assert_eq!(radio.profile_listeners(), 0);
   }
}
