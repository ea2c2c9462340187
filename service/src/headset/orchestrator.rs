//! Connection orchestration for headsets.
//!
//! A `ConnectionManager` handle forwards user requests to an actor that
//! owns the published connection state. Every connect or disconnect runs as
//! its own attempt task:
//!
//! ```text
//! radio enabled? -> bond state -> [pair + await bond] -> profile connect
//!                -> await profile (bounded) -> Connected | Error
//! ```
//!
//! Failures inside an attempt never reach the caller; they end the attempt
//! with an `Error` state that keeps the device for a retry.

use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio::{
   select,
   sync::{mpsc, oneshot, watch},
   task::JoinSet,
};

use crate::{
   bluetooth::platform::{ProfileConnector, RadioAdapter},
   config::Config,
   error::{AttemptError, HeadsetError, Result},
   headset::{
      bond::BondMonitor,
      device::{BondState, Device},
      profile::{PROFILE_CONNECT_TIMEOUT, ProfileMonitor, ProfileOutcome},
      state::{Attempt, ConnectionState, Failure, Phase, StatePublisher},
   },
};

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Bounds applied to a single connect attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptLimits {
   pub profile_connect: Duration,
   /// Pairing is unbounded when unset.
   pub pairing: Option<Duration>,
}

impl Default for AttemptLimits {
   fn default() -> Self {
      Self {
         profile_connect: PROFILE_CONNECT_TIMEOUT,
         pairing: None,
      }
   }
}

impl From<&Config> for AttemptLimits {
   fn from(config: &Config) -> Self {
      Self {
         profile_connect: config.profile_connect_timeout(),
         pairing: config.pairing_timeout(),
      }
   }
}

// === Commands ===

#[derive(Debug)]
enum ManagerCommand {
   Connect(Device, oneshot::Sender<()>),
   Disconnect(Device, oneshot::Sender<()>),
   Shutdown(oneshot::Sender<()>),
}

// === Handle ===

/// Entry point for connecting and disconnecting headsets.
///
/// This type is cheaply cloneable; the actor stops once every handle is
/// dropped or `shutdown` is called, cancelling all in-flight attempts.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
   inbox: mpsc::Sender<ManagerCommand>,
   state: watch::Receiver<ConnectionState>,
}

impl ConnectionManager {
   pub fn new<R: RadioAdapter>(radio: Arc<R>, limits: AttemptLimits) -> Self {
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      let publisher = StatePublisher::new();
      let state = publisher.subscribe();
      tokio::spawn(
         ManagerActor {
            radio,
            limits,
            publisher,
            inbox: command_rx,
            attempts: JoinSet::new(),
         }
         .run(),
      );
      Self {
         inbox: command_tx,
         state,
      }
   }

   /// Starts a connect attempt for `device`, superseding any running attempt.
   ///
   /// Returns once the attempt is dispatched; its progress and result are
   /// published through `state`.
   pub async fn connect(&self, device: Device) -> Result<()> {
      self.request(|tx| ManagerCommand::Connect(device, tx)).await
   }

   /// Starts removing the bond with `device`.
   pub async fn disconnect(&self, device: Device) -> Result<()> {
      self.request(|tx| ManagerCommand::Disconnect(device, tx)).await
   }

   /// Stops the actor, cancelling in-flight attempts and their monitors.
   pub async fn shutdown(&self) {
      if self.request(ManagerCommand::Shutdown).await.is_err() {
         debug!("Connection manager already stopped");
      }
   }

   /// Latest-wins view of the connection state.
   pub fn state(&self) -> watch::Receiver<ConnectionState> {
      let mut state = self.state.clone();
      state.mark_unchanged();
      state
   }

   pub fn current_state(&self) -> ConnectionState {
      self.state.borrow().clone()
   }

   async fn request(
      &self,
      command: impl FnOnce(oneshot::Sender<()>) -> ManagerCommand,
   ) -> Result<()> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(command(tx))
         .await
         .map_err(|_| HeadsetError::ManagerShutdown)?;
      rx.await.map_err(|_| HeadsetError::ManagerShutdown)
   }
}

// === Actor ===

struct ManagerActor<R> {
   radio: Arc<R>,
   limits: AttemptLimits,
   publisher: StatePublisher,
   inbox: mpsc::Receiver<ManagerCommand>,
   attempts: JoinSet<()>,
}

impl<R: RadioAdapter> ManagerActor<R> {
   async fn run(mut self) {
      info!("Connection manager starting up");

      loop {
         select! {
             cmd = self.inbox.recv() => {
                 match cmd {
                     Some(ManagerCommand::Shutdown(reply)) => {
                         self.cleanup().await;
                         let _ = reply.send(());
                         return;
                     }
                     Some(cmd) => self.handle_command(cmd),
                     None => break,
                 }
             }
             Some(joined) = self.attempts.join_next() => {
                 if let Err(e) = joined
                    && e.is_panic()
                 {
                    error!("Attempt failed: {}", HeadsetError::TaskPanicked(e));
                 }
             }
         }
      }

      info!("Connection manager shutting down");
      self.cleanup().await;
   }

   fn handle_command(&mut self, cmd: ManagerCommand) {
      match cmd {
         ManagerCommand::Connect(device, reply) => {
            let attempt = self.publisher.begin_attempt();
            info!("Connect attempt {} for {device}", attempt.generation());
            self.attempts.spawn(connect_attempt(
               self.radio.clone(),
               attempt,
               device,
               self.limits,
            ));
            let _ = reply.send(());
         },
         ManagerCommand::Disconnect(device, reply) => {
            let attempt = self.publisher.begin_attempt();
            info!("Disconnect attempt {} for {device}", attempt.generation());
            self
               .attempts
               .spawn(disconnect_attempt(self.radio.clone(), attempt, device));
            let _ = reply.send(());
         },
         ManagerCommand::Shutdown(reply) => {
            // Handled by the run loop.
            let _ = reply.send(());
         },
      }
   }

   async fn cleanup(&mut self) {
      if !self.attempts.is_empty() {
         info!("Cancelling {} in-flight attempts", self.attempts.len());
      }
      self.attempts.shutdown().await;
   }
}

// === Attempts ===

async fn connect_attempt<R: RadioAdapter>(
   radio: Arc<R>,
   attempt: Attempt,
   device: Device,
   limits: AttemptLimits,
) {
   let state = match establish(&*radio, &attempt, &device, limits).await {
      Ok(()) => ConnectionState::Connected(device),
      Err(AttemptError::Superseded) => {
         info!("Abandoning connect attempt {} for {device}", attempt.generation());
         return;
      },
      Err(e) => {
         warn!("Connecting to {device} failed: {e}");
         let failure = e.failure(Failure::ConnectFailed);
         ConnectionState::Error(device, failure)
      },
   };
   attempt.publish(state);
}

async fn establish<R: RadioAdapter>(
   radio: &R,
   attempt: &Attempt,
   device: &Device,
   limits: AttemptLimits,
) -> std::result::Result<(), AttemptError> {
   let address = device.address();

   if !radio.is_enabled().await? {
      return Err(AttemptError::RadioDisabled);
   }

   match radio.bond_state(address).await? {
      BondState::Bonded => {
         debug!("{device} already bonded, skipping pairing");
      },
      BondState::None => {
         attempt.publish(ConnectionState::Connecting(Phase::Pairing));
         let monitor = BondMonitor::register(radio, address)?;
         radio.request_bond(address).await?;
         await_bond(monitor, attempt, limits.pairing).await?;
      },
      BondState::Bonding => {
         // Someone else started pairing; wait for it instead of restarting it.
         attempt.publish(ConnectionState::Connecting(Phase::PairingInProgress));
         let monitor = BondMonitor::register(radio, address)?;
         // The pairing may have resolved before the monitor was registered.
         match radio.bond_state(address).await? {
            BondState::Bonded => {
               attempt.publish(ConnectionState::Connecting(Phase::Paired));
            },
            BondState::Bonding => {
               await_bond(monitor, attempt, limits.pairing).await?;
            },
            BondState::None => {
               warn!("Pending pairing with {device} ended before it could be observed");
               return Err(AttemptError::PairingFailed);
            },
         }
      },
   }

   if !attempt.is_current() {
      return Err(AttemptError::Superseded);
   }

   connect_profile(radio, attempt, device, limits.profile_connect).await
}

async fn await_bond(
   monitor: BondMonitor,
   attempt: &Attempt,
   limit: Option<Duration>,
) -> std::result::Result<(), AttemptError> {
   monitor
      .resolve(limit, || {
         attempt.publish(ConnectionState::Connecting(Phase::PairingInProgress));
      })
      .await?;
   attempt.publish(ConnectionState::Connecting(Phase::Paired));
   Ok(())
}

async fn connect_profile<R: RadioAdapter>(
   radio: &R,
   attempt: &Attempt,
   device: &Device,
   limit: Duration,
) -> std::result::Result<(), AttemptError> {
   let address = device.address();
   attempt.publish(ConnectionState::Connecting(Phase::Connecting));

   let monitor = ProfileMonitor::register(radio, address)?;

   // The handle is only held while dispatching the connect.
   let profile = radio.acquire_profile().await?;
   let dispatched = profile.connect(address).await;
   radio.release_profile(profile);
   dispatched?;

   match monitor.wait(limit).await {
      ProfileOutcome::Connected => Ok(()),
      ProfileOutcome::Disconnected => Err(AttemptError::ConnectionRefused),
      ProfileOutcome::TimedOut => Err(AttemptError::ConnectionTimeout(limit)),
   }
}

async fn disconnect_attempt<R: RadioAdapter>(radio: Arc<R>, attempt: Attempt, device: Device) {
   let address = device.address();
   attempt.publish(ConnectionState::Disconnecting);

   match radio.acquire_profile().await {
      Ok(profile) => {
         if let Err(e) = profile.disconnect(address).await {
            debug!("Profile disconnect from {device} failed: {e}");
         }
         radio.release_profile(profile);
      },
      Err(e) => debug!("No profile handle for disconnecting {device}: {e}"),
   }

   let state = match radio.remove_bond(address).await {
      Ok(()) => {
         info!("Removed bond with {device}");
         ConnectionState::Disconnected(device)
      },
      Err(e) => {
         let e = AttemptError::DisconnectFailed(e);
         warn!("Disconnecting {device} failed: {e}");
         let failure = e.failure(Failure::DisconnectFailed);
         ConnectionState::Error(device, failure)
      },
   };
   attempt.publish(state);
}
