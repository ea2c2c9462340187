//! Headset pairing and connection management.
//!
//! This module contains the device model, the published connection state
//! and the orchestration of bonding and profile connection attempts.

pub mod bond;
pub mod device;
pub mod directory;
pub mod orchestrator;
pub mod profile;
pub mod state;
