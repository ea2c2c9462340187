//! Bluetooth platform layer.
//!
//! This module defines the radio seams the headset core runs against, the
//! BlueZ implementation of them and device discovery on top.

pub mod bluez;
pub mod discovery;
#[cfg(test)]
pub mod fake;
pub mod platform;
