#![cfg_attr(not(test), no_std)]
//! # owif
//!
//! Core of a multi-channel 1-Wire bridge.
//!
//! The layers, leaf first:
//! - [`i2c`]: transport with one-shot bus recovery, and TCA9548A sub-bus channels.
//! - [`system`]: a [`OneWireSystem`] owning one [`OneWireChannel`] per enabled
//!   sub-bus and the map of discovered devices.
//! - [`cmd`]: the [`Command`] value type, the queue-driven [`Dispatcher`] and the
//!   subscription scheduler.
//! - [`request`]: JSON request parsing for transports.

extern crate alloc;

pub mod cmd;
pub mod config;
pub mod i2c;
pub mod request;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod system;

pub use cmd::{
    Action, Command, CommandError, Dispatcher, ErrorCallback, ErrorResponse, Response,
    ResultCallback, Severity, SubAction, SystemControl, Timer,
};
pub use config::OneWireConfig;
pub use request::parse_request;
pub use embedded_onewire::{FamilyCode, OneWireAddress};
pub use system::{Attribute, ChannelId, OneWireChannel, OneWireDevice, OneWireSystem};
