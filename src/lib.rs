//! Driver for the Bookoo Themis Ultra coffee scale.
//!
//! - [`decoding`] / [`encoding`] - the 20-byte telemetry and 6-byte command frames
//! - [`state`] - latest readings and the update hook
//! - [`connection`] - link lifecycle and reconnect cooldown
//! - [`dispatcher`] - serialized command writes
//! - [`scale`] - [`BookooScale`], the public actions
//! - [`btle_transport`] / [`scanner`] - btleplug glue

pub mod btle_transport;
pub mod config;
pub mod connection;
pub mod constants;
pub mod decoding;
pub mod dispatcher;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod scale;
pub mod scanner;
pub mod state;
pub mod transport;

pub use btle_transport::BtleTransport;
pub use config::ScaleConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use constants::{Command, StopCondition, Unit};
pub use decoding::{decode, TelemetryFrame};
pub use dispatcher::CommandDispatcher;
pub use encoding::{encode_command, CommandFrame};
pub use error::{DecodeError, Result, ScaleError, TransportError};
pub use scale::BookooScale;
pub use scanner::{BookooScanner, DiscoveredScale};
pub use state::{DeviceState, DeviceStateSnapshot, Setting, SettingKind, SupportedSettings};
pub use transport::{DisconnectHook, Endpoint, Transport};
