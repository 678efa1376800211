//! # Device Model
//!
//! The persisted shape of a device and the two small vocabularies that flow
//! over the wire: the state a device reports and the command we send back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Device identifier -> record. Ordered so snapshots serialize identically.
pub type DeviceMap = BTreeMap<String, DeviceRecord>;

/// # Power State
///
/// The last known or last commanded state of a device.
///
/// Devices may report tokens other than `ON`/`OFF`; those are kept verbatim
/// in `Reported` and are treated as "not on" by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    /// Token `ON`.
    On,
    /// Token `OFF`.
    Off,
    /// Any other token a device reported, e.g. `MANUAL_OFF`.
    Reported(String),
}

impl PowerState {
    /// Returns the wire token for this state.
    pub fn as_str(&self) -> &str {
        match self {
            PowerState::On => "ON",
            PowerState::Off => "OFF",
            PowerState::Reported(token) => token,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }
}

impl From<&str> for PowerState {
    fn from(token: &str) -> Self {
        match token {
            "ON" => PowerState::On,
            "OFF" => PowerState::Off,
            other => PowerState::Reported(other.to_string()),
        }
    }
}

impl From<String> for PowerState {
    fn from(token: String) -> Self {
        match token.as_str() {
            "ON" => PowerState::On,
            "OFF" => PowerState::Off,
            _ => PowerState::Reported(token),
        }
    }
}

impl From<PowerState> for String {
    fn from(state: PowerState) -> Self {
        match state {
            PowerState::On => "ON".to_string(),
            PowerState::Off => "OFF".to_string(),
            PowerState::Reported(token) => token,
        }
    }
}

impl From<Command> for PowerState {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::On => PowerState::On,
            Command::Off => PowerState::Off,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Command
///
/// What the controller can tell a device to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    On,
    Off,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::On => "ON",
            Command::Off => "OFF",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a command token is anything but `ON` or `OFF`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(Command::On),
            "OFF" => Ok(Command::Off),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// # Device Record
///
/// One entry of the registry. The device identifier is the map key and is
/// not repeated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// `YYYY-MM-DD`, or blank. Stored verbatim even when unparsable.
    #[serde(default)]
    pub birth_date: String,
    /// `YYYY-MM-DD`, or blank. Stored verbatim even when unparsable.
    #[serde(default)]
    pub passing_date: String,
    pub last_state: PowerState,
    /// Unix seconds of the last datagram received from this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<u64>,
}

impl DeviceRecord {
    /// A record as created on first contact: blank dates, the reported state.
    pub fn first_contact(state: PowerState, seen_at: u64) -> Self {
        Self {
            birth_date: String::new(),
            passing_date: String::new(),
            last_state: state,
            last_seen: Some(seen_at),
        }
    }
}
