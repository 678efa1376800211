//! # Wire Protocol
//!
//! Both directions use the same UTF-8 text datagram: `<device_id>,<token>`.
//! Devices send their state as the token; the controller sends `ON` or `OFF`.

use crate::model::{Command, PowerState};

/// A well-formed state report from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReport {
    pub device_id: String,
    pub state: PowerState,
}

/// Parses a device datagram.
///
/// Invalid UTF-8 is replaced, surrounding whitespace is trimmed and the
/// payload is split on the first comma. Everything after that comma is the
/// state token, unvalidated. Payloads without a comma or with an empty device
/// id yield `None`.
pub fn parse_report(payload: &[u8]) -> Option<StateReport> {
    let text = String::from_utf8_lossy(payload);
    let (device_id, state) = text.trim().split_once(',')?;
    if device_id.is_empty() {
        return None;
    }
    Some(StateReport {
        device_id: device_id.to_string(),
        state: PowerState::from(state),
    })
}

pub fn encode_command(device_id: &str, cmd: Command) -> String {
    format!("{},{}", device_id, cmd)
}
