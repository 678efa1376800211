//! # Calendar Rules
//!
//! Pure functions deciding whether a device should be lit today and which
//! command, if any, moves it there.

use crate::model::{Command, DeviceRecord, PowerState};
use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a stored date. Blank or malformed values are `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// True iff either stored date parses and equals `today`. A bad birth date
/// does not stop the passing date from being checked, and vice versa.
pub fn is_active_on(record: &DeviceRecord, today: NaiveDate) -> bool {
    [record.birth_date.as_str(), record.passing_date.as_str()]
        .into_iter()
        .filter_map(parse_date)
        .any(|date| date == today)
}

/// Edge-triggered transition table.
///
/// | active | last state     | command |
/// |--------|----------------|---------|
/// | yes    | `On`           | none    |
/// | yes    | anything else  | `ON`    |
/// | no     | `On`           | `OFF`   |
/// | no     | anything else  | none    |
///
/// Comparing against the last state rather than a separate "last commanded"
/// value means a device knocked out of `On` during its day gets `ON` again on
/// the next pass.
pub fn transition(active: bool, last_state: &PowerState) -> Option<Command> {
    match (active, last_state.is_on()) {
        (true, false) => Some(Command::On),
        (false, true) => Some(Command::Off),
        _ => None,
    }
}
