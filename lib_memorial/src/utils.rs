//! # Utilities
//!
//! Defaults shared by the library and the server binary, and a couple of small
//! time helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Built-in settings. The server's config layer starts from these.
pub mod defaults {
    /// UDP port devices report on and listen to for commands.
    pub const UDP_PORT: u16 = 4210;
    /// Largest datagram the listener reads.
    pub const RECV_BUFFER_SIZE: usize = 1024;
    pub const STORE_PATH: &str = "devices.json";
    pub const SCHEDULER_INTERVAL_SECS: u64 = 60;
    pub const BROADCAST_ADDR: &str = "255.255.255.255";
    pub const HTTP_PORT: u16 = 5000;
    /// Back-off before the listener re-binds after a socket failure.
    pub const REBIND_DELAY_SECS: u64 = 5;
}

/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

/// Process-local calendar date.
pub fn local_today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
