//! # lib_memorial
//!
//! Shared engine for the memorial lights controller. Devices report their
//! power state over broadcast UDP, and each device carries up to two calendar
//! dates on which it should be lit. Everything needed to track and drive that
//! fleet lives here; the `servers` crate only wires it into a process.
//!
//! ## Modules:
//! - **`model`**: device records, power states and commands.
//! - **`store`**: durable, atomically replaced snapshot of the registry.
//! - **`registry`**: the single lock-protected device map.
//! - **`protocol`**: the `<device_id>,<token>` datagram format.
//! - **`transport`**: fire-and-forget broadcast of ON/OFF commands.
//! - **`ingestion`**: the UDP listener feeding state reports into the registry.
//! - **`calendar`**: date parsing and the activation transition table.
//! - **`scheduler`**: the periodic pass that turns calendar dates into commands.
//! - **`service`**: the façade used by the HTTP layer.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod calendar;
pub mod error;
pub mod ingestion;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod transport;
pub mod utils;

// --- Public API Re-exports ---
pub use error::{RegistryError, ServiceError, StoreError, TransportError};
pub use ingestion::IngestionListener;
pub use model::{Command, DeviceMap, DeviceRecord, PowerState};
pub use registry::Registry;
pub use scheduler::{CalendarScheduler, PassReport};
pub use service::{ControlRequest, DeviceService, UpdateRequest};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
pub use transport::{CommandTransport, UdpBroadcaster};
