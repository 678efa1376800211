//! # Device Service
//!
//! The façade the request layer calls. It validates caller input, then
//! delegates to the registry and the broadcast transport. Request types carry
//! optional fields so a JSON body deserializes as-is and missing fields turn
//! into proper errors here rather than deserialization failures.

use crate::error::ServiceError;
use crate::model::{Command, DeviceMap, PowerState};
use crate::registry::Registry;
use crate::transport::CommandTransport;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    pub device_id: Option<String>,
    pub birth_date: Option<String>,
    pub passing_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlRequest {
    pub device_id: Option<String>,
    pub cmd: Option<String>,
}

#[derive(Clone)]
pub struct DeviceService {
    registry: Arc<Registry>,
    transport: Arc<dyn CommandTransport>,
}

impl DeviceService {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn CommandTransport>) -> Self {
        Self { registry, transport }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Consistent snapshot of every known device.
    pub async fn list_devices(&self) -> DeviceMap {
        self.registry.snapshot().await
    }

    /// Sets birth and/or passing date of a known device.
    pub async fn update_dates(&self, request: UpdateRequest) -> Result<(), ServiceError> {
        let device_id = match request.device_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                log::warn!("Rejected date update without device_id");
                return Err(ServiceError::MissingDeviceId);
            }
        };

        self.registry
            .set_dates(&device_id, request.birth_date, request.passing_date)
            .await
            .map_err(|e| {
                log::warn!("Date update for '{}' failed: {}", device_id, e);
                ServiceError::from(e)
            })
    }

    /// Broadcasts `cmd` to `device_id` whether or not it is registered, then
    /// records the new state if it is.
    pub async fn manual_control(&self, request: ControlRequest) -> Result<(), ServiceError> {
        let device_id = request
            .device_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::BadRequest("missing device_id".to_string()))?;
        let cmd: Command = request
            .cmd
            .as_deref()
            .unwrap_or_default()
            .parse::<Command>()
            .map_err(|e| ServiceError::BadRequest(format!("{e}")))?;

        self.transport.send(&device_id, cmd)?;
        log::info!("Manual {} sent to '{}'", cmd, device_id);

        if !self.registry.set_state(&device_id, PowerState::from(cmd)).await? {
            log::debug!("'{}' is not registered, state not recorded", device_id);
        }
        Ok(())
    }
}
