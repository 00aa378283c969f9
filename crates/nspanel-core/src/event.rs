//! Events emitted by the connector.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One attribute value inside a [`StoreDeviceState`] notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateEntry {
    /// Capability type, e.g. `power`
    pub capability: String,
    /// Attribute type, e.g. `powerState`
    pub attribute: String,
    /// Value to store; `null` when the attribute has no value
    pub value: serde_json::Value,
    /// Capability instance name, set for multi-instance capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// Request for consumers to store (and publish) a device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDeviceState {
    pub connector: Uuid,
    pub gateway: Uuid,
    pub device: Uuid,
    pub state: Vec<DeviceStateEntry>,
}

/// Events flowing through the connector event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorEvent {
    /// A device state has to be stored and pushed to the panel
    StoreDeviceState(StoreDeviceState),

    /// A load pass finished and the new device graph is committed
    DevicesLoaded {
        connector: Uuid,
        devices: usize,
        skipped: usize,
    },
}

impl ConnectorEvent {
    pub fn is_device_state(&self) -> bool {
        matches!(self, Self::StoreDeviceState(_))
    }

    pub fn connector(&self) -> Uuid {
        match self {
            Self::StoreDeviceState(state) => state.connector,
            Self::DevicesLoaded { connector, .. } => *connector,
        }
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub id: Uuid,
    pub source: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
