//! Configuration and state collaborators consumed by the loader.
//!
//! The loader never talks to storage directly. It reads device, channel and
//! property configuration through the traits below and reports freshly
//! loaded attribute values through a [`StateSink`]. [`MemoryRepository`]
//! implements every reader on top of in-memory maps.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::constraints::Constraints;
use crate::types::DataType;
use crate::value::{Pending, PropertyValue};
use nspanel_core::{ConnectorEvent, EventBus, StoreDeviceState};

/// Device type of gateways, whose children are the panel devices.
pub const GATEWAY_DEVICE_TYPE: &str = "gateway";

/// Persisted configuration of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub id: Uuid,
    pub identifier: String,
    pub connector: Uuid,
    /// Parent gateway, `None` for gateways
    #[serde(default)]
    pub parent: Option<Uuid>,
    /// `gateway`, `sub_device` or `third_party_device`
    pub device_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceConfiguration {
    pub fn is_gateway(&self) -> bool {
        self.device_type == GATEWAY_DEVICE_TYPE
    }

    /// Display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }
}

/// Persisted configuration of a device channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfiguration {
    pub id: Uuid,
    pub device: Uuid,
    /// Capability key, e.g. `power` or `toggle_2`
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// How a property gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    /// Fixed configured value
    Variable {
        #[serde(default)]
        value: Option<PropertyValue>,
    },
    /// Value stored in the property state
    Dynamic,
    /// Mirror of another property
    Mapped { parent: Uuid },
}

/// Value format of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyFormat {
    Values(Vec<PropertyValue>),
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

/// Persisted property of a device (device metadata such as `category`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperty {
    pub id: Uuid,
    pub device: Uuid,
    pub identifier: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl DeviceProperty {
    pub fn variable(device: Uuid, identifier: &str, value: impl Into<PropertyValue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            identifier: identifier.to_string(),
            kind: PropertyKind::Variable {
                value: Some(value.into()),
            },
        }
    }

    /// Configured value of a variable property.
    pub fn value(&self) -> Option<&PropertyValue> {
        match &self.kind {
            PropertyKind::Variable { value } => value.as_ref(),
            _ => None,
        }
    }
}

/// Persisted property of a channel. Backs an attribute or a configuration
/// row, sharing its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProperty {
    pub id: Uuid,
    pub channel: Uuid,
    pub identifier: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub format: Option<PropertyFormat>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub default: Option<PropertyValue>,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl ChannelProperty {
    pub fn new(channel: Uuid, identifier: &str, data_type: DataType, kind: PropertyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            identifier: identifier.to_string(),
            data_type,
            format: None,
            step: None,
            unit: None,
            default: None,
            kind,
        }
    }

    pub fn dynamic(channel: Uuid, identifier: &str, data_type: DataType) -> Self {
        Self::new(channel, identifier, data_type, PropertyKind::Dynamic)
    }

    pub fn with_format(mut self, format: PropertyFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Constraints declared on the property itself.
    pub fn constraints(&self) -> Constraints {
        let mut constraints = Constraints::default();
        match &self.format {
            Some(PropertyFormat::Values(values)) => {
                constraints.valid_values = Some(values.clone());
            }
            Some(PropertyFormat::Range { min, max }) => {
                constraints.min_value = *min;
                constraints.max_value = *max;
            }
            None => {}
        }
        constraints.min_step = self.step;
        constraints.unit = self.unit.clone();
        constraints.default_value = self.default.clone();
        constraints
    }
}

/// Stored state of a dynamic or mapped property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyState {
    pub actual_value: Option<PropertyValue>,
    pub expected_value: Option<PropertyValue>,
    pub pending: Pending,
    pub valid: bool,
}

#[async_trait]
pub trait DevicesRepository: Send + Sync {
    /// Devices of a connector, optionally restricted to one device type.
    async fn find_devices(
        &self,
        connector: Uuid,
        device_type: Option<&str>,
    ) -> anyhow::Result<Vec<DeviceConfiguration>>;

    /// Children of a gateway.
    async fn find_children(&self, parent: Uuid) -> anyhow::Result<Vec<DeviceConfiguration>>;
}

#[async_trait]
pub trait ChannelsRepository: Send + Sync {
    async fn find_channels(&self, device: Uuid) -> anyhow::Result<Vec<ChannelConfiguration>>;
}

#[async_trait]
pub trait PropertiesRepository: Send + Sync {
    async fn find_device_properties(&self, device: Uuid) -> anyhow::Result<Vec<DeviceProperty>>;

    async fn find_channel_properties(&self, channel: Uuid) -> anyhow::Result<Vec<ChannelProperty>>;

    async fn find_channel_property(&self, id: Uuid) -> anyhow::Result<Option<ChannelProperty>>;
}

#[async_trait]
pub trait PropertyStateRepository: Send + Sync {
    /// Stored state of a property, `None` when nothing was stored yet.
    async fn read_state(&self, property: Uuid) -> anyhow::Result<Option<PropertyState>>;
}

/// Receiver of outbound loader notifications.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn store_device_state(&self, message: StoreDeviceState) -> anyhow::Result<()>;

    /// Called once the new graph is committed.
    async fn devices_loaded(
        &self,
        _connector: Uuid,
        _devices: usize,
        _skipped: usize,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Publishes notifications on the connector event bus.
///
/// A notification is refused, not overwritten, when a subscriber has not
/// read the previous `capacity` events, or when nobody listens.
#[async_trait]
impl StateSink for EventBus {
    async fn store_device_state(&self, message: StoreDeviceState) -> anyhow::Result<()> {
        self.try_publish(ConnectorEvent::StoreDeviceState(message), "loader")?;
        Ok(())
    }

    async fn devices_loaded(
        &self,
        connector: Uuid,
        devices: usize,
        skipped: usize,
    ) -> anyhow::Result<()> {
        self.try_publish(
            ConnectorEvent::DevicesLoaded {
                connector,
                devices,
                skipped,
            },
            "loader",
        )?;
        Ok(())
    }
}

/// Sink over a bounded queue. Sending waits for room, so no notification
/// is lost while the receiver is alive.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StoreDeviceState>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StoreDeviceState>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StateSink for ChannelSink {
    async fn store_device_state(&self, message: StoreDeviceState) -> anyhow::Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("Device state receiver was dropped"))
    }
}

/// In-memory implementation of every configuration reader.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    devices: DashMap<Uuid, DeviceConfiguration>,
    device_properties: DashMap<Uuid, DeviceProperty>,
    channels: DashMap<Uuid, ChannelConfiguration>,
    channel_properties: DashMap<Uuid, ChannelProperty>,
    states: DashMap<Uuid, PropertyState>,
    unreadable: DashSet<Uuid>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_device(&self, device: DeviceConfiguration) {
        self.devices.insert(device.id, device);
    }

    pub fn insert_device_property(&self, property: DeviceProperty) {
        self.device_properties.insert(property.id, property);
    }

    pub fn insert_channel(&self, channel: ChannelConfiguration) {
        self.channels.insert(channel.id, channel);
    }

    pub fn insert_channel_property(&self, property: ChannelProperty) {
        self.channel_properties.insert(property.id, property);
    }

    pub fn set_state(&self, property: Uuid, state: PropertyState) {
        self.states.insert(property, state);
    }

    /// Make state reads of a property fail.
    pub fn set_unreadable(&self, property: Uuid) {
        self.unreadable.insert(property);
    }

    pub fn remove_device(&self, id: Uuid) -> Option<DeviceConfiguration> {
        self.devices.remove(&id).map(|(_, device)| device)
    }
}

#[async_trait]
impl DevicesRepository for MemoryRepository {
    async fn find_devices(
        &self,
        connector: Uuid,
        device_type: Option<&str>,
    ) -> anyhow::Result<Vec<DeviceConfiguration>> {
        let mut devices: Vec<DeviceConfiguration> = self
            .devices
            .iter()
            .filter(|entry| entry.connector == connector)
            .filter(|entry| device_type.map_or(true, |t| entry.device_type == t))
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(devices)
    }

    async fn find_children(&self, parent: Uuid) -> anyhow::Result<Vec<DeviceConfiguration>> {
        let mut devices: Vec<DeviceConfiguration> = self
            .devices
            .iter()
            .filter(|entry| entry.parent == Some(parent))
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(devices)
    }
}

#[async_trait]
impl ChannelsRepository for MemoryRepository {
    async fn find_channels(&self, device: Uuid) -> anyhow::Result<Vec<ChannelConfiguration>> {
        let mut channels: Vec<ChannelConfiguration> = self
            .channels
            .iter()
            .filter(|entry| entry.device == device)
            .map(|entry| entry.value().clone())
            .collect();
        channels.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(channels)
    }
}

#[async_trait]
impl PropertiesRepository for MemoryRepository {
    async fn find_device_properties(&self, device: Uuid) -> anyhow::Result<Vec<DeviceProperty>> {
        let mut properties: Vec<DeviceProperty> = self
            .device_properties
            .iter()
            .filter(|entry| entry.device == device)
            .map(|entry| entry.value().clone())
            .collect();
        properties.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(properties)
    }

    async fn find_channel_properties(&self, channel: Uuid) -> anyhow::Result<Vec<ChannelProperty>> {
        let mut properties: Vec<ChannelProperty> = self
            .channel_properties
            .iter()
            .filter(|entry| entry.channel == channel)
            .map(|entry| entry.value().clone())
            .collect();
        properties.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(properties)
    }

    async fn find_channel_property(&self, id: Uuid) -> anyhow::Result<Option<ChannelProperty>> {
        Ok(self.channel_properties.get(&id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl PropertyStateRepository for MemoryRepository {
    async fn read_state(&self, property: Uuid) -> anyhow::Result<Option<PropertyState>> {
        if self.unreadable.contains(&property) {
            anyhow::bail!("State of property {} cannot be read", property);
        }
        Ok(self.states.get(&property).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_repository_queries() {
        let repository = MemoryRepository::new();
        let connector = Uuid::new_v4();
        let gateway = Uuid::new_v4();

        repository.insert_device(DeviceConfiguration {
            id: gateway,
            identifier: "gateway".to_string(),
            connector,
            parent: None,
            device_type: GATEWAY_DEVICE_TYPE.to_string(),
            name: None,
        });
        for identifier in ["plug-b", "plug-a"] {
            repository.insert_device(DeviceConfiguration {
                id: Uuid::new_v4(),
                identifier: identifier.to_string(),
                connector,
                parent: Some(gateway),
                device_type: "third_party_device".to_string(),
                name: None,
            });
        }

        let gateways = repository
            .find_devices(connector, Some(GATEWAY_DEVICE_TYPE))
            .await
            .unwrap();
        assert_eq!(gateways.len(), 1);
        assert!(gateways[0].is_gateway());

        let children = repository.find_children(gateway).await.unwrap();
        let identifiers: Vec<&str> = children.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["plug-a", "plug-b"]);
        assert_eq!(children[0].display_name(), "plug-a");

        assert_eq!(repository.find_devices(connector, None).await.unwrap().len(), 3);
        assert!(repository
            .find_devices(Uuid::new_v4(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_property_state_reads() {
        let repository = MemoryRepository::new();
        let property = Uuid::new_v4();

        assert_eq!(repository.read_state(property).await.unwrap(), None);

        repository.set_state(
            property,
            PropertyState {
                actual_value: Some("on".into()),
                valid: true,
                ..Default::default()
            },
        );
        let state = repository.read_state(property).await.unwrap().unwrap();
        assert_eq!(state.actual_value, Some("on".into()));

        repository.set_unreadable(property);
        assert!(repository.read_state(property).await.is_err());
    }

    #[test]
    fn test_property_constraints() {
        let property = ChannelProperty::dynamic(Uuid::new_v4(), "brightness", DataType::UChar)
            .with_format(PropertyFormat::Range {
                min: Some(1.0),
                max: Some(100.0),
            })
            .with_step(1.0)
            .with_unit("%");

        let constraints = property.constraints();
        assert_eq!(constraints.min_value, Some(1.0));
        assert_eq!(constraints.max_value, Some(100.0));
        assert_eq!(constraints.min_step, Some(1.0));
        assert_eq!(constraints.unit.as_deref(), Some("%"));
    }

    #[test]
    fn test_property_kind_serialization() {
        let property: ChannelProperty = serde_json::from_str(&format!(
            r#"{{"id": "{}", "channel": "{}", "identifier": "power_state", "data_type": "enum",
                "format": {{"values": ["on", "off"]}}, "kind": "mapped", "parent": "{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::nil()
        ))
        .unwrap();

        assert_eq!(property.kind, PropertyKind::Mapped { parent: Uuid::nil() });
        assert_eq!(
            property.format,
            Some(PropertyFormat::Values(vec!["on".into(), "off".into()]))
        );
    }

    fn state(device: Uuid) -> StoreDeviceState {
        StoreDeviceState {
            connector: Uuid::nil(),
            gateway: Uuid::nil(),
            device,
            state: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_sink_reports_loss() {
        let bus = EventBus::with_capacity(1);
        assert!(bus.store_device_state(state(Uuid::new_v4())).await.is_err());

        let mut states = bus.device_states();
        bus.store_device_state(state(Uuid::new_v4())).await.unwrap();
        assert!(bus.store_device_state(state(Uuid::new_v4())).await.is_err());
        assert!(states.try_recv().is_some());
        assert!(states.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_waits_for_room() {
        let (sink, mut rx) = ChannelSink::channel(1);
        let devices: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        let sent = devices.clone();
        let producer = tokio::spawn(async move {
            for device in sent {
                sink.store_device_state(state(device)).await.unwrap();
            }
        });

        let mut received = Vec::new();
        while let Some(message) = rx.recv().await {
            received.push(message.device);
        }
        producer.await.unwrap();
        assert_eq!(received, devices);

        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(sink.store_device_state(state(Uuid::nil())).await.is_err());
    }
}
