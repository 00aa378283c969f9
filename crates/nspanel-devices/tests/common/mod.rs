//! Shared fixture for loader tests.

#![allow(dead_code)]

use std::sync::Arc;

use nspanel_core::EventBus;
use nspanel_devices::{
    ChannelConfiguration, ChannelProperty, Collaborators, DataType, DeviceConfiguration,
    DeviceProperty, Loader, MappingCatalog, MemoryRepository, PropertyKind, PropertyState,
    PropertyValue, StateSink, GATEWAY_DEVICE_TYPE,
};
use uuid::Uuid;

pub struct Fixture {
    pub connector: Uuid,
    pub gateway: Uuid,
    pub repository: Arc<MemoryRepository>,
    pub bus: Arc<EventBus>,
}

impl Fixture {
    pub fn new() -> Self {
        let connector = Uuid::new_v4();
        let gateway = Uuid::new_v4();
        let repository = Arc::new(MemoryRepository::new());

        repository.insert_device(DeviceConfiguration {
            id: gateway,
            identifier: "nspanel-gateway".to_string(),
            connector,
            parent: None,
            device_type: GATEWAY_DEVICE_TYPE.to_string(),
            name: Some("Living room panel".to_string()),
        });

        Self {
            connector,
            gateway,
            repository,
            bus: Arc::new(EventBus::new()),
        }
    }

    /// Add a child device of the gateway with a `category` variable.
    pub fn add_device(&self, identifier: &str, device_type: &str, category: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.repository.insert_device(DeviceConfiguration {
            id,
            identifier: identifier.to_string(),
            connector: self.connector,
            parent: Some(self.gateway),
            device_type: device_type.to_string(),
            name: Some(format!("Device {}", identifier)),
        });
        self.repository
            .insert_device_property(DeviceProperty::variable(id, "category", category));
        id
    }

    pub fn add_device_variable(&self, device: Uuid, identifier: &str, value: impl Into<PropertyValue>) {
        self.repository
            .insert_device_property(DeviceProperty::variable(device, identifier, value));
    }

    pub fn add_channel(&self, device: Uuid, identifier: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.repository.insert_channel(ChannelConfiguration {
            id,
            device,
            identifier: identifier.to_string(),
            name: None,
        });
        id
    }

    pub fn add_dynamic(&self, channel: Uuid, identifier: &str, data_type: DataType) -> Uuid {
        self.add_property(ChannelProperty::dynamic(channel, identifier, data_type))
    }

    pub fn add_property(&self, property: ChannelProperty) -> Uuid {
        let id = property.id;
        self.repository.insert_channel_property(property);
        id
    }

    pub fn add_mapped(&self, channel: Uuid, identifier: &str, parent: Uuid) -> Uuid {
        self.add_property(ChannelProperty::new(
            channel,
            identifier,
            DataType::Unknown,
            PropertyKind::Mapped { parent },
        ))
    }

    pub fn set_actual(&self, property: Uuid, value: impl Into<PropertyValue>) {
        self.repository.set_state(
            property,
            PropertyState {
                actual_value: Some(value.into()),
                valid: true,
                ..Default::default()
            },
        );
    }

    pub fn loader(&self) -> Loader {
        self.loader_with(Arc::new(MappingCatalog::embedded().unwrap()))
    }

    pub fn loader_with(&self, catalog: Arc<MappingCatalog>) -> Loader {
        Loader::new(
            self.connector,
            catalog,
            Collaborators::from_repository(self.repository.clone()),
            self.bus.clone(),
        )
        .unwrap()
    }

    pub fn loader_with_sink(&self, sink: Arc<dyn StateSink>) -> Loader {
        Loader::new(
            self.connector,
            Arc::new(MappingCatalog::embedded().unwrap()),
            Collaborators::from_repository(self.repository.clone()),
            sink,
        )
        .unwrap()
    }

    /// Add `count` bridged plugs with a power channel each.
    pub fn add_plugs(&self, count: usize) -> Vec<Uuid> {
        (0..count)
            .map(|index| {
                let device = self.add_device(&format!("plug-{}", index), "third_party_device", "plug");
                let channel = self.add_channel(device, "power");
                self.add_dynamic(channel, "power_state", DataType::Enum);
                device
            })
            .collect()
    }
}
