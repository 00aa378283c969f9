//! Loader - builds the device graph of a connector from its persisted
//! configuration and the mapping catalog.
//!
//! A load pass runs in two phases:
//! 1. Every child device of every gateway is turned into a [`Device`] with
//!    its capabilities, attributes and configuration rows. A device that
//!    cannot be built is logged and skipped, the pass continues.
//! 2. Every attribute is seeded from its stored property state and its
//!    capability recalculated.
//!
//! The new [`Driver`] replaces the shared one in a single write. Only then
//! are the per-attribute state notifications handed to the [`StateSink`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};
use crate::factory::{DeviceExtras, FactoryRegistry};
use crate::mapping::{
    catalog_cache, AttributeDefinition, CapabilityDefinition, CapabilityKey, CatalogSource,
    ConfigurationDefinition, MappingCatalog,
};
use crate::protocol::{Attribute, Capability, Device, DeviceParams, Driver, SharedDriver};
use crate::repository::{
    ChannelConfiguration, ChannelProperty, ChannelsRepository, DeviceConfiguration,
    DeviceProperty, DevicesRepository, PropertiesRepository, PropertyKind, PropertyState,
    PropertyStateRepository, StateSink, GATEWAY_DEVICE_TYPE,
};
use crate::types::{Category, DataType, DeviceKind};
use crate::value::PropertyValue;
use nspanel_core::{ConnectorConfig, DeviceStateEntry, StoreDeviceState};

/// Device property holding the display category.
pub const CATEGORY_PROPERTY: &str = "category";
pub const MANUFACTURER_PROPERTY: &str = "manufacturer";
pub const MODEL_PROPERTY: &str = "model";
pub const FIRMWARE_VERSION_PROPERTY: &str = "firmware_version";
pub const SERVICE_ADDRESS_PROPERTY: &str = "service_address";

/// A device left out of the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDevice {
    pub id: Uuid,
    pub identifier: String,
    pub reason: String,
}

/// Outcome of a load pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Devices in the committed graph
    pub loaded: usize,
    pub skipped: Vec<SkippedDevice>,
    /// Bridged devices whose graph misses required nodes
    pub corrupted: Vec<Uuid>,
    /// State notifications accepted by the sink
    pub notifications: usize,
    /// State notifications the sink refused
    pub undelivered: usize,
}

/// Readers the loader pulls configuration and state from.
#[derive(Clone)]
pub struct Collaborators {
    pub devices: Arc<dyn DevicesRepository>,
    pub channels: Arc<dyn ChannelsRepository>,
    pub properties: Arc<dyn PropertiesRepository>,
    pub states: Arc<dyn PropertyStateRepository>,
}

impl Collaborators {
    /// Use one repository for every reader.
    pub fn from_repository<R>(repository: Arc<R>) -> Self
    where
        R: DevicesRepository
            + ChannelsRepository
            + PropertiesRepository
            + PropertyStateRepository
            + 'static,
    {
        Self {
            devices: repository.clone(),
            channels: repository.clone(),
            properties: repository.clone(),
            states: repository,
        }
    }
}

pub struct Loader {
    connector: Uuid,
    catalog: Arc<MappingCatalog>,
    factories: Arc<FactoryRegistry>,
    collaborators: Collaborators,
    sink: Arc<dyn StateSink>,
}

impl Loader {
    /// Create a loader using the built-in factories.
    ///
    /// Fails when the catalog names a class without a factory.
    pub fn new(
        connector: Uuid,
        catalog: Arc<MappingCatalog>,
        collaborators: Collaborators,
        sink: Arc<dyn StateSink>,
    ) -> Result<Self> {
        let factories = Arc::new(FactoryRegistry::default());
        factories.validate_catalog(&catalog)?;

        Ok(Self {
            connector,
            catalog,
            factories,
            collaborators,
            sink,
        })
    }

    /// Create a loader for the configured connector, with the catalog taken
    /// from the process-wide cache.
    pub fn from_config(
        config: &ConnectorConfig,
        collaborators: Collaborators,
        sink: Arc<dyn StateSink>,
    ) -> Result<Self> {
        let catalog = catalog_cache().get_or_load(&CatalogSource::from_config(config))?;
        Self::new(config.connector, catalog, collaborators, sink)
    }

    /// Replace the factory registry.
    pub fn with_factories(mut self, factories: FactoryRegistry) -> Result<Self> {
        factories.validate_catalog(&self.catalog)?;
        self.factories = Arc::new(factories);
        Ok(self)
    }

    pub fn connector(&self) -> Uuid {
        self.connector
    }

    pub fn catalog(&self) -> &MappingCatalog {
        &self.catalog
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    /// Rebuild the device graph and commit it to `shared`.
    ///
    /// Errors of a single device skip that device. Failing to list the
    /// gateways or devices aborts the pass and leaves `shared` untouched.
    pub async fn load(&self, shared: &SharedDriver) -> Result<LoadReport> {
        info!(connector = %self.connector, "Loading devices");

        let mut driver = Driver::new();
        let mut report = LoadReport::default();

        let gateways = self
            .collaborators
            .devices
            .find_devices(self.connector, Some(GATEWAY_DEVICE_TYPE))
            .await?;

        for gateway in &gateways {
            let children = self.collaborators.devices.find_children(gateway.id).await?;
            for configuration in children {
                let result = match self.build_device(gateway, &configuration).await {
                    Ok(Some(device)) => driver.add_device(device),
                    Ok(None) => Err(ProtocolError::invalid_state(
                        "Device has no known category",
                    )),
                    Err(e) => Err(e),
                };

                if let Err(e) = result {
                    if !e.is_per_item() {
                        return Err(e);
                    }
                    warn!(
                        gateway = %gateway.id,
                        device = %configuration.id,
                        identifier = %configuration.identifier,
                        error = %e,
                        "Skipping device"
                    );
                    report.skipped.push(SkippedDevice {
                        id: configuration.id,
                        identifier: configuration.identifier.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut notifications = Vec::new();
        for device in driver.devices() {
            for capability in device.capabilities() {
                for attribute in capability.attributes() {
                    self.seed_attribute(device, attribute).await;
                }
                capability.recalculate_attributes(None);
            }
            notifications.extend(state_notifications(device));

            if device.is_corrupted() {
                report.corrupted.push(device.id());
            }
        }
        report.loaded = driver.len();

        *shared.write().await = driver;

        for message in notifications {
            let device = message.device;
            match self.sink.store_device_state(message).await {
                Ok(()) => report.notifications += 1,
                Err(e) => {
                    debug!(device = %device, error = %e, "Failed to send device state");
                    report.undelivered += 1;
                }
            }
        }
        if report.undelivered > 0 {
            warn!(
                connector = %self.connector,
                sent = report.notifications,
                undelivered = report.undelivered,
                "Device state notifications were not delivered"
            );
        }
        if let Err(e) = self
            .sink
            .devices_loaded(self.connector, report.loaded, report.skipped.len())
            .await
        {
            warn!(connector = %self.connector, error = %e, "Failed to announce loaded devices");
        }

        info!(
            connector = %self.connector,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            corrupted = report.corrupted.len(),
            "Devices loaded"
        );

        Ok(report)
    }

    /// Build one device. `Ok(None)` means the device has no category the
    /// catalog knows and cannot be represented.
    async fn build_device(
        &self,
        gateway: &DeviceConfiguration,
        configuration: &DeviceConfiguration,
    ) -> Result<Option<Device>> {
        let properties = self
            .collaborators
            .properties
            .find_device_properties(configuration.id)
            .await?;
        let variable = |identifier: &str| -> Option<String> {
            properties
                .iter()
                .find(|property| property.identifier == identifier)
                .and_then(DeviceProperty::value)
                .map(|value| match value {
                    PropertyValue::String(text) => text.clone(),
                    other => other.to_string(),
                })
        };

        let category = variable(CATEGORY_PROPERTY).and_then(|value| value.parse::<Category>().ok());
        let Some(category) = category else {
            warn!(
                device = %configuration.id,
                identifier = %configuration.identifier,
                "Device category is missing or unknown"
            );
            return Ok(None);
        };
        let Some((required, optional)) = self.catalog.category_capabilities(category) else {
            warn!(
                device = %configuration.id,
                category = %category,
                "Category is not defined in the mapping catalog"
            );
            return Ok(None);
        };

        let kind = configuration.device_type.parse::<DeviceKind>().map_err(|_| {
            ProtocolError::invalid_state(format!(
                "No factory for device type '{}'",
                configuration.device_type
            ))
        })?;

        let params = DeviceParams {
            id: configuration.id,
            identifier: configuration.identifier.clone(),
            gateway: gateway.id,
            connector: self.connector,
            category,
            name: configuration.display_name().to_string(),
            manufacturer: variable(MANUFACTURER_PROPERTY),
            model: variable(MODEL_PROPERTY),
            firmware_version: variable(FIRMWARE_VERSION_PROPERTY),
            required_capabilities: required,
            optional_capabilities: optional,
        };
        let extras = DeviceExtras {
            gateway_name: Some(gateway.display_name().to_string()),
            service_address: variable(SERVICE_ADDRESS_PROPERTY),
        };
        let mut device = self.factories.build_device(kind, params, extras)?;

        let channels = self
            .collaborators
            .channels
            .find_channels(configuration.id)
            .await?;
        for channel in &channels {
            let capability = self.build_capability(&device, channel).await?;
            device.add_capability(capability)?;
        }

        if kind == DeviceKind::ThirdPartyDevice {
            mark_corruption(&mut device);
        }

        debug!(
            device = %device.id(),
            capabilities = device.capabilities().len(),
            "Device built"
        );
        Ok(Some(device))
    }

    async fn build_capability(
        &self,
        device: &Device,
        channel: &ChannelConfiguration,
    ) -> Result<Capability> {
        let key = CapabilityKey::from_identifier(&channel.identifier)?;
        let definition = self
            .catalog
            .find_capability_definition(key.capability_type, key.name.as_deref())
            .ok_or_else(|| {
                ProtocolError::invalid_state(format!(
                    "No capability definition for channel '{}'",
                    channel.identifier
                ))
            })?;

        let mut capability =
            self.factories
                .build_capability(definition, channel.id, key.name.clone(), device.id())?;

        let properties = self
            .collaborators
            .properties
            .find_channel_properties(channel.id)
            .await?;

        let mut backed = BTreeSet::new();
        for property in &properties {
            match classify(definition, &property.identifier) {
                Some(Row::Attribute(row)) => {
                    let attribute = self.build_attribute(row, property, capability.id())?;
                    capability.add_attribute(attribute)?;
                }
                Some(Row::Configuration(row)) => {
                    let value = match &property.kind {
                        PropertyKind::Variable { value } => value.clone(),
                        _ => match self.read_property_state(property.id).await {
                            Ok(state) => state.and_then(|state| state.actual_value),
                            Err(e) => {
                                warn!(
                                    device = %device.id(),
                                    capability = %key,
                                    property = %property.identifier,
                                    error = %e,
                                    "Failed to read configuration state"
                                );
                                None
                            }
                        },
                    }
                    .or_else(|| row.value.clone());
                    let configuration = self.factories.build_configuration(
                        row,
                        property.id,
                        capability.id(),
                        value,
                        row.constraints.clone().or(&property.constraints()),
                    )?;
                    capability.add_configuration(configuration)?;
                    backed.insert(row.configuration);
                }
                None => {
                    warn!(
                        device = %device.id(),
                        capability = %key,
                        property = %property.identifier,
                        "Skipping property not mapped to an attribute or configuration"
                    );
                }
            }
        }

        for row in &definition.configurations {
            if backed.contains(&row.configuration) || row.value.is_none() {
                continue;
            }
            let configuration = self.factories.build_configuration(
                row,
                Uuid::new_v4(),
                capability.id(),
                row.value.clone(),
                row.constraints.clone(),
            )?;
            capability.add_configuration(configuration)?;
        }

        Ok(capability)
    }

    fn build_attribute(
        &self,
        row: &AttributeDefinition,
        property: &ChannelProperty,
        capability: Uuid,
    ) -> Result<Attribute> {
        let mut constraints = row.constraints.clone().or(&property.constraints());
        if property.default.is_some() {
            constraints.default_value = property.default.clone();
        }
        let data_type = if row.data_type == DataType::Unknown {
            property.data_type
        } else {
            row.data_type
        };

        self.factories
            .build_attribute(row, property.id, capability, data_type, constraints)
    }

    /// Seed an attribute from the state of its backing property.
    async fn seed_attribute(&self, device: &Device, attribute: &Attribute) {
        let state = match self.read_property_state(attribute.id()).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    device = %device.id(),
                    attribute = %attribute.attribute_type(),
                    property = %attribute.id(),
                    error = %e,
                    "Failed to read property state"
                );
                attribute.set_valid(false);
                return;
            }
        };

        let Some(state) = state else {
            if let Err(e) = attribute.set_actual_value(None) {
                debug!(property = %attribute.id(), error = %e, "Default value rejected");
            }
            attribute.set_valid(true);
            return;
        };

        let checked = |value: &Option<PropertyValue>| {
            value
                .clone()
                .map(|value| attribute.validate(value))
                .transpose()
        };
        let applied = checked(&state.actual_value).and_then(|actual| {
            let expected = checked(&state.expected_value)?;
            attribute.set_actual_value(actual)?;
            attribute.set_expected_value(expected)
        });
        if let Err(e) = applied {
            warn!(
                device = %device.id(),
                attribute = %attribute.attribute_type(),
                property = %attribute.id(),
                error = %e,
                "Stored property state rejected"
            );
            attribute.set_valid(false);
            return;
        }

        if attribute.expected_value().is_some() && state.pending.is_pending() {
            attribute.set_pending(state.pending);
        }
        attribute.set_valid(state.valid);

        debug!(
            device = %device.id(),
            attribute = %attribute.attribute_type(),
            value = ?attribute.get_value(),
            valid = state.valid,
            "Attribute seeded"
        );
    }

    /// Current state of a property. Mapped properties take the state of
    /// the first property up their chain that is not mapped, variable
    /// properties their configured value.
    async fn read_property_state(&self, property: Uuid) -> Result<Option<PropertyState>> {
        let properties = &self.collaborators.properties;

        let Some(mut current) = properties.find_channel_property(property).await? else {
            return Ok(None);
        };
        let mut visited = HashSet::from([current.id]);
        while let PropertyKind::Mapped { parent } = current.kind {
            if !visited.insert(parent) {
                return Err(ProtocolError::invalid_state(format!(
                    "Mapped property {} is part of a cycle",
                    property
                )));
            }
            current = properties.find_channel_property(parent).await?.ok_or_else(|| {
                ProtocolError::invalid_state(format!(
                    "Parent property {} of {} does not exist",
                    parent, current.id
                ))
            })?;
        }

        match current.kind {
            PropertyKind::Variable { value } => Ok(value.map(|value| PropertyState {
                actual_value: Some(value),
                valid: true,
                ..Default::default()
            })),
            _ => Ok(self.collaborators.states.read_state(current.id).await?),
        }
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("connector", &self.connector)
            .field("factories", &self.factories)
            .finish()
    }
}

enum Row<'a> {
    Attribute(&'a AttributeDefinition),
    Configuration(&'a ConfigurationDefinition),
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Match a property identifier against the attribute rows of a capability
/// definition, then against its configuration rows.
fn classify<'a>(definition: &'a CapabilityDefinition, identifier: &str) -> Option<Row<'a>> {
    let key = normalize_key(identifier);

    if let Some(row) = definition
        .attributes
        .iter()
        .find(|row| normalize_key(row.attribute.as_str()) == key)
    {
        return Some(Row::Attribute(row));
    }

    definition
        .configurations
        .iter()
        .find(|row| normalize_key(row.configuration.as_str()) == key)
        .map(Row::Configuration)
}

fn mark_corruption(device: &mut Device) {
    let mut corrupted = false;

    for capability in device.capabilities() {
        let missing = capability.missing_attributes();
        if !missing.is_empty() {
            warn!(
                device = %device.id(),
                capability = %capability.capability_type(),
                missing = ?missing,
                "Capability is missing required attributes"
            );
            corrupted = true;
        }
    }

    let missing = device.missing_capabilities();
    if !missing.is_empty() {
        warn!(
            device = %device.id(),
            missing = ?missing,
            "Device is missing required capabilities"
        );
        corrupted = true;
    }

    device.set_corrupted(corrupted);
}

/// One store-state notification per attribute of the device.
fn state_notifications(device: &Device) -> Vec<StoreDeviceState> {
    device
        .capabilities()
        .iter()
        .flat_map(|capability| {
            capability.attributes().iter().map(move |attribute| StoreDeviceState {
                connector: device.connector(),
                gateway: device.gateway(),
                device: device.id(),
                state: vec![DeviceStateEntry {
                    capability: capability.capability_type().to_string(),
                    attribute: attribute.attribute_type().to_string(),
                    value: attribute
                        .get_value()
                        .map(|value| value.to_json())
                        .unwrap_or(serde_json::Value::Null),
                    identifier: capability.name().map(str::to_string),
                }],
            })
        })
        .collect()
}
