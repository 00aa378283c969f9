//! Factory registry - maps device kinds and catalog classes to the
//! functions building graph nodes.
//!
//! Adding a capability kind means adding a catalog row and, when the
//! built-in `generic` / `named` classes do not fit, registering a factory
//! here. The loader itself never changes.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{ProtocolError, Result};
use crate::mapping::{AttributeDefinition, CapabilityDefinition, ConfigurationDefinition, MappingCatalog};
use crate::protocol::{
    Attribute, Capability, Configuration, Constraints, Device, DeviceParams, RecalculateFn,
    ThirdPartyInfo,
};
use crate::types::{CapabilityType, DataType, DeviceKind};
use crate::value::PropertyValue;

/// Class of capabilities existing once per device.
pub const GENERIC_CLASS: &str = "generic";
/// Class of capabilities with several named instances per device.
pub const NAMED_CLASS: &str = "named";

/// Bridging details of a device, used by the third-party factory.
#[derive(Debug, Clone, Default)]
pub struct DeviceExtras {
    pub gateway_name: Option<String>,
    pub service_address: Option<String>,
}

pub type DeviceFactory = fn(DeviceParams, DeviceExtras) -> Device;

pub type CapabilityFactory =
    fn(&CapabilityDefinition, Uuid, Option<String>, Uuid) -> Result<Capability>;

pub type AttributeFactory =
    fn(&AttributeDefinition, Uuid, Uuid, DataType, Constraints) -> Result<Attribute>;

pub type ConfigurationFactory = fn(
    &ConfigurationDefinition,
    Uuid,
    Uuid,
    Option<PropertyValue>,
    Constraints,
) -> Result<Configuration>;

fn sub_device_factory(params: DeviceParams, _extras: DeviceExtras) -> Device {
    Device::sub_device(params)
}

fn third_party_factory(params: DeviceParams, extras: DeviceExtras) -> Device {
    Device::third_party(
        params,
        ThirdPartyInfo::new(extras.gateway_name, extras.service_address),
    )
}

fn generic_capability(
    definition: &CapabilityDefinition,
    id: Uuid,
    name: Option<String>,
    device: Uuid,
) -> Result<Capability> {
    Ok(Capability::new(
        id,
        definition.capability_type(),
        name.or_else(|| definition.name().map(str::to_string)),
        definition.permission,
        device,
        definition.rules(),
    ))
}

fn named_capability(
    definition: &CapabilityDefinition,
    id: Uuid,
    name: Option<String>,
    device: Uuid,
) -> Result<Capability> {
    let name = name
        .or_else(|| definition.name().map(str::to_string))
        .ok_or_else(|| {
            ProtocolError::invalid_state(format!(
                "Capability '{}' requires an instance name",
                definition.capability
            ))
        })?;
    generic_capability(definition, id, Some(name), device)
}

fn generic_attribute(
    definition: &AttributeDefinition,
    id: Uuid,
    capability: Uuid,
    data_type: DataType,
    constraints: Constraints,
) -> Result<Attribute> {
    if let Some(default) = &constraints.default_value {
        constraints.validate(data_type, default.clone()).map_err(|e| {
            ProtocolError::invalid_state(format!(
                "Default value of attribute '{}' is invalid: {}",
                definition.attribute, e
            ))
        })?;
    }
    Ok(Attribute::new(
        id,
        definition.attribute,
        data_type,
        capability,
        constraints,
    ))
}

fn generic_configuration(
    definition: &ConfigurationDefinition,
    id: Uuid,
    capability: Uuid,
    value: Option<PropertyValue>,
    constraints: Constraints,
) -> Result<Configuration> {
    Configuration::new(
        id,
        definition.configuration,
        definition.data_type,
        capability,
        value,
        constraints,
    )
}

pub struct FactoryRegistry {
    devices: HashMap<DeviceKind, DeviceFactory>,
    capabilities: HashMap<String, CapabilityFactory>,
    attributes: HashMap<String, AttributeFactory>,
    configurations: HashMap<String, ConfigurationFactory>,
    recalculations: HashMap<CapabilityType, RecalculateFn>,
}

impl FactoryRegistry {
    /// Registry without any factory.
    pub fn empty() -> Self {
        Self {
            devices: HashMap::new(),
            capabilities: HashMap::new(),
            attributes: HashMap::new(),
            configurations: HashMap::new(),
            recalculations: HashMap::new(),
        }
    }

    /// Registry with the built-in factories and no recompute strategies.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_device(DeviceKind::SubDevice, sub_device_factory);
        registry.register_device(DeviceKind::ThirdPartyDevice, third_party_factory);
        registry.register_capability(GENERIC_CLASS, generic_capability);
        registry.register_capability(NAMED_CLASS, named_capability);
        registry.register_attribute(GENERIC_CLASS, generic_attribute);
        registry.register_configuration(GENERIC_CLASS, generic_configuration);
        registry
    }

    pub fn register_device(&mut self, kind: DeviceKind, factory: DeviceFactory) {
        self.devices.insert(kind, factory);
    }

    pub fn register_capability(&mut self, class: &str, factory: CapabilityFactory) {
        self.capabilities.insert(class.to_string(), factory);
    }

    pub fn register_attribute(&mut self, class: &str, factory: AttributeFactory) {
        self.attributes.insert(class.to_string(), factory);
    }

    pub fn register_configuration(&mut self, class: &str, factory: ConfigurationFactory) {
        self.configurations.insert(class.to_string(), factory);
    }

    /// Register the recompute strategy of a derived capability type.
    pub fn register_recalculation(&mut self, capability_type: CapabilityType, recalculate: RecalculateFn) {
        self.recalculations.insert(capability_type, recalculate);
    }

    pub fn recalculation(&self, capability_type: CapabilityType) -> Option<RecalculateFn> {
        self.recalculations.get(&capability_type).copied()
    }

    /// Capability types with a recompute strategy.
    pub fn derived_capabilities(&self) -> Vec<CapabilityType> {
        let mut types: Vec<CapabilityType> = self.recalculations.keys().copied().collect();
        types.sort();
        types
    }

    pub fn build_device(
        &self,
        kind: DeviceKind,
        params: DeviceParams,
        extras: DeviceExtras,
    ) -> Result<Device> {
        let factory = self.devices.get(&kind).ok_or_else(|| {
            ProtocolError::invalid_state(format!("No factory for device kind '{}'", kind))
        })?;
        Ok(factory(params, extras))
    }

    pub fn build_capability(
        &self,
        definition: &CapabilityDefinition,
        id: Uuid,
        name: Option<String>,
        device: Uuid,
    ) -> Result<Capability> {
        let factory = self.capabilities.get(&definition.class).ok_or_else(|| {
            ProtocolError::invalid_state(format!(
                "No factory for capability class '{}' of '{}'",
                definition.class, definition.capability
            ))
        })?;
        let capability = factory(definition, id, name, device)?;
        Ok(capability.with_recalculate(self.recalculation(definition.capability_type())))
    }

    pub fn build_attribute(
        &self,
        definition: &AttributeDefinition,
        id: Uuid,
        capability: Uuid,
        data_type: DataType,
        constraints: Constraints,
    ) -> Result<Attribute> {
        let factory = self.attributes.get(&definition.class).ok_or_else(|| {
            ProtocolError::invalid_state(format!(
                "No factory for attribute class '{}' of '{}'",
                definition.class, definition.attribute
            ))
        })?;
        factory(definition, id, capability, data_type, constraints)
    }

    pub fn build_configuration(
        &self,
        definition: &ConfigurationDefinition,
        id: Uuid,
        capability: Uuid,
        value: Option<PropertyValue>,
        constraints: Constraints,
    ) -> Result<Configuration> {
        let factory = self.configurations.get(&definition.class).ok_or_else(|| {
            ProtocolError::invalid_state(format!(
                "No factory for configuration class '{}' of '{}'",
                definition.class, definition.configuration
            ))
        })?;
        factory(definition, id, capability, value, constraints)
    }

    /// Check that every class named by the catalog has a factory.
    pub fn validate_catalog(&self, catalog: &MappingCatalog) -> Result<()> {
        for definition in catalog.capability_definitions() {
            if !self.capabilities.contains_key(&definition.class) {
                return Err(ProtocolError::mapping(format!(
                    "Capability '{}' uses unknown class '{}'",
                    definition.capability, definition.class
                )));
            }
            for row in &definition.attributes {
                if !self.attributes.contains_key(&row.class) {
                    return Err(ProtocolError::mapping(format!(
                        "Attribute '{}' of '{}' uses unknown class '{}'",
                        row.attribute, definition.capability, row.class
                    )));
                }
            }
            for row in &definition.configurations {
                if !self.configurations.contains_key(&row.class) {
                    return Err(ProtocolError::mapping(format!(
                        "Configuration '{}' of '{}' uses unknown class '{}'",
                        row.configuration, definition.capability, row.class
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut capabilities: Vec<&String> = self.capabilities.keys().collect();
        capabilities.sort();
        f.debug_struct("FactoryRegistry")
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .field("capabilities", &capabilities)
            .field("derived", &self.derived_capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeType, Category};
    use std::collections::BTreeSet;

    fn params() -> DeviceParams {
        DeviceParams {
            id: Uuid::new_v4(),
            identifier: "switch".to_string(),
            gateway: Uuid::new_v4(),
            connector: Uuid::new_v4(),
            category: Category::Switch,
            name: "Switch".to_string(),
            manufacturer: None,
            model: None,
            firmware_version: None,
            required_capabilities: BTreeSet::from([CapabilityType::Power]),
            optional_capabilities: BTreeSet::from([CapabilityType::Toggle]),
        }
    }

    #[test]
    fn test_embedded_catalog_classes_registered() {
        let catalog = MappingCatalog::embedded().unwrap();
        assert!(FactoryRegistry::default().validate_catalog(&catalog).is_ok());
        assert!(matches!(
            FactoryRegistry::empty().validate_catalog(&catalog),
            Err(ProtocolError::Mapping(_))
        ));
    }

    #[test]
    fn test_device_factories() {
        let registry = FactoryRegistry::default();

        let device = registry
            .build_device(DeviceKind::SubDevice, params(), DeviceExtras::default())
            .unwrap();
        assert_eq!(device.kind(), DeviceKind::SubDevice);

        let device = registry
            .build_device(
                DeviceKind::ThirdPartyDevice,
                params(),
                DeviceExtras {
                    gateway_name: Some("Gateway".to_string()),
                    service_address: None,
                },
            )
            .unwrap();
        assert_eq!(
            device.third_party_info().and_then(|info| info.gateway_name.as_deref()),
            Some("Gateway")
        );

        let result = FactoryRegistry::empty().build_device(
            DeviceKind::SubDevice,
            params(),
            DeviceExtras::default(),
        );
        assert!(matches!(result, Err(ProtocolError::InvalidState(_))));
    }

    #[test]
    fn test_named_capability_requires_name() {
        let catalog = MappingCatalog::embedded().unwrap();
        let registry = FactoryRegistry::default();
        let toggle = catalog
            .find_capability_definition(CapabilityType::Toggle, Some("1"))
            .unwrap();

        let capability = registry
            .build_capability(toggle, Uuid::new_v4(), Some("1".to_string()), Uuid::new_v4())
            .unwrap();
        assert_eq!(capability.name(), Some("1"));
        assert!(!capability.is_derived());

        let result = registry.build_capability(toggle, Uuid::new_v4(), None, Uuid::new_v4());
        assert!(matches!(result, Err(ProtocolError::InvalidState(_))));
    }

    fn noop(_capability: &Capability, _trigger: Option<Uuid>) {}

    #[test]
    fn test_recalculation_strategy_attached() {
        let catalog = MappingCatalog::embedded().unwrap();
        let mut registry = FactoryRegistry::default();
        assert!(registry.derived_capabilities().is_empty());

        registry.register_recalculation(CapabilityType::ThermostatMode, noop);
        assert_eq!(registry.derived_capabilities(), vec![CapabilityType::ThermostatMode]);

        let definition = catalog
            .find_capability_definition(CapabilityType::ThermostatMode, None)
            .unwrap();
        let capability = registry
            .build_capability(definition, Uuid::new_v4(), None, Uuid::new_v4())
            .unwrap();
        assert!(capability.is_derived());
    }

    #[test]
    fn test_invalid_default_rejected() {
        let registry = FactoryRegistry::default();
        let definition = AttributeDefinition {
            attribute: AttributeType::Brightness,
            class: GENERIC_CLASS.to_string(),
            data_type: DataType::UChar,
            constraints: Constraints::default(),
            required: true,
        };

        let result = registry.build_attribute(
            &definition,
            Uuid::new_v4(),
            Uuid::new_v4(),
            DataType::UChar,
            Constraints::default()
                .with_range(Some(0.0), Some(100.0))
                .with_default(150),
        );
        assert!(matches!(result, Err(ProtocolError::InvalidState(_))));
    }
}
