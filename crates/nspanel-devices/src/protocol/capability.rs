//! Capability - a group of attributes and configuration rows describing
//! one controllable or observable aspect of a device.

use std::collections::BTreeSet;

use uuid::Uuid;

use super::attribute::Attribute;
use super::configuration::Configuration;
use crate::error::{ProtocolError, Result};
use crate::types::{AttributeType, CapabilityType, ConfigurationType, Permission};

/// Recompute strategy of a derived capability.
///
/// Called with the capability and the id of the attribute that triggered
/// the recalculation, if any.
pub type RecalculateFn = fn(&Capability, Option<Uuid>);

/// Allow-lists of the nodes a capability may own.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRules {
    pub required_attributes: BTreeSet<AttributeType>,
    pub optional_attributes: BTreeSet<AttributeType>,
    pub required_configurations: BTreeSet<ConfigurationType>,
    pub optional_configurations: BTreeSet<ConfigurationType>,
}

impl CapabilityRules {
    pub fn allows_attribute(&self, attribute_type: AttributeType) -> bool {
        self.required_attributes.contains(&attribute_type)
            || self.optional_attributes.contains(&attribute_type)
    }

    pub fn allows_configuration(&self, configuration_type: ConfigurationType) -> bool {
        self.required_configurations.contains(&configuration_type)
            || self.optional_configurations.contains(&configuration_type)
    }
}

#[derive(Debug)]
pub struct Capability {
    id: Uuid,
    capability_type: CapabilityType,
    name: Option<String>,
    permission: Permission,
    device: Uuid,
    rules: CapabilityRules,
    attributes: Vec<Attribute>,
    configurations: Vec<Configuration>,
    recalculate: Option<RecalculateFn>,
}

impl Capability {
    pub fn new(
        id: Uuid,
        capability_type: CapabilityType,
        name: Option<String>,
        permission: Permission,
        device: Uuid,
        rules: CapabilityRules,
    ) -> Self {
        Self {
            id,
            capability_type,
            name,
            permission,
            device,
            rules,
            attributes: Vec::new(),
            configurations: Vec::new(),
            recalculate: None,
        }
    }

    /// Attach a recompute strategy.
    pub fn with_recalculate(mut self, recalculate: Option<RecalculateFn>) -> Self {
        self.recalculate = recalculate;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capability_type(&self) -> CapabilityType {
        self.capability_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Owning device id
    pub fn device(&self) -> Uuid {
        self.device
    }

    pub fn rules(&self) -> &CapabilityRules {
        &self.rules
    }

    pub fn is_derived(&self) -> bool {
        self.recalculate.is_some()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<()> {
        if !self.rules.allows_attribute(attribute.attribute_type()) {
            return Err(ProtocolError::invalid_argument(format!(
                "Attribute '{}' is not allowed for capability '{}'",
                attribute.attribute_type(),
                self.capability_type
            )));
        }

        if attribute.capability() != self.id {
            return Err(ProtocolError::invalid_argument(format!(
                "Attribute '{}' belongs to capability {}, not {}",
                attribute.id(),
                attribute.capability(),
                self.id
            )));
        }

        self.attributes.push(attribute);
        Ok(())
    }

    pub fn add_configuration(&mut self, configuration: Configuration) -> Result<()> {
        if !self.rules.allows_configuration(configuration.configuration_type()) {
            return Err(ProtocolError::invalid_argument(format!(
                "Configuration '{}' is not allowed for capability '{}'",
                configuration.configuration_type(),
                self.capability_type
            )));
        }

        if configuration.capability() != self.id {
            return Err(ProtocolError::invalid_argument(format!(
                "Configuration '{}' belongs to capability {}, not {}",
                configuration.id(),
                configuration.capability(),
                self.id
            )));
        }

        self.configurations.push(configuration);
        Ok(())
    }

    pub fn find_attribute(&self, attribute_type: AttributeType) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.attribute_type() == attribute_type)
    }

    pub fn find_attribute_by_id(&self, id: Uuid) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.id() == id)
    }

    pub fn find_configuration(&self, configuration_type: ConfigurationType) -> Option<&Configuration> {
        self.configurations
            .iter()
            .find(|configuration| configuration.configuration_type() == configuration_type)
    }

    /// Required attribute types with no attached attribute.
    pub fn missing_attributes(&self) -> Vec<AttributeType> {
        self.rules
            .required_attributes
            .iter()
            .filter(|attribute_type| self.find_attribute(**attribute_type).is_none())
            .copied()
            .collect()
    }

    /// Required configuration types with no attached row.
    pub fn missing_configurations(&self) -> Vec<ConfigurationType> {
        self.rules
            .required_configurations
            .iter()
            .filter(|configuration_type| self.find_configuration(**configuration_type).is_none())
            .copied()
            .collect()
    }

    /// Run the recompute strategy, if the capability has one.
    pub fn recalculate_attributes(&self, trigger: Option<Uuid>) {
        if let Some(recalculate) = self.recalculate {
            recalculate(self, trigger);
        }
    }

    /// `{capability, permission, name?, configuration?}`
    pub fn to_wire_definition(&self) -> serde_json::Value {
        let mut definition = serde_json::Map::new();
        definition.insert(
            "capability".to_string(),
            serde_json::Value::from(self.capability_type.as_str()),
        );
        definition.insert(
            "permission".to_string(),
            serde_json::Value::from(self.permission.as_str()),
        );
        if let Some(name) = &self.name {
            definition.insert("name".to_string(), serde_json::Value::from(name.as_str()));
        }

        let configuration: Vec<serde_json::Value> = self
            .configurations
            .iter()
            .filter_map(Configuration::to_wire_definition)
            .collect();
        if !configuration.is_empty() {
            definition.insert(
                "configuration".to_string(),
                serde_json::Value::Array(configuration),
            );
        }

        serde_json::Value::Object(definition)
    }

    /// `{type: {attr: value}}`, or `{type: {name: {attr: value}}}` for a
    /// named instance.
    pub fn to_wire_state(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attributes = serde_json::Map::new();
        for attribute in &self.attributes {
            attributes.extend(attribute.to_wire_state());
        }

        let inner = match &self.name {
            Some(name) => {
                let mut named = serde_json::Map::new();
                named.insert(name.clone(), serde_json::Value::Object(attributes));
                named
            }
            None => attributes,
        };

        let mut state = serde_json::Map::new();
        state.insert(
            self.capability_type.to_string(),
            serde_json::Value::Object(inner),
        );
        state
    }
}
