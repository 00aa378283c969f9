//! Capability group rows of the mapping catalog.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::protocol::capability::CapabilityRules;
use crate::protocol::constraints::Constraints;
use crate::types::{
    AttributeType, CapabilityType, Category, ConfigurationType, DataType, Group, Permission,
};
use crate::value::PropertyValue;

/// Class used when a catalog row does not name one.
pub const DEFAULT_CLASS: &str = "generic";

fn default_class() -> String {
    DEFAULT_CLASS.to_string()
}

/// `<type>[_<name>]` key of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityKey {
    pub capability_type: CapabilityType,
    pub name: Option<String>,
}

impl CapabilityKey {
    pub fn new(capability_type: CapabilityType, name: Option<String>) -> Self {
        Self {
            capability_type,
            name,
        }
    }

    /// Parse a channel identifier such as `color_temperature`, `toggle_2`
    /// or `thermostat-mode`.
    ///
    /// The whole identifier is tried as a type first, underscores standing
    /// in for dashes. Otherwise the part after the last underscore is the
    /// instance name.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        if let Ok(capability_type) = parse_type(identifier) {
            return Ok(Self::new(capability_type, None));
        }

        let (head, name) = identifier.rsplit_once('_').ok_or_else(|| {
            ProtocolError::invalid_state(format!(
                "Identifier '{}' does not name a capability",
                identifier
            ))
        })?;

        if name.is_empty() {
            return Err(ProtocolError::invalid_state(format!(
                "Identifier '{}' has an empty capability name",
                identifier
            )));
        }

        let capability_type = parse_type(head).map_err(|_| {
            ProtocolError::invalid_state(format!(
                "Identifier '{}' does not name a capability",
                identifier
            ))
        })?;

        Ok(Self::new(capability_type, Some(name.to_string())))
    }
}

fn parse_type(value: &str) -> Result<CapabilityType> {
    value
        .parse::<CapabilityType>()
        .or_else(|_| value.replace('_', "-").parse::<CapabilityType>())
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}_{}", self.capability_type, name),
            None => write!(f, "{}", self.capability_type),
        }
    }
}

impl FromStr for CapabilityKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_identifier(s)
    }
}

impl TryFrom<String> for CapabilityKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_identifier(&value)
    }
}

impl From<CapabilityKey> for String {
    fn from(key: CapabilityKey) -> Self {
        key.to_string()
    }
}

/// Attribute row of a capability definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub attribute: AttributeType,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(flatten)]
    pub constraints: Constraints,
    #[serde(default)]
    pub required: bool,
}

/// Configuration row of a capability definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDefinition {
    pub configuration: ConfigurationType,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub data_type: DataType,
    /// Static value used when no property backs the row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PropertyValue>,
    #[serde(flatten)]
    pub constraints: Constraints,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub capability: CapabilityKey,
    #[serde(default = "default_class")]
    pub class: String,
    pub permission: Permission,
    /// Whether a device may carry several named instances
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub configurations: Vec<ConfigurationDefinition>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

impl CapabilityDefinition {
    pub fn capability_type(&self) -> CapabilityType {
        self.capability.capability_type
    }

    pub fn name(&self) -> Option<&str> {
        self.capability.name.as_deref()
    }

    pub fn find_attribute(&self, attribute_type: AttributeType) -> Option<&AttributeDefinition> {
        self.attributes
            .iter()
            .find(|row| row.attribute == attribute_type)
    }

    pub fn find_configuration(
        &self,
        configuration_type: ConfigurationType,
    ) -> Option<&ConfigurationDefinition> {
        self.configurations
            .iter()
            .find(|row| row.configuration == configuration_type)
    }

    /// Allow-lists handed to a capability built from this definition.
    pub fn rules(&self) -> CapabilityRules {
        let mut rules = CapabilityRules::default();
        for row in &self.attributes {
            if row.required {
                rules.required_attributes.insert(row.attribute);
            } else {
                rules.optional_attributes.insert(row.attribute);
            }
        }
        for row in &self.configurations {
            if row.required {
                rules.required_configurations.insert(row.configuration);
            } else {
                rules.optional_configurations.insert(row.configuration);
            }
        }
        rules
    }

    /// Check the definition on its own.
    pub fn validate(&self) -> Result<()> {
        let mut attributes = BTreeSet::new();
        for row in &self.attributes {
            if !attributes.insert(row.attribute) {
                return Err(ProtocolError::mapping(format!(
                    "Capability '{}' declares attribute '{}' twice",
                    self.capability, row.attribute
                )));
            }
            row.constraints.check().map_err(|reason| {
                ProtocolError::mapping(format!(
                    "Capability '{}' attribute '{}': {}",
                    self.capability, row.attribute, reason
                ))
            })?;
        }

        let mut configurations = BTreeSet::new();
        for row in &self.configurations {
            if !configurations.insert(row.configuration) {
                return Err(ProtocolError::mapping(format!(
                    "Capability '{}' declares configuration '{}' twice",
                    self.capability, row.configuration
                )));
            }
            row.constraints.check().map_err(|reason| {
                ProtocolError::mapping(format!(
                    "Capability '{}' configuration '{}': {}",
                    self.capability, row.configuration, reason
                ))
            })?;
            if let Some(value) = &row.value {
                row.constraints
                    .validate(row.data_type, value.clone())
                    .map_err(|err| {
                        ProtocolError::mapping(format!(
                            "Capability '{}' configuration '{}' has an invalid value: {}",
                            self.capability, row.configuration, err
                        ))
                    })?;
            }
        }

        Ok(())
    }
}

/// Named bundle of capability definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDefinition {
    #[serde(rename = "type")]
    pub group: Group,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    pub capabilities: Vec<CapabilityDefinition>,
}
