//! Configuration - one static descriptor row of a capability.

use uuid::Uuid;

use super::constraints::Constraints;
use crate::error::Result;
use crate::types::{ConfigurationType, DataType};
use crate::value::PropertyValue;

#[derive(Debug, Clone)]
pub struct Configuration {
    id: Uuid,
    configuration_type: ConfigurationType,
    data_type: DataType,
    capability: Uuid,
    value: Option<PropertyValue>,
    constraints: Constraints,
}

impl Configuration {
    /// Create a configuration row. A value is validated against the
    /// constraints once, it never changes afterwards.
    pub fn new(
        id: Uuid,
        configuration_type: ConfigurationType,
        data_type: DataType,
        capability: Uuid,
        value: Option<PropertyValue>,
        constraints: Constraints,
    ) -> Result<Self> {
        let value = match value.or_else(|| constraints.default_value.clone()) {
            Some(value) => Some(constraints.validate(data_type, value)?),
            None => None,
        };

        Ok(Self {
            id,
            configuration_type,
            data_type,
            capability,
            value,
            constraints,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration_type(&self) -> ConfigurationType {
        self.configuration_type
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Owning capability id
    pub fn capability(&self) -> Uuid {
        self.capability
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Nested definition object, e.g. `temperature_max` with value 30
    /// becomes `{"temperature": {"max": 30}}`.
    ///
    /// Returns `None` when the row has no value.
    pub fn to_wire_definition(&self) -> Option<serde_json::Value> {
        let value = self.value.as_ref()?;

        let definition = self
            .configuration_type
            .path()
            .into_iter()
            .rev()
            .fold(value.to_json(), |inner, segment| {
                let mut map = serde_json::Map::new();
                map.insert(segment.to_string(), inner);
                serde_json::Value::Object(map)
            });

        Some(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configuration(
        configuration_type: ConfigurationType,
        data_type: DataType,
        value: Option<PropertyValue>,
    ) -> Result<Configuration> {
        Configuration::new(
            Uuid::new_v4(),
            configuration_type,
            data_type,
            Uuid::new_v4(),
            value,
            Constraints::default(),
        )
    }

    #[test]
    fn test_nested_definition() {
        let row = configuration(
            ConfigurationType::TemperatureMax,
            DataType::Float,
            Some(30.into()),
        )
        .unwrap();

        assert_eq!(row.to_wire_definition(), Some(json!({"temperature": {"max": 30}})));
    }

    #[test]
    fn test_flat_definition() {
        let row = configuration(
            ConfigurationType::SupportedModes,
            DataType::Unknown,
            Some(vec!["auto", "eco"].into()),
        )
        .unwrap();

        assert_eq!(row.to_wire_definition(), Some(json!({"supportedModes": ["auto", "eco"]})));
    }

    #[test]
    fn test_null_value_is_omitted() {
        let row = configuration(ConfigurationType::RangeMin, DataType::Float, None).unwrap();
        assert_eq!(row.to_wire_definition(), None);
    }

    #[test]
    fn test_default_value_used() {
        let row = Configuration::new(
            Uuid::new_v4(),
            ConfigurationType::TemperatureScale,
            DataType::Enum,
            Uuid::new_v4(),
            None,
            Constraints::default()
                .with_valid_values(vec!["c", "f"])
                .with_default("c"),
        )
        .unwrap();
        assert_eq!(row.value(), Some(&"c".into()));
    }

    #[test]
    fn test_invalid_value_rejected() {
        let result = Configuration::new(
            Uuid::new_v4(),
            ConfigurationType::RangeMax,
            DataType::Float,
            Uuid::new_v4(),
            Some(120.into()),
            Constraints::default().with_range(Some(-40.0), Some(80.0)),
        );
        assert!(result.is_err());
    }
}
