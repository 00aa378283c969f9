//! Value constraints shared by attributes and configuration rows.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::types::DataType;
use crate::value::PropertyValue;

/// Tolerance used when checking step alignment of float values.
const STEP_EPSILON: f64 = 1e-9;

/// Optional validation constraints of a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<PropertyValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Constraints {
    pub fn with_valid_values<T: Into<PropertyValue>>(mut self, values: Vec<T>) -> Self {
        self.valid_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.min_step = Some(step);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Fill every unset constraint from `other`.
    pub fn or(mut self, other: &Constraints) -> Self {
        if self.valid_values.is_none() {
            self.valid_values = other.valid_values.clone();
        }
        if self.max_length.is_none() {
            self.max_length = other.max_length;
        }
        if self.min_value.is_none() {
            self.min_value = other.min_value;
        }
        if self.max_value.is_none() {
            self.max_value = other.max_value;
        }
        if self.min_step.is_none() {
            self.min_step = other.min_step;
        }
        if self.default_value.is_none() {
            self.default_value = other.default_value.clone();
        }
        if self.unit.is_none() {
            self.unit = other.unit.clone();
        }
        self
    }

    /// Check that the constraints are consistent with each other.
    pub fn check(&self) -> std::result::Result<(), String> {
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                return Err(format!("min_value ({}) greater than max_value ({})", min, max));
            }
        }
        if let Some(step) = self.min_step {
            if step <= 0.0 {
                return Err(format!("min_step ({}) must be positive", step));
            }
        }
        if let Some(values) = &self.valid_values {
            if values.is_empty() {
                return Err("valid_values cannot be empty".to_string());
            }
        }
        Ok(())
    }

    /// Validate a value against the declared data type and every constraint.
    ///
    /// Returns the value normalised to the data type. Checks run in a fixed
    /// order and the first failure wins: data type, numeric range, step
    /// alignment, membership in `valid_values`, string length.
    pub fn validate(&self, data_type: DataType, value: PropertyValue) -> Result<PropertyValue> {
        let value = normalize(data_type, value)?;

        if self.min_value.is_some() || self.max_value.is_some() {
            let number = value.as_f64().ok_or_else(|| {
                ProtocolError::invalid_argument(format!(
                    "Value '{}' is not numeric but a numeric range is configured",
                    value
                ))
            })?;
            if let Some(min) = self.min_value {
                if number < min {
                    return Err(ProtocolError::invalid_argument(format!(
                        "Value {} is below min value {}",
                        number, min
                    )));
                }
            }
            if let Some(max) = self.max_value {
                if number > max {
                    return Err(ProtocolError::invalid_argument(format!(
                        "Value {} is above max value {}",
                        number, max
                    )));
                }
            }
        }

        if let Some(step) = self.min_step.filter(|step| *step > 0.0) {
            let number = value.as_f64().ok_or_else(|| {
                ProtocolError::invalid_argument(format!(
                    "Value '{}' is not numeric but a step is configured",
                    value
                ))
            })?;
            let ratio = (number - self.min_value.unwrap_or(0.0)) / step;
            if (ratio - ratio.round()).abs() > STEP_EPSILON * ratio.abs().max(1.0) {
                return Err(ProtocolError::invalid_argument(format!(
                    "Value {} is not aligned to step {}",
                    number, step
                )));
            }
        }

        if let Some(valid_values) = &self.valid_values {
            if !valid_values.contains(&value) {
                return Err(ProtocolError::invalid_argument(format!(
                    "Value '{}' is not one of the valid values",
                    value
                )));
            }
        }

        if let Some(max_length) = self.max_length {
            let text = value.as_str().ok_or_else(|| {
                ProtocolError::invalid_argument(format!(
                    "Value '{}' is not a string but a max length is configured",
                    value
                ))
            })?;
            if text.chars().count() > max_length {
                return Err(ProtocolError::invalid_argument(format!(
                    "Value is longer than {} characters",
                    max_length
                )));
            }
        }

        Ok(value)
    }
}

/// Coerce a value into the representation of the declared data type.
fn normalize(data_type: DataType, value: PropertyValue) -> Result<PropertyValue> {
    let mismatch = |value: &PropertyValue| {
        ProtocolError::invalid_argument(format!(
            "Value '{}' of type {} does not match data type {}",
            value,
            value.type_name(),
            data_type
        ))
    };

    match data_type {
        DataType::Bool => match value {
            PropertyValue::Boolean(_) => Ok(value),
            PropertyValue::Integer(0) => Ok(PropertyValue::Boolean(false)),
            PropertyValue::Integer(1) => Ok(PropertyValue::Boolean(true)),
            other => Err(mismatch(&other)),
        },
        t if t.is_integer() => {
            let number = value.as_i64().ok_or_else(|| mismatch(&value))?;
            if let Some((min, max)) = t.integer_bounds() {
                if number < min || number > max {
                    return Err(ProtocolError::invalid_argument(format!(
                        "Value {} is out of bounds of data type {}",
                        number, t
                    )));
                }
            }
            Ok(PropertyValue::Integer(number))
        }
        DataType::Float => {
            if value.is_numeric() {
                Ok(value)
            } else {
                Err(mismatch(&value))
            }
        }
        DataType::String | DataType::Enum | DataType::Switch | DataType::Button => match value {
            PropertyValue::String(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        _ => Ok(value),
    }
}
