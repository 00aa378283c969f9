//! Attribute - one measured or controlled value inside a capability.
//!
//! An attribute tracks three values:
//! - **actual**: last value confirmed by the device
//! - **expected**: value requested but not yet confirmed, `None` when nothing is pending
//! - **pending**: whether (and since when) a change is outstanding
//!
//! Every write is validated against the attribute constraints before it
//! touches the state, so a rejected write never leaves a partial update.

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::constraints::Constraints;
use crate::error::Result;
use crate::types::{AttributeType, DataType};
use crate::value::{Pending, PropertyValue};

/// Mutable state of an attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeState {
    pub actual_value: Option<PropertyValue>,
    pub expected_value: Option<PropertyValue>,
    pub pending: Pending,
    pub valid: bool,
}

#[derive(Debug)]
pub struct Attribute {
    id: Uuid,
    attribute_type: AttributeType,
    data_type: DataType,
    capability: Uuid,
    constraints: Constraints,
    state: RwLock<AttributeState>,
}

impl Attribute {
    /// Create an attribute holding its default value, not yet valid.
    pub fn new(
        id: Uuid,
        attribute_type: AttributeType,
        data_type: DataType,
        capability: Uuid,
        constraints: Constraints,
    ) -> Self {
        let state = AttributeState {
            actual_value: constraints.default_value.clone(),
            ..AttributeState::default()
        };

        Self {
            id,
            attribute_type,
            data_type,
            capability,
            constraints,
            state: RwLock::new(state),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Owning capability id
    pub fn capability(&self) -> Uuid {
        self.capability
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Validate a value without storing it.
    pub fn validate(&self, value: PropertyValue) -> Result<PropertyValue> {
        self.constraints.validate(self.data_type, value)
    }

    /// Store the last known real value.
    ///
    /// `None` resets the attribute to its default value. When the new
    /// value equals the expected one, the expected value and the pending
    /// marker are cleared.
    pub fn set_actual_value(&self, value: Option<PropertyValue>) -> Result<()> {
        let value = match value {
            Some(value) => Some(self.validate(value)?),
            None => self.constraints.default_value.clone(),
        };

        let mut state = self.state.write();
        if value.is_some() && state.expected_value == value {
            state.expected_value = None;
            state.pending = Pending::Flag(false);
        }
        state.actual_value = value;

        Ok(())
    }

    /// Store the desired value.
    ///
    /// `None` clears the expected value and the pending marker. A value
    /// equal to the actual value is a no-op change and clears them too.
    pub fn set_expected_value(&self, value: Option<PropertyValue>) -> Result<()> {
        let value = match value {
            Some(value) => Some(self.validate(value)?),
            None => None,
        };

        let mut state = self.state.write();
        match value {
            Some(value) if state.actual_value.as_ref() != Some(&value) => {
                state.expected_value = Some(value);
                state.pending = Pending::Flag(true);
            }
            _ => {
                state.expected_value = None;
                state.pending = Pending::Flag(false);
            }
        }

        Ok(())
    }

    pub fn set_pending(&self, pending: impl Into<Pending>) {
        self.state.write().pending = pending.into();
    }

    pub fn set_valid(&self, valid: bool) {
        self.state.write().valid = valid;
    }

    /// Expected value when one is outstanding, otherwise the actual value.
    pub fn get_value(&self) -> Option<PropertyValue> {
        let state = self.state.read();
        state
            .expected_value
            .clone()
            .or_else(|| state.actual_value.clone())
    }

    pub fn actual_value(&self) -> Option<PropertyValue> {
        self.state.read().actual_value.clone()
    }

    pub fn expected_value(&self) -> Option<PropertyValue> {
        self.state.read().expected_value.clone()
    }

    pub fn pending(&self) -> Pending {
        self.state.read().pending
    }

    pub fn is_valid(&self) -> bool {
        self.state.read().valid
    }

    /// Snapshot of the mutable state.
    pub fn state(&self) -> AttributeState {
        self.state.read().clone()
    }

    /// `{attributeKey: value}` as sent to the panel.
    pub fn to_wire_state(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut state = serde_json::Map::new();
        state.insert(
            self.attribute_type.to_string(),
            self.get_value()
                .map(|value| value.to_json())
                .unwrap_or(serde_json::Value::Null),
        );
        state
    }
}
