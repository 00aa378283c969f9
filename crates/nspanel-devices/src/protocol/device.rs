//! Device - a panel sub-device or a third-party device bridged by the
//! connector, owning its capabilities.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::attribute::Attribute;
use super::capability::Capability;
use super::wire::deep_merge;
use crate::error::{ProtocolError, Result};
use crate::types::{AttributeType, CapabilityType, Category, DeviceKind};
use crate::value::PropertyValue;

/// Fields shared by every device variant.
#[derive(Debug, Clone)]
pub struct DeviceParams {
    pub id: Uuid,
    /// Stable identifier of the device configuration
    pub identifier: String,
    /// Parent gateway id
    pub gateway: Uuid,
    pub connector: Uuid,
    pub category: Category,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub required_capabilities: BTreeSet<CapabilityType>,
    pub optional_capabilities: BTreeSet<CapabilityType>,
}

/// Extra state of a bridged third-party device.
#[derive(Debug, Default)]
pub struct ThirdPartyInfo {
    pub gateway_name: Option<String>,
    pub service_address: Option<String>,
    online: AtomicBool,
    provisioned: AtomicBool,
    corrupted: bool,
}

impl ThirdPartyInfo {
    pub fn new(gateway_name: Option<String>, service_address: Option<String>) -> Self {
        Self {
            gateway_name,
            service_address,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub enum DeviceVariant {
    SubDevice,
    ThirdParty(ThirdPartyInfo),
}

#[derive(Debug)]
pub struct Device {
    params: DeviceParams,
    variant: DeviceVariant,
    capabilities: Vec<Capability>,
}

impl Device {
    pub fn sub_device(params: DeviceParams) -> Self {
        Self {
            params,
            variant: DeviceVariant::SubDevice,
            capabilities: Vec::new(),
        }
    }

    pub fn third_party(params: DeviceParams, info: ThirdPartyInfo) -> Self {
        Self {
            params,
            variant: DeviceVariant::ThirdParty(info),
            capabilities: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.params.id
    }

    pub fn identifier(&self) -> &str {
        &self.params.identifier
    }

    pub fn gateway(&self) -> Uuid {
        self.params.gateway
    }

    pub fn connector(&self) -> Uuid {
        self.params.connector
    }

    pub fn category(&self) -> Category {
        self.params.category
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.params.manufacturer.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.params.model.as_deref()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.params.firmware_version.as_deref()
    }

    pub fn kind(&self) -> DeviceKind {
        match self.variant {
            DeviceVariant::SubDevice => DeviceKind::SubDevice,
            DeviceVariant::ThirdParty(_) => DeviceKind::ThirdPartyDevice,
        }
    }

    pub fn variant(&self) -> &DeviceVariant {
        &self.variant
    }

    pub fn third_party_info(&self) -> Option<&ThirdPartyInfo> {
        match &self.variant {
            DeviceVariant::ThirdParty(info) => Some(info),
            DeviceVariant::SubDevice => None,
        }
    }

    pub fn required_capabilities(&self) -> &BTreeSet<CapabilityType> {
        &self.params.required_capabilities
    }

    pub fn optional_capabilities(&self) -> &BTreeSet<CapabilityType> {
        &self.params.optional_capabilities
    }

    pub fn allows_capability(&self, capability_type: CapabilityType) -> bool {
        self.params.required_capabilities.contains(&capability_type)
            || self.params.optional_capabilities.contains(&capability_type)
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn add_capability(&mut self, capability: Capability) -> Result<()> {
        if !self.allows_capability(capability.capability_type()) {
            return Err(ProtocolError::invalid_argument(format!(
                "Capability '{}' is not allowed for device '{}' of category '{}'",
                capability.capability_type(),
                self.params.identifier,
                self.params.category
            )));
        }

        if capability.device() != self.params.id {
            return Err(ProtocolError::invalid_argument(format!(
                "Capability '{}' belongs to device {}, not {}",
                capability.id(),
                capability.device(),
                self.params.id
            )));
        }

        self.capabilities.push(capability);
        Ok(())
    }

    pub fn find_capability(&self, id: Uuid) -> Option<&Capability> {
        self.capabilities.iter().find(|capability| capability.id() == id)
    }

    /// Capabilities of the given type. With a name only the matching
    /// instance is returned.
    pub fn find_capabilities_by_type(
        &self,
        capability_type: CapabilityType,
        name: Option<&str>,
    ) -> Vec<&Capability> {
        self.capabilities
            .iter()
            .filter(|capability| capability.capability_type() == capability_type)
            .filter(|capability| name.is_none() || capability.name() == name)
            .collect()
    }

    /// Find an attribute of any capability by id.
    pub fn find_attribute(&self, id: Uuid) -> Option<&Attribute> {
        self.capabilities
            .iter()
            .find_map(|capability| capability.find_attribute_by_id(id))
    }

    pub fn recalculate_capabilities(&self) {
        for capability in &self.capabilities {
            capability.recalculate_attributes(None);
        }
    }

    /// Required capability types without an attached capability.
    pub fn missing_capabilities(&self) -> Vec<CapabilityType> {
        self.params
            .required_capabilities
            .iter()
            .filter(|capability_type| {
                !self
                    .capabilities
                    .iter()
                    .any(|capability| capability.capability_type() == **capability_type)
            })
            .copied()
            .collect()
    }

    /// Mark the graph under this device as incomplete. Only bridged devices
    /// track the flag, for a sub-device this is a no-op.
    pub fn set_corrupted(&mut self, corrupted: bool) {
        if let DeviceVariant::ThirdParty(info) = &mut self.variant {
            info.corrupted = corrupted;
        }
    }

    pub fn is_corrupted(&self) -> bool {
        self.third_party_info()
            .map(|info| info.corrupted)
            .unwrap_or(false)
    }

    pub fn set_online(&self, online: bool) {
        if let Some(info) = self.third_party_info() {
            info.online.store(online, Ordering::Release);
        }
    }

    pub fn is_online(&self) -> bool {
        self.third_party_info()
            .map(|info| info.online.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn set_provisioned(&self, provisioned: bool) {
        if let Some(info) = self.third_party_info() {
            info.provisioned.store(provisioned, Ordering::Release);
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.third_party_info()
            .map(|info| info.provisioned.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Device object as sent to the panel.
    pub fn to_wire_representation(&self) -> Value {
        let mut device = Map::new();

        let id_key = match self.variant {
            DeviceVariant::SubDevice => "id",
            DeviceVariant::ThirdParty(_) => "third_serial_number",
        };
        device.insert(id_key.to_string(), Value::from(self.params.id.to_string()));
        device.insert("name".to_string(), Value::from(self.params.name.as_str()));
        device.insert(
            "display_category".to_string(),
            Value::from(self.params.category.as_str()),
        );
        device.insert(
            "capabilities".to_string(),
            Value::Array(
                self.capabilities
                    .iter()
                    .map(Capability::to_wire_definition)
                    .collect(),
            ),
        );

        let mut state = Map::new();
        for capability in &self.capabilities {
            deep_merge(&mut state, capability.to_wire_state());
        }
        device.insert("state".to_string(), Value::Object(state));
        device.insert("tags".to_string(), Value::Object(Map::new()));
        device.insert(
            "manufacturer".to_string(),
            optional_string(&self.params.manufacturer),
        );
        device.insert("model".to_string(), optional_string(&self.params.model));
        device.insert(
            "firmware_version".to_string(),
            optional_string(&self.params.firmware_version),
        );

        if let DeviceVariant::ThirdParty(info) = &self.variant {
            device.insert(
                "service_address".to_string(),
                optional_string(&info.service_address),
            );
            device.insert("online".to_string(), Value::Bool(self.is_online()));
        }

        Value::Object(device)
    }

    /// Apply a vendor state object, storing each known value as the
    /// expected value of its attribute.
    ///
    /// Returns the ids of the attributes that were written. Unknown
    /// capabilities or attributes are skipped. Every capability that had
    /// an attribute written is recalculated, with the first written
    /// attribute as the trigger.
    pub fn apply_wire_state(&self, state: &Value) -> Result<Vec<Uuid>> {
        let state = state.as_object().ok_or_else(|| {
            ProtocolError::invalid_argument("Device state must be a JSON object")
        })?;

        let mut written = Vec::new();
        for (key, body) in state {
            let capability_type = match key.parse::<CapabilityType>() {
                Ok(capability_type) => capability_type,
                Err(_) => {
                    debug!(device = %self.params.id, capability = %key, "Skipping unknown capability");
                    continue;
                }
            };
            let Some(body) = body.as_object() else {
                debug!(device = %self.params.id, capability = %key, "Skipping non-object state");
                continue;
            };

            for capability in self.find_capabilities_by_type(capability_type, None) {
                let attributes = match capability.name() {
                    Some(name) => match body.get(name).and_then(Value::as_object) {
                        Some(attributes) => attributes,
                        None => continue,
                    },
                    None => body,
                };

                let mut trigger = None;
                let mut outcome = Ok(());
                for (attribute_key, value) in attributes {
                    let attribute = attribute_key
                        .parse::<AttributeType>()
                        .ok()
                        .and_then(|attribute_type| capability.find_attribute(attribute_type));
                    let Some(attribute) = attribute else {
                        debug!(
                            device = %self.params.id,
                            capability = %key,
                            attribute = %attribute_key,
                            "Skipping unknown attribute"
                        );
                        continue;
                    };

                    if let Err(e) = attribute.set_expected_value(PropertyValue::from_json(value)) {
                        outcome = Err(e);
                        break;
                    }
                    trigger.get_or_insert(attribute.id());
                    written.push(attribute.id());
                }

                // Writes that went through before a rejection still count.
                if trigger.is_some() {
                    capability.recalculate_attributes(trigger);
                }
                outcome?;
            }
        }

        Ok(written)
    }
}

fn optional_string(value: &Option<String>) -> Value {
    value
        .as_deref()
        .map(Value::from)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::capability::CapabilityRules;
    use crate::protocol::constraints::Constraints;
    use crate::types::{DataType, Permission};
    use serde_json::json;

    fn params(category: Category, required: &[CapabilityType], optional: &[CapabilityType]) -> DeviceParams {
        DeviceParams {
            id: Uuid::new_v4(),
            identifier: "living-room-plug".to_string(),
            gateway: Uuid::new_v4(),
            connector: Uuid::new_v4(),
            category,
            name: "Living room plug".to_string(),
            manufacturer: Some("Sonoff".to_string()),
            model: Some("S26".to_string()),
            firmware_version: Some("1.2.0".to_string()),
            required_capabilities: required.iter().copied().collect(),
            optional_capabilities: optional.iter().copied().collect(),
        }
    }

    fn power(device: Uuid) -> Capability {
        let mut capability = Capability::new(
            Uuid::new_v4(),
            CapabilityType::Power,
            None,
            Permission::ReadWrite,
            device,
            CapabilityRules {
                required_attributes: BTreeSet::from([AttributeType::PowerState]),
                ..Default::default()
            },
        );
        let attribute = Attribute::new(
            Uuid::new_v4(),
            AttributeType::PowerState,
            DataType::Enum,
            capability.id(),
            Constraints::default()
                .with_valid_values(vec!["on", "off"])
                .with_default("off"),
        );
        capability.add_attribute(attribute).unwrap();
        capability
    }

    fn toggle(device: Uuid, name: &str) -> Capability {
        let mut capability = Capability::new(
            Uuid::new_v4(),
            CapabilityType::Toggle,
            Some(name.to_string()),
            Permission::ReadWrite,
            device,
            CapabilityRules {
                required_attributes: BTreeSet::from([AttributeType::ToggleState]),
                ..Default::default()
            },
        );
        let attribute = Attribute::new(
            Uuid::new_v4(),
            AttributeType::ToggleState,
            DataType::Enum,
            capability.id(),
            Constraints::default()
                .with_valid_values(vec!["on", "off"])
                .with_default("off"),
        );
        capability.add_attribute(attribute).unwrap();
        capability
    }

    #[test]
    fn test_add_capability_allow_list() {
        let mut device = Device::sub_device(params(
            Category::Plug,
            &[CapabilityType::Power],
            &[CapabilityType::Rssi],
        ));
        assert!(device.add_capability(power(device.id())).is_ok());

        let rejected = toggle(device.id(), "1");
        assert!(matches!(
            device.add_capability(rejected),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert_eq!(device.capabilities().len(), 1);
        assert!(device.missing_capabilities().is_empty());
    }

    #[test]
    fn test_find_capabilities_by_type() {
        let mut device = Device::sub_device(params(
            Category::Switch,
            &[CapabilityType::Toggle],
            &[],
        ));
        device.add_capability(toggle(device.id(), "1")).unwrap();
        device.add_capability(toggle(device.id(), "2")).unwrap();

        assert_eq!(device.find_capabilities_by_type(CapabilityType::Toggle, None).len(), 2);
        let second = device.find_capabilities_by_type(CapabilityType::Toggle, Some("2"));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name(), Some("2"));
        assert!(device
            .find_capabilities_by_type(CapabilityType::Toggle, Some("3"))
            .is_empty());
    }

    #[test]
    fn test_sub_device_wire_representation() {
        let mut device = Device::sub_device(params(
            Category::Switch,
            &[CapabilityType::Toggle],
            &[],
        ));
        device.add_capability(toggle(device.id(), "1")).unwrap();
        device.add_capability(toggle(device.id(), "2")).unwrap();

        let wire = device.to_wire_representation();
        assert_eq!(wire["id"], json!(device.id().to_string()));
        assert_eq!(wire["display_category"], "switch");
        assert_eq!(wire["tags"], json!({}));
        assert_eq!(wire["manufacturer"], "Sonoff");
        assert_eq!(
            wire["state"],
            json!({"toggle": {"1": {"toggleState": "off"}, "2": {"toggleState": "off"}}})
        );
        assert_eq!(wire["capabilities"].as_array().map(Vec::len), Some(2));
        assert!(wire.get("online").is_none());
        assert!(wire.get("third_serial_number").is_none());
    }

    #[test]
    fn test_third_party_wire_representation() {
        let device = Device::third_party(
            params(Category::Plug, &[CapabilityType::Power], &[]),
            ThirdPartyInfo::new(Some("Gateway".to_string()), Some("http://10.0.0.2:8080".to_string())),
        );
        device.set_online(true);

        let wire = device.to_wire_representation();
        assert_eq!(wire["third_serial_number"], json!(device.id().to_string()));
        assert_eq!(wire["service_address"], "http://10.0.0.2:8080");
        assert_eq!(wire["online"], true);
        assert!(wire.get("id").is_none());
    }

    #[test]
    fn test_runtime_flags() {
        let mut device = Device::third_party(
            params(Category::Plug, &[CapabilityType::Power], &[]),
            ThirdPartyInfo::default(),
        );
        assert!(!device.is_corrupted());
        device.set_corrupted(true);
        assert!(device.is_corrupted());

        device.set_provisioned(true);
        assert!(device.is_provisioned());

        let mut sub_device = Device::sub_device(params(Category::Plug, &[CapabilityType::Power], &[]));
        sub_device.set_corrupted(true);
        sub_device.set_online(true);
        assert!(!sub_device.is_corrupted());
        assert!(!sub_device.is_online());
    }

    #[test]
    fn test_apply_wire_state() {
        let mut device = Device::sub_device(params(
            Category::Switch,
            &[CapabilityType::Toggle],
            &[CapabilityType::Power],
        ));
        device.add_capability(power(device.id())).unwrap();
        device.add_capability(toggle(device.id(), "1")).unwrap();
        device.add_capability(toggle(device.id(), "2")).unwrap();

        let written = device
            .apply_wire_state(&json!({
                "power": {"powerState": "on"},
                "toggle": {"2": {"toggleState": "on"}},
                "percentage": {"percent": 20},
                "rssi": {"rssi": -40}
            }))
            .unwrap();
        assert_eq!(written.len(), 2);

        let second = device.find_capabilities_by_type(CapabilityType::Toggle, Some("2"))[0];
        let attribute = second.find_attribute(AttributeType::ToggleState).unwrap();
        assert_eq!(attribute.expected_value(), Some("on".into()));
        assert!(attribute.pending().is_pending());

        let err = device.apply_wire_state(&json!({"power": {"powerState": "bright"}}));
        assert!(err.is_err());
    }

    static POWER_TRIGGERS: parking_lot::Mutex<Vec<Option<Uuid>>> =
        parking_lot::const_mutex(Vec::new());

    fn record_power_trigger(_capability: &Capability, trigger: Option<Uuid>) {
        POWER_TRIGGERS.lock().push(trigger);
    }

    #[test]
    fn test_apply_wire_state_recalculates_touched_capabilities() {
        let mut device = Device::sub_device(params(
            Category::Switch,
            &[CapabilityType::Toggle],
            &[CapabilityType::Power],
        ));
        let power = power(device.id()).with_recalculate(Some(record_power_trigger));
        let power_state = power
            .find_attribute(AttributeType::PowerState)
            .unwrap()
            .id();
        device.add_capability(power).unwrap();
        device.add_capability(toggle(device.id(), "1")).unwrap();

        device
            .apply_wire_state(&json!({"toggle": {"1": {"toggleState": "on"}}}))
            .unwrap();
        assert!(POWER_TRIGGERS.lock().is_empty());

        device
            .apply_wire_state(&json!({"power": {"powerState": "on"}}))
            .unwrap();
        assert_eq!(*POWER_TRIGGERS.lock(), vec![Some(power_state)]);
    }
}
