//! Driver - registry of every device of one connector.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::attribute::Attribute;
use super::device::Device;
use crate::error::{ProtocolError, Result};

/// Committed device graph shared by the connector.
///
/// The loader builds a new [`Driver`] privately and replaces the shared one
/// with a single write, so readers never see a half-built graph.
pub type SharedDriver = Arc<RwLock<Driver>>;

#[derive(Debug, Default)]
pub struct Driver {
    devices: Vec<Device>,
    index: HashMap<Uuid, usize>,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a driver for sharing.
    pub fn shared(self) -> SharedDriver {
        Arc::new(RwLock::new(self))
    }

    /// Drop every device.
    pub fn reset(&mut self) {
        self.devices.clear();
        self.index.clear();
    }

    pub fn add_device(&mut self, device: Device) -> Result<()> {
        if self.index.contains_key(&device.id()) {
            return Err(ProtocolError::invalid_argument(format!(
                "Device {} is already registered",
                device.id()
            )));
        }

        self.index.insert(device.id(), self.devices.len());
        self.devices.push(device);
        Ok(())
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Devices whose parent gateway is `gateway`.
    pub fn find_devices_by_parent(&self, gateway: Uuid) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|device| device.gateway() == gateway)
            .collect()
    }

    pub fn find_device(&self, id: Uuid) -> Option<&Device> {
        self.index.get(&id).and_then(|index| self.devices.get(*index))
    }

    pub fn find_device_by_identifier(&self, identifier: &str) -> Option<&Device> {
        self.devices
            .iter()
            .find(|device| device.identifier() == identifier)
    }

    /// Find an attribute anywhere in the graph.
    pub fn find_attribute(&self, id: Uuid) -> Option<&Attribute> {
        self.devices
            .iter()
            .find_map(|device| device.find_attribute(id))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn to_wire_representation(&self) -> Vec<serde_json::Value> {
        self.devices
            .iter()
            .map(Device::to_wire_representation)
            .collect()
    }
}
