//! Protocol graph: driver, devices, capabilities, attributes and
//! configuration rows.
//!
//! Ownership is a tree: the [`Driver`] owns devices, a [`Device`] owns its
//! capabilities and a [`Capability`] owns its attributes and configuration
//! rows. Parents are referenced by id. Only attribute values change after a
//! graph is built.

pub mod attribute;
pub mod capability;
pub mod configuration;
pub mod constraints;
pub mod device;
pub mod driver;
pub mod wire;

pub use attribute::{Attribute, AttributeState};
pub use capability::{Capability, CapabilityRules, RecalculateFn};
pub use configuration::Configuration;
pub use constraints::Constraints;
pub use device::{Device, DeviceParams, DeviceVariant, ThirdPartyInfo};
pub use driver::{Driver, SharedDriver};
pub use wire::deep_merge;
