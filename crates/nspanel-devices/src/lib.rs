//! NSPanel device graph.
//!
//! Models the devices a connector exposes to an NSPanel Pro: a [`Driver`]
//! owning [`Device`]s, each owning [`Capability`] instances which own
//! [`Attribute`]s (stateful values) and [`Configuration`] rows (static
//! descriptors). The graph is built by the [`Loader`] from persisted device
//! configuration and the declarative [`MappingCatalog`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nspanel_core::{ConnectorConfig, EventBus};
//! use nspanel_devices::{Collaborators, Driver, Loader, MemoryRepository};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConnectorConfig::from_env()?;
//! let repository = Arc::new(MemoryRepository::new());
//! let bus = Arc::new(EventBus::from_config(&config));
//! let loader = Loader::from_config(&config, Collaborators::from_repository(repository), bus)?;
//!
//! let driver = Driver::new().shared();
//! let report = loader.load(&driver).await?;
//! println!("{} devices loaded", report.loaded);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod factory;
pub mod loader;
pub mod mapping;
pub mod protocol;
pub mod repository;
pub mod types;
pub mod value;

pub use error::{ProtocolError, Result};
pub use factory::{DeviceExtras, FactoryRegistry, GENERIC_CLASS, NAMED_CLASS};
pub use loader::{Collaborators, LoadReport, Loader, SkippedDevice};
pub use mapping::{
    catalog_cache, CapabilityDefinition, CapabilityKey, CatalogSource, CategoryDefinition,
    MappingCatalog, MappingCatalogCache,
};
pub use protocol::{
    Attribute, AttributeState, Capability, CapabilityRules, Configuration, Constraints, Device,
    DeviceParams, DeviceVariant, Driver, RecalculateFn, SharedDriver, ThirdPartyInfo,
};
pub use repository::{
    ChannelConfiguration, ChannelProperty, ChannelSink, ChannelsRepository, DeviceConfiguration,
    DeviceProperty, DevicesRepository, MemoryRepository, PropertiesRepository, PropertyFormat,
    PropertyKind, PropertyState, PropertyStateRepository, StateSink, GATEWAY_DEVICE_TYPE,
};
pub use types::{
    AttributeType, CapabilityType, Category, ConfigurationType, DataType, DeviceKind, Group,
    Permission,
};
pub use value::{Pending, PropertyValue};
