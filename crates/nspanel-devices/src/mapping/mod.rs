//! Declarative mapping between device categories and capability graphs.

pub mod capabilities;
pub mod catalog;
pub mod categories;

pub use capabilities::{
    AttributeDefinition, CapabilityDefinition, CapabilityKey, ConfigurationDefinition,
    GroupDefinition, DEFAULT_CLASS,
};
pub use catalog::{catalog_cache, CatalogSource, MappingCatalog, MappingCatalogCache};
pub use categories::CategoryDefinition;
