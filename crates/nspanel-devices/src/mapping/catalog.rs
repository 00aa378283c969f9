//! Mapping catalog - which capabilities, attributes and configuration rows
//! belong to each device category.
//!
//! The catalog is plain data parsed once from two JSON documents. The
//! defaults are compiled into the crate and may be replaced by files named
//! in the connector configuration.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::capabilities::{CapabilityDefinition, GroupDefinition};
use super::categories::CategoryDefinition;
use crate::error::{ProtocolError, Result};
use crate::types::{CapabilityType, Category, Group};
use nspanel_core::ConnectorConfig;

const EMBEDDED_CATEGORIES: &str = include_str!("../../resources/categories.json");
const EMBEDDED_CAPABILITIES: &str = include_str!("../../resources/capabilities.json");

#[derive(Debug, Clone)]
pub struct MappingCatalog {
    categories: HashMap<Category, CategoryDefinition>,
    groups: HashMap<Group, GroupDefinition>,
}

impl MappingCatalog {
    /// Parse and validate both catalog documents.
    pub fn from_json(categories: &str, capabilities: &str) -> Result<Self> {
        let categories: Vec<CategoryDefinition> = serde_json::from_str(categories)
            .map_err(|e| ProtocolError::mapping(format!("Invalid categories catalog: {}", e)))?;
        let groups: Vec<GroupDefinition> = serde_json::from_str(capabilities)
            .map_err(|e| ProtocolError::mapping(format!("Invalid capabilities catalog: {}", e)))?;

        let mut catalog = Self {
            categories: HashMap::with_capacity(categories.len()),
            groups: HashMap::with_capacity(groups.len()),
        };

        for row in categories {
            let category = row.category;
            if catalog.categories.insert(category, row).is_some() {
                return Err(ProtocolError::mapping(format!(
                    "Category '{}' is defined twice",
                    category
                )));
            }
        }
        for row in groups {
            let group = row.group;
            if catalog.groups.insert(group, row).is_some() {
                return Err(ProtocolError::mapping(format!(
                    "Capability group '{}' is defined twice",
                    group
                )));
            }
        }

        catalog.validate()?;
        Ok(catalog)
    }

    /// Catalog compiled into the crate.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_CATEGORIES, EMBEDDED_CAPABILITIES)
    }

    /// Load the catalog, replacing each embedded document with a file when
    /// a path is given.
    pub fn from_files(categories: Option<&Path>, capabilities: Option<&Path>) -> Result<Self> {
        let categories = match categories {
            Some(path) => read_document(path)?,
            None => EMBEDDED_CATEGORIES.to_string(),
        };
        let capabilities = match capabilities {
            Some(path) => read_document(path)?,
            None => EMBEDDED_CAPABILITIES.to_string(),
        };
        Self::from_json(&categories, &capabilities)
    }

    fn validate(&self) -> Result<()> {
        for definition in self.categories.values() {
            for group in definition.groups() {
                if !self.groups.contains_key(group) {
                    return Err(ProtocolError::mapping(format!(
                        "Category '{}' references unknown capability group '{}'",
                        definition.category, group
                    )));
                }
            }
        }

        for definition in self.groups.values() {
            let mut keys = HashSet::new();
            for capability in &definition.capabilities {
                if !keys.insert(&capability.capability) {
                    return Err(ProtocolError::mapping(format!(
                        "Capability '{}' is defined twice in group '{}'",
                        capability.capability, definition.group
                    )));
                }
                capability.validate()?;
            }
        }

        Ok(())
    }

    pub fn get_category_definition(&self, category: Category) -> Option<&CategoryDefinition> {
        self.categories.get(&category)
    }

    pub fn get_capability_group(&self, group: Group) -> Option<&[CapabilityDefinition]> {
        self.groups
            .get(&group)
            .map(|definition| definition.capabilities.as_slice())
    }

    /// Find the definition of a capability.
    ///
    /// An exact `(type, name)` match wins. A named instance of a capability
    /// marked `multiple` falls back to the unnamed definition.
    pub fn find_capability_definition(
        &self,
        capability_type: CapabilityType,
        name: Option<&str>,
    ) -> Option<&CapabilityDefinition> {
        let definitions = || {
            self.groups
                .values()
                .flat_map(|group| group.capabilities.iter())
                .filter(move |definition| definition.capability_type() == capability_type)
        };

        definitions()
            .find(|definition| definition.name() == name)
            .or_else(|| {
                name?;
                definitions().find(|definition| definition.name().is_none() && definition.multiple)
            })
    }

    /// Required and optional capability types of a category, drawn from its
    /// capability groups. A type listed by both sides counts as required.
    pub fn category_capabilities(
        &self,
        category: Category,
    ) -> Option<(BTreeSet<CapabilityType>, BTreeSet<CapabilityType>)> {
        let definition = self.get_category_definition(category)?;

        let collect = |groups: &[Group]| -> BTreeSet<CapabilityType> {
            groups
                .iter()
                .filter_map(|group| self.get_capability_group(*group))
                .flatten()
                .map(CapabilityDefinition::capability_type)
                .collect()
        };

        let required = collect(&definition.required_capabilities_groups);
        let optional = collect(&definition.optional_capabilities_groups)
            .difference(&required)
            .copied()
            .collect();

        Some((required, optional))
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupDefinition> {
        self.groups.values()
    }

    /// Every capability definition of every group.
    pub fn capability_definitions(&self) -> impl Iterator<Item = &CapabilityDefinition> {
        self.groups
            .values()
            .flat_map(|group| group.capabilities.iter())
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ProtocolError::mapping(format!(
            "Failed to read mapping catalog {}: {}",
            path.display(),
            e
        ))
    })
}

/// Where a catalog is loaded from. `None` selects the embedded document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CatalogSource {
    pub categories: Option<PathBuf>,
    pub capabilities: Option<PathBuf>,
}

impl CatalogSource {
    pub fn embedded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            categories: config.categories_mapping.clone(),
            capabilities: config.capabilities_mapping.clone(),
        }
    }

    pub fn load(&self) -> Result<MappingCatalog> {
        MappingCatalog::from_files(self.categories.as_deref(), self.capabilities.as_deref())
    }
}

/// Process-wide cache of parsed catalogs.
#[derive(Debug, Default)]
pub struct MappingCatalogCache {
    entries: RwLock<HashMap<CatalogSource, Arc<MappingCatalog>>>,
}

impl MappingCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached catalog of `source`, parsing it on first use.
    pub fn get_or_load(&self, source: &CatalogSource) -> Result<Arc<MappingCatalog>> {
        if let Some(catalog) = self.entries.read().get(source) {
            return Ok(Arc::clone(catalog));
        }

        let mut entries = self.entries.write();
        if let Some(catalog) = entries.get(source) {
            return Ok(Arc::clone(catalog));
        }

        let catalog = Arc::new(source.load()?);
        info!(
            categories = catalog.categories.len(),
            groups = catalog.groups.len(),
            "Loaded mapping catalog"
        );
        entries.insert(source.clone(), Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Forget every cached catalog.
    pub fn invalidate(&self) {
        let mut entries = self.entries.write();
        debug!(count = entries.len(), "Invalidating mapping catalogs");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

static CATALOG_CACHE: Lazy<MappingCatalogCache> = Lazy::new(MappingCatalogCache::new);

/// Get the global catalog cache.
pub fn catalog_cache() -> &'static MappingCatalogCache {
    &CATALOG_CACHE
}
