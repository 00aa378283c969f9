//! Category rows of the mapping catalog.

use serde::{Deserialize, Serialize};

use crate::types::{Category, Group};

/// Capability groups a device category requires and permits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub category: Category,
    #[serde(default)]
    pub required_capabilities_groups: Vec<Group>,
    #[serde(default)]
    pub optional_capabilities_groups: Vec<Group>,
}

impl CategoryDefinition {
    /// Every group referenced by the category, required first.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.required_capabilities_groups
            .iter()
            .chain(self.optional_capabilities_groups.iter())
    }
}
