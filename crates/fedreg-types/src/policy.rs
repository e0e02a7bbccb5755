//! Registry policy configuration.

use crate::{EntityState, EntityType, MetadataSchema};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Registry-level settings consumed by the entity services.
///
/// Loaded from the `[registry]` table of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// Lifecycle states a revision may carry.
    #[serde(default = "default_states")]
    pub states: Vec<EntityState>,
    /// Enable flag per entity type. Types missing here are disabled.
    #[serde(default = "default_enabled_types")]
    pub enabled_types: BTreeMap<EntityType, bool>,
    /// Metadata field used to sort entity listings.
    #[serde(default)]
    pub pretty_name: Option<String>,
    /// Metadata schema per entity type.
    #[serde(default)]
    pub metadata_fields: BTreeMap<EntityType, MetadataSchema>,
}

/// One row of the type enable matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeAvailability {
    pub entity_type: EntityType,
    pub name: String,
    pub enabled: bool,
}

fn default_states() -> Vec<EntityState> {
    vec![
        EntityState::Accepted,
        EntityState::Pending,
        EntityState::PendingDelete,
        EntityState::Deleted,
    ]
}

fn default_enabled_types() -> BTreeMap<EntityType, bool> {
    BTreeMap::from([(EntityType::Saml20Sp, true), (EntityType::Saml20Idp, true)])
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            states: default_states(),
            enabled_types: default_enabled_types(),
            pretty_name: None,
            metadata_fields: BTreeMap::new(),
        }
    }
}

impl RegistryPolicy {
    pub fn is_type_enabled(&self, entity_type: &EntityType) -> bool {
        self.enabled_types.get(entity_type).copied().unwrap_or(false)
    }

    pub fn is_state_declared(&self, state: &EntityState) -> bool {
        self.states.contains(state)
    }

    /// The enable matrix: every built-in type, then any custom type named
    /// in `enabled_types`.
    pub fn allowed_types(&self) -> Vec<TypeAvailability> {
        let custom = self
            .enabled_types
            .keys()
            .filter(|t| matches!(t, EntityType::Custom(_)));

        EntityType::BUILTIN
            .iter()
            .chain(custom)
            .map(|t| TypeAvailability {
                entity_type: t.clone(),
                name: t.display_name().to_string(),
                enabled: self.is_type_enabled(t),
            })
            .collect()
    }

    /// Metadata schema for a type. Types without a configured schema accept
    /// any field name.
    pub fn schema_for(&self, entity_type: &EntityType) -> Cow<'_, MetadataSchema> {
        match self.metadata_fields.get(entity_type) {
            Some(schema) => Cow::Borrowed(schema),
            None => Cow::Owned(MetadataSchema::open()),
        }
    }

    /// The pretty-name field with surrounding whitespace removed, or `None`
    /// when unset or blank.
    pub fn pretty_name_field(&self) -> Option<&str> {
        self.pretty_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Placeholder value of the pretty-name field.
    ///
    /// The IdP schema is consulted when one is configured, otherwise the SP
    /// schema. A missing field or missing default yields the empty string.
    pub fn pretty_name_default(&self) -> String {
        let Some(field) = self.pretty_name_field() else {
            return String::new();
        };
        let schema = self
            .metadata_fields
            .get(&EntityType::Saml20Idp)
            .or_else(|| self.metadata_fields.get(&EntityType::Saml20Sp));

        schema
            .and_then(|s| s.default_value(field))
            .unwrap_or_default()
            .to_string()
    }
}
