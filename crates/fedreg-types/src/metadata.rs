//! Typed metadata attached to an entity revision.
//!
//! Field names are declared per entity type in configuration. A
//! [`MetadataSchema`] turns raw key/value pairs into a [`Metadata`] map:
//! declared names become [`MetadataKey`]s, undeclared names land in the
//! free-form extension map when the schema permits [`USER_DEFINED`], and
//! are rejected otherwise.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Marker name that opens a schema to arbitrary field names.
pub const USER_DEFINED: &str = "USERDEFINED";

/// Errors produced while validating metadata against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// A field name was empty.
    #[error("metadata field name cannot be empty")]
    EmptyKey,
    /// The field name is not declared and the schema is closed.
    #[error("metadata field '{0}' is not declared for this entity type")]
    UndeclaredKey(String),
    /// The same field name appeared twice.
    #[error("metadata field '{0}' given more than once")]
    DuplicateKey(String),
}

/// Per-field settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Placeholder value written by editors; rows holding it count as unset.
    #[serde(default)]
    pub default: Option<String>,
}

/// Metadata field declarations for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSchema {
    /// Accept undeclared field names into the extension map.
    #[serde(default)]
    pub user_defined: bool,
    /// Declared field names.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

/// A field name validated against a [`MetadataSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetadataKey(String);

impl MetadataKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Metadata of one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Values of declared fields.
    pub fields: BTreeMap<MetadataKey, String>,
    /// Values of undeclared fields (only when the schema is user-defined).
    pub extension: BTreeMap<String, String>,
}

impl Metadata {
    /// Looks a value up by name in either map.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, value)| value.as_str())
            .or_else(|| self.extension.get(name).map(String::as_str))
    }

    /// Iterates all pairs, declared fields first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(self.extension.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.extension.is_empty()
    }
}

impl MetadataSchema {
    /// A schema with no declared fields that accepts any name.
    pub fn open() -> Self {
        Self {
            user_defined: true,
            fields: BTreeMap::new(),
        }
    }

    /// Builds a schema from a field name list, where the [`USER_DEFINED`]
    /// marker opens the schema instead of declaring a field.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for name in names {
            let name = name.into();
            if name == USER_DEFINED {
                schema.user_defined = true;
            } else {
                schema.fields.insert(name, FieldSpec::default());
            }
        }
        schema
    }

    /// Returns the key for a declared field name.
    pub fn key(&self, name: &str) -> Option<MetadataKey> {
        self.fields
            .contains_key(name)
            .then(|| MetadataKey(name.to_string()))
    }

    /// The configured default value of a field, if any.
    pub fn default_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|f| f.default.as_deref())
    }

    /// Validates raw pairs and sorts them into declared and extension maps.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] on an empty name, a repeated name, or an
    /// undeclared name when the schema is closed.
    pub fn build<I, K, V>(&self, pairs: I) -> Result<Metadata, MetadataError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut metadata = Metadata::default();
        for (name, value) in pairs {
            let name = name.into();
            if name.is_empty() {
                return Err(MetadataError::EmptyKey);
            }
            let previous = match self.key(&name) {
                Some(key) => metadata.fields.insert(key, value.into()),
                None if self.user_defined => metadata.extension.insert(name.clone(), value.into()),
                None => return Err(MetadataError::UndeclaredKey(name)),
            };
            if previous.is_some() {
                return Err(MetadataError::DuplicateKey(name));
            }
        }
        Ok(metadata)
    }

    /// Sorts stored pairs without rejecting anything. Names the schema no
    /// longer declares are kept in the extension map.
    pub fn from_stored<I>(&self, pairs: I) -> Metadata
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut metadata = Metadata::default();
        for (name, value) in pairs {
            match self.key(&name) {
                Some(key) => {
                    metadata.fields.insert(key, value);
                }
                None => {
                    metadata.extension.insert(name, value);
                }
            }
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idp_schema(user_defined: bool) -> MetadataSchema {
        let mut names = vec!["SingleSignOnService", "name:en"];
        if user_defined {
            names.push(USER_DEFINED);
        }
        MetadataSchema::from_names(names)
    }

    #[test]
    fn declared_fields_become_keys() {
        let schema = idp_schema(false);
        let md = schema
            .build([("name:en", "Example IdP"), ("SingleSignOnService", "https://idp/sso")])
            .expect("declared fields should validate");
        assert_eq!(md.fields.len(), 2);
        assert!(md.extension.is_empty());
        assert_eq!(md.get("name:en"), Some("Example IdP"));
    }

    #[test]
    fn closed_schema_rejects_unknown_names() {
        let err = idp_schema(false)
            .build([("certFingerprint", "ab:cd")])
            .unwrap_err();
        assert_eq!(err, MetadataError::UndeclaredKey("certFingerprint".to_string()));
    }

    #[test]
    fn user_defined_schema_collects_extensions() {
        let md = idp_schema(true)
            .build([("name:en", "IdP"), ("x-custom", "1")])
            .expect("open schema should accept unknown names");
        assert_eq!(md.fields.len(), 1);
        assert_eq!(md.extension.get("x-custom").map(String::as_str), Some("1"));
        assert_eq!(md.iter().count(), 2);
    }

    #[test]
    fn stored_rows_survive_schema_changes() {
        let md = idp_schema(false).from_stored([
            ("name:en".to_string(), "IdP".to_string()),
            ("retired-field".to_string(), "x".to_string()),
        ]);
        assert_eq!(md.fields.len(), 1);
        assert_eq!(md.get("retired-field"), Some("x"));
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let schema = MetadataSchema::open();
        assert_eq!(
            schema.build([("a", "1"), ("a", "2")]).unwrap_err(),
            MetadataError::DuplicateKey("a".to_string())
        );
        assert_eq!(schema.build([("", "1")]).unwrap_err(), MetadataError::EmptyKey);
    }
}
