//! Shared types for the fedreg federation registry.
//!
//! This crate holds the records that cross crate boundaries: entity
//! identifiers, the lifecycle state and protocol type enums, revision and
//! summary rows, administrator accounts, and the registry policy that the
//! configuration layer hands to the core.
//!
//! States and types are open sets. The well-known values get dedicated
//! variants; anything else declared in configuration is carried as
//! `Custom`. Both serialize to their canonical string form, which is also
//! the form stored in the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod metadata;
mod policy;

pub use metadata::{FieldSpec, Metadata, MetadataError, MetadataKey, MetadataSchema, USER_DEFINED};
pub use policy::{RegistryPolicy, TypeAvailability};

/// Logical entity identifier. Immutable for the lifetime of the entity.
pub type Eid = i64;

/// Administrator account identifier.
pub type Uid = i64;

/// Error returned when a state or type label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseLabelError {
    /// The label was empty or whitespace.
    #[error("{0} label cannot be empty")]
    Empty(&'static str),
}

/// Lifecycle state of an entity revision.
///
/// The conceptual order is `pending -> accepted -> pendingdelete -> deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityState {
    Accepted,
    Pending,
    PendingDelete,
    Deleted,
    /// A state declared only in configuration.
    Custom(String),
}

impl EntityState {
    /// Returns the canonical label for this state.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => "accepted",
            Self::Pending => "pending",
            Self::PendingDelete => "pendingdelete",
            Self::Deleted => "deleted",
            Self::Custom(label) => label,
        }
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Whether a new revision may move an entity from `self` to `next`.
    ///
    /// Built-in states only move forward along the lifecycle (or stay put).
    /// Custom states are not ordered and are always allowed.
    pub fn can_transition_to(&self, next: &EntityState) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => !self.is_terminal() && to >= from || self == next,
            _ => true,
        }
    }

    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Accepted => Some(1),
            Self::PendingDelete => Some(2),
            Self::Deleted => Some(3),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityState {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ParseLabelError::Empty("state")),
            "accepted" => Ok(Self::Accepted),
            "pending" => Ok(Self::Pending),
            "pendingdelete" => Ok(Self::PendingDelete),
            "deleted" => Ok(Self::Deleted),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl From<EntityState> for String {
    fn from(state: EntityState) -> Self {
        state.as_str().to_string()
    }
}

impl TryFrom<String> for EntityState {
    type Error = ParseLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Federation protocol role of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityType {
    Saml20Sp,
    Saml20Idp,
    Shib13Sp,
    Shib13Idp,
    /// A type declared only in configuration.
    Custom(String),
}

impl EntityType {
    /// The built-in types, in the order they are presented to operators.
    pub const BUILTIN: [EntityType; 4] = [
        EntityType::Saml20Sp,
        EntityType::Saml20Idp,
        EntityType::Shib13Sp,
        EntityType::Shib13Idp,
    ];

    /// Returns the canonical label for this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Saml20Sp => "saml20-sp",
            Self::Saml20Idp => "saml20-idp",
            Self::Shib13Sp => "shib13-sp",
            Self::Shib13Idp => "shib13-idp",
            Self::Custom(label) => label,
        }
    }

    /// Human-readable name shown in type listings.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Saml20Sp => "SAML 2.0 SP",
            Self::Saml20Idp => "SAML 2.0 IdP",
            Self::Shib13Sp => "Shib 1.3 SP",
            Self::Shib13Idp => "Shib 1.3 IdP",
            Self::Custom(label) => label,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ParseLabelError::Empty("type")),
            "saml20-sp" => Ok(Self::Saml20Sp),
            "saml20-idp" => Ok(Self::Saml20Idp),
            "shib13-sp" => Ok(Self::Shib13Sp),
            "shib13-idp" => Ok(Self::Shib13Idp),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl TryFrom<String> for EntityType {
    type Error = ParseLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One stored snapshot of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRevision {
    /// Row ID of the revision; metadata and policy edges reference it.
    pub id: i64,
    /// The logical entity this revision belongs to.
    pub eid: Eid,
    /// Per-entity revision number, starting at 0.
    pub revision_id: i64,
    /// Entity identifier string (usually a URN or URL).
    pub entity_id: String,
    /// Creation timestamp (`YYYY-MM-DD HH:MM:SS.SSS`, UTC).
    pub created: String,
    pub state: EntityState,
    pub entity_type: EntityType,
    /// Visibility flag; always equal across all revisions of an entity.
    pub active: bool,
    /// Accept connections from every remote entity.
    pub allowed_all: bool,
}

/// Listing row describing the latest revision of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub eid: Eid,
    pub revision_id: i64,
    pub entity_id: String,
    pub created: String,
    pub state: EntityState,
    pub entity_type: EntityType,
}

impl From<&EntityRevision> for EntitySummary {
    fn from(rev: &EntityRevision) -> Self {
        Self {
            eid: rev.eid,
            revision_id: rev.revision_id,
            entity_id: rev.entity_id.clone(),
            created: rev.created.clone(),
            state: rev.state.clone(),
            entity_type: rev.entity_type.clone(),
        }
    }
}

/// An administrator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: Uid,
    /// External identifier, also used as the username.
    pub user_id: String,
    pub active: bool,
}
