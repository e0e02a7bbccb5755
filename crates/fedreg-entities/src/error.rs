//! Error type and failure reporting for the entity services.

use fedreg_types::MetadataError;
use thiserror::Error;

/// Names of the structured events emitted when an operation fails.
pub mod events {
    pub const ENTITY_FETCH_FAILED: &str = "entity-fetch-failed";
    pub const PERMISSION_FETCH_FAILED: &str = "permission-fetch-failed";
    pub const ENTITY_DELETE_FAILED: &str = "entity-delete-failed";
    pub const ENTITY_STATE_TOGGLE_FAILED: &str = "entity-state-toggle-failed";
}

/// Errors returned by the registry services.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store rejected or could not execute a statement.
    #[error("query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    /// No pooled connection could be checked out.
    #[error("database connection unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    /// A referenced entity, revision or user does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A multi-step write was aborted and rolled back.
    #[error("transaction failed at step '{step}': {source}")]
    TransactionFailed {
        step: &'static str,
        source: rusqlite::Error,
    },

    /// The request conflicts with registry configuration or existing data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RegistryError {
    pub(crate) fn entity_not_found(eid: i64) -> Self {
        Self::NotFound {
            kind: "entity",
            id: eid.to_string(),
        }
    }

    pub(crate) fn user_not_found(uid: i64) -> Self {
        Self::NotFound {
            kind: "user",
            id: uid.to_string(),
        }
    }

    /// Whether the failure came from storage rather than from the request.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::QueryFailed(_) | Self::Pool(_) | Self::TransactionFailed { .. }
        )
    }
}

impl From<MetadataError> for RegistryError {
    fn from(err: MetadataError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Runs `op` and reports a failure under `event` before handing it back.
///
/// Storage failures are logged at error level; rejected requests at warn.
pub(crate) fn logged<T>(
    event: &'static str,
    operation: &'static str,
    op: impl FnOnce() -> Result<T, RegistryError>,
) -> Result<T, RegistryError> {
    op().inspect_err(|err| {
        if err.is_storage_failure() {
            tracing::error!(event, operation, error = %err, "registry operation failed");
        } else {
            tracing::warn!(event, operation, error = %err, "registry request rejected");
        }
    })
}
