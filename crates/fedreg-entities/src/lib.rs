//! Entity registry core for fedreg.
//!
//! Four services share one SQLite pool:
//!
//! - [`RevisionStore`] appends entity revisions and resolves listings to the
//!   latest revision of every entity.
//! - [`PermissionGraph`] maintains which administrators manage which
//!   entities.
//! - [`ConnectivityResolver`] evaluates whitelist/blacklist policy between
//!   entities.
//! - [`EntityLifecycle`] toggles entity visibility and deletes entities with
//!   all their dependent rows.
//!
//! [`UserDirectory`] holds the administrator accounts the permission graph
//! refers to. [`Registry`] bundles everything for callers that want a single
//! handle.

pub mod connectivity;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod permission;
pub mod query;
pub mod revision;

pub use connectivity::{BlockReason, BlockedRemote, ConnectivityResolver, PolicySnapshot};
pub use directory::{entity_update_address, UserDirectory};
pub use error::RegistryError;
pub use lifecycle::EntityLifecycle;
pub use permission::PermissionGraph;
pub use revision::{EntityFilter, NewRevision, RevisionStore};

use fedreg_db::DbPool;
use fedreg_types::RegistryPolicy;
use std::sync::Arc;

/// All registry services over one pool and one policy.
#[derive(Clone)]
pub struct Registry {
    pub revisions: RevisionStore,
    pub permissions: PermissionGraph,
    pub connectivity: ConnectivityResolver,
    pub lifecycle: EntityLifecycle,
    pub users: UserDirectory,
}

impl Registry {
    pub fn new(pool: DbPool, policy: Arc<RegistryPolicy>) -> Self {
        Self {
            revisions: RevisionStore::new(pool.clone(), policy),
            permissions: PermissionGraph::new(pool.clone()),
            connectivity: ConnectivityResolver::new(pool.clone()),
            lifecycle: EntityLifecycle::new(pool.clone()),
            users: UserDirectory::new(pool),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use fedreg_types::EntityType;

    #[test]
    fn registry_services_share_one_store() {
        let pool = test_support::memory_pool();
        let registry = Registry::new(pool, Arc::new(RegistryPolicy::default()));

        let eid = registry.revisions.create_entity().unwrap();
        registry
            .revisions
            .append_revision(eid, &test_support::revision("urn:shared", EntityType::Saml20Sp))
            .unwrap();
        let user = registry.users.create_user("kim").unwrap();
        assert_eq!(registry.permissions.grant(eid, user.uid).unwrap(), "kim");

        let owned = registry.revisions.entities_for_user(user.uid).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].entity_id, "urn:shared");

        registry.lifecycle.delete(eid).unwrap();
        assert!(registry.revisions.entities_for_user(user.uid).unwrap().is_empty());
    }

    #[test]
    fn services_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Registry>();
    }
}
