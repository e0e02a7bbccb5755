#![allow(dead_code)]

use fedreg_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use fedreg_entities::{NewRevision, Registry};
use fedreg_types::{Eid, EntityState, EntityType, RegistryPolicy};
use std::sync::Arc;
use tempfile::TempDir;

/// A registry over a file-backed pool. The directory lives as long as the
/// fixture.
pub struct TestRegistry {
    pub registry: Registry,
    pub pool: DbPool,
    _dir: TempDir,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::with_policy(RegistryPolicy::default())
    }

    pub fn with_policy(policy: RegistryPolicy) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("fedreg.db");
        let pool = create_pool(
            path.to_str().expect("utf-8 path"),
            DbRuntimeSettings {
                busy_timeout_ms: 10_000,
                pool_max_size: 4,
            },
        )
        .expect("failed to create pool");
        {
            let conn = pool.get().expect("failed to get connection");
            run_migrations(&conn).expect("failed to run migrations");
        }

        Self {
            registry: Registry::new(pool.clone(), Arc::new(policy)),
            pool,
            _dir: dir,
        }
    }

    /// Creates an entity with one revision shaped by `configure`.
    pub fn entity(&self, entity_id: &str, configure: impl FnOnce(&mut NewRevision)) -> Eid {
        let eid = self
            .registry
            .revisions
            .create_entity()
            .expect("failed to create entity");
        let mut rev = NewRevision::new(entity_id, EntityState::Pending, EntityType::Saml20Sp);
        configure(&mut rev);
        self.registry
            .revisions
            .append_revision(eid, &rev)
            .expect("failed to append revision");
        eid
    }

    pub fn count(&self, sql: &str, eid: Eid) -> i64 {
        let conn = self.pool.get().expect("failed to get connection");
        conn.query_row(sql, [eid], |row| row.get(0))
            .expect("count query failed")
    }
}
