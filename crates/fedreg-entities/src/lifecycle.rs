//! Entity enable/disable and cascading removal.

use crate::directory::entity_update_address;
use crate::error::{
    events::{ENTITY_DELETE_FAILED, ENTITY_STATE_TOGGLE_FAILED},
    logged, RegistryError,
};
use crate::revision::entity_exists;
use fedreg_db::DbPool;
use fedreg_types::Eid;
use rusqlite::{params, TransactionBehavior};

/// Value bound to the single placeholder of a delete step.
#[derive(Debug, Clone, Copy)]
enum StepParam {
    Eid,
    UpdateAddress,
}

/// One scoped statement of the delete cascade.
struct DeleteStep {
    name: &'static str,
    sql: &'static str,
    param: StepParam,
}

/// Delete cascade, dependents first. Policy edges pointing at the entity
/// from other entities' revisions are removed along with its own.
const DELETE_STEPS: &[DeleteStep] = &[
    DeleteStep {
        name: "metadata",
        sql: "DELETE FROM metadata
              WHERE entity_revision_id IN (SELECT id FROM entity_revisions WHERE eid = ?1)",
        param: StepParam::Eid,
    },
    DeleteStep {
        name: "allowed_entities",
        sql: "DELETE FROM allowed_entities
              WHERE entity_revision_id IN (SELECT id FROM entity_revisions WHERE eid = ?1)
                 OR remote_eid = ?1",
        param: StepParam::Eid,
    },
    DeleteStep {
        name: "blocked_entities",
        sql: "DELETE FROM blocked_entities
              WHERE entity_revision_id IN (SELECT id FROM entity_revisions WHERE eid = ?1)
                 OR remote_eid = ?1",
        param: StepParam::Eid,
    },
    DeleteStep {
        name: "has_entity",
        sql: "DELETE FROM has_entity WHERE eid = ?1",
        param: StepParam::Eid,
    },
    DeleteStep {
        name: "subscriptions",
        sql: "DELETE FROM subscriptions WHERE address = ?1",
        param: StepParam::UpdateAddress,
    },
    DeleteStep {
        name: "entity_revisions",
        sql: "DELETE FROM entity_revisions WHERE eid = ?1",
        param: StepParam::Eid,
    },
    DeleteStep {
        name: "entities",
        sql: "DELETE FROM entities WHERE eid = ?1",
        param: StepParam::Eid,
    },
];

/// Mutates entity visibility and removes entities with all their records.
#[derive(Clone)]
pub struct EntityLifecycle {
    pool: DbPool,
}

impl EntityLifecycle {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Marks every revision of the entity inactive.
    pub fn disable(&self, eid: Eid) -> Result<(), RegistryError> {
        logged(ENTITY_STATE_TOGGLE_FAILED, "disable", || {
            self.set_active(eid, false)
        })
    }

    /// Marks every revision of the entity active.
    pub fn enable(&self, eid: Eid) -> Result<(), RegistryError> {
        logged(ENTITY_STATE_TOGGLE_FAILED, "enable", || self.set_active(eid, true))
    }

    fn set_active(&self, eid: Eid, active: bool) -> Result<(), RegistryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !entity_exists(&tx, eid)? {
            return Err(RegistryError::entity_not_found(eid));
        }
        let revisions = tx.execute(
            "UPDATE entity_revisions SET active = ?1 WHERE eid = ?2",
            params![active, eid],
        )?;
        tx.commit()?;

        tracing::info!(eid, active, revisions, "updated entity active flag");
        Ok(())
    }

    /// Removes an entity and everything that references it.
    ///
    /// All steps run in one transaction; if any of them fails nothing is
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown entity and
    /// [`RegistryError::TransactionFailed`] naming the failed step otherwise.
    pub fn delete(&self, eid: Eid) -> Result<(), RegistryError> {
        logged(ENTITY_DELETE_FAILED, "delete", || {
            let mut conn = self.pool.get()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|source| RegistryError::TransactionFailed {
                    step: "begin",
                    source,
                })?;

            let exists = entity_exists(&tx, eid).map_err(|source| {
                RegistryError::TransactionFailed {
                    step: "lookup",
                    source,
                }
            })?;
            if !exists {
                return Err(RegistryError::entity_not_found(eid));
            }

            let address = entity_update_address(eid);
            for step in DELETE_STEPS {
                let removed = match step.param {
                    StepParam::Eid => tx.execute(step.sql, [eid]),
                    StepParam::UpdateAddress => tx.execute(step.sql, [&address]),
                }
                .map_err(|source| RegistryError::TransactionFailed {
                    step: step.name,
                    source,
                })?;
                tracing::debug!(eid, step = step.name, removed, "delete step finished");
            }

            tx.commit()
                .map_err(|source| RegistryError::TransactionFailed {
                    step: "commit",
                    source,
                })?;

            tracing::info!(eid, "deleted entity");
            Ok(())
        })
    }
}
