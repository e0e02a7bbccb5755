//! Revision-aware entity store.
//!
//! Every entity-facing read resolves to the revision with the highest
//! `revision_id` of its entity ([`LATEST_REVISION`]); older revisions are
//! only reachable through the explicitly historical lookups.

use crate::error::{events::ENTITY_FETCH_FAILED, logged, RegistryError};
use crate::query::{SelectBuilder, LATEST_REVISION};
use fedreg_db::DbPool;
use fedreg_types::{
    Eid, EntityRevision, EntityState, EntitySummary, EntityType, Metadata, RegistryPolicy,
    TypeAvailability, Uid,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub(crate) const REVISION_COLUMNS: &str = "r.id, r.eid, r.revision_id, r.entity_id, r.created, \
     r.state, r.entity_type, r.active, r.allowed_all";

const SUMMARY_COLUMNS: [&str; 6] = [
    "r.eid",
    "r.revision_id",
    "r.entity_id",
    "r.created",
    "r.state",
    "r.entity_type",
];

/// Restrictions applied by [`RevisionStore::list_entities`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFilter {
    /// Allowed states of the latest revision; empty means any.
    pub states: Vec<EntityState>,
    /// Allowed types of the latest revision; empty means any.
    pub types: Vec<EntityType>,
    /// Required value of the active flag.
    pub active: bool,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            types: Vec::new(),
            active: true,
        }
    }
}

/// Content of a revision to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRevision {
    pub entity_id: String,
    pub state: EntityState,
    pub entity_type: EntityType,
    pub allowed_all: bool,
    /// Raw metadata, validated against the type's schema on write.
    pub metadata: BTreeMap<String, String>,
    /// Whitelisted remote entities.
    pub allowed: BTreeSet<Eid>,
    /// Blacklisted remote entities.
    pub blocked: BTreeSet<Eid>,
}

impl NewRevision {
    /// A revision with no metadata, no policy lists and `allowed_all` off.
    pub fn new(entity_id: impl Into<String>, state: EntityState, entity_type: EntityType) -> Self {
        Self {
            entity_id: entity_id.into(),
            state,
            entity_type,
            allowed_all: false,
            metadata: BTreeMap::new(),
            allowed: BTreeSet::new(),
            blocked: BTreeSet::new(),
        }
    }
}

/// Stores and resolves entity revisions.
#[derive(Clone)]
pub struct RevisionStore {
    pool: DbPool,
    policy: Arc<RegistryPolicy>,
}

impl RevisionStore {
    pub fn new(pool: DbPool, policy: Arc<RegistryPolicy>) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &RegistryPolicy {
        &self.policy
    }

    /// Lists the latest revision of every entity matching `filter`.
    ///
    /// Rows are sorted by the configured pretty-name metadata field. When
    /// that field is missing, empty, or still holds its configured default on
    /// a revision, the raw entity identifier is used in its place. Without a
    /// pretty-name field, rows are sorted by creation time.
    pub fn list_entities(&self, filter: &EntityFilter) -> Result<Vec<EntitySummary>, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "list_entities", || {
            let conn = self.pool.get()?;
            let mut q = SelectBuilder::new("entity_revisions AS r");
            q.columns(&SUMMARY_COLUMNS);

            let active = q.bind(filter.active);
            q.filter(format!("r.active = {active}"));
            q.filter_in("r.state", filter.states.iter().map(|s| s.as_str().to_string()));
            q.filter_in(
                "r.entity_type",
                filter.types.iter().map(|t| t.as_str().to_string()),
            );
            q.filter(LATEST_REVISION);

            match self.policy.pretty_name_field() {
                Some(field) => {
                    let name = q.bind(field.to_string());
                    let default = q.bind(self.policy.pretty_name_default());
                    q.join(format!(
                        "LEFT JOIN metadata AS m
                            ON m.entity_revision_id = r.id
                            AND m.name = {name}
                            AND m.value != {default}"
                    ));
                    q.order_by("COALESCE(NULLIF(m.value, ''), r.entity_id) COLLATE NOCASE ASC");
                }
                None => {
                    q.order_by("r.created ASC");
                }
            }
            q.order_by("r.eid ASC");

            let (sql, values) = q.build();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), map_row_to_summary)?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            tracing::debug!(count = summaries.len(), "listed entities");
            Ok(summaries)
        })
    }

    /// Lists the latest revision of every entity, ignoring the active flag,
    /// state and type.
    pub fn list_all_entities(&self) -> Result<Vec<EntitySummary>, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "list_all_entities", || {
            let conn = self.pool.get()?;
            let mut q = SelectBuilder::new("entity_revisions AS r");
            q.columns(&SUMMARY_COLUMNS)
                .filter(LATEST_REVISION)
                .order_by("r.eid ASC");

            let (sql, _) = q.build();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], map_row_to_summary)?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            Ok(summaries)
        })
    }

    /// Latest revision of every entity the user holds a permission edge for.
    pub fn entities_for_user(&self, uid: Uid) -> Result<Vec<EntityRevision>, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "entities_for_user", || {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {REVISION_COLUMNS}
                 FROM entity_revisions AS r
                 JOIN has_entity AS h ON h.eid = r.eid
                 WHERE h.uid = ?1 AND {LATEST_REVISION}
                 ORDER BY r.eid ASC"
            ))?;
            let rows = stmt.query_map([uid], map_row_to_revision)?;
            let mut revisions = Vec::new();
            for row in rows {
                revisions.push(row?);
            }
            Ok(revisions)
        })
    }

    /// Allocates a new logical entity with no revisions.
    pub fn create_entity(&self) -> Result<Eid, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "create_entity", || {
            let conn = self.pool.get()?;
            conn.execute("INSERT INTO entities DEFAULT VALUES", [])?;
            let eid = conn.last_insert_rowid();
            tracing::info!(eid, "created entity");
            Ok(eid)
        })
    }

    /// Appends a revision to an entity.
    ///
    /// The revision number is assigned inside the INSERT as one past the
    /// current maximum. Metadata and whitelist/blacklist edges are written in
    /// the same transaction. The new revision takes over the entity's
    /// current active flag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] for a disabled type, an
    /// undeclared state, an empty entity identifier, or metadata the type's
    /// schema rejects, and [`RegistryError::NotFound`] for an unknown entity.
    pub fn append_revision(
        &self,
        eid: Eid,
        revision: &NewRevision,
    ) -> Result<EntityRevision, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "append_revision", || {
            let metadata = self.validate(revision)?;

            let mut conn = self.pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if !entity_exists(&tx, eid)? {
                return Err(RegistryError::entity_not_found(eid));
            }

            let previous: Option<(String, bool)> = tx
                .query_row(
                    "SELECT state, active FROM entity_revisions
                     WHERE eid = ?1 ORDER BY revision_id DESC LIMIT 1",
                    [eid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let active = match &previous {
                Some((state, active)) => {
                    if let Ok(state) = state.parse::<EntityState>() {
                        if !state.can_transition_to(&revision.state) {
                            tracing::warn!(
                                eid,
                                from = %state,
                                to = %revision.state,
                                "revision moves entity backwards in its lifecycle"
                            );
                        }
                    }
                    *active
                }
                None => true,
            };

            let stored = tx.query_row(
                "INSERT INTO entity_revisions
                    (eid, revision_id, entity_id, state, entity_type, active, allowed_all)
                 VALUES (
                    ?1,
                    (SELECT COALESCE(MAX(revision_id), -1) + 1 FROM entity_revisions WHERE eid = ?1),
                    ?2, ?3, ?4, ?5, ?6
                 )
                 RETURNING id, eid, revision_id, entity_id, created, state, entity_type, active, allowed_all",
                params![
                    eid,
                    revision.entity_id,
                    revision.state.as_str(),
                    revision.entity_type.as_str(),
                    active,
                    revision.allowed_all,
                ],
                map_row_to_revision,
            )?;

            {
                let mut insert_md = tx.prepare(
                    "INSERT INTO metadata (entity_revision_id, name, value) VALUES (?1, ?2, ?3)",
                )?;
                for (name, value) in metadata.iter() {
                    insert_md.execute(params![stored.id, name, value])?;
                }

                let mut insert_allowed = tx.prepare(
                    "INSERT INTO allowed_entities (entity_revision_id, remote_eid) VALUES (?1, ?2)",
                )?;
                for remote in &revision.allowed {
                    insert_allowed.execute(params![stored.id, remote])?;
                }

                let mut insert_blocked = tx.prepare(
                    "INSERT INTO blocked_entities (entity_revision_id, remote_eid) VALUES (?1, ?2)",
                )?;
                for remote in &revision.blocked {
                    insert_blocked.execute(params![stored.id, remote])?;
                }
            }

            tx.commit()?;

            tracing::info!(
                eid,
                revision_id = stored.revision_id,
                entity_id = %stored.entity_id,
                "appended entity revision"
            );
            Ok(stored)
        })
    }

    /// The newest revision of an entity.
    pub fn latest_revision(&self, eid: Eid) -> Result<EntityRevision, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "latest_revision", || {
            let conn = self.pool.get()?;
            latest_revision(&conn, eid)?.ok_or_else(|| RegistryError::NotFound {
                kind: "entity revision",
                id: eid.to_string(),
            })
        })
    }

    /// A specific historical revision.
    pub fn revision(&self, eid: Eid, revision_id: i64) -> Result<EntityRevision, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "revision", || {
            let conn = self.pool.get()?;
            conn.query_row(
                &format!(
                    "SELECT {REVISION_COLUMNS} FROM entity_revisions AS r
                     WHERE r.eid = ?1 AND r.revision_id = ?2"
                ),
                [eid, revision_id],
                map_row_to_revision,
            )
            .optional()?
            .ok_or_else(|| RegistryError::NotFound {
                kind: "entity revision",
                id: format!("{eid}/{revision_id}"),
            })
        })
    }

    /// All revisions of an entity, oldest first.
    pub fn revision_history(&self, eid: Eid) -> Result<Vec<EntityRevision>, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "revision_history", || {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {REVISION_COLUMNS} FROM entity_revisions AS r
                 WHERE r.eid = ?1 ORDER BY r.revision_id ASC"
            ))?;
            let rows = stmt.query_map([eid], map_row_to_revision)?;
            let mut revisions = Vec::new();
            for row in rows {
                revisions.push(row?);
            }
            Ok(revisions)
        })
    }

    /// Metadata of one revision, sorted by the schema of its type.
    pub fn metadata(&self, eid: Eid, revision_id: i64) -> Result<Metadata, RegistryError> {
        let revision = self.revision(eid, revision_id)?;
        logged(ENTITY_FETCH_FAILED, "metadata", || {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT name, value FROM metadata WHERE entity_revision_id = ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map([revision.id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut pairs: Vec<(String, String)> = Vec::new();
            for row in rows {
                pairs.push(row?);
            }
            Ok(self.policy.schema_for(&revision.entity_type).from_stored(pairs))
        })
    }

    /// The entity type enable matrix from configuration.
    pub fn allowed_types(&self) -> Vec<TypeAvailability> {
        self.policy.allowed_types()
    }

    fn validate(&self, revision: &NewRevision) -> Result<Metadata, RegistryError> {
        if revision.entity_id.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "entity identifier cannot be empty".to_string(),
            ));
        }
        if !self.policy.is_type_enabled(&revision.entity_type) {
            return Err(RegistryError::InvalidInput(format!(
                "entity type '{}' is not enabled",
                revision.entity_type
            )));
        }
        if !self.policy.is_state_declared(&revision.state) {
            return Err(RegistryError::InvalidInput(format!(
                "state '{}' is not declared",
                revision.state
            )));
        }
        let schema = self.policy.schema_for(&revision.entity_type);
        Ok(schema.build(revision.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())))?)
    }
}

pub(crate) fn entity_exists(conn: &Connection, eid: Eid) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entities WHERE eid = ?1)",
        [eid],
        |row| row.get(0),
    )
}

pub(crate) fn latest_revision(
    conn: &Connection,
    eid: Eid,
) -> rusqlite::Result<Option<EntityRevision>> {
    conn.query_row(
        &format!(
            "SELECT {REVISION_COLUMNS} FROM entity_revisions AS r
             WHERE r.eid = ?1 AND {LATEST_REVISION}"
        ),
        [eid],
        map_row_to_revision,
    )
    .optional()
}

pub(crate) fn parse_label<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let label: String = row.get(idx)?;
    label
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn map_row_to_revision(row: &Row) -> rusqlite::Result<EntityRevision> {
    Ok(EntityRevision {
        id: row.get(0)?,
        eid: row.get(1)?,
        revision_id: row.get(2)?,
        entity_id: row.get(3)?,
        created: row.get(4)?,
        state: parse_label(row, 5)?,
        entity_type: parse_label(row, 6)?,
        active: row.get(7)?,
        allowed_all: row.get(8)?,
    })
}

/// Maps the six [`SUMMARY_COLUMNS`] starting at column 0.
pub(crate) fn map_row_to_summary(row: &Row) -> rusqlite::Result<EntitySummary> {
    Ok(EntitySummary {
        eid: row.get(0)?,
        revision_id: row.get(1)?,
        entity_id: row.get(2)?,
        created: row.get(3)?,
        state: parse_label(row, 4)?,
        entity_type: parse_label(row, 5)?,
    })
}
