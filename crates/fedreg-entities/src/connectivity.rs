//! Connectivity policy evaluation between entities.
//!
//! Each revision carries an `allowed_all` flag, a whitelist and a blacklist
//! of remote entities. Whether a remote entity accepts a requester is
//! decided on the remote's latest revision, in this order:
//!
//! 1. `allowed_all` set: accepted, whatever the lists say.
//! 2. Non-empty whitelist without the requester: blocked.
//! 3. Non-empty blacklist containing the requester: blocked.
//! 4. No list entries at all: blocked.

use crate::error::{events::ENTITY_FETCH_FAILED, logged, RegistryError};
use crate::query::{SelectBuilder, LATEST_REVISION};
use crate::revision::map_row_to_summary;
use fedreg_db::DbPool;
use fedreg_types::{Eid, EntitySummary};
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;
use std::collections::BTreeSet;

/// Upper bound on candidates bound into one statement.
const CANDIDATE_CHUNK: usize = 500;

/// Why a remote entity refuses a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// The remote whitelists other entities but not the requester.
    NotWhitelisted,
    /// The remote blacklists the requester.
    Blacklisted,
    /// The remote accepts nobody: no `allowed_all`, no list entries.
    NoPolicy,
}

/// Connectivity policy of one revision as seen by one requester.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub allowed_all: bool,
    pub uses_whitelist: bool,
    pub in_whitelist: bool,
    pub uses_blacklist: bool,
    pub in_blacklist: bool,
}

impl PolicySnapshot {
    /// Builds a snapshot from explicit whitelist and blacklist contents.
    pub fn from_lists(
        allowed_all: bool,
        whitelist: &BTreeSet<Eid>,
        blacklist: &BTreeSet<Eid>,
        requester: Eid,
    ) -> Self {
        Self {
            allowed_all,
            uses_whitelist: !whitelist.is_empty(),
            in_whitelist: whitelist.contains(&requester),
            uses_blacklist: !blacklist.is_empty(),
            in_blacklist: blacklist.contains(&requester),
        }
    }

    /// Returns why the requester is blocked, or `None` if it is accepted.
    pub fn evaluate(&self) -> Option<BlockReason> {
        if self.allowed_all {
            None
        } else if self.uses_whitelist && !self.in_whitelist {
            Some(BlockReason::NotWhitelisted)
        } else if self.uses_blacklist && self.in_blacklist {
            Some(BlockReason::Blacklisted)
        } else if !self.uses_whitelist && !self.uses_blacklist {
            Some(BlockReason::NoPolicy)
        } else {
            None
        }
    }
}

/// A remote entity that refuses the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedRemote {
    #[serde(flatten)]
    pub summary: EntitySummary,
    pub reason: BlockReason,
}

/// Resolves connectivity policy against stored revisions.
#[derive(Clone)]
pub struct ConnectivityResolver {
    pool: DbPool,
}

impl ConnectivityResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The subset of `remotes` whose latest revision blocks `requester`,
    /// ordered by eid.
    ///
    /// Remotes without revisions are skipped and duplicates reported once.
    pub fn reverse_blocked(
        &self,
        requester: Eid,
        remotes: &[Eid],
    ) -> Result<Vec<BlockedRemote>, RegistryError> {
        if remotes.is_empty() {
            return Ok(Vec::new());
        }
        logged(ENTITY_FETCH_FAILED, "reverse_blocked", || {
            let conn = self.pool.get()?;
            let candidates: Vec<Eid> = remotes
                .iter()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let mut blocked = Vec::new();
            for chunk in candidates.chunks(CANDIDATE_CHUNK) {
                for (summary, snapshot) in load_snapshots(&conn, requester, chunk)? {
                    if let Some(reason) = snapshot.evaluate() {
                        blocked.push(BlockedRemote { summary, reason });
                    }
                }
            }
            tracing::debug!(
                requester,
                candidates = candidates.len(),
                blocked = blocked.len(),
                "evaluated reverse-blocked entities"
            );
            Ok(blocked)
        })
    }

    /// Whether `a` and `b` accept each other.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if either entity has no revisions.
    pub fn can_connect(&self, a: Eid, b: Eid) -> Result<bool, RegistryError> {
        logged(ENTITY_FETCH_FAILED, "can_connect", || {
            let conn = self.pool.get()?;
            let a_view = single_snapshot(&conn, b, a)?;
            let b_view = single_snapshot(&conn, a, b)?;
            Ok(a_view.evaluate().is_none() && b_view.evaluate().is_none())
        })
    }
}

fn single_snapshot(
    conn: &Connection,
    requester: Eid,
    remote: Eid,
) -> Result<PolicySnapshot, RegistryError> {
    load_snapshots(conn, requester, &[remote])?
        .into_iter()
        .next()
        .map(|(_, snapshot)| snapshot)
        .ok_or_else(|| RegistryError::NotFound {
            kind: "entity revision",
            id: remote.to_string(),
        })
}

/// Latest-revision summaries and policy flags of `remotes`, ordered by eid.
fn load_snapshots(
    conn: &Connection,
    requester: Eid,
    remotes: &[Eid],
) -> Result<Vec<(EntitySummary, PolicySnapshot)>, RegistryError> {
    let mut q = SelectBuilder::new("entity_revisions AS r");
    let requester_param = q.bind(requester);
    q.columns(&[
        "r.eid",
        "r.revision_id",
        "r.entity_id",
        "r.created",
        "r.state",
        "r.entity_type",
        "r.allowed_all",
    ])
    .column("EXISTS(SELECT 1 FROM allowed_entities AS a WHERE a.entity_revision_id = r.id)")
    .column(format!(
        "EXISTS(SELECT 1 FROM allowed_entities AS a
                WHERE a.entity_revision_id = r.id AND a.remote_eid = {requester_param})"
    ))
    .column("EXISTS(SELECT 1 FROM blocked_entities AS b WHERE b.entity_revision_id = r.id)")
    .column(format!(
        "EXISTS(SELECT 1 FROM blocked_entities AS b
                WHERE b.entity_revision_id = r.id AND b.remote_eid = {requester_param})"
    ))
    .filter_in("r.eid", remotes.iter().copied())
    .filter(LATEST_REVISION)
    .order_by("r.eid ASC");

    let (sql, values) = q.build();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), map_row_to_snapshot)?;
    let mut snapshots = Vec::new();
    for row in rows {
        snapshots.push(row?);
    }
    Ok(snapshots)
}

fn map_row_to_snapshot(row: &Row) -> rusqlite::Result<(EntitySummary, PolicySnapshot)> {
    Ok((
        map_row_to_summary(row)?,
        PolicySnapshot {
            allowed_all: row.get(6)?,
            uses_whitelist: row.get(7)?,
            in_whitelist: row.get(8)?,
            uses_blacklist: row.get(9)?,
            in_blacklist: row.get(10)?,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::{NewRevision, RevisionStore};
    use crate::test_support::{memory_pool, revision};
    use fedreg_types::{EntityType, RegistryPolicy};
    use std::sync::Arc;

    fn snapshot(allowed_all: bool, white: &[Eid], black: &[Eid], requester: Eid) -> PolicySnapshot {
        PolicySnapshot::from_lists(
            allowed_all,
            &white.iter().copied().collect(),
            &black.iter().copied().collect(),
            requester,
        )
    }

    #[test]
    fn allowed_all_overrides_everything() {
        assert_eq!(snapshot(true, &[], &[], 1).evaluate(), None);
        assert_eq!(snapshot(true, &[2], &[1], 1).evaluate(), None);
    }

    #[test]
    fn whitelist_is_checked_before_blacklist() {
        assert_eq!(
            snapshot(false, &[2], &[], 1).evaluate(),
            Some(BlockReason::NotWhitelisted)
        );
        assert_eq!(snapshot(false, &[1], &[], 1).evaluate(), None);
        assert_eq!(
            snapshot(false, &[1], &[1], 1).evaluate(),
            Some(BlockReason::Blacklisted)
        );
        assert_eq!(
            snapshot(false, &[2], &[1], 1).evaluate(),
            Some(BlockReason::NotWhitelisted)
        );
    }

    #[test]
    fn blacklist_only_blocks_listed_requesters() {
        assert_eq!(
            snapshot(false, &[], &[1], 1).evaluate(),
            Some(BlockReason::Blacklisted)
        );
        assert_eq!(snapshot(false, &[], &[2], 1).evaluate(), None);
        assert_eq!(snapshot(false, &[1], &[2], 1).evaluate(), None);
    }

    #[test]
    fn no_policy_is_default_deny() {
        assert_eq!(
            snapshot(false, &[], &[], 1).evaluate(),
            Some(BlockReason::NoPolicy)
        );
    }

    struct Fixture {
        store: RevisionStore,
        resolver: ConnectivityResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let pool = memory_pool();
            Self {
                store: RevisionStore::new(pool.clone(), Arc::new(RegistryPolicy::default())),
                resolver: ConnectivityResolver::new(pool),
            }
        }

        fn entity(&self, configure: impl FnOnce(&mut NewRevision)) -> Eid {
            let eid = self.store.create_entity().unwrap();
            let mut rev = revision(&format!("urn:entity:{eid}"), EntityType::Saml20Sp);
            configure(&mut rev);
            self.store.append_revision(eid, &rev).unwrap();
            eid
        }
    }

    #[test]
    fn whitelist_scenario_from_both_sides() {
        let fx = Fixture::new();
        let b = fx.entity(|r| r.allowed_all = true);
        let c = fx.entity(|r| r.allowed_all = true);
        let a = fx.entity(|r| {
            r.allowed.insert(b);
        });

        let from_c = fx.resolver.reverse_blocked(c, &[a, b]).unwrap();
        assert_eq!(from_c.len(), 1);
        assert_eq!(from_c[0].summary.eid, a);
        assert_eq!(from_c[0].reason, BlockReason::NotWhitelisted);

        assert!(fx.resolver.reverse_blocked(b, &[a, c]).unwrap().is_empty());

        assert!(fx.resolver.can_connect(a, b).unwrap());
        assert!(fx.resolver.can_connect(b, a).unwrap());
        assert!(!fx.resolver.can_connect(a, c).unwrap());
        assert!(!fx.resolver.can_connect(c, a).unwrap());
    }

    #[test]
    fn results_are_sorted_deduplicated_and_skip_missing() {
        let fx = Fixture::new();
        let requester = fx.entity(|r| r.allowed_all = true);
        let closed_one = fx.entity(|_| {});
        let closed_two = fx.entity(|_| {});
        let empty = fx.store.create_entity().unwrap();

        let blocked = fx
            .resolver
            .reverse_blocked(requester, &[closed_two, closed_one, closed_two, empty, 9999])
            .unwrap();
        let eids: Vec<Eid> = blocked.iter().map(|b| b.summary.eid).collect();
        assert_eq!(eids, vec![closed_one, closed_two]);
        assert!(blocked.iter().all(|b| b.reason == BlockReason::NoPolicy));
    }

    #[test]
    fn only_the_latest_revision_counts() {
        let fx = Fixture::new();
        let requester = fx.entity(|r| r.allowed_all = true);
        let remote = fx.entity(|r| r.allowed_all = true);
        assert!(fx.resolver.reverse_blocked(requester, &[remote]).unwrap().is_empty());

        let mut closed = revision("urn:remote", EntityType::Saml20Sp);
        closed.blocked.insert(requester);
        fx.store.append_revision(remote, &closed).unwrap();

        let blocked = fx.resolver.reverse_blocked(requester, &[remote]).unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].reason, BlockReason::Blacklisted);
        assert_eq!(blocked[0].summary.revision_id, 1);
    }

    #[test]
    fn can_connect_requires_revisions_on_both_sides() {
        let fx = Fixture::new();
        let a = fx.entity(|r| r.allowed_all = true);
        let bare = fx.store.create_entity().unwrap();
        assert!(matches!(
            fx.resolver.can_connect(a, bare).unwrap_err(),
            RegistryError::NotFound { .. }
        ));
    }

    #[test]
    fn empty_candidate_list_is_empty_result() {
        let fx = Fixture::new();
        assert!(fx.resolver.reverse_blocked(1, &[]).unwrap().is_empty());
    }

    #[test]
    fn block_reasons_serialize_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&BlockReason::NotWhitelisted).unwrap(),
            "\"not_whitelisted\""
        );
    }
}
