//! Administrator/entity permission edges.
//!
//! An edge in `has_entity` lets a user manage an entity. Edges are keyed by
//! `eid` and survive new revisions.

use crate::error::{events::PERMISSION_FETCH_FAILED, logged, RegistryError};
use crate::revision::entity_exists;
use fedreg_db::DbPool;
use fedreg_types::{Eid, Uid, User};
use rusqlite::{Connection, OptionalExtension, Row};

pub(crate) const USER_COLUMNS: &str = "u.uid, u.user_id, u.active";

/// Many-to-many relation between users and entities.
#[derive(Clone)]
pub struct PermissionGraph {
    pool: DbPool,
}

impl PermissionGraph {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Active users holding an edge to `eid`, ordered by uid.
    pub fn users_with_access(&self, eid: Eid) -> Result<Vec<User>, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "users_with_access", || {
            let conn = self.pool.get()?;
            query_users(
                &conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM users AS u
                     WHERE u.active = 1
                       AND EXISTS(SELECT 1 FROM has_entity AS h WHERE h.uid = u.uid AND h.eid = ?1)
                     ORDER BY u.uid ASC"
                ),
                eid,
            )
        })
    }

    /// Active users holding no edge to `eid`, ordered by uid.
    pub fn users_without_access(&self, eid: Eid) -> Result<Vec<User>, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "users_without_access", || {
            let conn = self.pool.get()?;
            query_users(
                &conn,
                &format!(
                    "SELECT {USER_COLUMNS} FROM users AS u
                     WHERE u.active = 1
                       AND NOT EXISTS(SELECT 1 FROM has_entity AS h WHERE h.uid = u.uid AND h.eid = ?1)
                     ORDER BY u.uid ASC"
                ),
                eid,
            )
        })
    }

    /// Grants `uid` access to `eid` and returns the user's username.
    ///
    /// Granting an existing edge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the user or the entity does not
    /// exist.
    pub fn grant(&self, eid: Eid, uid: Uid) -> Result<String, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "grant", || {
            let conn = self.pool.get()?;
            let user = find_user(&conn, uid)?.ok_or_else(|| RegistryError::user_not_found(uid))?;
            if !entity_exists(&conn, eid)? {
                return Err(RegistryError::entity_not_found(eid));
            }

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO has_entity (uid, eid) VALUES (?1, ?2)",
                [uid, eid],
            )?;
            if inserted > 0 {
                tracing::info!(eid, uid, user_id = %user.user_id, "granted entity access");
            }
            Ok(user.user_id)
        })
    }

    /// Removes the edge between `uid` and `eid`. Returns whether one existed.
    pub fn revoke(&self, eid: Eid, uid: Uid) -> Result<bool, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "revoke", || {
            let conn = self.pool.get()?;
            let removed = conn.execute(
                "DELETE FROM has_entity WHERE uid = ?1 AND eid = ?2",
                [uid, eid],
            )?;
            if removed > 0 {
                tracing::info!(eid, uid, "revoked entity access");
            }
            Ok(removed > 0)
        })
    }

    /// Removes every edge of a user. Returns whether any existed.
    pub fn revoke_all_for_user(&self, uid: Uid) -> Result<bool, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "revoke_all_for_user", || {
            let conn = self.pool.get()?;
            let removed = revoke_all(&conn, uid)?;
            if removed > 0 {
                tracing::info!(uid, removed, "revoked all entity access");
            }
            Ok(removed > 0)
        })
    }

    pub fn has_access(&self, eid: Eid, uid: Uid) -> Result<bool, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "has_access", || {
            let conn = self.pool.get()?;
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM has_entity WHERE uid = ?1 AND eid = ?2)",
                [uid, eid],
                |row| row.get(0),
            )?)
        })
    }
}

pub(crate) fn revoke_all(conn: &Connection, uid: Uid) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM has_entity WHERE uid = ?1", [uid])
}

pub(crate) fn find_user(conn: &Connection, uid: Uid) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users AS u WHERE u.uid = ?1"),
        [uid],
        map_row_to_user,
    )
    .optional()
}

pub(crate) fn map_row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        uid: row.get(0)?,
        user_id: row.get(1)?,
        active: row.get(2)?,
    })
}

fn query_users(conn: &Connection, sql: &str, eid: Eid) -> Result<Vec<User>, RegistryError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([eid], map_row_to_user)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}
