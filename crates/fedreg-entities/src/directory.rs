//! Administrator accounts and change-notification subscriptions.

use crate::error::{events::PERMISSION_FETCH_FAILED, logged, RegistryError};
use crate::permission::{find_user, map_row_to_user, revoke_all};
use fedreg_db::DbPool;
use fedreg_types::{Eid, Uid, User};
use rusqlite::{params, ErrorCode};

/// Subscription address for change notifications about one entity.
pub fn entity_update_address(eid: Eid) -> String {
    format!("ENTITYUPDATE-{eid}")
}

/// User account lookup and maintenance.
#[derive(Clone)]
pub struct UserDirectory {
    pool: DbPool,
}

impl UserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates an active account.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] when `user_id` is blank or
    /// already taken.
    pub fn create_user(&self, user_id: &str) -> Result<User, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "create_user", || {
            let user_id = user_id.trim();
            if user_id.is_empty() {
                return Err(RegistryError::InvalidInput(
                    "user id cannot be empty".to_string(),
                ));
            }

            let conn = self.pool.get()?;
            let inserted = conn.query_row(
                "INSERT INTO users (user_id) VALUES (?1) RETURNING uid, user_id, active",
                [user_id],
                map_row_to_user,
            );
            match inserted {
                Ok(user) => {
                    tracing::info!(uid = user.uid, user_id = %user.user_id, "created user");
                    Ok(user)
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(RegistryError::InvalidInput(format!(
                        "user '{user_id}' already exists"
                    )))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn user(&self, uid: Uid) -> Result<User, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "user", || {
            let conn = self.pool.get()?;
            find_user(&conn, uid)?.ok_or_else(|| RegistryError::user_not_found(uid))
        })
    }

    /// Activates or deactivates an account. Deactivation also drops every
    /// permission edge of the user.
    pub fn set_active(&self, uid: Uid, active: bool) -> Result<(), RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "set_active", || {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE users SET active = ?1 WHERE uid = ?2",
                params![active, uid],
            )?;
            if updated == 0 {
                return Err(RegistryError::user_not_found(uid));
            }
            let revoked = if active { 0 } else { revoke_all(&tx, uid)? };
            tx.commit()?;

            tracing::info!(uid, active, revoked, "updated user active flag");
            Ok(())
        })
    }

    /// Removes an account with its permission edges and subscriptions.
    pub fn delete_user(&self, uid: Uid) -> Result<(), RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "delete_user", || {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction()?;
            revoke_all(&tx, uid)?;
            tx.execute("DELETE FROM subscriptions WHERE uid = ?1", [uid])?;
            if tx.execute("DELETE FROM users WHERE uid = ?1", [uid])? == 0 {
                return Err(RegistryError::user_not_found(uid));
            }
            tx.commit()?;

            tracing::info!(uid, "deleted user");
            Ok(())
        })
    }

    /// Subscribes a user to an address. Returns `false` if the subscription
    /// already existed.
    pub fn subscribe(&self, uid: Uid, address: &str) -> Result<bool, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "subscribe", || {
            let conn = self.pool.get()?;
            if find_user(&conn, uid)?.is_none() {
                return Err(RegistryError::user_not_found(uid));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO subscriptions (uid, address) VALUES (?1, ?2)",
                params![uid, address],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Addresses a user is subscribed to, in subscription order.
    pub fn subscriptions(&self, uid: Uid) -> Result<Vec<String>, RegistryError> {
        logged(PERMISSION_FETCH_FAILED, "subscriptions", || {
            let conn = self.pool.get()?;
            let mut stmt =
                conn.prepare("SELECT address FROM subscriptions WHERE uid = ?1 ORDER BY id")?;
            let rows = stmt.query_map([uid], |row| row.get(0))?;
            let mut addresses = Vec::new();
            for row in rows {
                addresses.push(row?);
            }
            Ok(addresses)
        })
    }
}
