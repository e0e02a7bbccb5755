//! CLI argument parsing and command dispatch.
//!
//! Every command prints its result to stdout as JSON, one object per line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fedreg_entities::{EntityFilter, NewRevision, Registry};
use fedreg_types::{Eid, EntityState, EntityType, Uid};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Write;

use crate::config::DEFAULT_CONFIG_PATH;

/// Administration console for the fedreg entity registry.
#[derive(Parser)]
#[command(name = "fedreg-admin")]
#[command(version)]
#[command(about = "Administration console for the fedreg entity registry")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "FEDREG_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the latest revision of matching entities.
    List {
        /// Restrict to these states (repeatable).
        #[arg(long = "state")]
        states: Vec<EntityState>,

        /// Restrict to these entity types (repeatable).
        #[arg(long = "type")]
        types: Vec<EntityType>,

        /// List disabled entities instead of enabled ones.
        #[arg(long)]
        inactive: bool,
    },

    /// List the latest revision of every entity, unfiltered.
    ListAll,

    /// List the entities a user may manage.
    UserEntities { uid: Uid },

    /// List users with (or without) access to an entity.
    Access {
        eid: Eid,

        /// List active users lacking access instead.
        #[arg(long)]
        without: bool,
    },

    /// Give a user access to an entity.
    Grant { eid: Eid, uid: Uid },

    /// Take access away from a user.
    Revoke {
        uid: Uid,

        /// The entity to revoke access to.
        #[arg(long, required_unless_present = "all", conflicts_with = "all")]
        entity: Option<Eid>,

        /// Revoke access to every entity.
        #[arg(long)]
        all: bool,
    },

    /// Show which remote entities refuse connections from a requester.
    Blocked {
        requester: Eid,

        #[arg(required = true)]
        remotes: Vec<Eid>,
    },

    /// Re-enable an entity.
    Enable { eid: Eid },

    /// Disable an entity without deleting it.
    Disable { eid: Eid },

    /// Delete an entity with all its revisions, permissions and subscriptions.
    Delete { eid: Eid },

    /// Show the entity type enable matrix.
    Types,

    /// Create an administrator account.
    CreateUser { user_id: String },

    /// Create an entity with its first revision.
    CreateEntity {
        entity_id: String,

        #[arg(long = "type")]
        entity_type: EntityType,

        #[arg(long, default_value = "pending")]
        state: EntityState,

        /// Accept connections from every remote entity.
        #[arg(long)]
        allowed_all: bool,

        /// Whitelist a remote entity (repeatable).
        #[arg(long = "allow")]
        allowed: Vec<Eid>,

        /// Blacklist a remote entity (repeatable).
        #[arg(long = "block")]
        blocked: Vec<Eid>,

        /// Metadata field as NAME=VALUE (repeatable).
        #[arg(long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

fn emit<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value).context("failed to serialize output")?;
    writeln!(out)?;
    Ok(())
}

fn emit_all<T: Serialize>(out: &mut impl Write, values: &[T]) -> Result<()> {
    for value in values {
        emit(out, value)?;
    }
    Ok(())
}

impl Command {
    /// Runs the command against `registry`, writing JSON lines to `out`.
    pub fn run(self, registry: &Registry, out: &mut impl Write) -> Result<()> {
        match self {
            Command::List {
                states,
                types,
                inactive,
            } => {
                let filter = EntityFilter {
                    states,
                    types,
                    active: !inactive,
                };
                emit_all(out, &registry.revisions.list_entities(&filter)?)
            }
            Command::ListAll => emit_all(out, &registry.revisions.list_all_entities()?),
            Command::UserEntities { uid } => {
                emit_all(out, &registry.revisions.entities_for_user(uid)?)
            }
            Command::Access { eid, without } => {
                let users = if without {
                    registry.permissions.users_without_access(eid)?
                } else {
                    registry.permissions.users_with_access(eid)?
                };
                emit_all(out, &users)
            }
            Command::Grant { eid, uid } => {
                let user_id = registry.permissions.grant(eid, uid)?;
                emit(out, &json!({ "eid": eid, "uid": uid, "user_id": user_id }))
            }
            Command::Revoke { uid, entity, all } => {
                let removed = match entity {
                    Some(eid) if !all => registry.permissions.revoke(eid, uid)?,
                    _ => registry.permissions.revoke_all_for_user(uid)?,
                };
                emit(out, &json!({ "uid": uid, "eid": entity, "removed": removed }))
            }
            Command::Blocked { requester, remotes } => {
                emit_all(out, &registry.connectivity.reverse_blocked(requester, &remotes)?)
            }
            Command::Enable { eid } => {
                registry.lifecycle.enable(eid)?;
                emit(out, &json!({ "eid": eid, "active": true }))
            }
            Command::Disable { eid } => {
                registry.lifecycle.disable(eid)?;
                emit(out, &json!({ "eid": eid, "active": false }))
            }
            Command::Delete { eid } => {
                registry.lifecycle.delete(eid)?;
                emit(out, &json!({ "eid": eid, "deleted": true }))
            }
            Command::Types => emit_all(out, &registry.revisions.allowed_types()),
            Command::CreateUser { user_id } => emit(out, &registry.users.create_user(&user_id)?),
            Command::CreateEntity {
                entity_id,
                entity_type,
                state,
                allowed_all,
                allowed,
                blocked,
                metadata,
            } => {
                let revision = NewRevision {
                    entity_id,
                    state,
                    entity_type,
                    allowed_all,
                    metadata: metadata.into_iter().collect::<BTreeMap<_, _>>(),
                    allowed: allowed.into_iter().collect(),
                    blocked: blocked.into_iter().collect(),
                };
                let eid = registry.revisions.create_entity()?;
                let stored = match registry.revisions.append_revision(eid, &revision) {
                    Ok(stored) => stored,
                    Err(err) => {
                        // Leave no revisionless entity behind.
                        registry.lifecycle.delete(eid)?;
                        return Err(err.into());
                    }
                };
                emit(out, &stored)
            }
        }
    }
}
