//! Storage layer for the fedreg registry.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and the embedded SQL migrations that create the registry schema:
//! entities and their revisions, revision metadata, whitelist/blacklist
//! edges, administrator accounts, permission edges and subscriptions.
//!
//! WAL mode gives the entity services snapshot reads alongside a single
//! writer; every write path in `fedreg-entities` takes an immediate
//! transaction, so conflicting writes to one entity are serialized here.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
