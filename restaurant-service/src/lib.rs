pub mod api;
pub mod assignment;
pub mod billing;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orders;
pub mod publisher;
pub mod reservations;
pub mod schema;

use anyhow::Result;
use diesel::{Connection, PgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Identity of the caller as established by the upstream auth layer. Every
/// engine lookup is scoped to `restaurant_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: Uuid,
    pub restaurant_id: Uuid,
}

pub fn run_migrations(database_url: &str) -> Result<()> {
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}
