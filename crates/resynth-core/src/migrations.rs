//! Embedded Postgres migrations, run at worker/server startup.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::LedgerError;

pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

/// Runs any pending migrations against `database_url`.
///
/// Diesel's sync `PgConnection` is used here deliberately: migrations run
/// once at process startup, off the async pool, via `spawn_blocking`.
pub async fn run_pending_migrations(database_url: &str) -> Result<(), LedgerError> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url)
            .map_err(|e| LedgerError::Migration(e.to_string()))?;
        conn.run_pending_migrations(POSTGRES_MIGRATIONS)
            .map(|_| ())
            .map_err(|e| LedgerError::Migration(e.to_string()))
    })
    .await
    .map_err(|e| LedgerError::Migration(e.to_string()))?
}
