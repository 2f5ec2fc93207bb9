//! Async Postgres connection pool for the ledger.
//!
//! Postgres-only: the claim primitive here is built on
//! `SELECT ... FOR UPDATE SKIP LOCKED`, which has no SQLite equivalent
//! with the same exactly-once-claim
//! guarantee, so only the Postgres half is carried forward.

use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use crate::error::LedgerError;

pub type PgConn = Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct LedgerPool {
    pool: Pool<AsyncPgConnection>,
}

impl LedgerPool {
    pub fn new(database_url: &str, max_size: usize) -> Result<Self, LedgerError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| LedgerError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn get(&self) -> Result<PgConn, LedgerError> {
        self.pool.get().await.map_err(|e| LedgerError::Pool(e.to_string()))
    }

    pub fn inner(&self) -> &Pool<AsyncPgConnection> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_construction_validates_the_url_lazily() {
        // Pool::builder doesn't connect eagerly, so an unreachable host is
        // still a valid pool until the first `get()`.
        let pool = LedgerPool::new("postgres://localhost/does-not-exist", 4);
        assert!(pool.is_ok());
    }
}
