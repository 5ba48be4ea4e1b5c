//! Cross-process advisory lock.
//!
//! Postgres advisory locks are session-scoped, so the acquiring
//! connection must stay checked out of the pool for as long as the lock
//! is held. [`AdvisoryLock`] owns that connection; callers must invoke
//! [`AdvisoryLock::release`] on every exit path. If the process dies the
//! session closes and Postgres frees the lock on its own.

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

/// Fixed task identifier the sync lock key is derived from. The same
/// string hashes to the same lock id on every worker, which is the whole
/// point: at most one process cluster-wide runs a sync cycle.
pub const SYNC_LOCK_KEY: &str = "wb_tariffs:box_sync";

/// Held advisory lock. Keeps its Postgres session pinned until released.
pub struct AdvisoryLock {
    conn: PoolConnection<Postgres>,
    key: String,
}

/// Try to take the named advisory lock without blocking.
///
/// Returns `Ok(None)` when another session holds it — a clean skip
/// signal, not an error.
pub async fn try_acquire(pool: &PgPool, key: &str) -> Result<Option<AdvisoryLock>> {
    let mut conn = pool
        .acquire()
        .await
        .context("advisory lock: pool acquire failed")?;

    let (locked,): (bool,) =
        sqlx::query_as("select pg_try_advisory_lock(hashtext($1))")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .context("pg_try_advisory_lock failed")?;

    if locked {
        Ok(Some(AdvisoryLock {
            conn,
            key: key.to_string(),
        }))
    } else {
        Ok(None)
    }
}

impl AdvisoryLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock and return the connection to the pool.
    ///
    /// Must be called explicitly; merely dropping the guard hands the
    /// connection back with the lock still attached to its session.
    pub async fn release(mut self) -> Result<()> {
        let (released,): (bool,) =
            sqlx::query_as("select pg_advisory_unlock(hashtext($1))")
                .bind(&self.key)
                .fetch_one(&mut *self.conn)
                .await
                .context("pg_advisory_unlock failed")?;

        anyhow::ensure!(released, "advisory lock '{}' was not held by this session", self.key);
        Ok(())
    }
}
