//! # Unit of Work
//!
//! One SQLite transaction around a business operation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UnitOfWork::begin(pool)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1st statement is a WRITE                                              │
//! │  (sequence reservation or status-guarded UPDATE)                       │
//! │  → SQLite takes the write lock before anything is read                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ledger writes, document rows, ...                                     │
//! │       │                                                                 │
//! │       ├── any `?` returns early ──► dropped ──► ROLLBACK                │
//! │       ▼                                                                 │
//! │  uow.commit() ──► COMMIT                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stock ledger's writers take `&mut UnitOfWork`, so stock rows can only
//! change inside one. Never touch the pool while a unit of work is alive: an
//! in-memory database has a single connection.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::trace;

use crate::error::{DbError, DbResult};

/// An open database transaction; rolls back when dropped uncommitted.
pub(crate) struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Starts a transaction on a pooled connection.
    pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        trace!("Unit of work started");
        Ok(UnitOfWork { tx })
    }

    /// The connection to run statements on.
    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commits every write made through this unit of work.
    pub(crate) async fn commit(self) -> DbResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        trace!("Unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn scratch_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("CREATE TABLE scratch (v INTEGER NOT NULL)")
            .execute(db.pool())
            .await
            .unwrap();
        db
    }

    async fn count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM scratch")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let db = scratch_db().await;
        {
            let mut uow = UnitOfWork::begin(db.pool()).await.unwrap();
            sqlx::query("INSERT INTO scratch (v) VALUES (1)")
                .execute(uow.conn())
                .await
                .unwrap();
        }
        assert_eq!(count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let db = scratch_db().await;
        let mut uow = UnitOfWork::begin(db.pool()).await.unwrap();
        sqlx::query("INSERT INTO scratch (v) VALUES (1)")
            .execute(uow.conn())
            .await
            .unwrap();
        uow.commit().await.unwrap();
        assert_eq!(count(&db).await, 1);
    }
}
