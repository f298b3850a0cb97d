//! # Sequencer
//!
//! Issues document, transaction, session and hold numbers.
//!
//! ## Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  document_sequences (kind, scope_id, day) → last_value                 │
//! │                                                                         │
//! │  INSERT ... VALUES (kind, scope, day, 1)                               │
//! │  ON CONFLICT (kind, scope_id, day)                                     │
//! │  DO UPDATE SET last_value = last_value + 1                             │
//! │  RETURNING last_value                                                  │
//! │                                                                         │
//! │  One statement: two writers can never read the same value, and the    │
//! │  reservation is the write that opens every creating unit of work.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A reservation made inside a unit of work that later rolls back is
//! released with it, so numbers stay gap-free for committed rows.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use stockroom_core::numbering::{day_key, format_number, SequenceKind, SequenceScope};
use stockroom_core::Store;

use crate::error::DbResult;
use crate::uow::UnitOfWork;

/// Reserves the next counter value for `(kind, scope_id, date)`.
async fn reserve(
    conn: &mut SqliteConnection,
    kind: SequenceKind,
    scope_id: &str,
    date: NaiveDate,
) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (kind, scope_id, day, last_value)
        VALUES (?1, ?2, ?3, 1)
        ON CONFLICT (kind, scope_id, day)
        DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(kind.prefix())
    .bind(scope_id)
    .bind(day_key(date))
    .fetch_one(conn)
    .await?;

    Ok(value)
}

/// The counter partition a store belongs to for `kind`.
fn scope_id(kind: SequenceKind, store: &Store) -> &str {
    match kind.scope() {
        SequenceScope::Tenant => &store.tenant_id,
        SequenceScope::Store => &store.id,
    }
}

/// Reserves and formats the next number inside a unit of work.
pub(crate) async fn next_number(
    uow: &mut UnitOfWork,
    kind: SequenceKind,
    store: &Store,
    date: NaiveDate,
) -> DbResult<String> {
    let seq = reserve(uow.conn(), kind, scope_id(kind, store), date).await?;
    let number = format_number(kind, &store.code, date, seq);
    debug!(kind = kind.prefix(), number = %number, "Reserved number");
    Ok(number)
}

/// Standalone access to the counters.
#[derive(Debug, Clone)]
pub struct Sequencer {
    pool: SqlitePool,
}

impl Sequencer {
    pub fn new(pool: SqlitePool) -> Self {
        Sequencer { pool }
    }

    /// Reserves a number in its own unit of work.
    ///
    /// Engines reserve inside their own unit of work instead, so a failed
    /// creation does not consume a number.
    pub async fn next(
        &self,
        kind: SequenceKind,
        store: &Store,
        date: NaiveDate,
    ) -> DbResult<String> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let number = next_number(&mut uow, kind, store, date).await?;
        uow.commit().await?;
        Ok(number)
    }

    /// Last value issued for a store's partition on `date`, if any.
    pub async fn current(
        &self,
        kind: SequenceKind,
        store: &Store,
        date: NaiveDate,
    ) -> DbResult<Option<i64>> {
        let value = sqlx::query_scalar(
            "SELECT last_value FROM document_sequences WHERE kind = ?1 AND scope_id = ?2 AND day = ?3",
        )
        .bind(kind.prefix())
        .bind(scope_id(kind, store))
        .bind(day_key(date))
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;
    use stockroom_core::{RoundingMode, TaxMode};

    fn store(id: &str, tenant: &str, code: &str) -> Store {
        Store {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            tax_rate_bps: 0,
            tax_mode: TaxMode::Exclusive,
            rounding_mode: RoundingMode::None,
            rounding_unit: 1,
            utc_offset_minutes: 0,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_numbers_increment_per_day() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequencer();
        let s = store("s1", "t1", "JKT01");

        assert_eq!(

            seq.next(SequenceKind::PurchaseOrder, &s, day(14)).await.unwrap(),

            "PO-20250314-001"

        );
        assert_eq!(
            seq.next(SequenceKind::PurchaseOrder, &s, day(14)).await.unwrap(),
            "PO-20250314-002"
        );
        assert_eq!(
            seq.next(SequenceKind::PurchaseOrder, &s, day(15)).await.unwrap(),
            "PO-20250315-001"
        );
        assert_eq!(seq.current(SequenceKind::PurchaseOrder, &s, day(14)).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_document_counters_are_shared_across_a_tenant() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequencer();
        let a = store("s1", "t1", "A");
        let b = store("s2", "t1", "B");

        seq.next(SequenceKind::StockAdjustment, &a, day(1)).await.unwrap();
        assert_eq!(
            seq.next(SequenceKind::StockAdjustment, &b, day(1)).await.unwrap(),
            "SA-20250301-002"
        );
    }

    #[tokio::test]
    async fn test_transaction_counters_are_per_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequencer();
        let a = store("s1", "t1", "A");
        let b = store("s2", "t1", "B");

        seq.next(SequenceKind::Transaction, &a, day(1)).await.unwrap();
        assert_eq!(
            seq.next(SequenceKind::Transaction, &b, day(1)).await.unwrap(),
            "TRX-B-20250301-0001"
        );
        assert_eq!(
            seq.next(SequenceKind::Transaction, &a, day(1)).await.unwrap(),
            "TRX-A-20250301-0002"
        );
    }

    #[tokio::test]
    async fn test_rolled_back_reservation_is_released() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = store("s1", "t1", "A");
        {
            let mut uow = UnitOfWork::begin(db.pool()).await.unwrap();
            next_number(&mut uow, SequenceKind::Hold, &s, day(2)).await.unwrap();
        }
        assert_eq!(
            db.sequencer().next(SequenceKind::Hold, &s, day(2)).await.unwrap(),
            "HOLD-A-20250302-0001"
        );
    }
}
