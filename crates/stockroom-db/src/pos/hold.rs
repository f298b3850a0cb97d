//! Held carts, parked at the register and resumed later.
//!
//! The payload is whatever the register sent; it is stored and returned
//! verbatim. Holding, resuming and discarding never touch stock.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use stockroom_core::numbering::SequenceKind;
use stockroom_core::pos::{HoldCart, PendingTransaction};
use stockroom_core::validation::normalize_note;
use stockroom_core::{Actor, CoreError, ValidationError};

use super::{warn_failed, PosEngine};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::store::StoreRepository;
use crate::sequencer;
use crate::uow::UnitOfWork;

const PENDING_COLUMNS: &str =
    "id, tenant_id, store_id, hold_number, cashier_id, store_session_id, payload, notes, created_at";

impl PosEngine {
    /// Parks a cart under a `HOLD-{store}-{date}-{seq}` number.
    pub async fn hold_transaction(
        &self,
        cart: HoldCart,
        cashier: &Actor,
    ) -> ServiceResult<PendingTransaction> {
        let store_id = cart.store_id.clone();
        let result = async {
            if cart.payload.is_null() {
                return Err(ValidationError::required("payload").into());
            }
            let notes = normalize_note("notes", cart.notes.as_deref())?;
            let store = StoreRepository::new(self.pool.clone())
                .require(&cart.store_id)
                .await?;

            let now = Utc::now();
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let date = store.business_date(now);
            let hold_number =
                sequencer::next_number(&mut uow, SequenceKind::Hold, &store, date).await?;

            let pending = PendingTransaction {
                id: Uuid::new_v4().to_string(),
                tenant_id: store.tenant_id.clone(),
                store_id: store.id.clone(),
                hold_number,
                cashier_id: cashier.id().to_string(),
                store_session_id: cart.session_id,
                payload: cart.payload,
                notes,
                created_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO pending_transactions (
                    id, tenant_id, store_id, hold_number, cashier_id,
                    store_session_id, payload, notes, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&pending.id)
            .bind(&pending.tenant_id)
            .bind(&pending.store_id)
            .bind(&pending.hold_number)
            .bind(&pending.cashier_id)
            .bind(&pending.store_session_id)
            .bind(&pending.payload)
            .bind(&pending.notes)
            .bind(pending.created_at)
            .execute(uow.conn())
            .await?;
            uow.commit().await?;

            info!(id = %pending.id, number = %pending.hold_number, cashier = %cashier, "Cart held");
            Ok::<_, ServiceError>(pending)
        }
        .await;

        result.inspect_err(|err| warn_failed(&store_id, cashier, "hold", err))
    }

    /// Returns a held cart as it was stored.
    ///
    /// The hold is kept; the register discards it with
    /// [`delete_pending_transaction`](Self::delete_pending_transaction)
    /// once the sale goes through.
    pub async fn resume_transaction(&self, id: &str) -> ServiceResult<PendingTransaction> {
        let sql = format!(
            "SELECT {} FROM pending_transactions WHERE id = ?1",
            PENDING_COLUMNS
        );
        let pending = sqlx::query_as::<_, PendingTransaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("pending transaction", id))?;

        debug!(id, number = %pending.hold_number, "Cart resumed");
        Ok(pending)
    }

    /// Discards a held cart.
    pub async fn delete_pending_transaction(&self, id: &str, actor: &Actor) -> ServiceResult<()> {
        let deleted = sqlx::query("DELETE FROM pending_transactions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            let err: ServiceError = CoreError::not_found("pending transaction", id).into();
            warn_failed(id, actor, "delete", &err);
            return Err(err);
        }
        info!(id, actor = %actor, "Held cart discarded");
        Ok(())
    }

    /// Held carts of a store, oldest first, optionally for one cashier.
    pub async fn list_pending(
        &self,
        store_id: &str,
        cashier_id: Option<&str>,
    ) -> ServiceResult<Vec<PendingTransaction>> {
        let sql = format!(
            "SELECT {} FROM pending_transactions \
             WHERE store_id = ?1 AND (?2 IS NULL OR cashier_id = ?2) \
             ORDER BY created_at, hold_number",
            PENDING_COLUMNS
        );
        let pending = sqlx::query_as::<_, PendingTransaction>(&sql)
            .bind(store_id)
            .bind(cashier_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(pending)
    }
}
