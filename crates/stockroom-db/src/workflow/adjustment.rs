//! Stock adjustments: one product, one signed `ADJUSTMENT` movement.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use stockroom_core::documents::{DocumentHeader, StockAdjustment, StockAdjustmentDraft};
use stockroom_core::numbering::SequenceKind;
use stockroom_core::validation::{normalize_note, validate_reason};
use stockroom_core::{
    Actor, CoreError, DocumentKind, DocumentStatus, MovementReference, MovementType,
    WorkflowAction,
};

use super::{guarded_transition, header_columns, WorkflowEngine};
use crate::error::ServiceResult;
use crate::ledger::{self, MovementEntry};
use crate::sequencer;
use crate::uow::UnitOfWork;

const KIND: DocumentKind = DocumentKind::StockAdjustment;

fn select_sql() -> String {
    format!(
        "SELECT {}, product_id, quantity, adjustment_type, reason FROM stock_adjustments",
        header_columns(KIND)
    )
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> ServiceResult<StockAdjustment> {
    let sql = format!("{} WHERE id = ?1", select_sql());
    sqlx::query_as::<_, StockAdjustment>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| CoreError::not_found(KIND.label(), id).into())
}

/// Terminal effect: `+quantity` for `add`, `-quantity` for `reduce`.
///
/// A reduce larger than on-hand stock fails with `InsufficientStock` and
/// the document stays `approved`.
pub(super) async fn apply(
    uow: &mut UnitOfWork,
    header: &DocumentHeader,
    actor: &Actor,
) -> ServiceResult<()> {
    let adjustment = fetch(uow.conn(), &header.id).await?;
    let reference = MovementReference::new(KIND, &header.id);
    let entry = MovementEntry {
        product_id: &adjustment.product_id,
        store_id: &header.store_id,
        movement_type: MovementType::Adjustment,
        reference: Some(&reference),
        note: Some(&adjustment.reason),
    };
    ledger::apply_movement(uow, entry, adjustment.signed_quantity(), actor).await?;
    Ok(())
}

impl WorkflowEngine {
    /// Creates a draft adjustment numbered `SA-{date}-{seq}`.
    pub async fn create_adjustment(
        &self,
        store_id: &str,
        draft: StockAdjustmentDraft,
        actor: &Actor,
    ) -> ServiceResult<StockAdjustment> {
        let result = async {
            draft.validate()?;
            let reason = validate_reason("reason", &draft.reason)?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let store = self.store(store_id).await?;
            self.require_products(&store, [draft.product_id.as_str()])
                .await?;

            let id = Uuid::new_v4().to_string();
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let number =
                sequencer::next_number(&mut uow, SequenceKind::from(KIND), &store, draft.date)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO stock_adjustments (
                    id, tenant_id, store_id, number, date, status, product_id,
                    quantity, adjustment_type, reason, notes, created_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                "#,
            )
            .bind(&id)
            .bind(&store.tenant_id)
            .bind(&store.id)
            .bind(&number)
            .bind(draft.date)
            .bind(DocumentStatus::Draft)
            .bind(&draft.product_id)
            .bind(draft.quantity)
            .bind(draft.adjustment_type)
            .bind(&reason)
            .bind(&notes)
            .bind(actor.id())
            .bind(Utc::now())
            .execute(uow.conn())
            .await?;
            uow.commit().await?;

            info!(id = %id, number = %number, actor = %actor, "Stock adjustment created");
            self.adjustment(&id).await
        }
        .await;

        result.inspect_err(|err| {
            warn!(document = %KIND, store_id, actor = %actor, action = "create", error = %err, "Workflow action failed")
        })
    }

    /// Replaces every editable field of a draft adjustment.
    pub async fn update_adjustment(
        &self,
        id: &str,
        draft: StockAdjustmentDraft,
        actor: &Actor,
    ) -> ServiceResult<StockAdjustment> {
        let result = async {
            draft.validate()?;
            let reason = validate_reason("reason", &draft.reason)?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let header = self.header(KIND, id).await?;
            let store = self.store(&header.store_id).await?;
            self.require_products(&store, [draft.product_id.as_str()])
                .await?;

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            guarded_transition(&mut uow, KIND, id, WorkflowAction::Update, actor, None).await?;
            sqlx::query(
                r#"
                UPDATE stock_adjustments
                SET date = ?1, product_id = ?2, quantity = ?3, adjustment_type = ?4,
                    reason = ?5, notes = ?6
                WHERE id = ?7
                "#,
            )
            .bind(draft.date)
            .bind(&draft.product_id)
            .bind(draft.quantity)
            .bind(draft.adjustment_type)
            .bind(&reason)
            .bind(&notes)
            .bind(id)
            .execute(uow.conn())
            .await?;
            uow.commit().await?;

            info!(id, actor = %actor, "Stock adjustment updated");
            self.adjustment(id).await
        }
        .await;

        result.inspect_err(|err| super::warn_failed(KIND, id, actor, "update", err))
    }

    pub async fn adjustment(&self, id: &str) -> ServiceResult<StockAdjustment> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// A store's adjustments, newest first, optionally by status.
    pub async fn list_adjustments(
        &self,
        store_id: &str,
        status: Option<DocumentStatus>,
    ) -> ServiceResult<Vec<StockAdjustment>> {
        let sql = format!(
            "{} WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY date DESC, number DESC",
            select_sql()
        );
        let adjustments = sqlx::query_as::<_, StockAdjustment>(&sql)
            .bind(store_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(adjustments)
    }
}
