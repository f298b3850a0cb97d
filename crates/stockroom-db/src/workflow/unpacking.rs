//! Unpackings: bulk source product out, smaller result product in.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use stockroom_core::documents::{DocumentHeader, UnpackingDraft, UnpackingTransaction};
use stockroom_core::numbering::SequenceKind;
use stockroom_core::validation::normalize_note;
use stockroom_core::{
    Actor, CoreError, DocumentKind, DocumentStatus, MovementReference, MovementType,
    WorkflowAction,
};

use super::{guarded_transition, header_columns, WorkflowEngine};
use crate::error::ServiceResult;
use crate::ledger::{self, MovementEntry};
use crate::sequencer;
use crate::uow::UnitOfWork;

const KIND: DocumentKind = DocumentKind::Unpacking;

fn select_sql() -> String {
    format!(
        "SELECT {}, source_product_id, source_quantity, result_product_id, result_quantity, \
         conversion_ratio FROM unpacking_transactions",
        header_columns(KIND)
    )
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> ServiceResult<UnpackingTransaction> {
    let sql = format!("{} WHERE id = ?1", select_sql());
    sqlx::query_as::<_, UnpackingTransaction>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| CoreError::not_found(KIND.label(), id).into())
}

/// Terminal effect: `-source UNPACKING_OUT`, then `+result UNPACKING_IN`.
///
/// Not enough source stock fails the whole unit of work, so the result
/// product is never credited alone.
pub(super) async fn process(
    uow: &mut UnitOfWork,
    header: &DocumentHeader,
    actor: &Actor,
) -> ServiceResult<()> {
    let unpacking = fetch(uow.conn(), &header.id).await?;
    let reference = MovementReference::new(KIND, &header.id);

    let source = MovementEntry {
        product_id: &unpacking.source_product_id,
        store_id: &header.store_id,
        movement_type: MovementType::UnpackingOut,
        reference: Some(&reference),
        note: Some(&header.number),
    };
    ledger::apply_movement(uow, source, -unpacking.source_quantity, actor).await?;

    let result = MovementEntry {
        product_id: &unpacking.result_product_id,
        movement_type: MovementType::UnpackingIn,
        ..source
    };
    ledger::apply_movement(uow, result, unpacking.result_quantity, actor).await?;
    Ok(())
}

impl WorkflowEngine {
    /// Creates a draft unpacking numbered `UP-{date}-{seq}`.
    pub async fn create_unpacking(
        &self,
        store_id: &str,
        draft: UnpackingDraft,
        actor: &Actor,
    ) -> ServiceResult<UnpackingTransaction> {
        let result = async {
            draft.validate()?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let store = self.store(store_id).await?;
            self.require_products(
                &store,
                [
                    draft.source_product_id.as_str(),
                    draft.result_product_id.as_str(),
                ],
            )
            .await?;

            let id = Uuid::new_v4().to_string();
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let number =
                sequencer::next_number(&mut uow, SequenceKind::from(KIND), &store, draft.date)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO unpacking_transactions (
                    id, tenant_id, store_id, number, date, status,
                    source_product_id, source_quantity, result_product_id, result_quantity,
                    conversion_ratio, notes, created_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                "#,
            )
            .bind(&id)
            .bind(&store.tenant_id)
            .bind(&store.id)
            .bind(&number)
            .bind(draft.date)
            .bind(DocumentStatus::Draft)
            .bind(&draft.source_product_id)
            .bind(draft.source_quantity)
            .bind(&draft.result_product_id)
            .bind(draft.result_quantity)
            .bind(draft.conversion_ratio())
            .bind(&notes)
            .bind(actor.id())
            .bind(Utc::now())
            .execute(uow.conn())
            .await?;
            uow.commit().await?;

            info!(
                id = %id,
                number = %number,
                ratio = %draft.conversion_ratio(),
                actor = %actor,
                "Unpacking created"
            );
            self.unpacking(&id).await
        }
        .await;

        result.inspect_err(|err| {
            warn!(document = %KIND, store_id, actor = %actor, action = "create", error = %err, "Workflow action failed")
        })
    }

    /// Replaces the products and quantities of a draft unpacking.
    pub async fn update_unpacking(
        &self,
        id: &str,
        draft: UnpackingDraft,
        actor: &Actor,
    ) -> ServiceResult<UnpackingTransaction> {
        let result = async {
            draft.validate()?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let header = self.header(KIND, id).await?;
            let store = self.store(&header.store_id).await?;
            self.require_products(
                &store,
                [
                    draft.source_product_id.as_str(),
                    draft.result_product_id.as_str(),
                ],
            )
            .await?;

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            guarded_transition(&mut uow, KIND, id, WorkflowAction::Update, actor, None).await?;
            sqlx::query(
                r#"
                UPDATE unpacking_transactions
                SET date = ?1, source_product_id = ?2, source_quantity = ?3,
                    result_product_id = ?4, result_quantity = ?5, conversion_ratio = ?6,
                    notes = ?7
                WHERE id = ?8
                "#,
            )
            .bind(draft.date)
            .bind(&draft.source_product_id)
            .bind(draft.source_quantity)
            .bind(&draft.result_product_id)
            .bind(draft.result_quantity)
            .bind(draft.conversion_ratio())
            .bind(&notes)
            .bind(id)
            .execute(uow.conn())
            .await?;
            uow.commit().await?;

            info!(id, actor = %actor, "Unpacking updated");
            self.unpacking(id).await
        }
        .await;

        result.inspect_err(|err| super::warn_failed(KIND, id, actor, "update", err))
    }

    pub async fn unpacking(&self, id: &str) -> ServiceResult<UnpackingTransaction> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    pub async fn list_unpackings(
        &self,
        store_id: &str,
        status: Option<DocumentStatus>,
    ) -> ServiceResult<Vec<UnpackingTransaction>> {
        let sql = format!(
            "{} WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY date DESC, number DESC",
            select_sql()
        );
        let unpackings = sqlx::query_as::<_, UnpackingTransaction>(&sql)
            .bind(store_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(unpackings)
    }
}
