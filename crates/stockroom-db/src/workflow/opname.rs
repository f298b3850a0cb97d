//! Stock opnames: physical counts that set stock to what was found.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use stockroom_core::documents::{
    check_variance_reasons, DocumentHeader, StockOpname, StockOpnameDraft, StockOpnameItem,
};
use stockroom_core::numbering::SequenceKind;
use stockroom_core::validation::normalize_note;
use stockroom_core::{
    Actor, CoreError, DocumentKind, DocumentStatus, MovementReference, MovementType, Quantity,
    WorkflowAction,
};

use super::{guarded_transition, header_columns, WorkflowEngine};
use crate::error::{DbResult, ServiceResult};
use crate::ledger::{self, MovementEntry};
use crate::sequencer;
use crate::uow::UnitOfWork;

const KIND: DocumentKind = DocumentKind::StockOpname;

/// A counted line with the ledger quantity seen when it was written.
struct CountedLine {
    product_id: String,
    system_quantity: Quantity,
    physical_quantity: Quantity,
    variance_reason: Option<String>,
}

async fn load_items(conn: &mut SqliteConnection, id: &str) -> DbResult<Vec<StockOpnameItem>> {
    let items = sqlx::query_as::<_, StockOpnameItem>(
        r#"
        SELECT id, stock_opname_id, product_id, system_quantity,
               physical_quantity, variance, variance_reason
        FROM stock_opname_items
        WHERE stock_opname_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

async fn insert_items(uow: &mut UnitOfWork, id: &str, lines: &[CountedLine]) -> DbResult<()> {
    for (line_no, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO stock_opname_items (
                id, stock_opname_id, product_id, system_quantity,
                physical_quantity, variance, variance_reason, line_no
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(id)
        .bind(&line.product_id)
        .bind(line.system_quantity)
        .bind(line.physical_quantity)
        .bind(line.physical_quantity - line.system_quantity)
        .bind(&line.variance_reason)
        .bind(line_no as i64)
        .execute(uow.conn())
        .await?;
    }
    Ok(())
}

/// Refuses submission while a line with a variance has no reason.
pub(super) async fn check_submittable(uow: &mut UnitOfWork, id: &str) -> ServiceResult<()> {
    let items = load_items(uow.conn(), id).await?;
    check_variance_reasons(&items)?;
    Ok(())
}

/// Terminal effect: stock of every counted product becomes its physical
/// count, with an `OPNAME` movement for the difference.
pub(super) async fn finalize(
    uow: &mut UnitOfWork,
    header: &DocumentHeader,
    actor: &Actor,
) -> ServiceResult<()> {
    let items = load_items(uow.conn(), &header.id).await?;
    let reference = MovementReference::new(KIND, &header.id);

    for item in &items {
        let entry = MovementEntry {
            product_id: &item.product_id,
            store_id: &header.store_id,
            movement_type: MovementType::Opname,
            reference: Some(&reference),
            note: item.variance_reason.as_deref().or(Some(header.number.as_str())),
        };
        ledger::set_absolute(uow, entry, item.physical_quantity, actor).await?;
    }
    Ok(())
}

impl WorkflowEngine {
    /// Snapshots the ledger quantity of every counted product.
    async fn counted_lines(
        &self,
        store_id: &str,
        draft: &StockOpnameDraft,
    ) -> ServiceResult<Vec<CountedLine>> {
        let mut conn = self.pool.acquire().await?;
        let mut lines = Vec::with_capacity(draft.items.len());
        for line in &draft.items {
            let system_quantity =
                ledger::read_quantity(&mut conn, &line.product_id, store_id).await?;
            lines.push(CountedLine {
                product_id: line.product_id.clone(),
                system_quantity,
                physical_quantity: line.physical_quantity,
                variance_reason: normalize_note(
                    "variance_reason",
                    line.variance_reason.as_deref(),
                )?,
            });
        }
        Ok(lines)
    }

    /// Creates a draft opname numbered `SO-{date}-{seq}`.
    pub async fn create_opname(
        &self,
        store_id: &str,
        draft: StockOpnameDraft,
        actor: &Actor,
    ) -> ServiceResult<StockOpname> {
        let result = async {
            draft.validate()?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let store = self.store(store_id).await?;
            self.require_products(&store, draft.items.iter().map(|l| l.product_id.as_str()))
                .await?;
            let lines = self.counted_lines(&store.id, &draft).await?;

            let id = Uuid::new_v4().to_string();
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let number =
                sequencer::next_number(&mut uow, SequenceKind::from(KIND), &store, draft.date)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO stock_opnames (
                    id, tenant_id, store_id, number, date, status,
                    notes, created_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                "#,
            )
            .bind(&id)
            .bind(&store.tenant_id)
            .bind(&store.id)
            .bind(&number)
            .bind(draft.date)
            .bind(DocumentStatus::Draft)
            .bind(&notes)
            .bind(actor.id())
            .bind(Utc::now())
            .execute(uow.conn())
            .await?;
            insert_items(&mut uow, &id, &lines).await?;
            uow.commit().await?;

            info!(id = %id, number = %number, lines = lines.len(), actor = %actor, "Stock opname created");
            self.opname(&id).await
        }
        .await;

        result.inspect_err(|err| {
            warn!(document = %KIND, store_id, actor = %actor, action = "create", error = %err, "Workflow action failed")
        })
    }

    /// Replaces a draft's counts; system quantities are snapshotted again.
    pub async fn update_opname(
        &self,
        id: &str,
        draft: StockOpnameDraft,
        actor: &Actor,
    ) -> ServiceResult<StockOpname> {
        let result = async {
            draft.validate()?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let header = self.header(KIND, id).await?;
            let store = self.store(&header.store_id).await?;
            self.require_products(&store, draft.items.iter().map(|l| l.product_id.as_str()))
                .await?;
            let lines = self.counted_lines(&store.id, &draft).await?;

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            guarded_transition(&mut uow, KIND, id, WorkflowAction::Update, actor, None).await?;
            sqlx::query("UPDATE stock_opnames SET date = ?1, notes = ?2 WHERE id = ?3")
                .bind(draft.date)
                .bind(&notes)
                .bind(id)
                .execute(uow.conn())
                .await?;
            sqlx::query("DELETE FROM stock_opname_items WHERE stock_opname_id = ?1")
                .bind(id)
                .execute(uow.conn())
                .await?;
            insert_items(&mut uow, id, &lines).await?;
            uow.commit().await?;

            info!(id, lines = lines.len(), actor = %actor, "Stock opname updated");
            self.opname(id).await
        }
        .await;

        result.inspect_err(|err| super::warn_failed(KIND, id, actor, "update", err))
    }

    /// A stock opname with its counted lines.
    pub async fn opname(&self, id: &str) -> ServiceResult<StockOpname> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM stock_opnames WHERE id = ?1",
            header_columns(KIND)
        );
        let mut opname = sqlx::query_as::<_, StockOpname>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| CoreError::not_found(KIND.label(), id))?;
        opname.items = load_items(&mut conn, id).await?;
        Ok(opname)
    }

    /// A store's opnames, newest first, optionally by status.
    pub async fn list_opnames(
        &self,
        store_id: &str,
        status: Option<DocumentStatus>,
    ) -> ServiceResult<Vec<StockOpname>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM stock_opnames WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY date DESC, number DESC",
            header_columns(KIND)
        );
        let mut opnames = sqlx::query_as::<_, StockOpname>(&sql)
            .bind(store_id)
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;
        for opname in &mut opnames {
            opname.items = load_items(&mut conn, &opname.header.id).await?;
        }
        Ok(opnames)
    }
}
