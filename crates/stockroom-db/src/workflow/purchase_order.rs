//! Purchase orders: supplier lines received into stock as `IN` movements.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{info, warn};
use uuid::Uuid;

use stockroom_core::documents::{
    DocumentHeader, PurchaseOrder, PurchaseOrderDraft, PurchaseOrderItem, PurchaseOrderLine,
};
use stockroom_core::numbering::SequenceKind;
use stockroom_core::validation::normalize_note;
use stockroom_core::{
    Actor, CoreError, DocumentKind, DocumentStatus, MovementReference, MovementType,
    WorkflowAction,
};

use super::{guarded_transition, header_columns, WorkflowEngine};
use crate::error::{DbResult, ServiceResult};
use crate::ledger::{self, MovementEntry};
use crate::sequencer;
use crate::uow::UnitOfWork;

const KIND: DocumentKind = DocumentKind::PurchaseOrder;

fn select_sql() -> String {
    format!(
        "SELECT {}, supplier_name, total FROM purchase_orders",
        header_columns(KIND)
    )
}

async fn load_items(conn: &mut SqliteConnection, id: &str) -> DbResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        r#"
        SELECT id, purchase_order_id, product_id, quantity, unit_price, subtotal
        FROM purchase_order_items
        WHERE purchase_order_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

async fn insert_items(
    uow: &mut UnitOfWork,
    id: &str,
    lines: &[PurchaseOrderLine],
) -> ServiceResult<()> {
    for (line_no, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (
                id, purchase_order_id, product_id, quantity, unit_price, subtotal, line_no
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(id)
        .bind(&line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.subtotal()?)
        .bind(line_no as i64)
        .execute(uow.conn())
        .await?;
    }
    Ok(())
}

/// Terminal effect: `+quantity IN` for every line.
pub(super) async fn receive(
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
            movement_type: MovementType::In,
            reference: Some(&reference),
            note: Some(&header.number),
        };
        ledger::apply_movement(uow, entry, item.quantity, actor).await?;
    }
    Ok(())
}

impl WorkflowEngine {
    /// Creates a draft purchase order numbered `PO-{date}-{seq}`.
    pub async fn create_purchase_order(
        &self,
        store_id: &str,
        draft: PurchaseOrderDraft,
        actor: &Actor,
    ) -> ServiceResult<PurchaseOrder> {
        let result = async {
            draft.validate()?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let supplier_name = normalize_note("supplier_name", draft.supplier_name.as_deref())?;
            let store = self.store(store_id).await?;
            self.require_products(&store, draft.items.iter().map(|l| l.product_id.as_str()))
                .await?;

            let id = Uuid::new_v4().to_string();
            let now = Utc::now();

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let number =
                sequencer::next_number(&mut uow, SequenceKind::from(KIND), &store, draft.date)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO purchase_orders (
                    id, tenant_id, store_id, number, date, status,
                    supplier_name, total, notes, created_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                "#,
            )
            .bind(&id)
            .bind(&store.tenant_id)
            .bind(&store.id)
            .bind(&number)
            .bind(draft.date)
            .bind(DocumentStatus::Draft)
            .bind(&supplier_name)
            .bind(draft.total()?)
            .bind(&notes)
            .bind(actor.id())
            .bind(now)
            .execute(uow.conn())
            .await?;
            insert_items(&mut uow, &id, &draft.items).await?;
            uow.commit().await?;

            info!(id = %id, number = %number, lines = draft.items.len(), actor = %actor, "Purchase order created");
            self.purchase_order(&id).await
        }
        .await;

        result.inspect_err(|err| {
            warn!(document = %KIND, store_id, actor = %actor, action = "create", error = %err, "Workflow action failed")
        })
    }

    /// Replaces a draft's supplier, date, notes and all of its lines.
    pub async fn update_purchase_order(
        &self,
        id: &str,
        draft: PurchaseOrderDraft,
        actor: &Actor,
    ) -> ServiceResult<PurchaseOrder> {
        let result = async {
            draft.validate()?;
            let notes = normalize_note("notes", draft.notes.as_deref())?;
            let supplier_name = normalize_note("supplier_name", draft.supplier_name.as_deref())?;
            let header = self.header(KIND, id).await?;
            let store = self.store(&header.store_id).await?;
            self.require_products(&store, draft.items.iter().map(|l| l.product_id.as_str()))
                .await?;

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            guarded_transition(&mut uow, KIND, id, WorkflowAction::Update, actor, None).await?;

            sqlx::query(
                "UPDATE purchase_orders SET date = ?1, supplier_name = ?2, total = ?3, notes = ?4 WHERE id = ?5",
            )
            .bind(draft.date)
            .bind(&supplier_name)
            .bind(draft.total()?)
            .bind(&notes)
            .bind(id)
            .execute(uow.conn())
            .await?;
            sqlx::query("DELETE FROM purchase_order_items WHERE purchase_order_id = ?1")
                .bind(id)
                .execute(uow.conn())
                .await?;
            insert_items(&mut uow, id, &draft.items).await?;
            uow.commit().await?;

            info!(id, lines = draft.items.len(), actor = %actor, "Purchase order updated");
            self.purchase_order(id).await
        }
        .await;

        result.inspect_err(|err| super::warn_failed(KIND, id, actor, "update", err))
    }

    /// A purchase order with its lines.
    pub async fn purchase_order(&self, id: &str) -> ServiceResult<PurchaseOrder> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("{} WHERE id = ?1", select_sql());
        let mut order = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| CoreError::not_found(KIND.label(), id))?;
        order.items = load_items(&mut conn, id).await?;
        Ok(order)
    }

    /// A store's purchase orders, newest first, optionally by status.
    pub async fn list_purchase_orders(
        &self,
        store_id: &str,
        status: Option<DocumentStatus>,
    ) -> ServiceResult<Vec<PurchaseOrder>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "{} WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY date DESC, number DESC",
            select_sql()
        );
        let mut orders = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(store_id)
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;
        for order in &mut orders {
            order.items = load_items(&mut conn, &order.header.id).await?;
        }
        Ok(orders)
    }
}
