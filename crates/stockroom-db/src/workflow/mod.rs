//! # Workflow Document Engine
//!
//! Purchase orders, stock adjustments, stock opnames and unpackings share
//! one approval state machine ([`stockroom_core::workflow`]). Each kind
//! brings its own rows and its own terminal effect on the ledger.
//!
//! ## Transition Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  engine.approve(kind, id, actor)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UnitOfWork::begin                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE {table} SET status = 'approved', approved_by = ?, ...          │
//! │   WHERE id = ? AND status = 'submitted'         ◄── guarded write      │
//! │       │                                                                 │
//! │       ├── 0 rows ──► read status ──► NotFound | InvalidStateTransition │
//! │       ▼                                                                 │
//! │  complete only: terminal effect (enum dispatch on DocumentKind)        │
//! │    PO  receive   +qty IN per line                                      │
//! │    SA  apply     ±qty ADJUSTMENT                                       │
//! │    SO  finalize  set_absolute per line (OPNAME)                        │
//! │    UP  process   -source UNPACKING_OUT, +result UNPACKING_IN           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT (all or nothing)                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because the status guard is the first write of the unit of work, two
//! concurrent `complete` calls cannot both see `approved`: the terminal
//! effect runs exactly once.

mod adjustment;
mod opname;
mod purchase_order;
mod unpacking;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use stockroom_core::documents::DocumentHeader;
use stockroom_core::validation::validate_reason;
use stockroom_core::workflow::{plan_transition, transition_for, Transition};
use stockroom_core::{Actor, CoreError, DocumentKind, DocumentStatus, Store, WorkflowAction};

use crate::error::{DbResult, ServiceError, ServiceResult};
use crate::repository::product::ProductRepository;
use crate::repository::store::StoreRepository;
use crate::uow::UnitOfWork;

// =============================================================================
// Shared SQL
// =============================================================================

/// Header columns of `kind`, with the terminal columns aliased to
/// `completed_by` / `completed_at`.
fn header_columns(kind: DocumentKind) -> String {
    format!(
        "id, tenant_id, store_id, number, date, status, notes, created_by, created_at, \
         submitted_by, submitted_at, approved_by, approved_at, rejected_by, rejected_at, \
         rejection_reason, {} AS completed_by, {} AS completed_at, updated_at",
        kind.completed_by_column(),
        kind.completed_at_column()
    )
}

async fn fetch_status(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    id: &str,
) -> DbResult<Option<DocumentStatus>> {
    let sql = format!("SELECT status FROM {} WHERE id = ?1", kind.table());
    let status = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(status)
}

pub(super) async fn fetch_header(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    id: &str,
) -> ServiceResult<DocumentHeader> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        header_columns(kind),
        kind.table()
    );
    sqlx::query_as::<_, DocumentHeader>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| CoreError::not_found(kind.label(), id).into())
}

/// Explains why a guarded write matched no row.
async fn refusal(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    id: &str,
    action: WorkflowAction,
) -> ServiceError {
    match fetch_status(conn, kind, id).await {
        Ok(None) => ServiceError::not_found(kind.label(), id),
        Ok(Some(current)) => match plan_transition(kind, id, current, action) {
            Err(err) => err.into(),
            Ok(_) => ServiceError::conflict(format!("{} {} was modified concurrently", kind, id)),
        },
        Err(err) => err.into(),
    }
}

/// Moves a document along `action` with a status-guarded UPDATE.
///
/// Stamps the actor/time columns that belong to the action. `Update`
/// only claims a draft (status stays `draft`); `Reopen` keeps the
/// rejection history.
pub(super) async fn guarded_transition(
    uow: &mut UnitOfWork,
    kind: DocumentKind,
    id: &str,
    action: WorkflowAction,
    actor: &Actor,
    reason: Option<&str>,
) -> ServiceResult<Transition> {
    let Some(transition) = transition_for(kind, action) else {
        return Err(refusal(uow.conn(), kind, id, action).await);
    };

    let stamp = match action {
        WorkflowAction::Submit => ", submitted_by = ?5, submitted_at = ?2".to_string(),
        WorkflowAction::Approve => ", approved_by = ?5, approved_at = ?2".to_string(),
        WorkflowAction::Reject => {
            ", rejected_by = ?5, rejected_at = ?2, rejection_reason = ?6".to_string()
        }
        WorkflowAction::Complete => format!(
            ", {} = ?5, {} = ?2",
            kind.completed_by_column(),
            kind.completed_at_column()
        ),
        WorkflowAction::Update | WorkflowAction::Delete | WorkflowAction::Reopen => String::new(),
    };
    let sql = format!(
        "UPDATE {} SET status = ?1, updated_at = ?2{} WHERE id = ?3 AND status = ?4",
        kind.table(),
        stamp
    );

    let mut query = sqlx::query(&sql)
        .bind(transition.to)
        .bind(Utc::now())
        .bind(id)
        .bind(transition.from);
    if !stamp.is_empty() {
        query = query.bind(actor.id());
    }
    if action == WorkflowAction::Reject {
        query = query.bind(reason.unwrap_or_default());
    }

    let result = query.execute(uow.conn()).await?;
    if result.rows_affected() == 0 {
        return Err(refusal(uow.conn(), kind, id, action).await);
    }
    Ok(transition)
}

pub(super) fn warn_failed(
    kind: DocumentKind,
    id: &str,
    actor: &Actor,
    action: &str,
    err: &ServiceError,
) {
    warn!(
        document = %kind,
        id,
        actor = %actor,
        action,
        error = %err,
        "Workflow action failed"
    );
}

// =============================================================================
// Engine
// =============================================================================

/// Entry point for every workflow document operation.
///
/// ## Usage
/// ```rust,ignore
/// let engine = db.workflow();
/// let po = engine.create_purchase_order(&store.id, draft, &actor).await?;
/// engine.submit(DocumentKind::PurchaseOrder, &po.header.id, &actor).await?;
/// engine.approve(DocumentKind::PurchaseOrder, &po.header.id, &manager).await?;
/// engine.receive_purchase_order(&po.header.id, &manager).await?;
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    pool: SqlitePool,
}

impl WorkflowEngine {
    pub fn new(pool: SqlitePool) -> Self {
        WorkflowEngine { pool }
    }

    /// Header of any document.
    pub async fn header(&self, kind: DocumentKind, id: &str) -> ServiceResult<DocumentHeader> {
        let mut conn = self.pool.acquire().await?;
        fetch_header(&mut conn, kind, id).await
    }

    /// Headers of a store's documents of one kind, newest first.
    pub async fn list_headers(
        &self,
        kind: DocumentKind,
        store_id: &str,
        status: Option<DocumentStatus>,
    ) -> ServiceResult<Vec<DocumentHeader>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY date DESC, number DESC",
            header_columns(kind),
            kind.table()
        );
        let headers = sqlx::query_as::<_, DocumentHeader>(&sql)
            .bind(store_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(headers)
    }

    /// `draft → submitted`.
    ///
    /// A stock opname is refused with `Validation` while any line with a
    /// non-zero variance lacks a reason.
    pub async fn submit(
        &self,
        kind: DocumentKind,
        id: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        self.run(kind, id, WorkflowAction::Submit, actor, None).await
    }

    /// `submitted → approved`. Does not touch stock.
    pub async fn approve(
        &self,
        kind: DocumentKind,
        id: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        self.run(kind, id, WorkflowAction::Approve, actor, None).await
    }

    /// `submitted → rejected`, with a required reason.
    pub async fn reject(
        &self,
        kind: DocumentKind,
        id: &str,
        reason: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        let reason = validate_reason("rejection reason", reason)
            .map_err(ServiceError::from)
            .inspect_err(|err| warn_failed(kind, id, actor, "reject", err))?;
        self.run(kind, id, WorkflowAction::Reject, actor, Some(reason))
            .await
    }

    /// `rejected → draft`, purchase orders and unpackings only.
    pub async fn reopen(
        &self,
        kind: DocumentKind,
        id: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        self.run(kind, id, WorkflowAction::Reopen, actor, None).await
    }

    /// `approved → terminal`, running the kind's ledger effect.
    pub async fn complete(
        &self,
        kind: DocumentKind,
        id: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        self.run(kind, id, WorkflowAction::Complete, actor, None).await
    }

    /// Receives an approved purchase order into stock.
    pub async fn receive_purchase_order(
        &self,
        id: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        self.complete(DocumentKind::PurchaseOrder, id, actor).await
    }

    /// Applies an approved stock adjustment.
    pub async fn apply_adjustment(&self, id: &str, actor: &Actor) -> ServiceResult<DocumentHeader> {
        self.complete(DocumentKind::StockAdjustment, id, actor).await
    }

    /// Finalizes an approved stock opname.
    pub async fn finalize_opname(&self, id: &str, actor: &Actor) -> ServiceResult<DocumentHeader> {
        self.complete(DocumentKind::StockOpname, id, actor).await
    }

    /// Processes an approved unpacking.
    pub async fn process_unpacking(
        &self,
        id: &str,
        actor: &Actor,
    ) -> ServiceResult<DocumentHeader> {
        self.complete(DocumentKind::Unpacking, id, actor).await
    }

    /// Deletes a draft with its lines.
    pub async fn delete(&self, kind: DocumentKind, id: &str, actor: &Actor) -> ServiceResult<()> {
        let result = async {
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let sql = format!(
                "DELETE FROM {} WHERE id = ?1 AND status = 'draft'",
                kind.table()
            );
            let deleted = sqlx::query(&sql).bind(id).execute(uow.conn()).await?;
            if deleted.rows_affected() == 0 {
                return Err(refusal(uow.conn(), kind, id, WorkflowAction::Delete).await);
            }
            uow.commit().await?;
            Ok::<_, ServiceError>(())
        }
        .await;

        match &result {
            Ok(()) => info!(document = %kind, id, actor = %actor, "Draft deleted"),
            Err(err) => warn_failed(kind, id, actor, "delete", err),
        }
        result
    }

    async fn run(
        &self,
        kind: DocumentKind,
        id: &str,
        action: WorkflowAction,
        actor: &Actor,
        reason: Option<String>,
    ) -> ServiceResult<DocumentHeader> {
        let result = async {
            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let transition =
                guarded_transition(&mut uow, kind, id, action, actor, reason.as_deref()).await?;

            match action {
                WorkflowAction::Submit if kind == DocumentKind::StockOpname => {
                    opname::check_submittable(&mut uow, id).await?;
                }
                WorkflowAction::Complete => {
                    terminal_effect(&mut uow, kind, id, actor).await?;
                }
                _ => {}
            }

            let header = fetch_header(uow.conn(), kind, id).await?;
            uow.commit().await?;
            Ok::<_, ServiceError>((transition, header))
        }
        .await;

        let verb = action.verb(kind);
        match result {
            Ok((transition, header)) => {
                info!(
                    document = %kind,
                    id,
                    number = %header.number,
                    actor = %actor,
                    action = verb,
                    from = %transition.from,
                    to = %transition.to,
                    "Workflow transition"
                );
                Ok(header)
            }
            Err(err) => {
                warn_failed(kind, id, actor, verb, &err);
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Lookups shared by the per-kind modules (run before a unit of work)
    // -------------------------------------------------------------------------

    async fn store(&self, store_id: &str) -> ServiceResult<Store> {
        StoreRepository::new(self.pool.clone()).require(store_id).await
    }

    async fn require_products<'a>(
        &self,
        store: &Store,
        product_ids: impl IntoIterator<Item = &'a str>,
    ) -> ServiceResult<()> {
        let products = ProductRepository::new(self.pool.clone());
        for id in product_ids {
            products.require_active(&store.tenant_id, id).await?;
        }
        Ok(())
    }
}

/// The terminal effect of `kind`, inside the completing unit of work.
async fn terminal_effect(
    uow: &mut UnitOfWork,
    kind: DocumentKind,
    id: &str,
    actor: &Actor,
) -> ServiceResult<()> {
    let header = fetch_header(uow.conn(), kind, id).await?;
    match kind {
        DocumentKind::PurchaseOrder => purchase_order::receive(uow, &header, actor).await,
        DocumentKind::StockAdjustment => adjustment::apply(uow, &header, actor).await,
        DocumentKind::StockOpname => opname::finalize(uow, &header, actor).await,
        DocumentKind::Unpacking => unpacking::process(uow, &header, actor).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{fixture, manager, receive, today};
    use stockroom_core::documents::{
        AdjustmentType, PurchaseOrderDraft, PurchaseOrderLine, StockAdjustmentDraft,
        StockOpnameDraft, StockOpnameLine, UnpackingDraft,
    };
    use stockroom_core::{Money, MovementReference, MovementType, Quantity};

    const RICE: usize = 0;
    const OIL: usize = 1;
    const CASE: usize = 2;
    const PCS: usize = 3;

    #[test]
    fn test_header_columns_alias_terminal_stamp() {
        let cols = header_columns(DocumentKind::StockOpname);
        assert!(cols.contains("finalized_by AS completed_by"));
        assert!(cols.contains("finalized_at AS completed_at"));
    }

    #[tokio::test]
    async fn test_purchase_order_lifecycle() {
        let fx = fixture().await;
        let actor = manager();
        let engine = fx.db.workflow();

        let po = engine
            .create_purchase_order(
                &fx.store.id,
                PurchaseOrderDraft {
                    date: today(),
                    supplier_name: Some("CV Beras Jaya".into()),
                    notes: None,
                    items: vec![
                        PurchaseOrderLine {
                            product_id: fx.product(RICE).into(),
                            quantity: Quantity::from_units(10),
                            unit_price: Money::from_minor(60_000),
                        },
                        PurchaseOrderLine {
                            product_id: fx.product(OIL).into(),
                            quantity: Quantity::from_units(4),
                            unit_price: Money::from_minor(30_000),
                        },
                    ],
                },
                &actor,
            )
            .await
            .unwrap();
        assert_eq!(po.header.status, DocumentStatus::Draft);
        assert!(po.header.number.starts_with("PO-"));
        assert!(po.header.number.ends_with("-001"));
        assert_eq!(po.total, Money::from_minor(720_000));

        // approving a draft is refused
        let err = engine
            .approve(DocumentKind::PurchaseOrder, &po.header.id, &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);

        engine.submit(DocumentKind::PurchaseOrder, &po.header.id, &actor).await.unwrap();
        let approved = engine
            .approve(DocumentKind::PurchaseOrder, &po.header.id, &actor)
            .await
            .unwrap();
        assert_eq!(approved.approved_by.as_deref(), Some("manager-1"));
        assert!(fx.on_hand(RICE).await.is_zero());

        let received = engine.receive_purchase_order(&po.header.id, &actor).await.unwrap();
        assert_eq!(received.status, DocumentStatus::Received);
        assert!(received.completed_at.is_some());
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(10));
        assert_eq!(fx.on_hand(OIL).await, Quantity::from_units(4));

        let movements = fx
            .db
            .ledger()
            .movements_for(&MovementReference::new(DocumentKind::PurchaseOrder, &po.header.id))
            .await
            .unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.movement_type == MovementType::In));

        // a second receive must not double the stock
        let again = engine.receive_purchase_order(&po.header.id, &actor).await.unwrap_err();
        assert_eq!(again.code(), ErrorCode::InvalidState);
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(10));
    }

    #[tokio::test]
    async fn test_reject_then_reopen_and_edit() {
        let fx = fixture().await;
        let actor = manager();
        let engine = fx.db.workflow();
        let draft = |units| PurchaseOrderDraft {
            date: today(),
            supplier_name: None,
            notes: None,
            items: vec![PurchaseOrderLine {
                product_id: fx.product(RICE).into(),
                quantity: Quantity::from_units(units),
                unit_price: Money::from_minor(60_000),
            }],
        };

        let po = engine.create_purchase_order(&fx.store.id, draft(5), &actor).await.unwrap();
        engine.submit(DocumentKind::PurchaseOrder, &po.header.id, &actor).await.unwrap();

        let blank = engine
            .reject(DocumentKind::PurchaseOrder, &po.header.id, "  ", &actor)
            .await
            .unwrap_err();
        assert_eq!(blank.code(), ErrorCode::ValidationError);

        let rejected = engine
            .reject(DocumentKind::PurchaseOrder, &po.header.id, "price too high", &actor)
            .await
            .unwrap();
        assert_eq!(rejected.status, DocumentStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("price too high"));

        // only drafts are editable
        let locked = engine
            .update_purchase_order(&po.header.id, draft(6), &actor)
            .await
            .unwrap_err();
        assert_eq!(locked.code(), ErrorCode::InvalidState);

        let reopened = engine
            .reopen(DocumentKind::PurchaseOrder, &po.header.id, &actor)
            .await
            .unwrap();
        assert_eq!(reopened.status, DocumentStatus::Draft);

        let edited = engine.update_purchase_order(&po.header.id, draft(6), &actor).await.unwrap();
        assert_eq!(edited.items.len(), 1);
        assert_eq!(edited.items[0].quantity, Quantity::from_units(6));
        assert_eq!(edited.header.number, po.header.number);
    }

    #[tokio::test]
    async fn test_delete_only_drafts() {
        let fx = fixture().await;
        let actor = manager();
        let engine = fx.db.workflow();
        let draft = StockAdjustmentDraft {
            date: today(),
            product_id: fx.product(RICE).into(),
            quantity: Quantity::from_units(1),
            adjustment_type: AdjustmentType::Add,
            reason: "found in back room".into(),
            notes: None,
        };

        let kept = engine.create_adjustment(&fx.store.id, draft.clone(), &actor).await.unwrap();
        engine.submit(DocumentKind::StockAdjustment, &kept.header.id, &actor).await.unwrap();
        let err = engine
            .delete(DocumentKind::StockAdjustment, &kept.header.id, &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);

        let dropped = engine.create_adjustment(&fx.store.id, draft, &actor).await.unwrap();
        engine
            .delete(DocumentKind::StockAdjustment, &dropped.header.id, &actor)
            .await
            .unwrap();
        let gone = engine.adjustment(&dropped.header.id).await.unwrap_err();
        assert_eq!(gone.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_adjustment_reduce_beyond_stock_stays_approved() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 3)]).await;
        let actor = manager();
        let engine = fx.db.workflow();

        let sa = engine
            .create_adjustment(
                &fx.store.id,
                StockAdjustmentDraft {
                    date: today(),
                    product_id: fx.product(RICE).into(),
                    quantity: Quantity::from_units(5),
                    adjustment_type: AdjustmentType::Reduce,
                    reason: "water damage".into(),
                    notes: None,
                },
                &actor,
            )
            .await
            .unwrap();
        assert!(sa.header.number.starts_with("SA-"));
        engine.submit(DocumentKind::StockAdjustment, &sa.header.id, &actor).await.unwrap();
        engine.approve(DocumentKind::StockAdjustment, &sa.header.id, &actor).await.unwrap();

        let err = engine.apply_adjustment(&sa.header.id, &actor).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        let after = engine.adjustment(&sa.header.id).await.unwrap();
        assert_eq!(after.header.status, DocumentStatus::Approved);
        assert!(after.header.completed_by.is_none());
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(3));
    }

    #[tokio::test]
    async fn test_adjustment_add_applies_once() {
        let fx = fixture().await;
        let actor = manager();
        let engine = fx.db.workflow();

        let sa = engine
            .create_adjustment(
                &fx.store.id,
                StockAdjustmentDraft {
                    date: today(),
                    product_id: fx.product(OIL).into(),
                    quantity: Quantity::from_units(2),
                    adjustment_type: AdjustmentType::Add,
                    reason: "found during cleanup".into(),
                    notes: None,
                },
                &actor,
            )
            .await
            .unwrap();
        engine.submit(DocumentKind::StockAdjustment, &sa.header.id, &actor).await.unwrap();
        engine.approve(DocumentKind::StockAdjustment, &sa.header.id, &actor).await.unwrap();
        let applied = engine.apply_adjustment(&sa.header.id, &actor).await.unwrap();
        assert_eq!(applied.status, DocumentStatus::Applied);
        assert_eq!(fx.on_hand(OIL).await, Quantity::from_units(2));

        assert!(engine.apply_adjustment(&sa.header.id, &actor).await.is_err());
        assert_eq!(fx.on_hand(OIL).await, Quantity::from_units(2));

        let movements = fx.db.ledger().movements(fx.product(OIL), &fx.store.id, 10).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Adjustment);
        assert_eq!(movements[0].note.as_deref(), Some("found during cleanup"));
    }

    #[tokio::test]
    async fn test_opname_requires_reasons_and_sets_absolute() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 50), (OIL, 20)]).await;
        let actor = manager();
        let engine = fx.db.workflow();
        let counted = |reason: Option<&str>| StockOpnameDraft {
            date: today(),
            notes: None,
            items: vec![
                StockOpnameLine {
                    product_id: fx.product(RICE).into(),
                    physical_quantity: Quantity::from_units(47),
                    variance_reason: reason.map(String::from),
                },
                StockOpnameLine {
                    product_id: fx.product(OIL).into(),
                    physical_quantity: Quantity::from_units(20),
                    variance_reason: None,
                },
            ],
        };

        let so = engine.create_opname(&fx.store.id, counted(None), &actor).await.unwrap();
        assert!(so.header.number.starts_with("SO-"));
        assert_eq!(so.items[0].system_quantity, Quantity::from_units(50));
        assert_eq!(so.items[0].variance, Quantity::from_units(-3));
        assert!(so.items[1].variance.is_zero());

        let err = engine
            .submit(DocumentKind::StockOpname, &so.header.id, &actor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        let still_draft = engine.opname(&so.header.id).await.unwrap();
        assert_eq!(still_draft.header.status, DocumentStatus::Draft);

        engine
            .update_opname(&so.header.id, counted(Some("3 bags torn")), &actor)
            .await
            .unwrap();
        engine.submit(DocumentKind::StockOpname, &so.header.id, &actor).await.unwrap();
        engine.approve(DocumentKind::StockOpname, &so.header.id, &actor).await.unwrap();

        // stock moved after the count; finalize still lands on the physical count
        receive(&fx, &[(RICE, 5)]).await;
        let finalized = engine.finalize_opname(&so.header.id, &actor).await.unwrap();
        assert_eq!(finalized.status, DocumentStatus::Finalized);
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(47));
        assert_eq!(fx.on_hand(OIL).await, Quantity::from_units(20));

        let stock = fx.db.ledger().stock(fx.product(RICE), &fx.store.id).await.unwrap().unwrap();
        assert!(stock.last_stock_opname_date.is_some());
        let balance = fx.db.ledger().verify_balance(fx.product(RICE), &fx.store.id).await.unwrap();
        assert!(balance.is_consistent());

        let movements = fx
            .db
            .ledger()
            .movements_for(&MovementReference::new(DocumentKind::StockOpname, &so.header.id))
            .await
            .unwrap();
        // counted lines without variance still leave a zero movement
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].quantity, Quantity::from_units(-8));
        assert_eq!(movements[0].note.as_deref(), Some("3 bags torn"));
        assert!(movements[1].quantity.is_zero());
        assert_eq!(movements[1].note.as_deref(), Some(so.header.number.as_str()));
    }

    #[tokio::test]
    async fn test_unpacking_moves_both_products() {
        let fx = fixture().await;
        receive(&fx, &[(CASE, 2)]).await;
        let actor = manager();
        let engine = fx.db.workflow();

        let up = engine
            .create_unpacking(
                &fx.store.id,
                UnpackingDraft {
                    date: today(),
                    source_product_id: fx.product(CASE).into(),
                    source_quantity: Quantity::from_units(1),
                    result_product_id: fx.product(PCS).into(),
                    result_quantity: Quantity::from_units(40),
                    notes: None,
                },
                &actor,
            )
            .await
            .unwrap();
        assert!(up.header.number.starts_with("UP-"));
        assert_eq!(up.conversion_ratio, Quantity::from_units(40));

        engine.submit(DocumentKind::Unpacking, &up.header.id, &actor).await.unwrap();
        engine.approve(DocumentKind::Unpacking, &up.header.id, &actor).await.unwrap();
        let done = engine.process_unpacking(&up.header.id, &actor).await.unwrap();
        assert_eq!(done.status, DocumentStatus::Processed);

        assert_eq!(fx.on_hand(CASE).await, Quantity::from_units(1));
        assert_eq!(fx.on_hand(PCS).await, Quantity::from_units(40));

        let movements = fx
            .db
            .ledger()
            .movements_for(&MovementReference::new(DocumentKind::Unpacking, &up.header.id))
            .await
            .unwrap();
        let types: Vec<MovementType> = movements.iter().map(|m| m.movement_type).collect();
        assert_eq!(types, vec![MovementType::UnpackingOut, MovementType::UnpackingIn]);
    }

    #[tokio::test]
    async fn test_unpacking_without_source_stock_changes_nothing() {
        let fx = fixture().await;
        let actor = manager();
        let engine = fx.db.workflow();

        let up = engine
            .create_unpacking(
                &fx.store.id,
                UnpackingDraft {
                    date: today(),
                    source_product_id: fx.product(CASE).into(),
                    source_quantity: Quantity::from_units(1),
                    result_product_id: fx.product(PCS).into(),
                    result_quantity: Quantity::from_units(40),
                    notes: None,
                },
                &actor,
            )
            .await
            .unwrap();
        engine.submit(DocumentKind::Unpacking, &up.header.id, &actor).await.unwrap();
        engine.approve(DocumentKind::Unpacking, &up.header.id, &actor).await.unwrap();

        let err = engine.process_unpacking(&up.header.id, &actor).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert!(fx.on_hand(PCS).await.is_zero());
        assert_eq!(
            engine.unpacking(&up.header.id).await.unwrap().header.status,
            DocumentStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_unknown_document_not_found() {
        let fx = fixture().await;
        let err = fx
            .db
            .workflow()
            .submit(DocumentKind::PurchaseOrder, "missing", &manager())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_list_headers_by_status() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 1)]).await;
        let engine = fx.db.workflow();

        let received = engine
            .list_headers(DocumentKind::PurchaseOrder, &fx.store.id, Some(DocumentStatus::Received))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        let drafts = engine
            .list_headers(DocumentKind::PurchaseOrder, &fx.store.id, Some(DocumentStatus::Draft))
            .await
            .unwrap();
        assert!(drafts.is_empty());
    }
}
