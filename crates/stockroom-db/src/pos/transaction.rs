//! Completed sales and their voids.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use stockroom_core::numbering::SequenceKind;
use stockroom_core::pos::{
    price_cart, NewTransaction, PricingBreakdown, PricingConfig, Transaction, TransactionItem,
    TransactionPayment, TransactionStatus,
};
use stockroom_core::session::SessionStatus;
use stockroom_core::validation::{normalize_note, validate_reason};
use stockroom_core::{Actor, CoreError, MovementType, Store, ValidationError};

use super::{warn_failed, PosEngine};
use crate::error::{DbResult, ServiceError, ServiceResult};
use crate::ledger::{self, MovementEntry};
use crate::repository::product::ProductRepository;
use crate::repository::store::StoreRepository;
use crate::sequencer;
use crate::uow::UnitOfWork;

const TRANSACTION_COLUMNS: &str = "id, tenant_id, store_id, transaction_number, cashier_id, \
     store_session_id, status, subtotal, discount, tax, rounding_adjustment, total, paid, change, \
     payment_method, notes, voided_by, voided_at, void_reason, created_at, updated_at";

async fn fetch(conn: &mut SqliteConnection, id: &str) -> ServiceResult<Transaction> {
    let sql = format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS);
    let mut transaction = sqlx::query_as::<_, Transaction>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found("transaction", id))?;

    transaction.items = load_items(&mut *conn, id).await?;
    transaction.payments = sqlx::query_as::<_, TransactionPayment>(
        r#"
        SELECT id, transaction_id, method, amount, tendered, reference, created_at
        FROM transaction_payments
        WHERE transaction_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(transaction)
}

async fn load_items(conn: &mut SqliteConnection, id: &str) -> DbResult<Vec<TransactionItem>> {
    let items = sqlx::query_as::<_, TransactionItem>(
        r#"
        SELECT id, transaction_id, product_id, quantity, unit_price, discount, subtotal
        FROM transaction_items
        WHERE transaction_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Refuses a sale into a session that is missing, foreign or no longer open.
///
/// Runs inside the unit of work so a concurrent close cannot slip between
/// the check and the insert.
async fn check_session(
    uow: &mut UnitOfWork,
    session_id: &str,
    store: &Store,
    cashier: &Actor,
) -> ServiceResult<()> {
    let row: Option<(String, String, SessionStatus)> = sqlx::query_as(
        "SELECT store_id, cashier_id, status FROM store_sessions WHERE id = ?1",
    )
    .bind(session_id)
    .fetch_optional(uow.conn())
    .await?;

    let Some((store_id, cashier_id, status)) = row else {
        return Err(CoreError::not_found("store session", session_id).into());
    };
    if store_id != store.id {
        return Err(ValidationError::rule("session belongs to another store").into());
    }
    if cashier_id != cashier.id() {
        return Err(ValidationError::rule("session belongs to another cashier").into());
    }
    if status != SessionStatus::Open {
        return Err(CoreError::invalid_transition(
            "store session",
            session_id,
            status.as_str(),
            "sell in",
        )
        .into());
    }
    Ok(())
}

async fn insert_transaction(
    uow: &mut UnitOfWork,
    transaction: &Transaction,
    pricing: &PricingBreakdown,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, tenant_id, store_id, transaction_number, cashier_id, store_session_id,
            status, subtotal, discount, tax, rounding_adjustment, total, paid, change,
            payment_method, notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
        "#,
    )
    .bind(&transaction.id)
    .bind(&transaction.tenant_id)
    .bind(&transaction.store_id)
    .bind(&transaction.transaction_number)
    .bind(&transaction.cashier_id)
    .bind(&transaction.store_session_id)
    .bind(transaction.status)
    .bind(transaction.subtotal)
    .bind(transaction.discount)
    .bind(transaction.tax)
    .bind(transaction.rounding_adjustment)
    .bind(transaction.total)
    .bind(transaction.paid)
    .bind(transaction.change)
    .bind(transaction.payment_method)
    .bind(&transaction.notes)
    .bind(transaction.created_at)
    .execute(uow.conn())
    .await?;

    for (line_no, line) in pricing.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO transaction_items (
                id, transaction_id, product_id, quantity, unit_price, discount, subtotal, line_no
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&transaction.id)
        .bind(&line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.discount)
        .bind(line.subtotal)
        .bind(line_no as i64)
        .execute(uow.conn())
        .await?;
    }

    for (line_no, payment) in pricing.payments.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO transaction_payments (
                id, transaction_id, method, amount, tendered, reference, line_no, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&transaction.id)
        .bind(payment.method)
        .bind(payment.amount)
        .bind(payment.tendered)
        .bind(&payment.reference)
        .bind(line_no as i64)
        .bind(transaction.created_at)
        .execute(uow.conn())
        .await?;
    }
    Ok(())
}

impl PosEngine {
    /// Records a completed sale and takes its items out of stock.
    ///
    /// ## Errors
    /// - `Validation` for an empty cart, bad amounts or short payment
    /// - `NotFound` for an unknown store, session or product
    /// - `InsufficientStock` naming the first product that cannot be covered;
    ///   nothing is written
    pub async fn create_transaction(
        &self,
        cart: NewTransaction,
        cashier: &Actor,
    ) -> ServiceResult<Transaction> {
        let store_id = cart.store_id.clone();
        let result = self.sell(cart, cashier).await;
        result.inspect_err(|err| warn_failed(&store_id, cashier, "create", err))
    }

    async fn sell(&self, cart: NewTransaction, cashier: &Actor) -> ServiceResult<Transaction> {
        cart.validate()?;
        let notes = normalize_note("notes", cart.notes.as_deref())?;
        let store = StoreRepository::new(self.pool.clone())
            .require(&cart.store_id)
            .await?;

        let products = ProductRepository::new(self.pool.clone());
        for (product_id, requested) in cart.requested_quantities() {
            products.require_active(&store.tenant_id, &product_id).await?;
            let available = products.available_stock(&product_id, &store.id).await?;
            if available < requested {
                return Err(CoreError::InsufficientStock {
                    product_id,
                    available,
                    requested,
                }
                .into());
            }
        }

        let pricing = price_cart(
            &cart,
            PricingConfig {
                tax_rate: store.tax_rate(),
                tax_mode: store.tax_mode,
                rounding: store.rounding(),
            },
        )?;

        let now = Utc::now();
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let date = store.business_date(now);
        let number =
            sequencer::next_number(&mut uow, SequenceKind::Transaction, &store, date).await?;
        if let Some(session_id) = &cart.session_id {
            check_session(&mut uow, session_id, &store, cashier).await?;
        }

        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            tenant_id: store.tenant_id.clone(),
            store_id: store.id.clone(),
            transaction_number: number,
            cashier_id: cashier.id().to_string(),
            store_session_id: cart.session_id.clone(),
            status: TransactionStatus::Completed,
            subtotal: pricing.subtotal,
            discount: pricing.discount,
            tax: pricing.tax,
            rounding_adjustment: pricing.rounding_adjustment,
            total: pricing.total,
            paid: pricing.paid,
            change: pricing.change,
            payment_method: pricing.payment_method,
            notes,
            voided_by: None,
            voided_at: None,
            void_reason: None,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
            payments: Vec::new(),
        };
        insert_transaction(&mut uow, &transaction, &pricing).await?;

        for line in &pricing.lines {
            let entry = MovementEntry {
                product_id: &line.product_id,
                store_id: &store.id,
                movement_type: MovementType::Out,
                reference: None,
                note: Some(&transaction.transaction_number),
            };
            ledger::apply_movement(&mut uow, entry, -line.quantity, cashier).await?;
        }
        uow.commit().await?;

        info!(
            id = %transaction.id,
            number = %transaction.transaction_number,
            store_id = %store.id,
            cashier = %cashier,
            total = %transaction.total,
            items = pricing.lines.len(),
            "Transaction completed"
        );
        self.transaction(&transaction.id).await
    }

    /// Voids a completed sale, returning every item to stock.
    ///
    /// Each item is booked back as an `OUT` movement with a positive
    /// quantity. A second void fails with `InvalidStateTransition`.
    pub async fn void_transaction(
        &self,
        id: &str,
        reason: &str,
        actor: &Actor,
    ) -> ServiceResult<Transaction> {
        let result = async {
            let reason = validate_reason("void reason", reason)?;
            let now = Utc::now();

            let mut uow = UnitOfWork::begin(&self.pool).await?;
            let voided = sqlx::query(
                r#"
                UPDATE transactions
                SET status = ?1, voided_by = ?2, voided_at = ?3, void_reason = ?4, updated_at = ?3
                WHERE id = ?5 AND status = ?6
                "#,
            )
            .bind(TransactionStatus::Voided)
            .bind(actor.id())
            .bind(now)
            .bind(&reason)
            .bind(id)
            .bind(TransactionStatus::Completed)
            .execute(uow.conn())
            .await?;

            if voided.rows_affected() == 0 {
                let status: Option<TransactionStatus> =
                    sqlx::query_scalar("SELECT status FROM transactions WHERE id = ?1")
                        .bind(id)
                        .fetch_optional(uow.conn())
                        .await?;
                return Err(match status {
                    None => ServiceError::not_found("transaction", id),
                    Some(TransactionStatus::Completed) => ServiceError::conflict(format!(
                        "transaction {} was modified concurrently",
                        id
                    )),
                    Some(current) => {
                        CoreError::invalid_transition("transaction", id, current.as_str(), "void")
                            .into()
                    }
                });
            }

            let (store_id, number): (String, String) = sqlx::query_as(
                "SELECT store_id, transaction_number FROM transactions WHERE id = ?1",
            )
            .bind(id)
            .fetch_one(uow.conn())
            .await?;
            let items = load_items(uow.conn(), id).await?;
            for item in &items {
                let entry = MovementEntry {
                    product_id: &item.product_id,
                    store_id: &store_id,
                    movement_type: MovementType::Out,
                    reference: None,
                    note: Some(&number),
                };
                ledger::apply_movement(&mut uow, entry, item.quantity, actor).await?;
            }
            uow.commit().await?;

            info!(id, number = %number, actor = %actor, items = items.len(), "Transaction voided");
            self.transaction(id).await
        }
        .await;

        result.inspect_err(|err| warn_failed(id, actor, "void", err))
    }

    /// A transaction with its items and payments.
    pub async fn transaction(&self, id: &str) -> ServiceResult<Transaction> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Sales of a session, oldest first.
    pub async fn session_transactions(&self, session_id: &str) -> ServiceResult<Vec<Transaction>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM transactions WHERE store_session_id = ?1 ORDER BY created_at, transaction_number",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut transactions = Vec::with_capacity(ids.len());
        for id in &ids {
            transactions.push(fetch(&mut conn, id).await?);
        }
        debug!(session_id, count = transactions.len(), "Loaded session transactions");
        Ok(transactions)
    }
}
