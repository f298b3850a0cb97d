//! # Stock Ledger
//!
//! The only code that writes `stocks` and `stock_movements`.
//!
//! ## Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stocks.quantity(product, store) == Σ stock_movements.quantity         │
//! │  stocks.quantity >= 0                                                  │
//! │                                                                         │
//! │  apply_movement(product, store, ±qty, type, reference, actor, note)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT stocks row if missing (quantity 0)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE stocks SET quantity = quantity + ?                             │
//! │   WHERE ... AND quantity + ? >= 0  RETURNING quantity                  │
//! │       │                                                                 │
//! │       ├── no row ──► InsufficientStock (nothing written)               │
//! │       ▼                                                                 │
//! │  INSERT stock_movements (same unit of work)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The writers are crate-private and demand a [`UnitOfWork`], so the stock
//! row and its movement commit together or not at all. The public
//! [`StockLedger`] only reads, except for the advisory thresholds.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use stockroom_core::{
    Actor, CoreError, DocumentKind, LedgerBalance, MovementReference, MovementType, Quantity,
    StockLevel, StockMovement, ValidationError,
};

use crate::error::{DbError, DbResult, ServiceResult};
use crate::uow::UnitOfWork;

const STOCK_COLUMNS: &str = "id, product_id, store_id, quantity, min_stock, max_stock, \
     last_stock_opname_date, created_at, updated_at";

// =============================================================================
// Writers (crate-private)
// =============================================================================

/// What a movement is about, minus its quantity.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MovementEntry<'a> {
    pub product_id: &'a str,
    pub store_id: &'a str,
    pub movement_type: MovementType,
    pub reference: Option<&'a MovementReference>,
    pub note: Option<&'a str>,
}

/// Returns the stock row for `(product, store)`, creating it at zero.
pub(crate) async fn get_or_create_stock(
    uow: &mut UnitOfWork,
    product_id: &str,
    store_id: &str,
) -> DbResult<StockLevel> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO stocks (id, product_id, store_id, quantity, min_stock, created_at, updated_at)
        VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)
        ON CONFLICT (product_id, store_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(store_id)
    .bind(now)
    .execute(uow.conn())
    .await?;

    fetch_stock(uow.conn(), product_id, store_id)
        .await?
        .ok_or_else(|| DbError::not_found("Stock", format!("{}@{}", product_id, store_id)))
}

/// Changes on-hand quantity by `quantity` and records the movement.
///
/// ## Errors
/// - `Validation` when `quantity` is zero
/// - `InsufficientStock` when a decrease would go below zero; nothing is
///   written and the caller's unit of work should be dropped
pub(crate) async fn apply_movement(
    uow: &mut UnitOfWork,
    entry: MovementEntry<'_>,
    quantity: Quantity,
    actor: &Actor,
) -> ServiceResult<StockMovement> {
    if quantity.is_zero() {
        return Err(ValidationError::rule("movement quantity must not be zero").into());
    }

    get_or_create_stock(uow, entry.product_id, entry.store_id).await?;

    let now = Utc::now();
    let updated: Option<Quantity> = sqlx::query_scalar(
        r#"
        UPDATE stocks
        SET quantity = quantity + ?1, updated_at = ?2
        WHERE product_id = ?3 AND store_id = ?4 AND quantity + ?1 >= 0
        RETURNING quantity
        "#,
    )
    .bind(quantity)
    .bind(now)
    .bind(entry.product_id)
    .bind(entry.store_id)
    .fetch_optional(uow.conn())
    .await?;

    let Some(balance) = updated else {
        let available = read_quantity(uow.conn(), entry.product_id, entry.store_id).await?;
        debug!(
            product_id = entry.product_id,
            store_id = entry.store_id,
            %available,
            requested = %quantity.abs(),
            "Movement refused: insufficient stock"
        );
        return Err(CoreError::InsufficientStock {
            product_id: entry.product_id.to_string(),
            available,
            requested: quantity.abs(),
        }
        .into());
    };

    let movement = insert_movement(uow, entry, quantity, actor).await?;
    debug!(
        product_id = entry.product_id,
        store_id = entry.store_id,
        movement_type = %entry.movement_type,
        %quantity,
        %balance,
        "Stock movement applied"
    );
    Ok(movement)
}

/// Sets on-hand quantity to a physical count, recording the difference.
///
/// The movement carries `physical - current` (possibly zero) so the
/// conservation invariant keeps holding. Also stamps
/// `last_stock_opname_date`.
pub(crate) async fn set_absolute(
    uow: &mut UnitOfWork,
    entry: MovementEntry<'_>,
    physical: Quantity,
    actor: &Actor,
) -> ServiceResult<StockMovement> {
    if physical.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "physical quantity".to_string(),
        }
        .into());
    }

    let stock = get_or_create_stock(uow, entry.product_id, entry.store_id).await?;
    let delta = physical - stock.quantity;
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE stocks
        SET quantity = ?1, last_stock_opname_date = ?2, updated_at = ?2
        WHERE id = ?3
        "#,
    )
    .bind(physical)
    .bind(now)
    .bind(&stock.id)
    .execute(uow.conn())
    .await?;

    let movement = insert_movement(uow, entry, delta, actor).await?;
    debug!(
        product_id = entry.product_id,
        store_id = entry.store_id,
        previous = %stock.quantity,
        %physical,
        %delta,
        "Stock set to physical count"
    );
    Ok(movement)
}

async fn insert_movement(
    uow: &mut UnitOfWork,
    entry: MovementEntry<'_>,
    quantity: Quantity,
    actor: &Actor,
) -> DbResult<StockMovement> {
    let movement = StockMovement {
        id: Uuid::new_v4().to_string(),
        product_id: entry.product_id.to_string(),
        store_id: entry.store_id.to_string(),
        movement_type: entry.movement_type,
        quantity,
        reference: entry.reference.cloned(),
        note: entry.note.map(str::to_string),
        created_by: actor.id().to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, store_id, movement_type, quantity,
            reference_type, reference_id, note, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(&movement.store_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.reference.as_ref().map(|r| r.kind))
    .bind(movement.reference.as_ref().map(|r| r.id.as_str()))
    .bind(&movement.note)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(uow.conn())
    .await?;

    Ok(movement)
}

// =============================================================================
// Shared reads
// =============================================================================

async fn fetch_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    store_id: &str,
) -> DbResult<Option<StockLevel>> {
    let sql = format!(
        "SELECT {} FROM stocks WHERE product_id = ?1 AND store_id = ?2",
        STOCK_COLUMNS
    );
    let stock = sqlx::query_as::<_, StockLevel>(&sql)
        .bind(product_id)
        .bind(store_id)
        .fetch_optional(conn)
        .await?;
    Ok(stock)
}

/// On-hand quantity, zero when no stock row exists yet.
pub(crate) async fn read_quantity(
    conn: &mut SqliteConnection,
    product_id: &str,
    store_id: &str,
) -> DbResult<Quantity> {
    let quantity: Option<Quantity> =
        sqlx::query_scalar("SELECT quantity FROM stocks WHERE product_id = ?1 AND store_id = ?2")
            .bind(product_id)
            .bind(store_id)
            .fetch_optional(conn)
            .await?;
    Ok(quantity.unwrap_or_default())
}

/// Movement row as stored; the reference is split over two columns.
#[derive(sqlx::FromRow)]
struct MovementRow {
    id: String,
    product_id: String,
    store_id: String,
    movement_type: MovementType,
    quantity: Quantity,
    reference_type: Option<DocumentKind>,
    reference_id: Option<String>,
    note: Option<String>,
    created_by: String,
    created_at: chrono::DateTime<Utc>,
}

impl From<MovementRow> for StockMovement {
    fn from(row: MovementRow) -> Self {
        let reference = match (row.reference_type, row.reference_id) {
            (Some(kind), Some(id)) => Some(MovementReference::new(kind, id)),
            _ => None,
        };
        StockMovement {
            id: row.id,
            product_id: row.product_id,
            store_id: row.store_id,
            movement_type: row.movement_type,
            quantity: row.quantity,
            reference,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

const MOVEMENT_COLUMNS: &str = "id, product_id, store_id, movement_type, quantity, \
     reference_type, reference_id, note, created_by, created_at";

// =============================================================================
// Public ledger API
// =============================================================================

/// Read access to stock levels and history, plus advisory thresholds.
///
/// ## Usage
/// ```rust,ignore
/// let on_hand = db.ledger().available(&product_id, &store_id).await?;
/// let balance = db.ledger().verify_balance(&product_id, &store_id).await?;
/// assert!(balance.is_consistent());
/// ```
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    /// The stock row, if the product ever moved at this store.
    pub async fn stock(&self, product_id: &str, store_id: &str) -> DbResult<Option<StockLevel>> {
        let mut conn = self.pool.acquire().await?;
        fetch_stock(&mut conn, product_id, store_id).await
    }

    /// On-hand quantity (zero when no row exists).
    pub async fn available(&self, product_id: &str, store_id: &str) -> DbResult<Quantity> {
        let mut conn = self.pool.acquire().await?;
        read_quantity(&mut conn, product_id, store_id).await
    }

    /// Movement history, newest first.
    pub async fn movements(
        &self,
        product_id: &str,
        store_id: &str,
        limit: u32,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE product_id = ?1 AND store_id = ?2 \
             ORDER BY rowid DESC LIMIT ?3",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(product_id)
            .bind(store_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StockMovement::from).collect())
    }

    /// Movements caused by one workflow document, in write order.
    pub async fn movements_for(
        &self,
        reference: &MovementReference,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE reference_type = ?1 AND reference_id = ?2 \
             ORDER BY rowid",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(reference.kind)
            .bind(&reference.id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StockMovement::from).collect())
    }

    /// Stock quantity next to the sum of its movements.
    pub async fn verify_balance(
        &self,
        product_id: &str,
        store_id: &str,
    ) -> DbResult<LedgerBalance> {
        let stock_quantity = self.available(product_id, store_id).await?;
        let movement_sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0) FROM stock_movements
            WHERE product_id = ?1 AND store_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerBalance {
            stock_quantity,
            movement_sum: Quantity::from_milli(movement_sum),
        })
    }

    /// Stock rows of a store whose quantity is under `min_stock`.
    pub async fn below_minimum(&self, store_id: &str) -> DbResult<Vec<StockLevel>> {
        let sql = format!(
            "SELECT {} FROM stocks WHERE store_id = ?1 AND quantity < min_stock ORDER BY product_id",
            STOCK_COLUMNS
        );
        let rows = sqlx::query_as::<_, StockLevel>(&sql)
            .bind(store_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Sets the advisory minimum/maximum for a product at a store.
    ///
    /// Thresholds never block a movement.
    pub async fn set_thresholds(
        &self,
        product_id: &str,
        store_id: &str,
        min_stock: Quantity,
        max_stock: Option<Quantity>,
    ) -> ServiceResult<StockLevel> {
        if min_stock.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "min_stock".to_string(),
            }
            .into());
        }
        if max_stock.is_some_and(|max| max < min_stock) {
            return Err(ValidationError::rule("max_stock must not be below min_stock").into());
        }

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let stock = get_or_create_stock(&mut uow, product_id, store_id).await?;
        sqlx::query(
            "UPDATE stocks SET min_stock = ?1, max_stock = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(min_stock)
        .bind(max_stock)
        .bind(Utc::now())
        .bind(&stock.id)
        .execute(uow.conn())
        .await?;
        let updated = fetch_stock(uow.conn(), product_id, store_id)
            .await?
            .ok_or_else(|| DbError::not_found("Stock", &stock.id))?;
        uow.commit().await?;

        info!(product_id, store_id, min = %min_stock, "Stock thresholds updated");
        Ok(updated)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO stores (id, tenant_id, code, name, created_at) VALUES ('s1', 't1', 'S1', 'Store', ?1)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO products (id, tenant_id, sku, name, created_at, updated_at) VALUES ('p1', 't1', 'P1', 'Rice', ?1, ?1)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    fn entry(movement_type: MovementType) -> MovementEntry<'static> {
        MovementEntry {
            product_id: "p1",
            store_id: "s1",
            movement_type,
            reference: None,
            note: None,
        }
    }

    async fn move_stock(db: &Database, qty: i64) -> ServiceResult<StockMovement> {
        let actor = Actor::new("u1");
        let mut uow = UnitOfWork::begin(db.pool()).await.unwrap();
        let movement_type = if qty > 0 { MovementType::In } else { MovementType::Out };
        let quantity = Quantity::from_units(qty);
        let result = apply_movement(&mut uow, entry(movement_type), quantity, &actor).await;
        if result.is_ok() {
            uow.commit().await.unwrap();
        }
        result
    }

    #[tokio::test]
    async fn test_movements_keep_balance() {
        let db = setup().await;
        move_stock(&db, 20).await.unwrap();
        move_stock(&db, -5).await.unwrap();

        let ledger = db.ledger();
        assert_eq!(ledger.available("p1", "s1").await.unwrap(), Quantity::from_units(15));
        let balance = ledger.verify_balance("p1", "s1").await.unwrap();
        assert!(balance.is_consistent());

        let history = ledger.movements("p1", "s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].quantity, Quantity::from_units(-5));
        assert_eq!(history[0].created_by, "u1");
    }

    #[tokio::test]
    async fn test_decrease_below_zero_is_refused() {
        let db = setup().await;
        move_stock(&db, 2).await.unwrap();

        let err = move_stock(&db, -3).await.unwrap_err();
        match err {
            crate::error::ServiceError::Core(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, Quantity::from_units(2));
                assert_eq!(requested, Quantity::from_units(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(db.ledger().available("p1", "s1").await.unwrap(), Quantity::from_units(2));
        assert_eq!(db.ledger().movements("p1", "s1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_movement_rejected() {
        let db = setup().await;
        assert!(move_stock(&db, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_set_absolute_records_delta() {
        let db = setup().await;
        move_stock(&db, 10).await.unwrap();

        let actor = Actor::new("auditor");
        let mut uow = UnitOfWork::begin(db.pool()).await.unwrap();
        let physical = Quantity::from_units(7);
        let movement = set_absolute(&mut uow, entry(MovementType::Opname), physical, &actor)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert_eq!(movement.quantity, Quantity::from_units(-3));
        let stock = db.ledger().stock("p1", "s1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, Quantity::from_units(7));
        assert!(stock.last_stock_opname_date.is_some());
        assert!(db.ledger().verify_balance("p1", "s1").await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_thresholds() {
        let db = setup().await;
        let ledger = db.ledger();

        assert!(ledger
            .set_thresholds("p1", "s1", Quantity::from_units(5), Some(Quantity::from_units(2)))
            .await
            .is_err());

        let stock = ledger
            .set_thresholds("p1", "s1", Quantity::from_units(5), None)
            .await
            .unwrap();
        assert!(stock.is_below_min());
        assert_eq!(ledger.below_minimum("s1").await.unwrap().len(), 1);
    }
}
