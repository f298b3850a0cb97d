//! # POS Transaction Engine
//!
//! Sales, voids and held carts at the register.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_transaction(cart, cashier)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  store + products + on-hand check       (pool, before any write)       │
//! │  price_cart → subtotal, discount, tax, rounding, change                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UnitOfWork                                                            │
//! │    reserve TRX-{store}-{date}-{seq}      ◄── first write               │
//! │    session still open?                                                 │
//! │    INSERT transactions / items / payments                              │
//! │    ledger: -qty OUT per item             ◄── refuses oversell          │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A void flips `completed → voided` with a guarded UPDATE and books each
//! item back as a positive `OUT` movement. Held carts never touch stock.

mod hold;
mod transaction;

use sqlx::SqlitePool;
use tracing::warn;

use stockroom_core::Actor;

use crate::error::ServiceError;

/// Entry point for register operations.
///
/// ## Usage
/// ```rust,ignore
/// let pos = db.pos();
/// let sale = pos.create_transaction(cart, &cashier).await?;
/// pos.void_transaction(&sale.id, "customer returned goods", &supervisor).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PosEngine {
    pool: SqlitePool,
}

impl PosEngine {
    pub fn new(pool: SqlitePool) -> Self {
        PosEngine { pool }
    }
}

fn warn_failed(target: &str, actor: &Actor, action: &str, err: &ServiceError) {
    warn!(
        target_id = target,
        actor = %actor,
        action,
        error = %err,
        "POS action failed"
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stockroom_core::pos::{
        CartLine, HoldCart, NewTransaction, PaymentInput, PaymentMethod, TransactionStatus,
    };
    use stockroom_core::{Money, MovementType, Quantity};

    use crate::error::ErrorCode;
    use crate::pool::{Database, DbConfig};
    use crate::testing::{fixture, receive, seeded, Fixture};

    use super::*;

    const RICE: usize = 0;
    const OIL: usize = 1;

    fn cart(fx: &Fixture, lines: &[(usize, i64)], payments: Vec<PaymentInput>) -> NewTransaction {
        NewTransaction {
            store_id: fx.store.id.clone(),
            session_id: None,
            items: lines
                .iter()
                .map(|(index, units)| CartLine {
                    product_id: fx.product(*index).to_string(),
                    quantity: Quantity::from_units(*units),
                    unit_price: fx.products[*index].selling_price,
                    discount: Money::zero(),
                })
                .collect(),
            discount: None,
            payments,
            notes: None,
        }
    }

    fn pay(method: PaymentMethod, minor: i64) -> PaymentInput {
        PaymentInput {
            method,
            amount: Money::from_minor(minor),
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_sale_takes_items_out_of_stock() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 10)]).await;
        let cashier = Actor::new("cashier-1");

        let sale = fx
            .db
            .pos()
            .create_transaction(
                cart(&fx, &[(RICE, 2)], vec![pay(PaymentMethod::Cash, 200_000)]),
                &cashier,
            )
            .await
            .unwrap();

        assert_eq!(sale.status, TransactionStatus::Completed);
        // dated by the store's UTC+07:00 day, not the UTC day
        let local_day = fx.store.business_date(sale.created_at).format("%Y%m%d");
        assert_eq!(sale.transaction_number, format!("TRX-JKT01-{}-0001", local_day));
        assert_eq!(sale.total, Money::from_minor(150_000));
        assert_eq!(sale.change, Money::from_minor(50_000));
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.payments[0].amount, Money::from_minor(150_000));
        assert_eq!(sale.payments[0].tendered, Some(Money::from_minor(200_000)));
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(8));

        let history = fx.db.ledger().movements(fx.product(RICE), &fx.store.id, 1).await.unwrap();
        assert_eq!(history[0].movement_type, MovementType::Out);
        assert_eq!(history[0].quantity, Quantity::from_units(-2));
        assert!(history[0].reference.is_none());
        assert_eq!(history[0].note.as_deref(), Some(sale.transaction_number.as_str()));
    }

    #[tokio::test]
    async fn test_insufficient_stock_writes_nothing() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 1), (OIL, 5)]).await;
        let cashier = Actor::new("cashier-1");
        let pos = fx.db.pos();

        let err = pos
            .create_transaction(
                cart(&fx, &[(OIL, 1), (RICE, 2)], vec![pay(PaymentMethod::Cash, 500_000)]),
                &cashier,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(fx.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(1));
        assert_eq!(fx.on_hand(OIL).await, Quantity::from_units(5));

        // the failed sale did not burn a number
        let sale = pos
            .create_transaction(
                cart(&fx, &[(RICE, 1)], vec![pay(PaymentMethod::Cash, 75_000)]),
                &cashier,
            )
            .await
            .unwrap();
        assert!(sale.transaction_number.ends_with("-0001"));
    }

    #[tokio::test]
    async fn test_short_payment_rejected() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 1)]).await;

        let err = fx
            .db
            .pos()
            .create_transaction(
                cart(&fx, &[(RICE, 1)], vec![pay(PaymentMethod::Cash, 70_000)]),
                &Actor::new("cashier-1"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(1));
    }

    #[tokio::test]
    async fn test_oversized_amounts_refused_before_stock_moves() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 10)]).await;
        let cashier = Actor::new("cashier-1");
        let pos = fx.db.pos();

        // 4 x 2^62 would wrap to a total of 0
        let mut wrapping = cart(&fx, &[(RICE, 4)], vec![pay(PaymentMethod::Cash, 1)]);
        wrapping.items[0].unit_price = Money::from_minor(1 << 62);
        let err = pos.create_transaction(wrapping, &cashier).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let mut overpaid = cart(&fx, &[(RICE, 1)], vec![]);
        overpaid.payments = vec![
            pay(PaymentMethod::Cash, i64::MAX),
            pay(PaymentMethod::Cash, i64::MAX),
        ];
        let err = pos.create_transaction(overpaid, &cashier).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(fx.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(10));
    }

    #[tokio::test]
    async fn test_split_payment_gives_change_from_cash() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 1), (OIL, 1)]).await;

        let sale = fx
            .db
            .pos()
            .create_transaction(
                cart(
                    &fx,
                    &[(RICE, 1), (OIL, 1)],
                    vec![pay(PaymentMethod::Card, 50_000), pay(PaymentMethod::Cash, 100_000)],
                ),
                &Actor::new("cashier-1"),
            )
            .await
            .unwrap();

        assert_eq!(sale.total, Money::from_minor(111_000));
        assert_eq!(sale.payment_method, PaymentMethod::Split);
        assert_eq!(sale.paid, Money::from_minor(150_000));
        assert_eq!(sale.change, Money::from_minor(39_000));
        assert_eq!(sale.payments.len(), 2);
        assert_eq!(sale.payments[1].method, PaymentMethod::Cash);
        assert_eq!(sale.payments[1].amount, Money::from_minor(61_000));
    }

    #[tokio::test]
    async fn test_void_restores_stock_once() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 5)]).await;
        let cashier = Actor::new("cashier-1");
        let supervisor = Actor::new("supervisor-1");
        let pos = fx.db.pos();

        let sale = pos
            .create_transaction(
                cart(&fx, &[(RICE, 3)], vec![pay(PaymentMethod::Qris, 225_000)]),
                &cashier,
            )
            .await
            .unwrap();
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(2));

        // unrelated movements between the sale and its void
        receive(&fx, &[(RICE, 4)]).await;
        let later = pos
            .create_transaction(
                cart(&fx, &[(RICE, 1)], vec![pay(PaymentMethod::Cash, 75_000)]),
                &cashier,
            )
            .await
            .unwrap();
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(5));

        let blank = pos.void_transaction(&sale.id, "", &supervisor).await.unwrap_err();
        assert_eq!(blank.code(), ErrorCode::ValidationError);

        let voided = pos
            .void_transaction(&sale.id, "customer changed mind", &supervisor)
            .await
            .unwrap();
        assert_eq!(voided.status, TransactionStatus::Voided);
        assert_eq!(voided.voided_by.as_deref(), Some("supervisor-1"));
        assert_eq!(voided.void_reason.as_deref(), Some("customer changed mind"));
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(8));

        let history = fx.db.ledger().movements(fx.product(RICE), &fx.store.id, 1).await.unwrap();
        assert_eq!(history[0].movement_type, MovementType::Out);
        assert_eq!(history[0].quantity, Quantity::from_units(3));

        let again = pos
            .void_transaction(&sale.id, "double click", &supervisor)
            .await
            .unwrap_err();
        assert_eq!(again.code(), ErrorCode::InvalidState);
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(8));

        let untouched = pos.transaction(&later.id).await.unwrap();
        assert_eq!(untouched.status, TransactionStatus::Completed);
        let balance = fx.db.ledger().verify_balance(fx.product(RICE), &fx.store.id).await.unwrap();
        assert!(balance.is_consistent());

        let missing = pos.void_transaction("nope", "typo", &supervisor).await.unwrap_err();
        assert_eq!(missing.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_sale_into_foreign_session_refused() {
        let fx = fixture().await;
        receive(&fx, &[(RICE, 5)]).await;
        let owner = Actor::new("cashier-1");
        let session = fx
            .db
            .sessions()
            .open_session(&fx.store.id, Money::zero(), &owner)
            .await
            .unwrap();

        let mut sale = cart(&fx, &[(RICE, 1)], vec![pay(PaymentMethod::Cash, 75_000)]);
        sale.session_id = Some(session.id.clone());
        let err = fx
            .db
            .pos()
            .create_transaction(sale.clone(), &Actor::new("cashier-2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let ok = fx.db.pos().create_transaction(sale, &owner).await.unwrap();
        assert_eq!(ok.store_session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(fx.on_hand(RICE).await, Quantity::from_units(4));
    }

    #[tokio::test]
    async fn test_hold_resume_and_discard() {
        let fx = fixture().await;
        let cashier = Actor::new("cashier-1");
        let pos = fx.db.pos();
        let payload = json!({
            "items": [{ "product_id": fx.product(RICE), "quantity": 2 }],
            "customer": "Bu Sari"
        });

        let held = pos
            .hold_transaction(
                HoldCart {
                    store_id: fx.store.id.clone(),
                    session_id: None,
                    payload: payload.clone(),
                    notes: Some("back in 5 minutes".into()),
                },
                &cashier,
            )
            .await
            .unwrap();
        assert!(held.hold_number.starts_with("HOLD-JKT01-"));

        let resumed = pos.resume_transaction(&held.id).await.unwrap();
        assert_eq!(resumed.payload, payload);
        assert_eq!(pos.list_pending(&fx.store.id, Some("cashier-1")).await.unwrap().len(), 1);
        assert!(pos.list_pending(&fx.store.id, Some("cashier-9")).await.unwrap().is_empty());

        pos.delete_pending_transaction(&held.id, &cashier).await.unwrap();
        let gone = pos.resume_transaction(&held.id).await.unwrap_err();
        assert_eq!(gone.code(), ErrorCode::NotFound);
        let twice = pos.delete_pending_transaction(&held.id, &cashier).await.unwrap_err();
        assert_eq!(twice.code(), ErrorCode::NotFound);

        let empty = pos
            .hold_transaction(
                HoldCart {
                    store_id: fx.store.id.clone(),
                    session_id: None,
                    payload: serde_json::Value::Null,
                    notes: None,
                },
                &cashier,
            )
            .await
            .unwrap_err();
        assert_eq!(empty.code(), ErrorCode::ValidationError);
        assert!(fx.on_hand(RICE).await.is_zero());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("pos.db")).max_connections(4))
            .await
            .unwrap();
        let fx = seeded(db).await;
        receive(&fx, &[(RICE, 10)]).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let pos = fx.db.pos();
            let sale = cart(&fx, &[(RICE, 2)], vec![pay(PaymentMethod::Cash, 150_000)]);
            let cashier = Actor::new(format!("cashier-{i}"));
            handles.push(tokio::spawn(async move {
                pos.create_transaction(sale, &cashier).await
            }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(err) => assert_eq!(err.code(), ErrorCode::InsufficientStock),
            }
        }

        assert_eq!(sold, 5);
        assert!(fx.on_hand(RICE).await.is_zero());
        let balance = fx.db.ledger().verify_balance(fx.product(RICE), &fx.store.id).await.unwrap();
        assert!(balance.is_consistent());

        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT transaction_number FROM transactions ORDER BY transaction_number",
        )
        .fetch_all(fx.db.pool())
        .await
        .unwrap();
        assert_eq!(numbers.len(), 5);
        assert!(numbers[4].ends_with("-0005"));
    }
}
