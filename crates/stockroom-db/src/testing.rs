//! Shared fixtures for the engine tests.

use chrono::{NaiveDate, Utc};

use stockroom_core::documents::{PurchaseOrderDraft, PurchaseOrderLine};
use stockroom_core::{Actor, DocumentKind, Money, Product, Quantity, RoundingMode, Store, TaxMode};

use crate::pool::{Database, DbConfig};
use crate::repository::product::NewProduct;
use crate::repository::store::NewStore;

pub(crate) struct Fixture {
    pub db: Database,
    pub store: Store,
    /// RICE, OIL, CASE, PCS in that order.
    pub products: Vec<Product>,
}

impl Fixture {
    pub fn product(&self, index: usize) -> &str {
        &self.products[index].id
    }

    pub async fn on_hand(&self, index: usize) -> Quantity {
        self.db
            .ledger()
            .available(self.product(index), &self.store.id)
            .await
            .unwrap()
    }
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn manager() -> Actor {
    Actor::new("manager-1")
}

/// In-memory database with one tax-free UTC+07:00 store and four products.
pub(crate) async fn fixture() -> Fixture {
    seeded(Database::new(DbConfig::in_memory()).await.unwrap()).await
}

/// Same data on an existing database (e.g. a file with several connections).
pub(crate) async fn seeded(db: Database) -> Fixture {
    let store = db
        .stores()
        .insert(NewStore {
            tenant_id: "t1".into(),
            code: "JKT01".into(),
            name: "Jakarta Pusat".into(),
            tax_rate_bps: 0,
            tax_mode: TaxMode::Exclusive,
            rounding_mode: RoundingMode::None,
            rounding_unit: 1,
            utc_offset_minutes: 420,
        })
        .await
        .unwrap();

    let mut products = Vec::new();
    for (sku, name, unit, price) in [
        ("RICE-5KG", "Rice 5kg", "pcs", 75_000),
        ("OIL-2L", "Cooking Oil 2L", "pcs", 36_000),
        ("NOODLE-CASE", "Noodles (case of 40)", "case", 120_000),
        ("NOODLE-PCS", "Noodles", "pcs", 3_500),
    ] {
        let product = db
            .products()
            .insert(NewProduct {
                tenant_id: "t1".into(),
                sku: sku.into(),
                name: name.into(),
                unit: unit.into(),
                purchase_price: Money::from_minor(price * 8 / 10),
                selling_price: Money::from_minor(price),
            })
            .await
            .unwrap();
        products.push(product);
    }

    Fixture { db, store, products }
}

/// Brings stock in through a received purchase order.
pub(crate) async fn receive(fx: &Fixture, lines: &[(usize, i64)]) {
    let actor = manager();
    let workflow = fx.db.workflow();
    let order = workflow
        .create_purchase_order(
            &fx.store.id,
            PurchaseOrderDraft {
                date: today(),
                supplier_name: Some("PT Sumber Makmur".into()),
                notes: None,
                items: lines
                    .iter()
                    .map(|(index, units)| PurchaseOrderLine {
                        product_id: fx.product(*index).to_string(),
                        quantity: Quantity::from_units(*units),
                        unit_price: fx.products[*index].purchase_price,
                    })
                    .collect(),
            },
            &actor,
        )
        .await
        .unwrap();

    let id = &order.header.id;
    workflow.submit(DocumentKind::PurchaseOrder, id, &actor).await.unwrap();
    workflow.approve(DocumentKind::PurchaseOrder, id, &actor).await.unwrap();
    workflow.receive_purchase_order(id, &actor).await.unwrap();
}
