//! # Seed Data Generator
//!
//! Creates a demo store, a small catalogue and opening stock for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in stockroom.toml (or ./stockroom.db)
//! cargo run -p stockroom-db --bin seed
//!
//! # Specify database path
//! cargo run -p stockroom-db --bin seed -- --db ./data/stockroom_dev.db
//!
//! # Use another config file
//! cargo run -p stockroom-db --bin seed -- --config ./stockroom.toml
//! ```
//!
//! Opening stock goes through a purchase order that is submitted, approved
//! and received like any other, so the ledger starts balanced.

use chrono::Utc;
use std::env;
use std::path::PathBuf;

use stockroom_core::documents::{PurchaseOrderDraft, PurchaseOrderLine};
use stockroom_core::{Actor, DocumentKind, Money, Quantity, RoundingMode, TaxMode};
use stockroom_db::config::StockroomConfig;
use stockroom_db::repository::product::NewProduct;
use stockroom_db::repository::store::NewStore;
use stockroom_db::{telemetry, Database, DbConfig};

const STORE_CODE: &str = "MAIN";

/// (sku, name, unit, purchase price, selling price, opening units)
const CATALOGUE: &[(&str, &str, &str, i64, i64, i64)] = &[
    ("RICE-5KG", "Beras Premium 5kg", "pcs", 62_000, 75_000, 40),
    ("OIL-2L", "Minyak Goreng 2L", "pcs", 30_000, 36_500, 60),
    ("SUGAR-1KG", "Gula Pasir 1kg", "pcs", 14_000, 17_500, 80),
    ("NOODLE-CASE", "Mie Instan (dus isi 40)", "case", 98_000, 120_000, 10),
    ("NOODLE-PCS", "Mie Instan", "pcs", 2_450, 3_500, 0),
    ("TEA-25", "Teh Celup isi 25", "pcs", 6_000, 8_000, 50),
    ("WATER-600", "Air Mineral 600ml", "pcs", 2_000, 3_500, 120),
    ("EGG-1KG", "Telur Ayam 1kg", "kg", 25_000, 29_000, 30),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (overrides the config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = StockroomConfig::load_or_default(config_path);
    if let Err(e) = telemetry::init_tracing(&config.logging.filter) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let db_config = match db_path {
        Some(path) => DbConfig::new(path),
        None => config.db_config(),
    };

    println!("Stockroom Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_config.database_path.display());
    println!("Tenant:   {}", config.tenant.id);
    println!();

    let db = Database::new(db_config).await?;
    if !db.health_check().await {
        eprintln!("Database did not answer a health check");
        return Err("database unavailable".into());
    }
    let (embedded, applied) = db.migration_status().await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied ({}/{})", applied, embedded);

    let tenant_id = config.tenant.id.clone();
    if db.stores().find_by_code(&tenant_id, STORE_CODE).await?.is_some() {
        println!("⚠ Store {} already exists", STORE_CODE);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let store = db
        .stores()
        .insert(NewStore {
            tenant_id: tenant_id.clone(),
            code: STORE_CODE.to_string(),
            name: "Toko Utama".to_string(),
            tax_rate_bps: 1100,
            tax_mode: TaxMode::Exclusive,
            rounding_mode: RoundingMode::Nearest,
            rounding_unit: 100,
            utc_offset_minutes: 420,
        })
        .await?;
    println!("✓ Store {} ({})", store.name, store.code);

    let mut lines = Vec::new();
    for (sku, name, unit, purchase, selling, opening) in CATALOGUE {
        let product = db
            .products()
            .insert(NewProduct {
                tenant_id: tenant_id.clone(),
                sku: sku.to_string(),
                name: name.to_string(),
                unit: unit.to_string(),
                purchase_price: Money::from_minor(*purchase),
                selling_price: Money::from_minor(*selling),
            })
            .await?;

        if *opening > 0 {
            lines.push(PurchaseOrderLine {
                product_id: product.id,
                quantity: Quantity::from_units(*opening),
                unit_price: Money::from_minor(*purchase),
            });
        }
    }
    println!("✓ {} products", CATALOGUE.len());

    let actor = Actor::new("seed");
    let workflow = db.workflow();
    let order = workflow
        .create_purchase_order(
            &store.id,
            PurchaseOrderDraft {
                date: Utc::now().date_naive(),
                supplier_name: Some("Opening stock".to_string()),
                notes: None,
                items: lines,
            },
            &actor,
        )
        .await?;
    workflow
        .submit(DocumentKind::PurchaseOrder, &order.header.id, &actor)
        .await?;
    workflow
        .approve(DocumentKind::PurchaseOrder, &order.header.id, &actor)
        .await?;
    workflow
        .receive_purchase_order(&order.header.id, &actor)
        .await?;
    println!(
        "✓ Opening stock received via {} ({} lines, total {})",
        order.header.number,
        order.items.len(),
        order.total
    );

    println!();
    println!("✓ Seed complete!");
    Ok(())
}
