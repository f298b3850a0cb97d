//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Lookup by id or SKU
//! - Catalogue listing per tenant
//! - `available_stock`, the read-only view the POS checks before selling
//!
//! Products never carry a stock column: quantities live per store in the
//! ledger's `stocks` table.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use stockroom_core::validation::{validate_amount, validate_name, validate_sku};
use stockroom_core::{CoreError, Money, Product, Quantity, ValidationError};

use crate::error::{DbResult, ServiceResult};
use crate::ledger;

const PRODUCT_COLUMNS: &str = "id, tenant_id, sku, name, unit, purchase_price, selling_price, \
     is_active, created_at, updated_at";

/// Input for [`ProductRepository::insert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub purchase_price: Money,
    pub selling_price: Money,
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_sku(&self.sku)?;
        validate_name("product name", &self.name)?;
        validate_name("unit", &self.unit)?;
        validate_amount("purchase price", self.purchase_price)?;
        validate_amount("selling price", self.selling_price)?;
        Ok(())
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.find_by_sku(tenant_id, "RICE-5KG").await?;
/// let on_hand = repo.available_stock(&product.id, &store.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product.
    pub async fn insert(&self, new: NewProduct) -> ServiceResult<Product> {
        new.validate()?;

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            tenant_id: new.tenant_id,
            sku: new.sku.trim().to_string(),
            name: new.name.trim().to_string(),
            unit: new.unit.trim().to_string(),
            purchase_price: new.purchase_price,
            selling_price: new.selling_price,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, name, unit,
                purchase_price, selling_price, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.unit)
        .bind(product.purchase_price)
        .bind(product.selling_price)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        info!(id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Gets a product by ID.
    ///
    /// ## Returns
    /// * `Ok(Some(product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Gets a product by SKU within a tenant.
    pub async fn find_by_sku(&self, tenant_id: &str, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE tenant_id = ?1 AND sku = ?2",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(tenant_id)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Lists active products of a tenant ordered by name.
    pub async fn list_active(&self, tenant_id: &str, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE tenant_id = ?1 AND is_active = 1 ORDER BY name LIMIT ?2",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Listed active products");
        Ok(products)
    }

    /// Deactivates a product. History and stock rows are kept.
    pub async fn deactivate(&self, id: &str) -> ServiceResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("product", id).into());
        }
        info!(id, "Product deactivated");
        Ok(())
    }

    /// On-hand quantity of a product at a store (zero when never stocked).
    pub async fn available_stock(&self, product_id: &str, store_id: &str) -> DbResult<Quantity> {
        let mut conn = self.pool.acquire().await?;
        ledger::read_quantity(&mut conn, product_id, store_id).await
    }

    /// Gets an active product of `tenant_id` or fails.
    ///
    /// ## Errors
    /// - `NotFound` for unknown ids and products of another tenant
    /// - `Validation` for deactivated products
    pub async fn require_active(&self, tenant_id: &str, id: &str) -> ServiceResult<Product> {
        let product = self
            .find_by_id(id)
            .await?
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::not_found("product", id))?;

        if !product.is_active {
            let reason = format!("product {} is inactive", product.sku);
            return Err(ValidationError::rule(reason).into());
        }
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn new_product(sku: &str) -> NewProduct {
        NewProduct {
            tenant_id: "t1".into(),
            sku: sku.into(),
            name: "Beras 5kg".into(),
            unit: "pcs".into(),
            purchase_price: Money::from_minor(60_000),
            selling_price: Money::from_minor(75_000),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = db.products();

        let product = products.insert(new_product("RICE-5KG")).await.unwrap();
        assert!(product.is_active);

        let by_sku = products.find_by_sku("t1", "RICE-5KG").await.unwrap().unwrap();
        assert_eq!(by_sku.id, product.id);
        assert_eq!(by_sku.selling_price, Money::from_minor(75_000));

        assert!(products.find_by_sku("t2", "RICE-5KG").await.unwrap().is_none());
        assert_eq!(products.list_active("t1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.products().insert(new_product("has space")).await.is_err());
    }

    #[tokio::test]
    async fn test_require_active() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let products = db.products();
        let product = products.insert(new_product("OIL-1L")).await.unwrap();

        assert!(products.require_active("t1", &product.id).await.is_ok());
        assert!(products.require_active("t2", &product.id).await.is_err());

        products.deactivate(&product.id).await.unwrap();
        assert!(products.require_active("t1", &product.id).await.is_err());
    }

    #[tokio::test]
    async fn test_available_stock_defaults_to_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(new_product("SUGAR-1KG")).await.unwrap();
        assert_eq!(
            db.products().available_stock(&product.id, "any-store").await.unwrap(),
            Quantity::zero()
        );
    }
}
