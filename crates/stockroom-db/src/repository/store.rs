//! # Store Repository
//!
//! Stores of a tenant and their pricing configuration (tax rate, tax mode,
//! rounding), which the POS engine reads before pricing a cart.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use stockroom_core::validation::{validate_name, validate_store_code, validate_tax_rate_bps};
use stockroom_core::{CoreError, RoundingMode, Store, TaxMode, ValidationError};

use crate::error::{DbResult, ServiceResult};

const STORE_COLUMNS: &str = "id, tenant_id, code, name, tax_rate_bps, tax_mode, rounding_mode, \
     rounding_unit, utc_offset_minutes, created_at";

/// UTC-12:00 to UTC+14:00.
const UTC_OFFSET_RANGE: std::ops::RangeInclusive<i32> = -720..=840;

/// Input for [`StoreRepository::insert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStore {
    pub tenant_id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub tax_rate_bps: u32,
    #[serde(default)]
    pub tax_mode: TaxMode,
    #[serde(default)]
    pub rounding_mode: RoundingMode,
    #[serde(default = "default_rounding_unit")]
    pub rounding_unit: i64,
    /// Minutes east of UTC; daily document numbers follow the local day.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_rounding_unit() -> i64 {
    1
}

impl NewStore {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_store_code(&self.code)?;
        validate_name("store name", &self.name)?;
        validate_tax_rate_bps(self.tax_rate_bps)?;
        if self.rounding_unit < 1 {
            return Err(ValidationError::must_be_positive("rounding unit"));
        }
        if !UTC_OFFSET_RANGE.contains(&self.utc_offset_minutes) {
            return Err(ValidationError::OutOfRange {
                field: "utc_offset_minutes".to_string(),
                min: i64::from(*UTC_OFFSET_RANGE.start()),
                max: i64::from(*UTC_OFFSET_RANGE.end()),
            });
        }
        Ok(())
    }
}

/// Repository for store lookups.
#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    /// Creates a new StoreRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    /// Creates a store.
    pub async fn insert(&self, new: NewStore) -> ServiceResult<Store> {
        new.validate()?;

        let store = Store {
            id: Uuid::new_v4().to_string(),
            tenant_id: new.tenant_id,
            code: new.code,
            name: new.name.trim().to_string(),
            tax_rate_bps: new.tax_rate_bps,
            tax_mode: new.tax_mode,
            rounding_mode: new.rounding_mode,
            rounding_unit: new.rounding_unit,
            utc_offset_minutes: new.utc_offset_minutes,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO stores (
                id, tenant_id, code, name, tax_rate_bps,
                tax_mode, rounding_mode, rounding_unit, utc_offset_minutes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&store.id)
        .bind(&store.tenant_id)
        .bind(&store.code)
        .bind(&store.name)
        .bind(store.tax_rate_bps)
        .bind(store.tax_mode)
        .bind(store.rounding_mode)
        .bind(store.rounding_unit)
        .bind(store.utc_offset_minutes)
        .bind(store.created_at)
        .execute(&self.pool)
        .await?;

        info!(id = %store.id, code = %store.code, "Store created");
        Ok(store)
    }

    /// Gets a store by ID.
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Store>> {
        let sql = format!("SELECT {} FROM stores WHERE id = ?1", STORE_COLUMNS);
        let store = sqlx::query_as::<_, Store>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    /// Gets a store by tenant and code.
    pub async fn find_by_code(&self, tenant_id: &str, code: &str) -> DbResult<Option<Store>> {
        debug!(tenant_id, code, "Looking up store by code");
        let sql = format!(
            "SELECT {} FROM stores WHERE tenant_id = ?1 AND code = ?2",
            STORE_COLUMNS
        );
        let store = sqlx::query_as::<_, Store>(&sql)
            .bind(tenant_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    /// Gets a store or fails with `NotFound`.
    pub async fn require(&self, id: &str) -> ServiceResult<Store> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("store", id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn new_store(code: &str) -> NewStore {
        NewStore {
            tenant_id: "t1".into(),
            code: code.into(),
            name: "Jakarta Pusat".into(),
            tax_rate_bps: 1100,
            tax_mode: TaxMode::Exclusive,
            rounding_mode: RoundingMode::Nearest,
            rounding_unit: 100,
            utc_offset_minutes: 420,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stores = db.stores();

        let store = stores.insert(new_store("JKT01")).await.unwrap();
        let found = stores.require(&store.id).await.unwrap();
        assert_eq!(found.code, "JKT01");
        assert_eq!(found.tax_rate().bps(), 1100);
        assert_eq!(found.rounding().unit, 100);
        assert_eq!(found.utc_offset_minutes, 420);

        let by_code = stores.find_by_code("t1", "JKT01").await.unwrap();
        assert!(by_code.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores().insert(new_store("JKT01")).await.unwrap();
        assert!(db.stores().insert(new_store("JKT01")).await.is_err());
    }

    #[tokio::test]
    async fn test_utc_offset_must_be_a_real_zone() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut store = new_store("JKT01");
        store.utc_offset_minutes = 15 * 60;
        let err = db.stores().insert(store).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationError);

        let mut store = new_store("HNL01");
        store.utc_offset_minutes = -600;
        assert!(db.stores().insert(store).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_store_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.stores().require("nope").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::NotFound);
    }
}
