//! # Domain Types
//!
//! Shared domain types: actors, the collaborator entities (store, product)
//! and the stock ledger records.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Store       │   │    Product      │   │     Actor       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  code (TRX-…)   │   │  sku            │   │  user_id        │       │
//! │  │  tax_rate_bps   │   │  purchase_price │   │  (passed into   │       │
//! │  │  rounding       │   │  selling_price  │   │   every call)   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────────────────────┐        │
//! │  │   StockLevel    │   │           StockMovement              │        │
//! │  │  ─────────────  │   │  ──────────────────────────────────  │        │
//! │  │  (product,store)│◄──│  signed quantity, MovementType,      │        │
//! │  │  quantity       │ Σ │  Option<MovementReference>, note,    │        │
//! │  │  min / max      │   │  created_by, created_at              │        │
//! │  └─────────────────┘   └──────────────────────────────────────┘        │
//! │                                                                         │
//! │  Invariant: StockLevel.quantity == Σ StockMovement.quantity            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, RoundingMode, RoundingRule};
use crate::quantity::Quantity;
use crate::workflow::DocumentKind;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1100 bps = 11%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Whether shelf prices include tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TaxMode {
    /// Tax is added on top of the price.
    #[default]
    Exclusive,
    /// Prices already contain tax.
    Inclusive,
}

// =============================================================================
// Actor
// =============================================================================

/// The authenticated user performing an operation.
///
/// Supplied by the request layer and passed explicitly into every mutating
/// call; the core never reads ambient "current user" state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub user_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}

// =============================================================================
// Store
// =============================================================================

/// A store (branch) of a tenant, with its pricing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Store {
    pub id: String,
    pub tenant_id: String,
    /// Short code used in transaction/session/hold numbers (e.g. "JKT01").
    pub code: String,
    pub name: String,
    pub tax_rate_bps: u32,
    pub tax_mode: TaxMode,
    pub rounding_mode: RoundingMode,
    /// Rounding unit in minor currency units.
    pub rounding_unit: i64,
    /// Minutes east of UTC (420 for UTC+07:00).
    pub utc_offset_minutes: i32,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Local calendar date at the store; daily numbers roll over at local
    /// midnight.
    ///
    /// ```rust
    /// use chrono::{NaiveDate, TimeZone, Utc};
    /// # use stockroom_core::{RoundingMode, Store, TaxMode};
    /// # let mut store = Store {
    /// #     id: "s1".into(), tenant_id: "t1".into(), code: "JKT01".into(), name: "Jakarta".into(),
    /// #     tax_rate_bps: 0, tax_mode: TaxMode::Exclusive, rounding_mode: RoundingMode::None,
    /// #     rounding_unit: 1, utc_offset_minutes: 0, created_at: Utc::now(),
    /// # };
    /// store.utc_offset_minutes = 420;
    /// let late_evening_utc = Utc.with_ymd_and_hms(2025, 3, 14, 18, 30, 0).unwrap();
    /// assert_eq!(
    ///     store.business_date(late_evening_utc),
    ///     NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
    /// );
    /// ```
    pub fn business_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)) {
            Some(offset) => at.with_timezone(&offset).date_naive(),
            None => at.date_naive(),
        }
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    #[inline]
    pub fn rounding(&self) -> RoundingRule {
        RoundingRule::new(self.rounding_mode, self.rounding_unit)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stockable, sellable item of a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub sku: String,
    pub name: String,
    /// Unit of measure label ("pcs", "kg", "case").
    pub unit: String,
    /// Reference purchase price.
    pub purchase_price: Money,
    /// Reference selling price.
    pub selling_price: Money,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Stock Level
// =============================================================================

/// On-hand quantity of one product at one store.
///
/// Rows are created lazily on the first movement and are only ever written
/// by the stock ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    pub id: String,
    pub product_id: String,
    pub store_id: String,
    pub quantity: Quantity,
    /// Advisory threshold only.
    pub min_stock: Quantity,
    /// Advisory threshold only.
    pub max_stock: Option<Quantity>,
    #[ts(as = "Option<String>")]
    pub last_stock_opname_date: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// True when on-hand quantity has dropped below the advisory minimum.
    pub fn is_below_min(&self) -> bool {
        self.quantity < self.min_stock
    }

    /// True when on-hand quantity exceeds the advisory maximum.
    pub fn is_above_max(&self) -> bool {
        self.max_stock.is_some_and(|max| self.quantity > max)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Cause of a stock movement.
///
/// Persisted upper-case (`IN`, `UNPACKING_OUT`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Goods received (purchase orders).
    In,
    /// Goods sold; a void is recorded as a positive OUT reversal.
    Out,
    /// Manual add/reduce adjustment.
    Adjustment,
    /// Physical count reconciliation.
    Opname,
    /// Result product of an unpacking.
    UnpackingIn,
    /// Source product of an unpacking.
    UnpackingOut,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Opname => "OPNAME",
            MovementType::UnpackingIn => "UNPACKING_IN",
            MovementType::UnpackingOut => "UNPACKING_OUT",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The workflow document that caused a movement.
///
/// POS sales and voids carry no reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementReference {
    pub kind: DocumentKind,
    pub id: String,
}

impl MovementReference {
    pub fn new(kind: DocumentKind, id: impl Into<String>) -> Self {
        MovementReference {
            kind,
            id: id.into(),
        }
    }
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub store_id: String,
    pub movement_type: MovementType,
    /// Positive = increase, negative = decrease.
    pub quantity: Quantity,
    pub reference: Option<MovementReference>,
    pub note: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Stock quantity next to the sum of its movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerBalance {
    pub stock_quantity: Quantity,
    pub movement_sum: Quantity,
}

impl LedgerBalance {
    /// The conservation invariant.
    pub fn is_consistent(&self) -> bool {
        self.stock_quantity == self.movement_sum
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn level(quantity: i64, min: i64, max: Option<i64>) -> StockLevel {
        let now = Utc::now();
        StockLevel {
            id: "s".into(),
            product_id: "p".into(),
            store_id: "st".into(),
            quantity: Quantity::from_units(quantity),
            min_stock: Quantity::from_units(min),
            max_stock: max.map(Quantity::from_units),
            last_stock_opname_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_thresholds() {
        assert!(level(2, 5, None).is_below_min());
        assert!(!level(5, 5, None).is_below_min());
        assert!(level(11, 0, Some(10)).is_above_max());
        assert!(!level(11, 0, None).is_above_max());
    }

    #[test]
    fn test_movement_type_serialization() {
        let json = serde_json::to_string(&MovementType::UnpackingOut).unwrap();
        assert_eq!(json, "\"UNPACKING_OUT\"");
        assert_eq!(MovementType::In.as_str(), "IN");
    }

    #[test]
    fn test_ledger_balance() {
        let ok = LedgerBalance {
            stock_quantity: Quantity::from_units(15),
            movement_sum: Quantity::from_units(15),
        };
        assert!(ok.is_consistent());
    }

    #[test]
    fn test_business_date_follows_store_offset() {
        use chrono::TimeZone;

        let mut store = Store {
            id: "s1".into(),
            tenant_id: "t1".into(),
            code: "NYC01".into(),
            name: "New York".into(),
            tax_rate_bps: 0,
            tax_mode: crate::TaxMode::Exclusive,
            rounding_mode: RoundingMode::None,
            rounding_unit: 1,
            utc_offset_minutes: -300,
            created_at: Utc::now(),
        };
        let early_utc = Utc.with_ymd_and_hms(2025, 3, 15, 2, 0, 0).unwrap();
        assert_eq!(store.business_date(early_utc), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());

        store.utc_offset_minutes = 0;
        assert_eq!(store.business_date(early_utc), NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());

        // Out-of-range offsets fall back to UTC
        store.utc_offset_minutes = i32::MAX;
        assert_eq!(store.business_date(early_utc), NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }
}
