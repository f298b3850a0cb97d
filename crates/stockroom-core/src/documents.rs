//! # Workflow Documents
//!
//! Records and draft inputs for the four workflow document kinds.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DocumentHeader (shared)                                                │
//! │  number, date, status, store, tenant, created/submitted/approved/      │
//! │  rejected/completed actor + timestamp pairs                            │
//! │                                                                         │
//! │  ├── PurchaseOrder      + supplier, total, lines (product, qty, price)  │
//! │  ├── StockAdjustment    + product, qty, add|reduce, reason             │
//! │  ├── StockOpname        + lines (system qty, physical qty, variance)   │
//! │  └── UnpackingTransaction + source qty → result qty, ratio             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `*Draft` is what the caller submits on create and on every draft edit;
//! an edit replaces the whole payload, lines included.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::validation::{
    bounded_amount, normalize_note, validate_amount, validate_counted_quantity, validate_line_count,
    validate_quantity, validate_reason, ValidationResult,
};
use crate::workflow::DocumentStatus;
use crate::MAX_DOCUMENT_LINES;

// =============================================================================
// Header
// =============================================================================

/// Fields every workflow document carries.
///
/// `completed_by/at` map to the kind's terminal columns
/// (`received_*`, `applied_*`, `finalized_*`, `processed_*`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DocumentHeader {
    pub id: String,
    pub tenant_id: String,
    pub store_id: String,
    pub number: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub submitted_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub completed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Order
// =============================================================================

/// A supplier order; receiving it books every line into stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub header: DocumentHeader,
    pub supplier_name: Option<String>,
    pub total: Money,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// `unit_price × quantity`
    pub subtotal: Money,
}

/// Purchase order payload for create and draft edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderDraft {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub supplier_name: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<PurchaseOrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderLine {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
}

impl PurchaseOrderLine {
    pub fn subtotal(&self) -> ValidationResult<Money> {
        bounded_amount("line amount", self.unit_price.checked_times(self.quantity))
    }
}

impl PurchaseOrderDraft {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_line_count("purchase order items", self.items.len(), MAX_DOCUMENT_LINES)?;
        normalize_note("notes", self.notes.as_deref())?;
        for line in &self.items {
            require_id("product_id", &line.product_id)?;
            validate_quantity("quantity", line.quantity)?;
            validate_amount("unit price", line.unit_price)?;
        }
        self.total()?;
        Ok(())
    }

    /// Sum of line subtotals.
    pub fn total(&self) -> ValidationResult<Money> {
        let subtotals = self
            .items
            .iter()
            .map(PurchaseOrderLine::subtotal)
            .collect::<ValidationResult<Vec<Money>>>()?;
        bounded_amount("total", Money::checked_sum(subtotals))
    }
}

// =============================================================================
// Stock Adjustment
// =============================================================================

/// Direction of a manual adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Add,
    Reduce,
}

impl AdjustmentType {
    /// Applies the direction to an unsigned quantity.
    pub fn signed(&self, quantity: Quantity) -> Quantity {
        match self {
            AdjustmentType::Add => quantity,
            AdjustmentType::Reduce => -quantity,
        }
    }
}

/// A single-product manual correction (found goods, breakage, expiry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub header: DocumentHeader,
    pub product_id: String,
    /// Always positive; direction comes from `adjustment_type`.
    pub quantity: Quantity,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
}

impl StockAdjustment {
    pub fn signed_quantity(&self) -> Quantity {
        self.adjustment_type.signed(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustmentDraft {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub product_id: String,
    pub quantity: Quantity,
    pub adjustment_type: AdjustmentType,
    pub reason: String,
    pub notes: Option<String>,
}

impl StockAdjustmentDraft {
    pub fn validate(&self) -> ValidationResult<()> {
        require_id("product_id", &self.product_id)?;
        validate_quantity("quantity", self.quantity)?;
        validate_reason("reason", &self.reason)?;
        normalize_note("notes", self.notes.as_deref())?;
        Ok(())
    }
}

// =============================================================================
// Stock Opname
// =============================================================================

/// A physical count of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockOpname {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub header: DocumentHeader,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<StockOpnameItem>,
}

/// One counted product.
///
/// `system_quantity` is the ledger quantity captured when the line was
/// written; finalizing sets stock to `physical_quantity` whatever the
/// ledger holds by then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockOpnameItem {
    pub id: String,
    pub stock_opname_id: String,
    pub product_id: String,
    pub system_quantity: Quantity,
    pub physical_quantity: Quantity,
    /// `physical_quantity - system_quantity`
    pub variance: Quantity,
    pub variance_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockOpnameDraft {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<StockOpnameLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockOpnameLine {
    pub product_id: String,
    pub physical_quantity: Quantity,
    pub variance_reason: Option<String>,
}

impl StockOpnameDraft {
    /// Checks shape only. Missing variance reasons are a submit-time rule,
    /// see [`check_variance_reasons`].
    pub fn validate(&self) -> ValidationResult<()> {
        validate_line_count("stock opname items", self.items.len(), MAX_DOCUMENT_LINES)?;
        normalize_note("notes", self.notes.as_deref())?;

        let mut seen = HashSet::new();
        for line in &self.items {
            require_id("product_id", &line.product_id)?;
            validate_counted_quantity("physical_quantity", line.physical_quantity)?;
            normalize_note("variance_reason", line.variance_reason.as_deref())?;
            if !seen.insert(line.product_id.as_str()) {
                return Err(ValidationError::rule(format!(
                    "product {} is counted more than once",
                    line.product_id
                )));
            }
        }
        Ok(())
    }
}

/// Every line with a non-zero variance must explain it.
///
/// ## Example
/// ```rust
/// use stockroom_core::documents::{check_variance_reasons, StockOpnameItem};
/// use stockroom_core::quantity::Quantity;
///
/// let line = StockOpnameItem {
///     id: "l1".into(),
///     stock_opname_id: "so1".into(),
///     product_id: "p1".into(),
///     system_quantity: Quantity::from_units(50),
///     physical_quantity: Quantity::from_units(47),
///     variance: Quantity::from_units(-3),
///     variance_reason: None,
/// };
/// assert!(check_variance_reasons(&[line]).is_err());
/// ```
pub fn check_variance_reasons(items: &[StockOpnameItem]) -> ValidationResult<()> {
    let missing: Vec<&str> = items
        .iter()
        .filter(|item| !item.variance.is_zero())
        .filter(|item| {
            item.variance_reason
                .as_deref()
                .map_or(true, |reason| reason.trim().is_empty())
        })
        .map(|item| item.product_id.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::rule(format!(
            "variance reason is required for products: {}",
            missing.join(", ")
        )))
    }
}

// =============================================================================
// Unpacking
// =============================================================================

/// Breaks a bulk product into a smaller sellable one (1 case → 12 units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct UnpackingTransaction {
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub header: DocumentHeader,
    pub source_product_id: String,
    pub source_quantity: Quantity,
    pub result_product_id: String,
    pub result_quantity: Quantity,
    /// Result units per source unit.
    pub conversion_ratio: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnpackingDraft {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub source_product_id: String,
    pub source_quantity: Quantity,
    pub result_product_id: String,
    pub result_quantity: Quantity,
    pub notes: Option<String>,
}

impl UnpackingDraft {
    pub fn validate(&self) -> ValidationResult<()> {
        require_id("source_product_id", &self.source_product_id)?;
        require_id("result_product_id", &self.result_product_id)?;
        validate_quantity("source_quantity", self.source_quantity)?;
        validate_quantity("result_quantity", self.result_quantity)?;
        normalize_note("notes", self.notes.as_deref())?;

        if self.source_product_id == self.result_product_id {
            return Err(ValidationError::rule(
                "source and result product must differ",
            ));
        }
        Ok(())
    }

    /// `result_quantity / source_quantity`, zero if the source is zero.
    pub fn conversion_ratio(&self) -> Quantity {
        self.result_quantity
            .ratio_to(self.source_quantity)
            .unwrap_or_default()
    }
}

fn require_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
