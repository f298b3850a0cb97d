//! # POS Transactions
//!
//! Sale records, cart input and the pricing pipeline that turns a cart into
//! the amounts persisted on a completed transaction.
//!
//! ## Pricing Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each line:  qty × unit_price − line discount   = line subtotal    │
//! │                                      Σ               = subtotal         │
//! │  transaction discount (amount | percent of subtotal) = discount         │
//! │  subtotal − discount                                 = taxable          │
//! │    exclusive store: tax = taxable × rate, total = taxable + tax        │
//! │    inclusive store: tax = part of taxable, total = taxable             │
//! │  store rounding rule applied to total                = total            │
//! │  Σ payments                                          = paid             │
//! │  paid − total (cash only)                            = change           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure; the database layer supplies the store's tax and
//! rounding configuration and persists the [`PricingBreakdown`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, RoundingRule};
use crate::quantity::Quantity;
use crate::types::{TaxMode, TaxRate};
use crate::validation::{
    bounded_amount, normalize_note, validate_amount, validate_line_count,
    validate_payment_amount, validate_quantity, ValidationResult,
};
use crate::MAX_CART_ITEMS;

// =============================================================================
// Statuses
// =============================================================================

/// Status of a POS transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Paid and booked out of stock.
    Completed,
    /// Reversed; stock restored.
    Voided,
}

impl TransactionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Voided => "voided",
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; the only method counted into the drawer.
    Cash,
    /// Debit/credit card on an external terminal.
    Card,
    Qris,
    BankTransfer,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ewallet"))]
    #[serde(rename = "ewallet")]
    EWallet,
    /// Transaction-level marker when several methods were used.
    Split,
}

impl PaymentMethod {
    #[inline]
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A completed or voided sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub tenant_id: String,
    pub store_id: String,
    pub transaction_number: String,
    pub cashier_id: String,
    pub store_session_id: Option<String>,
    pub status: TransactionStatus,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub rounding_adjustment: Money,
    pub total: Money,
    pub paid: Money,
    pub change: Money,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub voided_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<TransactionItem>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub payments: Vec<TransactionPayment>,
}

/// A sold line. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionItem {
    pub id: String,
    pub transaction_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount: Money,
    /// `quantity × unit_price − discount`
    pub subtotal: Money,
}

/// One tender towards a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransactionPayment {
    pub id: String,
    pub transaction_id: String,
    pub method: PaymentMethod,
    /// Amount applied to the total.
    pub amount: Money,
    /// For cash: what the customer handed over.
    pub tendered: Option<Money>,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A parked cart. The payload is stored and returned byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PendingTransaction {
    pub id: String,
    pub tenant_id: String,
    pub store_id: String,
    pub hold_number: String,
    pub cashier_id: String,
    pub store_session_id: Option<String>,
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Input
// =============================================================================

/// One cart line as rung up by the cashier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// Line discount as an amount.
    #[serde(default)]
    pub discount: Money,
}

impl CartLine {
    /// `quantity × unit_price`, before the line discount.
    pub fn gross(&self) -> ValidationResult<Money> {
        bounded_amount("line amount", self.unit_price.checked_times(self.quantity))
    }
}

/// Discount on the whole transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TransactionDiscount {
    Amount(Money),
    /// Basis points of the subtotal (1000 = 10%).
    Percent(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    /// For cash, the amount tendered.
    pub amount: Money,
    pub reference: Option<String>,
}

/// Everything needed to ring up a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransaction {
    pub store_id: String,
    pub session_id: Option<String>,
    pub items: Vec<CartLine>,
    pub discount: Option<TransactionDiscount>,
    pub payments: Vec<PaymentInput>,
    pub notes: Option<String>,
}

impl NewTransaction {
    /// Shape checks; amounts are checked again while pricing.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.store_id.trim().is_empty() {
            return Err(ValidationError::required("store_id"));
        }
        validate_line_count("transaction items", self.items.len(), MAX_CART_ITEMS)?;
        normalize_note("notes", self.notes.as_deref())?;

        for line in &self.items {
            if line.product_id.trim().is_empty() {
                return Err(ValidationError::required("product_id"));
            }
            validate_quantity("quantity", line.quantity)?;
            validate_amount("unit price", line.unit_price)?;
            validate_amount("line discount", line.discount)?;
            if line.discount > line.gross()? {
                return Err(ValidationError::rule(format!(
                    "discount on product {} exceeds the line amount",
                    line.product_id
                )));
            }
        }

        if self.payments.is_empty() {
            return Err(ValidationError::required("payment"));
        }
        for payment in &self.payments {
            if payment.method == PaymentMethod::Split {
                return Err(ValidationError::InvalidFormat {
                    field: "payment method".to_string(),
                    reason: "split is not a tender; list each payment".to_string(),
                });
            }
            validate_payment_amount(payment.amount)?;
        }

        Ok(())
    }

    /// Total requested quantity per product, in first-seen order.
    pub fn requested_quantities(&self) -> Vec<(String, Quantity)> {
        let mut totals: Vec<(String, Quantity)> = Vec::new();
        for line in &self.items {
            match totals.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, qty)) => *qty += line.quantity,
                None => totals.push((line.product_id.clone(), line.quantity)),
            }
        }
        totals
    }
}

/// A cart parked for later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HoldCart {
    pub store_id: String,
    pub session_id: Option<String>,
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
    pub notes: Option<String>,
}

// =============================================================================
// Pricing
// =============================================================================

/// Store settings that drive pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    pub tax_rate: TaxRate,
    pub tax_mode: TaxMode,
    pub rounding: RoundingRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedLine {
    pub product_id: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount: Money,
    pub subtotal: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppliedPayment {
    pub method: PaymentMethod,
    pub amount: Money,
    pub tendered: Option<Money>,
    pub reference: Option<String>,
}

/// The computed amounts of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricingBreakdown {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub rounding_adjustment: Money,
    pub total: Money,
    pub paid: Money,
    pub change: Money,
    pub payment_method: PaymentMethod,
    pub payments: Vec<AppliedPayment>,
}

/// Prices a cart and settles its payments.
///
/// ## Rules
/// - Non-cash tenders are applied first and may not exceed the total
/// - Cash covers the rest; change is only ever given from cash
/// - Paid short of the total is rejected
///
/// ## Example
/// ```rust
/// use stockroom_core::money::{Money, RoundingRule};
/// use stockroom_core::pos::*;
/// use stockroom_core::quantity::Quantity;
/// use stockroom_core::types::{TaxMode, TaxRate};
///
/// let cart = NewTransaction {
///     store_id: "s1".into(),
///     session_id: None,
///     items: vec![CartLine {
///         product_id: "p1".into(),
///         quantity: Quantity::from_units(2),
///         unit_price: Money::from_minor(5_000),
///         discount: Money::zero(),
///     }],
///     discount: None,
///     payments: vec![PaymentInput {
///         method: PaymentMethod::Cash,
///         amount: Money::from_minor(20_000),
///         reference: None,
///     }],
///     notes: None,
/// };
/// let config = PricingConfig {
///     tax_rate: TaxRate::from_bps(1100),
///     tax_mode: TaxMode::Exclusive,
///     rounding: RoundingRule::none(),
/// };
/// let priced = price_cart(&cart, config).unwrap();
/// assert_eq!(priced.total.minor(), 11_100);
/// assert_eq!(priced.change.minor(), 8_900);
/// ```
pub fn price_cart(
    cart: &NewTransaction,
    config: PricingConfig,
) -> ValidationResult<PricingBreakdown> {
    cart.validate()?;

    let lines = cart
        .items
        .iter()
        .map(|line| -> ValidationResult<PricedLine> {
            Ok(PricedLine {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                subtotal: line.gross()? - line.discount,
            })
        })
        .collect::<ValidationResult<Vec<PricedLine>>>()?;

    let subtotal =
        bounded_amount("subtotal", Money::checked_sum(lines.iter().map(|l| l.subtotal)))?;
    let discount = transaction_discount(subtotal, cart.discount)?;
    let taxable = subtotal - discount;

    let (tax, before_rounding) = match config.tax_mode {
        TaxMode::Exclusive => {
            let tax = bounded_amount("tax", taxable.calculate_tax(config.tax_rate))?;
            (tax, bounded_amount("total", taxable.checked_add(tax))?)
        }
        TaxMode::Inclusive => (
            bounded_amount("tax", taxable.included_tax(config.tax_rate))?,
            taxable,
        ),
    };

    let total = bounded_amount("total", Some(config.rounding.apply(before_rounding)))?;
    let rounding_adjustment = total - before_rounding;

    let (payments, paid) = settle_payments(&cart.payments, total)?;
    let change = paid - total;

    Ok(PricingBreakdown {
        lines,
        subtotal,
        discount,
        tax,
        rounding_adjustment,
        total,
        paid,
        change,
        payment_method: primary_method(&cart.payments),
        payments,
    })
}

fn transaction_discount(
    subtotal: Money,
    discount: Option<TransactionDiscount>,
) -> ValidationResult<Money> {
    let amount = match discount {
        None => Money::zero(),
        Some(TransactionDiscount::Amount(amount)) => {
            validate_amount("discount", amount)?;
            amount
        }
        Some(TransactionDiscount::Percent(bps)) => {
            if bps > 10_000 {
                return Err(ValidationError::OutOfRange {
                    field: "discount percent".to_string(),
                    min: 0,
                    max: 10_000,
                });
            }
            bounded_amount("discount", subtotal.percentage(bps))?
        }
    };

    if amount > subtotal {
        return Err(ValidationError::rule("discount exceeds the subtotal"));
    }
    Ok(amount)
}

fn settle_payments(
    payments: &[PaymentInput],
    total: Money,
) -> ValidationResult<(Vec<AppliedPayment>, Money)> {
    let non_cash = bounded_amount(
        "non-cash payments",
        Money::checked_sum(payments.iter().filter(|p| !p.method.is_cash()).map(|p| p.amount)),
    )?;
    if non_cash > total {
        return Err(ValidationError::rule(format!(
            "non-cash payments {} exceed the total {}",
            non_cash, total
        )));
    }

    let paid = bounded_amount("payments", Money::checked_sum(payments.iter().map(|p| p.amount)))?;
    if paid < total {
        return Err(ValidationError::rule(format!(
            "payment {} is short of the total {}",
            paid, total
        )));
    }

    let mut cash_due = total - non_cash;
    let applied = payments
        .iter()
        .map(|p| {
            if p.method.is_cash() {
                let amount = if p.amount < cash_due { p.amount } else { cash_due };
                cash_due -= amount;
                AppliedPayment {
                    method: p.method,
                    amount,
                    tendered: Some(p.amount),
                    reference: p.reference.clone(),
                }
            } else {
                AppliedPayment {
                    method: p.method,
                    amount: p.amount,
                    tendered: None,
                    reference: p.reference.clone(),
                }
            }
        })
        .collect();

    Ok((applied, paid))
}

fn primary_method(payments: &[PaymentInput]) -> PaymentMethod {
    match payments.split_first() {
        Some((first, rest)) if rest.iter().all(|p| p.method == first.method) => first.method,
        Some(_) => PaymentMethod::Split,
        None => PaymentMethod::Cash,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
