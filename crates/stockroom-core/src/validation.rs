//! # Validation Module
//!
//! Input validation shared by every mutating operation.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request layer (out of scope)                                 │
//! │  └── Deserialization into the New* input types                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE, called from New*::validate()                    │
//! │  ├── Required text, lengths, formats                                   │
//! │  └── Positive quantities, non-negative money, line counts              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity >= 0) on stocks                                   │
//! │  ├── UNIQUE document numbers                                           │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Every check here runs before the unit of work begins.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::quantity::Quantity;
//! use stockroom_core::validation::{validate_quantity, validate_reason};
//!
//! assert!(validate_quantity("quantity", Quantity::from_units(5)).is_ok());
//! assert_eq!(validate_reason("reason", "  damaged ").unwrap(), "damaged");
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::{MAX_AMOUNT, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted free-text reason or note.
pub const MAX_REASON_LENGTH: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_sku;
///
/// assert!(validate_sku("RICE-5KG").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a store code as it appears inside `TRX-{code}-...` numbers.
///
/// ## Rules
/// - 1 to 10 characters
/// - ASCII uppercase letters and digits only (no hyphen, it is the separator)
pub fn validate_store_code(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::required("store code"));
    }

    if code.len() > 10 {
        return Err(ValidationError::TooLong {
            field: "store code".to_string(),
            max: 10,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "store code".to_string(),
            reason: "must contain only uppercase letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a required display name (product or store).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a required free-text reason.
///
/// ## Returns
/// The trimmed reason, ready to persist.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_reason;
///
/// assert!(validate_reason("rejection reason", "   ").is_err());
/// ```
pub fn validate_reason(field: &str, reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required(field));
    }

    if reason.len() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(reason.to_string())
}

/// Normalizes an optional note: trims it and maps blank to `None`.
pub fn normalize_note(field: &str, note: Option<&str>) -> ValidationResult<Option<String>> {
    match note.map(str::trim) {
        None | Some("") => Ok(None),
        Some(note) => validate_reason(field, note).map(Some),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line or movement quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Purchase Order: Add Line                                               │
/// │                                                                         │
/// │  User enters quantity: 10                                              │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity("quantity", 10) ← THIS FUNCTION                     │
/// │       │                                                                 │
/// │       ├── qty <= 0?  → Error: "quantity must be positive"              │
/// │       │                                                                 │
/// │       ├── qty too large? → Error: "quantity must be between ..."       │
/// │       │                                                                 │
/// │       └── OK → line accepted                                           │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(field: &str, qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::must_be_positive(field));
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY.milli(),
        });
    }

    Ok(())
}

/// Validates a counted quantity (zero allowed, e.g. an empty shelf).
pub fn validate_counted_quantity(field: &str, qty: Quantity) -> ValidationResult<()> {
    if qty.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_LINE_QUANTITY.milli(),
        });
    }

    Ok(())
}

/// Validates a price, discount or cash amount.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items, empty drawer)
/// - At most [`MAX_AMOUNT`]
///
/// ## Example
/// ```rust
/// use stockroom_core::money::Money;
/// use stockroom_core::validation::validate_amount;
///
/// assert!(validate_amount("unit price", Money::from_minor(1099)).is_ok());
/// assert!(validate_amount("unit price", Money::zero()).is_ok());
/// assert!(validate_amount("unit price", Money::from_minor(-1)).is_err());
/// assert!(validate_amount("unit price", Money::from_minor(i64::MAX)).is_err());
/// ```
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if amount > MAX_AMOUNT {
        return Err(amount_out_of_range(field));
    }

    Ok(())
}

/// Validates a payment amount.
///
/// ## Rules
/// - Must be positive (> 0)
/// - At most [`MAX_AMOUNT`]
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::must_be_positive("payment amount"));
    }

    if amount > MAX_AMOUNT {
        return Err(amount_out_of_range("payment amount"));
    }

    Ok(())
}

/// Checks a computed amount: the arithmetic must not have overflowed
/// (`None`) and the result must not exceed [`MAX_AMOUNT`].
///
/// ## Example
/// ```rust
/// use stockroom_core::money::Money;
/// use stockroom_core::validation::bounded_amount;
///
/// let a = Money::from_minor(1_000);
/// assert_eq!(bounded_amount("total", a.checked_add(a)).unwrap().minor(), 2_000);
/// assert!(bounded_amount("total", Money::from_minor(i64::MAX).checked_add(a)).is_err());
/// ```
pub fn bounded_amount(field: &str, amount: Option<Money>) -> ValidationResult<Money> {
    match amount {
        Some(amount) if amount <= MAX_AMOUNT => Ok(amount),
        _ => Err(amount_out_of_range(field)),
    }
}

fn amount_out_of_range(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_AMOUNT.minor(),
    }
}

/// Validates a tax rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on a document or cart.
///
/// ## Rules
/// - At least one line
/// - At most `max` lines
pub fn validate_line_count(field: &str, count: usize, max: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Rule(format!(
            "{} must contain at least one line",
            field
        )));
    }

    if count > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: max as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("RICE-5KG").is_ok());
        assert!(validate_sku("oil_1l").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_store_code() {
        assert!(validate_store_code("JKT01").is_ok());
        assert!(validate_store_code("").is_err());
        assert!(validate_store_code("JKT-01").is_err());
        assert!(validate_store_code("jkt01").is_err());
        assert!(validate_store_code("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity("quantity", Quantity::from_milli(1)).is_ok());
        assert!(validate_quantity("quantity", Quantity::from_units(12)).is_ok());
        assert!(validate_quantity("quantity", MAX_LINE_QUANTITY).is_ok());

        assert!(validate_quantity("quantity", Quantity::zero()).is_err());
        assert!(validate_quantity("quantity", Quantity::from_units(-1)).is_err());
        let over = MAX_LINE_QUANTITY + Quantity::from_milli(1);
        assert!(validate_quantity("quantity", over).is_err());
    }

    #[test]
    fn test_validate_counted_quantity() {
        assert!(validate_counted_quantity("physical_quantity", Quantity::zero()).is_ok());
        assert!(validate_counted_quantity("physical_quantity", Quantity::from_units(-1)).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason("reason", " expired ").unwrap(), "expired");
        assert_eq!(
            validate_reason("reason", ""),
            Err(ValidationError::required("reason"))
        );
        assert!(validate_reason("reason", &"x".repeat(501)).is_err());
    }

    #[test]
    fn test_normalize_note() {
        assert_eq!(normalize_note("notes", None).unwrap(), None);
        assert_eq!(normalize_note("notes", Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_note("notes", Some(" late delivery ")).unwrap(),
            Some("late delivery".to_string())
        );
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count("items", 1, 10).is_ok());
        assert!(validate_line_count("items", 0, 10).is_err());
        assert!(validate_line_count("items", 11, 10).is_err());
    }

    #[test]
    fn test_amounts_are_capped() {
        assert!(validate_amount("unit price", MAX_AMOUNT).is_ok());
        assert_eq!(
            validate_amount("unit price", Money::from_minor(1 << 62)),
            Err(ValidationError::OutOfRange {
                field: "unit price".to_string(),
                min: 0,
                max: MAX_AMOUNT.minor(),
            })
        );

        assert!(validate_payment_amount(MAX_AMOUNT).is_ok());
        assert!(validate_payment_amount(Money::from_minor(i64::MAX)).is_err());
        assert!(validate_payment_amount(Money::zero()).is_err());
    }

    #[test]
    fn test_bounded_amount() {
        assert_eq!(bounded_amount("total", Some(MAX_AMOUNT)), Ok(MAX_AMOUNT));
        assert!(bounded_amount("total", None).is_err());
        assert!(bounded_amount("total", MAX_AMOUNT.checked_add(Money::from_minor(1))).is_err());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1100).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }
}
