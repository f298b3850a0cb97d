//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule failures (the taxonomy below)    │
//! │  └── ValidationError  - Malformed input, caught before any mutation    │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - CoreError | DbError, what callers receive      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → request layer      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Taxonomy
//! | Variant                  | Meaning                                       |
//! |--------------------------|-----------------------------------------------|
//! | `Validation`             | malformed input                               |
//! | `NotFound`               | unknown document / transaction / session id   |
//! | `InvalidStateTransition` | e.g. approving a document still in `draft`    |
//! | `InsufficientStock`      | a decrease would drive quantity below zero    |
//! | `Conflict`               | duplicate open session for a cashier/store    |

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Core business errors.
///
/// Every expected business failure is a variant here; nothing in the core
/// signals a business failure by panicking.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Entity cannot be found.
    ///
    /// ## When This Occurs
    /// - Document, transaction, session or held cart id doesn't exist
    /// - Product or store referenced by an input doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The entity is not in a state that allows the requested action.
    ///
    /// ## When This Occurs
    /// - Approving a draft purchase order (must be submitted first)
    /// - Receiving a purchase order twice
    /// - Voiding an already voided transaction
    /// - Closing a session that is not open
    #[error("Cannot {action} {entity} {id} while it is {from}")]
    InvalidStateTransition {
        entity: String,
        id: String,
        from: String,
        action: String,
    },

    /// A stock decrease would drive on-hand quantity below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 3 × P at store S
    ///      │
    ///      ▼
    /// Check stock: available=2
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: P, available: 2, requested: 3 }
    ///      │
    ///      ▼
    /// Nothing is written, stock stays at 2
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: Quantity,
        requested: Quantity,
    },

    /// The operation collides with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidStateTransition error.
    pub fn invalid_transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        from: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidStateTransition {
            entity: entity.into(),
            id: id.into(),
            from: from.into(),
            action: action.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements. They are always
/// raised before any write.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid quantity literal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A rule spanning several fields was broken.
    #[error("{0}")]
    Rule(String),
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Shorthand for [`ValidationError::MustBePositive`].
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }

    /// Shorthand for [`ValidationError::Rule`].
    pub fn rule(message: impl Into<String>) -> Self {
        ValidationError::Rule(message.into())
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            product_id: "P1".to_string(),
            available: Quantity::from_units(2),
            requested: Quantity::from_units(3),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product P1: available 2, requested 3"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::invalid_transition("purchase order", "po-1", "draft", "approve");
        assert_eq!(
            err.to_string(),
            "Cannot approve purchase order po-1 while it is draft"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("reason").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: reason is required");
    }
}
