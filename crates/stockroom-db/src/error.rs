//! # Database & Service Error Types
//!
//! [`DbError`] wraps sqlx failures. [`ServiceError`] is what every engine
//! returns: a business failure from stockroom-core or a database failure.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (stockroom-core)        │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError (this module)                    │                             │
//! │  ← adds context and categorization        │                             │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  ServiceError ──► code() + user_message() ──► ErrorBody (JSON)         │
//! │                                                                         │
//! │  The request layer only ever sees the ErrorBody. Raw SQL text is       │
//! │  logged, never returned.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use stockroom_core::{CoreError, ValidationError};
use thiserror::Error;
use tracing::error;

// =============================================================================
// Database Error
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second open session for the same cashier and store
    /// - Duplicate SKU or store code
    /// - Any UNIQUE index violation
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent product_id or store_id
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A CHECK constraint rejected the row.
    ///
    /// ## When This Occurs
    /// - A stock row would go negative outside the ledger's guarded update
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>[, <table>.<column>]"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Service Error
// =============================================================================

/// Error returned by the engines (ledger, workflow, POS, sessions).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A business rule refused the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The database failed underneath the operation.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Db(err.into())
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Core(err.into())
    }
}

/// Machine-readable error codes for callers.
///
/// ## Usage in a Client
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK': showStockWarning(e.message); break;
///   case 'INVALID_STATE':      refreshDocument(); break;
///   default:                   showError(e.message);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unknown id (404)
    NotFound,
    /// Malformed input (400)
    ValidationError,
    /// Action not allowed from the current status (409)
    InvalidState,
    /// A decrease would go below zero (422)
    InsufficientStock,
    /// Collides with existing state (409)
    Conflict,
    /// Storage failure (500)
    DatabaseError,
}

/// Serializable error body handed to the request layer.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for product ..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    /// Shorthand for a core `Conflict`.
    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Core(CoreError::Conflict(message.into()))
    }

    /// Shorthand for a core `NotFound`.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::Core(CoreError::not_found(entity, id))
    }

    /// The error's machine-readable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Core(core) => match core {
                CoreError::Validation(_) => ErrorCode::ValidationError,
                CoreError::NotFound { .. } => ErrorCode::NotFound,
                CoreError::InvalidStateTransition { .. } => ErrorCode::InvalidState,
                CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
                CoreError::Conflict(_) => ErrorCode::Conflict,
            },
            ServiceError::Db(db) => match db {
                DbError::NotFound { .. } => ErrorCode::NotFound,
                DbError::UniqueViolation { .. } => ErrorCode::Conflict,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => {
                    ErrorCode::ValidationError
                }
                _ => ErrorCode::DatabaseError,
            },
        }
    }

    /// A message safe to show to a user.
    ///
    /// Business errors keep their own text; database failures are logged
    /// and replaced by a generic sentence.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Core(core) => core.to_string(),
            ServiceError::Db(db) => match db {
                DbError::NotFound { entity, id } => format!("{} not found: {}", entity, id),
                DbError::UniqueViolation { .. } => "Record already exists".to_string(),
                DbError::ForeignKeyViolation { message } => {
                    error!("Foreign key violation: {}", message);
                    "Invalid reference".to_string()
                }
                DbError::CheckViolation { message } => {
                    error!("Check constraint violation: {}", message);
                    "Value rejected by a data rule".to_string()
                }
                DbError::ConnectionFailed(_) | DbError::PoolExhausted => {
                    "Database unavailable".to_string()
                }
                DbError::MigrationFailed(_) => "Database migration failed".to_string(),
                DbError::QueryFailed(e) | DbError::TransactionFailed(e) | DbError::Internal(e) => {
                    error!("Database operation failed: {}", e);
                    "Database operation failed".to_string()
                }
            },
        }
    }

    /// Builds the serializable body.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.user_message(),
        }
    }
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        err.to_body()
    }
}

/// Result type for engine operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::Quantity;

    #[test]
    fn test_core_codes() {
        let err: ServiceError = CoreError::InsufficientStock {
            product_id: "p1".into(),
            available: Quantity::from_units(2),
            requested: Quantity::from_units(3),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        let err: ServiceError =
            CoreError::invalid_transition("purchase order", "po-1", "draft", "approve").into();
        assert_eq!(err.code(), ErrorCode::InvalidState);

        let err: ServiceError = ValidationError::required("reason").into();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_query_failure_hides_sql() {
        let err: ServiceError =
            DbError::QueryFailed("near \"SELEC\": syntax error".to_string()).into();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
        assert_eq!(err.user_message(), "Database operation failed");
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err: ServiceError = DbError::duplicate("store_sessions.cashier_id", "c1").into();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_error_body_serialization() {
        let err = ServiceError::not_found("transaction", "t-1");
        let json = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "transaction not found: t-1");
    }
}
