//! # Cash Sessions
//!
//! A cashier's shift at one store and the reconciliation of its drawer.
//!
//! ## Lifecycle
//! ```text
//! open ──close──► variance == 0 ──────────────► closed
//!          │
//!          └────► variance != 0 ──► pending_approval ──approve──► approved
//! ```
//!
//! `expected = opening + cash taken by completed sales in the session`,
//! `variance = actual - expected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::validation::{normalize_note, validate_amount, ValidationResult};

/// Status of a store session, persisted snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    /// Closed with a cash variance; waits for a supervisor.
    PendingApproval,
    Approved,
    /// Closed and balanced.
    Closed,
}

impl SessionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::PendingApproval => "pending_approval",
            SessionStatus::Approved => "approved",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cashier shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StoreSession {
    pub id: String,
    pub tenant_id: String,
    pub store_id: String,
    pub cashier_id: String,
    pub session_number: String,
    pub status: SessionStatus,
    pub opening_cash: Money,
    pub closing_cash: Option<Money>,
    pub expected_cash: Option<Money>,
    pub actual_cash: Option<Money>,
    pub variance: Option<Money>,
    pub variance_reason: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// What the cashier reports at the end of a shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseSession {
    /// Cash counted in the drawer.
    pub actual_cash: Money,
    /// Cash left in the drawer for the next shift, if any.
    pub closing_cash: Option<Money>,
    /// Recommended when the count is off; not enforced.
    pub variance_reason: Option<String>,
}

impl CloseSession {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_amount("actual cash", self.actual_cash)?;
        if let Some(closing) = self.closing_cash {
            validate_amount("closing cash", closing)?;
        }
        normalize_note("variance reason", self.variance_reason.as_deref())?;
        Ok(())
    }
}

/// Result of counting a drawer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reconciliation {
    pub expected_cash: Money,
    pub variance: Money,
    pub status: SessionStatus,
}

/// Reconciles a drawer count against the cash sales of the shift.
///
/// ```rust
/// use stockroom_core::money::Money;
/// use stockroom_core::session::{reconcile, SessionStatus};
///
/// let r = reconcile(
///     Money::from_minor(100_000),
///     Money::from_minor(50_000),
///     Money::from_minor(150_000),
/// );
/// assert_eq!(r.expected_cash.minor(), 150_000);
/// assert!(r.variance.is_zero());
/// assert_eq!(r.status, SessionStatus::Closed);
/// ```
pub fn reconcile(opening_cash: Money, cash_sales: Money, actual_cash: Money) -> Reconciliation {
    let expected_cash = opening_cash + cash_sales;
    let variance = actual_cash - expected_cash;
    let status = if variance.is_zero() {
        SessionStatus::Closed
    } else {
        SessionStatus::PendingApproval
    };

    Reconciliation {
        expected_cash,
        variance,
        status,
    }
}

/// Sales totals of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSummary {
    pub session_id: String,
    /// Completed transactions only.
    pub transaction_count: i64,
    pub voided_count: i64,
    /// Cash applied by completed transactions.
    pub cash_total: Money,
    /// Every other tender of completed transactions.
    pub non_cash_total: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_drawer_needs_approval() {
        let r = reconcile(
            Money::from_minor(100_000),
            Money::from_minor(50_000),
            Money::from_minor(149_000),
        );
        assert_eq!(r.variance.minor(), -1_000);
        assert_eq!(r.status, SessionStatus::PendingApproval);
    }

    #[test]
    fn test_over_drawer_needs_approval() {
        let r = reconcile(Money::zero(), Money::zero(), Money::from_minor(500));
        assert_eq!(r.variance.minor(), 500);
        assert_eq!(r.status, SessionStatus::PendingApproval);
    }

    #[test]
    fn test_close_input_validation() {
        let close = CloseSession {
            actual_cash: Money::from_minor(-1),
            closing_cash: None,
            variance_reason: None,
        };
        assert!(close.validate().is_err());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
    }
}
