//! # Workflow State Machine
//!
//! The single approval state machine shared by all four workflow document
//! kinds. The database layer asks [`plan_transition`] whether an action is
//! legal before it issues the status-guarded update.
//!
//! ## State Diagram
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create                                                                │
//! │     │        update / delete (draft only)                              │
//! │     ▼       ┌────┐                                                     │
//! │  ┌───────┐◄─┘    │                                                     │
//! │  │ draft │───────┘                                                     │
//! │  └───┬───┘◄──────────────────────┐ reopen                              │
//! │      │ submit                    │ (purchase order, unpacking only)    │
//! │      ▼                           │                                     │
//! │  ┌───────────┐  reject    ┌──────┴───┐                                 │
//! │  │ submitted │───────────►│ rejected │                                 │
//! │  └─────┬─────┘            └──────────┘                                 │
//! │        │ approve                                                        │
//! │        ▼                                                                │
//! │  ┌──────────┐  complete   ┌─────────────────────────────────┐          │
//! │  │ approved │────────────►│ received | applied              │          │
//! │  └──────────┘  (ledger)   │ finalized | processed           │          │
//! │                           └─────────────────────────────────┘          │
//! │                                                                         │
//! │  Only `complete` touches the stock ledger, and only once.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Document Kind
// =============================================================================

/// The four workflow document kinds.
///
/// Also the `kind` of a [`MovementReference`](crate::types::MovementReference),
/// persisted snake_case in `stock_movements.reference_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PurchaseOrder,
    StockAdjustment,
    StockOpname,
    Unpacking,
}

impl DocumentKind {
    /// Number prefix (`PO-20250101-001`).
    pub const fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "PO",
            DocumentKind::StockAdjustment => "SA",
            DocumentKind::StockOpname => "SO",
            DocumentKind::Unpacking => "UP",
        }
    }

    /// Human-readable name used in errors and logs.
    pub const fn label(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "purchase order",
            DocumentKind::StockAdjustment => "stock adjustment",
            DocumentKind::StockOpname => "stock opname",
            DocumentKind::Unpacking => "unpacking",
        }
    }

    /// Status reached by the terminal effect.
    pub const fn terminal_status(&self) -> DocumentStatus {
        match self {
            DocumentKind::PurchaseOrder => DocumentStatus::Received,
            DocumentKind::StockAdjustment => DocumentStatus::Applied,
            DocumentKind::StockOpname => DocumentStatus::Finalized,
            DocumentKind::Unpacking => DocumentStatus::Processed,
        }
    }

    /// Verb of the terminal effect (`receive`, `apply`, ...).
    pub const fn completion_verb(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "receive",
            DocumentKind::StockAdjustment => "apply",
            DocumentKind::StockOpname => "finalize",
            DocumentKind::Unpacking => "process",
        }
    }

    /// Whether a rejected document may return to draft.
    ///
    /// Rejection is final for adjustments and opnames.
    pub const fn allows_reopen(&self) -> bool {
        matches!(self, DocumentKind::PurchaseOrder | DocumentKind::Unpacking)
    }

    /// Header table.
    pub const fn table(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "purchase_orders",
            DocumentKind::StockAdjustment => "stock_adjustments",
            DocumentKind::StockOpname => "stock_opnames",
            DocumentKind::Unpacking => "unpacking_transactions",
        }
    }

    /// Column holding the terminal-effect timestamp.
    pub const fn completed_at_column(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "received_at",
            DocumentKind::StockAdjustment => "applied_at",
            DocumentKind::StockOpname => "finalized_at",
            DocumentKind::Unpacking => "processed_at",
        }
    }

    /// Column holding the terminal-effect actor.
    pub const fn completed_by_column(&self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "received_by",
            DocumentKind::StockAdjustment => "applied_by",
            DocumentKind::StockOpname => "finalized_by",
            DocumentKind::Unpacking => "processed_by",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// Status of a workflow document, persisted lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    /// Purchase order terminal.
    Received,
    /// Stock adjustment terminal.
    Applied,
    /// Stock opname terminal.
    Finalized,
    /// Unpacking terminal.
    Processed,
}

impl DocumentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::Received => "received",
            DocumentStatus::Applied => "applied",
            DocumentStatus::Finalized => "finalized",
            DocumentStatus::Processed => "processed",
        }
    }

    /// True once the terminal effect has run.
    pub const fn is_completed(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Received
                | DocumentStatus::Applied
                | DocumentStatus::Finalized
                | DocumentStatus::Processed
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Actions & Transitions
// =============================================================================

/// Something a user asks a document to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowAction {
    Update,
    Delete,
    Submit,
    Approve,
    Reject,
    Reopen,
    /// The kind-specific terminal effect.
    Complete,
}

impl WorkflowAction {
    /// Verb for messages; `Complete` takes the kind's own verb.
    pub const fn verb(&self, kind: DocumentKind) -> &'static str {
        match self {
            WorkflowAction::Update => "update",
            WorkflowAction::Delete => "delete",
            WorkflowAction::Submit => "submit",
            WorkflowAction::Approve => "approve",
            WorkflowAction::Reject => "reject",
            WorkflowAction::Reopen => "reopen",
            WorkflowAction::Complete => kind.completion_verb(),
        }
    }
}

/// A legal status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

/// The status `action` must start from, and where it leads.
///
/// Returns `None` when the action is never legal for this kind.
pub fn transition_for(kind: DocumentKind, action: WorkflowAction) -> Option<Transition> {
    let (from, to) = match action {
        WorkflowAction::Update | WorkflowAction::Delete => {
            (DocumentStatus::Draft, DocumentStatus::Draft)
        }
        WorkflowAction::Submit => (DocumentStatus::Draft, DocumentStatus::Submitted),
        WorkflowAction::Approve => (DocumentStatus::Submitted, DocumentStatus::Approved),
        WorkflowAction::Reject => (DocumentStatus::Submitted, DocumentStatus::Rejected),
        WorkflowAction::Reopen if kind.allows_reopen() => {
            (DocumentStatus::Rejected, DocumentStatus::Draft)
        }
        WorkflowAction::Reopen => return None,
        WorkflowAction::Complete => (DocumentStatus::Approved, kind.terminal_status()),
    };
    Some(Transition { from, to })
}

/// Checks `action` against the document's current status.
///
/// ## Example
/// ```rust
/// use stockroom_core::workflow::*;
///
/// let t = plan_transition(
///     DocumentKind::PurchaseOrder,
///     "po-1",
///     DocumentStatus::Approved,
///     WorkflowAction::Complete,
/// )
/// .unwrap();
/// assert_eq!(t.to, DocumentStatus::Received);
///
/// // draft cannot skip submission
/// assert!(plan_transition(
///     DocumentKind::PurchaseOrder,
///     "po-1",
///     DocumentStatus::Draft,
///     WorkflowAction::Approve,
/// )
/// .is_err());
/// ```
pub fn plan_transition(
    kind: DocumentKind,
    id: &str,
    current: DocumentStatus,
    action: WorkflowAction,
) -> CoreResult<Transition> {
    match transition_for(kind, action) {
        Some(transition) if transition.from == current => Ok(transition),
        _ => Err(CoreError::invalid_transition(
            kind.label(),
            id,
            current.as_str(),
            action.verb(kind),
        )),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
