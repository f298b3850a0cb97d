//! # stockroom-core: Pure Back-Office Domain Logic
//!
//! The stock ledger, workflow documents, POS transactions and cash sessions
//! of a multi-tenant retail back office, as pure types and functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request layer (HTTP/RPC, not in this repo)         │   │
//! │  │    authenticates the user, builds an Actor, calls the engines   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    stockroom-db (engines)                       │   │
//! │  │   Sequencer, StockLedger, WorkflowEngine, PosEngine,            │   │
//! │  │   SessionReconciler over SQLite                                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plans transitions, prices carts       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockroom-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │ workflow │ │documents │ │   pos    │ │ session  │          │   │
//! │  │   │  state   │ │ PO SA SO │ │ pricing  │ │reconcile │          │   │
//! │  │   │ machine  │ │    UP    │ │ payments │ │          │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │  money   │ │ quantity │ │numbering │ │validation│          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Actor, Store, Product, stock levels and movements
//! - [`money`] - Money in minor units, tax and rounding
//! - [`quantity`] - Fixed-point stock quantities
//! - [`workflow`] - The shared document state machine
//! - [`documents`] - Purchase orders, adjustments, opnames, unpackings
//! - [`pos`] - Sales, held carts and cart pricing
//! - [`session`] - Cashier sessions and drawer reconciliation
//! - [`numbering`] - Document number formats
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::money::Money;
//! use stockroom_core::session::{reconcile, SessionStatus};
//!
//! let r = reconcile(
//!     Money::from_minor(100_000),
//!     Money::from_minor(50_000),
//!     Money::from_minor(149_500),
//! );
//! assert_eq!(r.variance.minor(), -500);
//! assert_eq!(r.status, SessionStatus::PendingApproval);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod documents;
pub mod error;
pub mod money;
pub mod numbering;
pub mod pos;
pub mod quantity;
pub mod session;
pub mod types;
pub mod validation;
pub mod workflow;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, RoundingMode, RoundingRule};
pub use quantity::Quantity;
pub use types::*;
pub use workflow::{DocumentKind, DocumentStatus, WorkflowAction};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tenant used by the seed data and single-tenant deployments.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum lines on a purchase order or stock opname.
pub const MAX_DOCUMENT_LINES: usize = 500;

/// Largest quantity accepted on a single line.
pub const MAX_LINE_QUANTITY: Quantity = Quantity::from_units(1_000_000);

/// Largest amount accepted for a price, payment or computed total.
pub const MAX_AMOUNT: Money = Money::from_minor(1_000_000_000_000_000);
