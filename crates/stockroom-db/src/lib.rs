//! # stockroom-db: Back-Office Engines over SQLite
//!
//! Every persistent operation of the stockroom lives here: the stock
//! ledger, document numbering, workflow documents, POS transactions and
//! cash sessions. Pure rules (pricing, transitions, reconciliation) come
//! from `stockroom-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  Request layer (HTTP handler, CLI, job)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockroom-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   │   │
//! │  │   │ WorkflowEngine│  │  PosEngine   │   │ SessionReconciler│   │   │
//! │  │   └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘   │   │
//! │  │          │   UnitOfWork     │                    │             │   │
//! │  │          ▼                  ▼                    ▼             │   │
//! │  │   ┌──────────────┐   ┌──────────────┐                          │   │
//! │  │   │  Sequencer   │   │ Stock Ledger │  (only stock writer)     │   │
//! │  │   └──────────────┘   └──────────────┘                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL) - schema from migrations/sqlite                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and engine accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and service error types
//! - [`ledger`] - Stock levels and movements
//! - [`sequencer`] - Gap-free document numbers
//! - [`workflow`] - Purchase orders, adjustments, opnames, unpacking
//! - [`pos`] - Sales, voids and held carts
//! - [`session`] - Cash session open/close/approve
//! - [`config`] / [`telemetry`] - Config file and tracing setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("stockroom.db")).await?;
//!
//! let session = db.sessions().open_session(&store_id, opening_cash, &cashier).await?;
//! let sale = db.pos().create_transaction(cart, &cashier).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod pos;
pub mod repository;
pub mod sequencer;
pub mod session;
pub mod telemetry;
#[cfg(test)]
mod testing;
mod uow;
pub mod workflow;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::StockroomConfig;
pub use error::{DbError, ErrorCode, ServiceError};
pub use pool::{Database, DbConfig};

// Engine re-exports for convenience
pub use ledger::StockLedger;
pub use pos::PosEngine;
pub use repository::product::ProductRepository;
pub use repository::store::StoreRepository;
pub use sequencer::Sequencer;
pub use session::SessionReconciler;
pub use workflow::WorkflowEngine;
