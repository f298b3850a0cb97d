//! # Repository Module
//!
//! Lookups for the collaborator entities the engines depend on.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engines (workflow, POS, sessions)                                     │
//! │       │                                                                 │
//! │       │  db.stores().require(store_id)                                 │
//! │       │  db.products().find_by_id(product_id)                          │
//! │       ▼                                                                 │
//! │  StoreRepository / ProductRepository                                   │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Stock quantities are NOT written here: that is the ledger's job.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product catalogue
//! - [`StoreRepository`](store::StoreRepository) - Stores and their pricing configuration

pub mod product;
pub mod store;
