//! # Document Numbers
//!
//! Formats the human-readable numbers issued by the sequencer.
//!
//! ```text
//! ┌──────────────┬────────────────────────────────┬───────────────────────┐
//! │ Kind         │ Format                         │ Counter scope         │
//! ├──────────────┼────────────────────────────────┼───────────────────────┤
//! │ PO SA SO UP  │ PO-20250314-007                │ tenant + day          │
//! │ TRX SES HOLD │ TRX-JKT01-20250314-0042        │ store + day           │
//! └──────────────┴────────────────────────────────┴───────────────────────┘
//! ```
//!
//! The counter itself lives in the database (`document_sequences`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::workflow::DocumentKind;

/// Everything that gets a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    PurchaseOrder,
    StockAdjustment,
    StockOpname,
    Unpacking,
    Transaction,
    Session,
    Hold,
}

/// What a counter is partitioned by besides the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceScope {
    Tenant,
    Store,
}

impl SequenceKind {
    pub const fn prefix(&self) -> &'static str {
        match self {
            SequenceKind::PurchaseOrder => DocumentKind::PurchaseOrder.prefix(),
            SequenceKind::StockAdjustment => DocumentKind::StockAdjustment.prefix(),
            SequenceKind::StockOpname => DocumentKind::StockOpname.prefix(),
            SequenceKind::Unpacking => DocumentKind::Unpacking.prefix(),
            SequenceKind::Transaction => "TRX",
            SequenceKind::Session => "SES",
            SequenceKind::Hold => "HOLD",
        }
    }

    pub const fn scope(&self) -> SequenceScope {
        match self {
            SequenceKind::PurchaseOrder
            | SequenceKind::StockAdjustment
            | SequenceKind::StockOpname
            | SequenceKind::Unpacking => SequenceScope::Tenant,
            SequenceKind::Transaction | SequenceKind::Session | SequenceKind::Hold => {
                SequenceScope::Store
            }
        }
    }

    /// Zero-padding of the counter.
    pub const fn width(&self) -> usize {
        match self.scope() {
            SequenceScope::Tenant => 3,
            SequenceScope::Store => 4,
        }
    }
}

impl From<DocumentKind> for SequenceKind {
    fn from(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::PurchaseOrder => SequenceKind::PurchaseOrder,
            DocumentKind::StockAdjustment => SequenceKind::StockAdjustment,
            DocumentKind::StockOpname => SequenceKind::StockOpname,
            DocumentKind::Unpacking => SequenceKind::Unpacking,
        }
    }
}

/// Day key of a counter and the date part of a number.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Builds the number for counter value `seq`.
///
/// `store_code` is only used by store-scoped kinds. Values wider than the
/// padding are printed in full.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use stockroom_core::numbering::{format_number, SequenceKind};
///
/// let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
/// assert_eq!(format_number(SequenceKind::PurchaseOrder, "JKT01", day, 7), "PO-20250314-007");
/// assert_eq!(format_number(SequenceKind::Transaction, "JKT01", day, 42), "TRX-JKT01-20250314-0042");
/// ```
pub fn format_number(kind: SequenceKind, store_code: &str, date: NaiveDate, seq: i64) -> String {
    let width = kind.width();
    match kind.scope() {
        SequenceScope::Tenant => {
            format!("{}-{}-{:0width$}", kind.prefix(), day_key(date), seq)
        }
        SequenceScope::Store => format!(
            "{}-{}-{}-{:0width$}",
            kind.prefix(),
            store_code,
            day_key(date),
            seq
        ),
    }
}
