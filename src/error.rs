//! Error type for cashbook operations.
//!
//! Validation failures are rejected before any row is touched; store
//! failures abort the enclosing transaction, leaving the ledger as it was.

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CashbookError>;

#[derive(Debug, Error)]
pub enum CashbookError {
    /// Both debit and kredit are nonzero on the same entry.
    #[error("entry cannot carry both debit ({debit}) and kredit ({kredit})")]
    BothSidesNonzero { debit: Decimal, kredit: Decimal },

    /// Neither debit nor kredit is filled in.
    #[error("entry must carry either a debit or a kredit amount")]
    BothSidesZero,

    /// A monetary amount is negative.
    #[error("amount must be non-negative, got {amount}")]
    NegativeAmount { amount: Decimal },

    /// Category string outside the allow-list (strict parsing).
    #[error("unknown transaction category: {raw:?}")]
    UnknownCategory { raw: String },

    /// Date string that none of the accepted formats matched.
    #[error("unparseable date: {raw:?}")]
    InvalidDate { raw: String },

    /// CSV input that cannot be imported at all (empty, missing columns).
    #[error("invalid CSV: {reason}")]
    InvalidCsv { reason: String },

    /// No entry with the given id.
    #[error("cashbook entry not found: {id}")]
    EntryNotFound { id: String },

    /// Mutation attempted on an archived (closed-period) row.
    #[error("entry {id} is archived and cannot be modified")]
    EntryArchived { id: String },

    /// No archived rows match the requested period.
    #[error("archived period not found: {label} @ {archived_at}")]
    PeriodNotFound { label: String, archived_at: String },

    /// A stored monetary column failed to parse as a decimal.
    #[error("corrupt decimal in column {column}: {raw:?}")]
    CorruptDecimal { column: &'static str, raw: String },

    #[error("database: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
