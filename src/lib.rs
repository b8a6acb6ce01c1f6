//! GemiPrint cashbook backend.
//!
//! The cashbook (`keuangan`) is a chronologically ordered ledger of
//! debit/kredit entries from which twelve running-total columns are
//! derived: revenue, two expense buckets, the cash balance, net profit,
//! four partner draw balances, and three partner profit shares. This
//! crate owns that ledger end to end: the pure recalculation engine, the
//! SQLite store behind a narrow contract, entry lifecycle operations,
//! CSV import, and period close.
//!
//! Derived columns are never edited directly; they are recomputed by
//! folding [`calc::Accumulator`] over the ledger in canonical order.
//! Manual corrections go through per-column overrides, which pin a value
//! and shift the running baseline for every later row.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod archive;
pub mod calc;
pub mod cashbook;
pub mod db;
pub mod entry;
pub mod error;
pub mod import;
pub mod store;

pub use db::{init as init_db, DbState};
pub use entry::{
    Category, CashBookEntry, DerivedField, DerivedFields, EntryPatch, NewEntry, Overrides,
};
pub use error::{CashbookError, Result};

/// Initialize structured logging (console, env-filtered).
///
/// Safe to call once at process start; embedding apps that install their
/// own subscriber should skip this.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gemiprint_cashbook=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}
