//! Cashbook entry lifecycle: create, edit, delete, reorder, override.
//!
//! Two recompute paths share one rule set ([`crate::calc::Accumulator`]):
//!
//! - **Full recalculation** ([`recalculate`]): scan all active rows in
//!   canonical order, fold from zero, rewrite every row's derived columns.
//!   Runs after any edit, delete, reorder, override change, or archival
//!   change, since any of those can touch a non-trailing row.
//! - **Trailing append** (inside [`create_entry`] only): seed the
//!   accumulator from the last active row and fold the new entry once.
//!   The fold is not exposed anywhere else, so it cannot be misapplied to
//!   backdated or edited rows.
//!
//! Every operation takes the connection mutex and runs inside a single
//! transaction; a failure mid-write rolls the whole pass back.

use chrono::Utc;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calc::{fold_derived, Accumulator};
use crate::db::DbState;
use crate::entry::{
    validate_amounts, CashBookEntry, DerivedField, DerivedFields, EntryPatch, NewEntry, Overrides,
};
use crate::error::{CashbookError, Result};
use crate::store::{LedgerStore, SqliteLedgerStore};

/// Outcome of [`create_entry`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct CreatedEntry {
    pub id: String,
    pub urutan_tampilan: i64,
    pub derived: DerivedFields,
}

// ---------------------------------------------------------------------------
// Batch recalculation
// ---------------------------------------------------------------------------

/// Recompute every active row's derived columns from scratch.
///
/// Returns the number of rows rewritten. Idempotent: rerunning on
/// unchanged data writes back identical values.
pub fn recalculate(db: &DbState) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;
    let count = recalculate_in(&tx)?;
    tx.commit()?;
    info!(rows = count, "Cashbook recalculated");
    Ok(count)
}

/// The store half of a batch pass, against an open transaction. Shared by
/// every operation that must recompute after mutating rows, including the
/// import and archive modules.
pub(crate) fn recalculate_in(conn: &Connection) -> Result<usize> {
    let store = SqliteLedgerStore::new(conn);
    let entries = store.list_active()?;
    let derived = fold_derived(&entries);
    for (entry, fields) in entries.iter().zip(&derived) {
        store.write_derived_fields(&entry.id, fields)?;
    }
    Ok(entries.len())
}

// ---------------------------------------------------------------------------
// Create (trailing append fast path)
// ---------------------------------------------------------------------------

/// Append a new entry at the tail of the ledger.
///
/// Derived columns come from one accumulator fold seeded from the last
/// active row, with no full rescan. Equivalent to a batch pass because the
/// tail row's stored totals are the fold state of the whole prefix.
pub fn create_entry(db: &DbState, new: &NewEntry) -> Result<CreatedEntry> {
    validate_amounts(new.debit, new.kredit)?;

    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    let (id, urutan, derived) = {
        let store = SqliteLedgerStore::new(&tx);
        let urutan = store.next_display_order()?;
        let mut acc = match store.last_active_entry()? {
            Some(last) => Accumulator::seeded_from(&last),
            None => Accumulator::zero(),
        };

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let candidate = CashBookEntry {
            id: id.clone(),
            tanggal: new.tanggal,
            kategori_transaksi: new.kategori_transaksi.clone(),
            debit: new.debit,
            kredit: new.kredit,
            keperluan: new.keperluan.clone(),
            catatan: new.catatan.clone(),
            urutan_tampilan: urutan,
            dibuat_oleh: new.dibuat_oleh.clone(),
            dibuat_pada: now.clone(),
            diperbarui_pada: None,
            diarsipkan_pada: None,
            label_arsip: None,
            derived: DerivedFields::default(),
            overrides: Overrides::default(),
        };
        let derived = acc.apply(&candidate);

        tx.execute(
            "INSERT INTO keuangan
                (id, tanggal, kategori_transaksi, debit, kredit, keperluan,
                 catatan, dibuat_oleh, dibuat_pada, urutan_tampilan,
                 omzet, biaya_operasional, biaya_bahan, saldo, laba_bersih,
                 kasbon_anwar, kasbon_suri, kasbon_cahaya, kasbon_dinil,
                 bagi_hasil_anwar, bagi_hasil_suri, bagi_hasil_gemi)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                id,
                new.tanggal.format("%Y-%m-%d").to_string(),
                new.kategori_transaksi.as_str(),
                new.debit.to_string(),
                new.kredit.to_string(),
                new.keperluan,
                new.catatan,
                new.dibuat_oleh,
                now,
                urutan,
                derived.omzet.to_string(),
                derived.biaya_operasional.to_string(),
                derived.biaya_bahan.to_string(),
                derived.saldo.to_string(),
                derived.laba_bersih.to_string(),
                derived.kasbon_anwar.to_string(),
                derived.kasbon_suri.to_string(),
                derived.kasbon_cahaya.to_string(),
                derived.kasbon_dinil.to_string(),
                derived.bagi_hasil_anwar.to_string(),
                derived.bagi_hasil_suri.to_string(),
                derived.bagi_hasil_gemi.to_string(),
            ],
        )?;

        (id, urutan, derived)
    };
    tx.commit()?;

    info!(
        id = %id,
        kategori = new.kategori_transaksi.as_str(),
        urutan = urutan,
        "Cashbook entry created"
    );
    Ok(CreatedEntry {
        id,
        urutan_tampilan: urutan,
        derived,
    })
}

// ---------------------------------------------------------------------------
// Edit / delete
// ---------------------------------------------------------------------------

/// Load an entry and refuse to touch it if it belongs to a closed period.
fn active_entry_or_err(conn: &Connection, id: &str) -> Result<CashBookEntry> {
    let store = SqliteLedgerStore::new(conn);
    let entry = store
        .get_entry(id)?
        .ok_or_else(|| CashbookError::EntryNotFound { id: id.to_string() })?;
    if entry.diarsipkan_pada.is_some() {
        return Err(CashbookError::EntryArchived { id: id.to_string() });
    }
    Ok(entry)
}

/// Edit an active entry's base columns, then run a full recalculation.
pub fn update_entry(db: &DbState, id: &str, patch: &EntryPatch) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    let current = active_entry_or_err(&tx, id)?;

    let tanggal = patch.tanggal.unwrap_or(current.tanggal);
    let kategori = patch
        .kategori_transaksi
        .clone()
        .unwrap_or(current.kategori_transaksi);
    let debit = patch.debit.unwrap_or(current.debit);
    let kredit = patch.kredit.unwrap_or(current.kredit);
    let keperluan = patch.keperluan.clone().unwrap_or(current.keperluan);
    let catatan = patch.catatan.clone().unwrap_or(current.catatan);
    validate_amounts(debit, kredit)?;

    tx.execute(
        "UPDATE keuangan SET
            tanggal = ?1, kategori_transaksi = ?2, debit = ?3, kredit = ?4,
            keperluan = ?5, catatan = ?6, diperbarui_pada = ?7
         WHERE id = ?8",
        params![
            tanggal.format("%Y-%m-%d").to_string(),
            kategori.as_str(),
            debit.to_string(),
            kredit.to_string(),
            keperluan,
            catatan,
            Utc::now().to_rfc3339(),
            id,
        ],
    )?;

    let count = recalculate_in(&tx)?;
    tx.commit()?;
    info!(id = %id, rows = count, "Cashbook entry updated, ledger recalculated");
    Ok(count)
}

/// Physically delete an active entry, then run a full recalculation.
/// Archived rows are immutable history and cannot be deleted.
pub fn delete_entry(db: &DbState, id: &str) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    active_entry_or_err(&tx, id)?;
    tx.execute("DELETE FROM keuangan WHERE id = ?1", params![id])?;

    let count = recalculate_in(&tx)?;
    tx.commit()?;
    info!(id = %id, rows = count, "Cashbook entry deleted, ledger recalculated");
    Ok(count)
}

/// Delete every active entry. Archived periods are preserved.
pub fn delete_all_active(db: &DbState) -> Result<usize> {
    let guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let deleted = guard.execute("DELETE FROM keuangan WHERE diarsipkan_pada IS NULL", [])?;
    info!(rows = deleted, "Active cashbook cleared");
    Ok(deleted)
}

// ---------------------------------------------------------------------------
// Reorder
// ---------------------------------------------------------------------------

/// Rewrite `urutan_tampilan` to match the given id sequence (position 0
/// first), then run a full recalculation.
pub fn reorder(db: &DbState, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    let mut moved = 0usize;
    {
        let mut stmt = tx.prepare("UPDATE keuangan SET urutan_tampilan = ?1 WHERE id = ?2")?;
        for (index, id) in ids.iter().enumerate() {
            moved += stmt.execute(params![index as i64, id])?;
        }
    }
    if moved != ids.len() {
        warn!(
            requested = ids.len(),
            moved = moved,
            "Reorder matched fewer rows than requested"
        );
    }

    let count = recalculate_in(&tx)?;
    tx.commit()?;
    info!(rows = count, "Cashbook reordered and recalculated");
    Ok(count)
}

// ---------------------------------------------------------------------------
// Manual overrides
// ---------------------------------------------------------------------------

/// Pin one derived column of an active entry to a manual value, then run
/// a full recalculation so later rows continue from the pin.
pub fn set_override(db: &DbState, id: &str, field: DerivedField, value: Decimal) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    active_entry_or_err(&tx, id)?;
    // Column names come from a closed enum, not caller input.
    let sql = format!(
        "UPDATE keuangan SET {value_col} = ?1, {flag_col} = 1, diperbarui_pada = ?2 WHERE id = ?3",
        value_col = field.column(),
        flag_col = field.flag_column(),
    );
    tx.execute(&sql, params![value.to_string(), Utc::now().to_rfc3339(), id])?;

    let count = recalculate_in(&tx)?;
    tx.commit()?;
    info!(id = %id, field = field.column(), %value, "Override set, ledger recalculated");
    Ok(count)
}

/// Clear one derived column's pin; the formula takes over again from the
/// preceding row's state on the recalculation that follows.
pub fn clear_override(db: &DbState, id: &str, field: DerivedField) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    active_entry_or_err(&tx, id)?;
    let sql = format!(
        "UPDATE keuangan SET {flag_col} = 0, diperbarui_pada = ?1 WHERE id = ?2",
        flag_col = field.flag_column(),
    );
    tx.execute(&sql, params![Utc::now().to_rfc3339(), id])?;

    let count = recalculate_in(&tx)?;
    tx.commit()?;
    info!(id = %id, field = field.column(), "Override cleared, ledger recalculated");
    Ok(count)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Active entries, newest first (display order for the cashbook screen).
pub fn list_entries(db: &DbState) -> Result<Vec<CashBookEntry>> {
    let guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let store = SqliteLedgerStore::new(&guard);
    let mut entries = store.list_active()?;
    entries.reverse();
    Ok(entries)
}

/// One entry by id, archived or not.
pub fn get_entry(db: &DbState, id: &str) -> Result<Option<CashBookEntry>> {
    let guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    SqliteLedgerStore::new(&guard).get_entry(id)
}

// ===========================================================================
// Tests
// ===========================================================================
