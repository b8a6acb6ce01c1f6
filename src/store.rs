//! Ledger store contract and the SQLite implementation.
//!
//! The engine only ever touches the ledger through [`LedgerStore`]: a full
//! active scan, a point write of the twelve derived columns, the tail row,
//! and the next display position. Keeping the surface this narrow means
//! the recalculation paths stay unit-testable against any backing table.

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::calc::canonical_sort;
use crate::entry::{CashBookEntry, Category, DerivedFields, Overrides};
use crate::error::{CashbookError, Result};

/// Narrow read/write contract the recalculation engine depends on.
pub trait LedgerStore {
    /// All entries with `diarsipkan_pada IS NULL`, in canonical order.
    fn list_active(&self) -> Result<Vec<CashBookEntry>>;

    /// Persist the twelve computed columns for one entry. Touches nothing
    /// else.
    fn write_derived_fields(&self, id: &str, fields: &DerivedFields) -> Result<()>;

    /// Tail of canonical order among active entries, if any.
    fn last_active_entry(&self) -> Result<Option<CashBookEntry>>;

    /// `max(urutan_tampilan) + 1` over the whole table (1 when empty).
    /// Archived rows keep their positions, so the maximum spans them too:
    /// a restored period must never collide with rows created after the
    /// close.
    fn next_display_order(&self) -> Result<i64>;
}

/// Column list shared by every entry SELECT, in mapping order.
pub(crate) const ENTRY_COLUMNS: &str = "id, tanggal, kategori_transaksi, debit, kredit, \
     keperluan, catatan, dibuat_oleh, dibuat_pada, diperbarui_pada, \
     diarsipkan_pada, label_arsip, urutan_tampilan, \
     omzet, biaya_operasional, biaya_bahan, saldo, laba_bersih, \
     kasbon_anwar, kasbon_suri, kasbon_cahaya, kasbon_dinil, \
     bagi_hasil_anwar, bagi_hasil_suri, bagi_hasil_gemi, \
     override_omzet, override_biaya_operasional, override_biaya_bahan, \
     override_saldo, override_laba_bersih, override_kasbon_anwar, \
     override_kasbon_suri, override_kasbon_cahaya, override_kasbon_dinil, \
     override_bagi_hasil_anwar, override_bagi_hasil_suri, override_bagi_hasil_gemi";

/// Stored row before decimal/date parsing.
struct RawEntry {
    id: String,
    tanggal: String,
    kategori_transaksi: String,
    debit: String,
    kredit: String,
    keperluan: String,
    catatan: Option<String>,
    dibuat_oleh: Option<String>,
    dibuat_pada: String,
    diperbarui_pada: Option<String>,
    diarsipkan_pada: Option<String>,
    label_arsip: Option<String>,
    urutan_tampilan: i64,
    derived: [String; 12],
    flags: [bool; 12],
}

fn map_raw(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    let mut derived: [String; 12] = Default::default();
    for (i, slot) in derived.iter_mut().enumerate() {
        *slot = row.get(13 + i)?;
    }
    let mut flags = [false; 12];
    for (i, slot) in flags.iter_mut().enumerate() {
        *slot = row.get::<_, i64>(25 + i)? != 0;
    }
    Ok(RawEntry {
        id: row.get(0)?,
        tanggal: row.get(1)?,
        kategori_transaksi: row.get(2)?,
        debit: row.get(3)?,
        kredit: row.get(4)?,
        keperluan: row.get(5)?,
        catatan: row.get(6)?,
        dibuat_oleh: row.get(7)?,
        dibuat_pada: row.get(8)?,
        diperbarui_pada: row.get(9)?,
        diarsipkan_pada: row.get(10)?,
        label_arsip: row.get(11)?,
        urutan_tampilan: row.get(12)?,
        derived,
        flags,
    })
}

pub(crate) fn parse_money(raw: &str, column: &'static str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|_| CashbookError::CorruptDecimal {
        column,
        raw: raw.to_string(),
    })
}

const DERIVED_COLUMN_NAMES: [&str; 12] = [
    "omzet",
    "biaya_operasional",
    "biaya_bahan",
    "saldo",
    "laba_bersih",
    "kasbon_anwar",
    "kasbon_suri",
    "kasbon_cahaya",
    "kasbon_dinil",
    "bagi_hasil_anwar",
    "bagi_hasil_suri",
    "bagi_hasil_gemi",
];

impl RawEntry {
    fn into_entry(self) -> Result<CashBookEntry> {
        let tanggal = NaiveDate::parse_from_str(&self.tanggal, "%Y-%m-%d").map_err(|_| {
            CashbookError::InvalidDate {
                raw: self.tanggal.clone(),
            }
        })?;

        let mut parsed = [Decimal::ZERO; 12];
        for (i, raw) in self.derived.iter().enumerate() {
            parsed[i] = parse_money(raw, DERIVED_COLUMN_NAMES[i])?;
        }
        let [omzet, biaya_operasional, biaya_bahan, saldo, laba_bersih, kasbon_anwar, kasbon_suri, kasbon_cahaya, kasbon_dinil, bagi_hasil_anwar, bagi_hasil_suri, bagi_hasil_gemi] =
            parsed;
        let [f_omzet, f_ops, f_bahan, f_saldo, f_laba, f_ka, f_ks, f_kc, f_kd, f_ba, f_bs, f_bg] =
            self.flags;

        Ok(CashBookEntry {
            tanggal,
            kategori_transaksi: Category::from_stored(&self.kategori_transaksi),
            debit: parse_money(&self.debit, "debit")?,
            kredit: parse_money(&self.kredit, "kredit")?,
            id: self.id,
            keperluan: self.keperluan,
            catatan: self.catatan,
            urutan_tampilan: self.urutan_tampilan,
            dibuat_oleh: self.dibuat_oleh,
            dibuat_pada: self.dibuat_pada,
            diperbarui_pada: self.diperbarui_pada,
            diarsipkan_pada: self.diarsipkan_pada,
            label_arsip: self.label_arsip,
            derived: DerivedFields {
                omzet,
                biaya_operasional,
                biaya_bahan,
                saldo,
                laba_bersih,
                kasbon_anwar,
                kasbon_suri,
                kasbon_cahaya,
                kasbon_dinil,
                bagi_hasil_anwar,
                bagi_hasil_suri,
                bagi_hasil_gemi,
            },
            overrides: Overrides {
                omzet: f_omzet,
                biaya_operasional: f_ops,
                biaya_bahan: f_bahan,
                saldo: f_saldo,
                laba_bersih: f_laba,
                kasbon_anwar: f_ka,
                kasbon_suri: f_ks,
                kasbon_cahaya: f_kc,
                kasbon_dinil: f_kd,
                bagi_hasil_anwar: f_ba,
                bagi_hasil_suri: f_bs,
                bagi_hasil_gemi: f_bg,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// [`LedgerStore`] over a rusqlite connection (or transaction, via deref).
pub struct SqliteLedgerStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLedgerStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteLedgerStore { conn }
    }

    /// Fetch one entry by id, archived or not.
    pub fn get_entry(&self, id: &str) -> Result<Option<CashBookEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM keuangan WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], map_raw)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.into_entry()?)),
            None => Ok(None),
        }
    }
}

impl LedgerStore for SqliteLedgerStore<'_> {
    fn list_active(&self) -> Result<Vec<CashBookEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM keuangan
             WHERE diarsipkan_pada IS NULL
             ORDER BY urutan_tampilan ASC, dibuat_pada ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw_rows = stmt.query_map([], map_raw)?;
        let mut entries = Vec::new();
        for raw in raw_rows {
            entries.push(raw?.into_entry()?);
        }
        // The SQL already orders; re-sort defensively in case a caller
        // swapped in a store that doesn't.
        canonical_sort(&mut entries);
        Ok(entries)
    }

    fn write_derived_fields(&self, id: &str, fields: &DerivedFields) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE keuangan SET
                omzet = ?1, biaya_operasional = ?2, biaya_bahan = ?3,
                saldo = ?4, laba_bersih = ?5,
                kasbon_anwar = ?6, kasbon_suri = ?7,
                kasbon_cahaya = ?8, kasbon_dinil = ?9,
                bagi_hasil_anwar = ?10, bagi_hasil_suri = ?11,
                bagi_hasil_gemi = ?12
             WHERE id = ?13",
            params![
                fields.omzet.to_string(),
                fields.biaya_operasional.to_string(),
                fields.biaya_bahan.to_string(),
                fields.saldo.to_string(),
                fields.laba_bersih.to_string(),
                fields.kasbon_anwar.to_string(),
                fields.kasbon_suri.to_string(),
                fields.kasbon_cahaya.to_string(),
                fields.kasbon_dinil.to_string(),
                fields.bagi_hasil_anwar.to_string(),
                fields.bagi_hasil_suri.to_string(),
                fields.bagi_hasil_gemi.to_string(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(CashbookError::EntryNotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn last_active_entry(&self) -> Result<Option<CashBookEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM keuangan
             WHERE diarsipkan_pada IS NULL
             ORDER BY urutan_tampilan DESC, dibuat_pada DESC
             LIMIT 1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map([], map_raw)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.into_entry()?)),
            None => Ok(None),
        }
    }

    fn next_display_order(&self) -> Result<i64> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(urutan_tampilan), 0) FROM keuangan",
            [],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
