//! CSV import for the cashbook.
//!
//! Accepts exports from the shop's old spreadsheets: header row with
//! TANGGAL/KATEGORI/DEBIT/KREDIT (KEPERLUAN optional), quoted fields,
//! dates in ISO or slash/dash forms, amounts in Indonesian
//! (`5.085.464,50`) or US (`5,085,464.50`) digit grouping with an
//! optional `Rp`/`IDR` prefix. Bad rows are skipped and reported by row
//! number; one full recalculation runs after the inserts.

use chrono::{NaiveDate, Utc};
use rusqlite::params;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::cashbook::recalculate_in;
use crate::db::DbState;
use crate::entry::{validate_amounts, Category};
use crate::error::{CashbookError, Result};
use crate::store::{LedgerStore, SqliteLedgerStore};

/// Outcome of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Split one CSV line, honoring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                values.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

/// Parse a money cell. Handles `Rp`/`IDR` prefixes and both Indonesian
/// and US digit grouping; anything unparseable becomes zero (the amount
/// validation after parsing rejects the row if both sides end up zero).
pub(crate) fn parse_amount(raw: &str) -> Decimal {
    let mut v = raw.trim().to_string();
    if v.is_empty() {
        return Decimal::ZERO;
    }

    // Currency prefix
    for prefix in ["Rp", "RP", "rp", "IDR", "idr"] {
        if let Some(rest) = v.strip_prefix(prefix) {
            v = rest.to_string();
            break;
        }
    }
    v.retain(|c| !c.is_whitespace());

    let comma_count = v.matches(',').count();
    let dot_count = v.matches('.').count();

    if comma_count > 1 {
        // Multiple commas: US grouping (5,085,464)
        v = v.replace(',', "");
    } else if dot_count > 1 {
        // Multiple dots: Indonesian grouping (5.085.464 or 5.085.464,50)
        v = v.replace('.', "");
        if comma_count == 1 {
            v = v.replace(',', ".");
        }
    } else if comma_count == 1 && dot_count == 1 {
        let comma_pos = v.find(',').unwrap_or(0);
        let dot_pos = v.find('.').unwrap_or(0);
        if dot_pos > comma_pos {
            // 1,234.56
            v = v.replace(',', "");
        } else {
            // 1.234,56
            v = v.replace('.', "").replace(',', ".");
        }
    } else if comma_count == 1 {
        let frac_len = v.split(',').nth(1).map(str::len).unwrap_or(0);
        if frac_len > 0 && frac_len <= 2 {
            v = v.replace(',', ".");
        } else {
            v = v.replace(',', "");
        }
    } else if dot_count == 1 {
        // A lone dot with exactly three trailing digits is grouping, not
        // a decimal point (1.234 = 1234).
        let frac_len = v.split('.').nth(1).map(str::len).unwrap_or(0);
        if frac_len == 3 {
            v = v.replace('.', "");
        }
    }

    Decimal::from_str(&v).unwrap_or(Decimal::ZERO)
}

/// Parse a date cell: ISO first, then slash/dash-separated with two-digit
/// year windowing (>= 50 → 19xx) and day/month disambiguation. Ambiguous
/// dates default to month-first (spreadsheet convention).
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    let parts: Vec<&str> = s.split(['/', '-']).collect();
    if parts.len() != 3 || !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    let (p1, p2, year_raw) = (parts[0], parts[1], parts[2]);
    if p1.is_empty() || p1.len() > 2 || p2.is_empty() || p2.len() > 2 {
        return None;
    }

    let year: i32 = match year_raw.len() {
        2 => {
            let y: i32 = year_raw.parse().ok()?;
            if y >= 50 {
                1900 + y
            } else {
                2000 + y
            }
        }
        4 => year_raw.parse().ok()?,
        _ => return None,
    };

    let n1: u32 = p1.parse().ok()?;
    let n2: u32 = p2.parse().ok()?;
    let (month, day) = if n1 > 12 {
        (n2, n1)
    } else if n2 > 12 {
        (n1, n2)
    } else {
        // Default to MM/DD (Google Sheets format)
        (n1, n2)
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Import cashbook rows from CSV text.
///
/// When `append` is false, active rows are cleared first (archived
/// periods stay). All inserts and the closing recalculation share one
/// transaction: a failure imports nothing.
pub fn import_csv(db: &DbState, csv_text: &str, append: bool) -> Result<ImportSummary> {
    let lines: Vec<&str> = csv_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let Some((header_line, data_lines)) = lines.split_first() else {
        return Err(CashbookError::InvalidCsv {
            reason: "CSV file is empty".to_string(),
        });
    };

    let headers: Vec<String> = header_line
        .split(',')
        .map(|h| h.trim().to_uppercase())
        .collect();
    let col = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<&str> = ["TANGGAL", "KATEGORI", "DEBIT", "KREDIT"]
        .into_iter()
        .filter(|c| col(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CashbookError::InvalidCsv {
            reason: format!("missing required columns: {}", missing.join(", ")),
        });
    }
    let tanggal_idx = col("TANGGAL").unwrap_or(0);
    let kategori_idx = col("KATEGORI").unwrap_or(0);
    let debit_idx = col("DEBIT").unwrap_or(0);
    let kredit_idx = col("KREDIT").unwrap_or(0);
    let keperluan_idx = col("KEPERLUAN");

    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    if !append {
        let cleared = tx.execute("DELETE FROM keuangan WHERE diarsipkan_pada IS NULL", [])?;
        info!(rows = cleared, "Cleared active cashbook before import");
    }

    let mut next_order = SqliteLedgerStore::new(&tx).next_display_order()?;
    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for (i, line) in data_lines.iter().enumerate() {
        // 1-based data row number, counting the header as row 1.
        let row_no = i + 2;
        let values = split_csv_line(line);
        let cell = |idx: usize| values.get(idx).map(String::as_str).unwrap_or("");

        let Some(tanggal) = parse_date(cell(tanggal_idx)) else {
            skipped += 1;
            errors.push(format!("Row {row_no}: invalid date"));
            continue;
        };
        let kategori = match Category::parse_strict(cell(kategori_idx)) {
            Ok(c) => c,
            Err(_) => {
                skipped += 1;
                errors.push(format!("Row {row_no}: invalid category"));
                continue;
            }
        };
        let debit = parse_amount(cell(debit_idx));
        let kredit = parse_amount(cell(kredit_idx));
        if let Err(e) = validate_amounts(debit, kredit) {
            skipped += 1;
            errors.push(format!("Row {row_no}: {e}"));
            continue;
        }
        let keperluan = keperluan_idx.map(cell).unwrap_or("").to_string();

        tx.execute(
            "INSERT INTO keuangan
                (id, tanggal, kategori_transaksi, debit, kredit, keperluan,
                 dibuat_pada, urutan_tampilan)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                tanggal.format("%Y-%m-%d").to_string(),
                kategori.as_str(),
                debit.to_string(),
                kredit.to_string(),
                keperluan,
                Utc::now().to_rfc3339(),
                next_order,
            ],
        )?;
        next_order += 1;
        imported += 1;
    }

    let recalculated = recalculate_in(&tx)?;
    tx.commit()?;

    info!(
        imported = imported,
        skipped = skipped,
        rows = recalculated,
        "CSV import finished"
    );
    Ok(ImportSummary {
        imported,
        skipped,
        errors,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
