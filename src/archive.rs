//! Period close ("tutup buku") for the cashbook.
//!
//! Closing a period stamps its rows with an archival timestamp and label;
//! archived rows become immutable history, excluded from every
//! recalculation. A period can be reopened (restored) later, and each
//! archived period can be summarized as a financial report.

use chrono::{NaiveDate, Utc};
use rusqlite::params;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

use crate::cashbook::recalculate_in;
use crate::db::DbState;
use crate::error::{CashbookError, Result};
use crate::store::parse_money;

/// One archived period, as listed for the period picker.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedPeriod {
    pub label: String,
    pub archived_at: String,
    pub count: i64,
    pub start_date: String,
    pub end_date: String,
}

fn pct(part: Decimal, whole: Decimal) -> Decimal {
    let mut ratio = if whole.is_zero() {
        Decimal::ZERO
    } else {
        (part / whole * Decimal::from(100))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };
    // Pad to two places so percentages render uniformly ("60.00").
    ratio.rescale(2);
    ratio
}

// ---------------------------------------------------------------------------
// Close / reopen
// ---------------------------------------------------------------------------

/// Close the books for a date range: stamp every active row whose
/// `tanggal` falls in the inclusive range, then recalculate the remaining
/// active ledger. Returns the number of rows archived.
pub fn archive_period(db: &DbState, start: NaiveDate, end: NaiveDate, label: &str) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    let archived = tx.execute(
        "UPDATE keuangan
         SET diarsipkan_pada = ?1, label_arsip = ?2
         WHERE tanggal >= ?3 AND tanggal <= ?4 AND diarsipkan_pada IS NULL",
        params![
            Utc::now().to_rfc3339(),
            label,
            start.format("%Y-%m-%d").to_string(),
            end.format("%Y-%m-%d").to_string(),
        ],
    )?;

    let remaining = recalculate_in(&tx)?;
    tx.commit()?;
    info!(
        label = label,
        archived = archived,
        remaining = remaining,
        "Period closed"
    );
    Ok(archived)
}

/// Reopen one archived period, identified by its label and archival
/// timestamp, then recalculate. The restored rows keep their positions and
/// interleave back into canonical order.
pub fn restore_period(db: &DbState, label: &str, archived_at: &str) -> Result<usize> {
    let mut guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let tx = guard.transaction()?;

    let restored = tx.execute(
        "UPDATE keuangan
         SET diarsipkan_pada = NULL, label_arsip = NULL
         WHERE label_arsip = ?1 AND diarsipkan_pada = ?2",
        params![label, archived_at],
    )?;
    if restored == 0 {
        return Err(CashbookError::PeriodNotFound {
            label: label.to_string(),
            archived_at: archived_at.to_string(),
        });
    }

    let active = recalculate_in(&tx)?;
    tx.commit()?;
    info!(
        label = label,
        restored = restored,
        active = active,
        "Period restored"
    );
    Ok(restored)
}

/// List archived periods, newest close first.
pub fn archived_periods(db: &DbState) -> Result<Vec<ArchivedPeriod>> {
    let guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let mut stmt = guard.prepare(
        "SELECT label_arsip, diarsipkan_pada, COUNT(*),
                MIN(tanggal), MAX(tanggal)
         FROM keuangan
         WHERE diarsipkan_pada IS NOT NULL
         GROUP BY label_arsip, diarsipkan_pada
         ORDER BY diarsipkan_pada DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ArchivedPeriod {
            label: row.get(0)?,
            archived_at: row.get(1)?,
            count: row.get(2)?,
            start_date: row.get(3)?,
            end_date: row.get(4)?,
        })
    })?;
    let mut periods = Vec::new();
    for row in rows {
        periods.push(row?);
    }
    Ok(periods)
}

// ---------------------------------------------------------------------------
// Period report
// ---------------------------------------------------------------------------

/// Financial summary for one archived period: debit/kredit totals, net
/// result and margin, per-category breakdown, the transaction list, and
/// the closing derived snapshot (the period's last row in canonical
/// order). Monetary values serialize as exact decimal strings.
pub fn period_report(db: &DbState, label: &str, archived_at: &str) -> Result<Value> {
    let guard = db.conn.lock().unwrap_or_else(|e| e.into_inner());
    let mut stmt = guard.prepare(
        "SELECT tanggal, kategori_transaksi, debit, kredit, keperluan,
                omzet, biaya_operasional, biaya_bahan, saldo, laba_bersih,
                bagi_hasil_anwar, bagi_hasil_suri, bagi_hasil_gemi
         FROM keuangan
         WHERE label_arsip = ?1 AND diarsipkan_pada = ?2
         ORDER BY urutan_tampilan ASC, dibuat_pada ASC",
    )?;

    struct ReportRow {
        tanggal: String,
        kategori: String,
        debit: Decimal,
        kredit: Decimal,
        keperluan: String,
        snapshot: [String; 8],
    }

    let rows = stmt.query_map(params![label, archived_at], |row| {
        let debit: String = row.get(2)?;
        let kredit: String = row.get(3)?;
        let mut snapshot: [String; 8] = Default::default();
        for (i, slot) in snapshot.iter_mut().enumerate() {
            *slot = row.get(5 + i)?;
        }
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            debit,
            kredit,
            row.get::<_, String>(4)?,
            snapshot,
        ))
    })?;

    let mut report_rows: Vec<ReportRow> = Vec::new();
    for row in rows {
        let (tanggal, kategori, debit, kredit, keperluan, snapshot) = row?;
        report_rows.push(ReportRow {
            tanggal,
            kategori,
            debit: parse_money(&debit, "debit")?,
            kredit: parse_money(&kredit, "kredit")?,
            keperluan,
            snapshot,
        });
    }
    if report_rows.is_empty() {
        return Err(CashbookError::PeriodNotFound {
            label: label.to_string(),
            archived_at: archived_at.to_string(),
        });
    }

    let mut total_income = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    for row in &report_rows {
        total_income += row.debit;
        total_expenses += row.kredit;
        let amount = if row.debit > Decimal::ZERO {
            row.debit
        } else {
            row.kredit
        };
        *by_category.entry(row.kategori.clone()).or_default() += amount;
    }
    let net = total_income - total_expenses;
    let turnover = total_income + total_expenses;

    let category_breakdown: Vec<Value> = by_category
        .iter()
        .map(|(category, amount)| {
            serde_json::json!({
                "category": category,
                "amount": amount,
                "percentage": pct(*amount, turnover),
            })
        })
        .collect();

    let transactions: Vec<Value> = report_rows
        .iter()
        .map(|row| {
            let is_income = row.debit > Decimal::ZERO;
            serde_json::json!({
                "date": row.tanggal,
                "description": if row.keperluan.is_empty() {
                    "No description"
                } else {
                    row.keperluan.as_str()
                },
                "category": row.kategori,
                "amount": if is_income { row.debit } else { row.kredit },
                "type": if is_income { "income" } else { "expense" },
            })
        })
        .collect();

    let last = &report_rows[report_rows.len() - 1];
    let closing: Result<Vec<Decimal>> = last
        .snapshot
        .iter()
        .map(|raw| parse_money(raw, "closing snapshot"))
        .collect();
    let closing = closing?;

    Ok(serde_json::json!({
        "label": label,
        "archivedAt": archived_at,
        "dateRange": {
            "startDate": report_rows[0].tanggal,
            "endDate": last.tanggal,
        },
        "summary": {
            "entryCount": report_rows.len(),
            "totalIncome": total_income,
            "totalExpenses": total_expenses,
            "netResult": net,
            "profitMargin": pct(net, total_income),
        },
        "categoryBreakdown": category_breakdown,
        "transactions": transactions,
        "closingSnapshot": {
            "omzet": closing[0],
            "biayaOperasional": closing[1],
            "biayaBahan": closing[2],
            "saldo": closing[3],
            "labaBersih": closing[4],
            "bagiHasilAnwar": closing[5],
            "bagiHasilSuri": closing[6],
            "bagiHasilGemi": closing[7],
        },
        "generatedAt": Utc::now().to_rfc3339(),
    }))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cashbook::{create_entry, list_entries};
    use crate::db;
    use crate::entry::{Category, NewEntry};
    use rusqlite::Connection;
    use rust_decimal_macros::dec;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: std::sync::Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        }
    }

    fn add(db: &DbState, day: u32, cat: Category, debit: Decimal, kredit: Decimal) {
        create_entry(
            db,
            &NewEntry {
                tanggal: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                kategori_transaksi: cat,
                debit,
                kredit,
                keperluan: String::new(),
                catatan: None,
                dibuat_oleh: None,
            },
        )
        .expect("create entry");
    }

    #[test]
    fn test_archive_excludes_period_from_recalc() {
        let db = test_db();
        add(&db, 1, Category::Omzet, dec!(100000), dec!(0));
        add(&db, 2, Category::Supply, dec!(0), dec!(40000));
        add(&db, 20, Category::Omzet, dec!(7000), dec!(0));

        // Close the first decade of March.
        let archived = archive_period(
            &db,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            "Maret awal",
        )
        .unwrap();
        assert_eq!(archived, 2);

        // The remaining active row restarts from zero state.
        let entries = list_entries(&db).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].derived.saldo, dec!(7000));
        assert_eq!(entries[0].derived.omzet, dec!(7000));
    }

    #[test]
    fn test_restore_reinstates_period() {
        let db = test_db();
        add(&db, 1, Category::Omzet, dec!(100000), dec!(0));
        add(&db, 20, Category::Omzet, dec!(7000), dec!(0));

        archive_period(
            &db,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            "Maret awal",
        )
        .unwrap();

        let periods = archived_periods(&db).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].label, "Maret awal");
        assert_eq!(periods[0].count, 1);

        let restored = restore_period(&db, &periods[0].label, &periods[0].archived_at).unwrap();
        assert_eq!(restored, 1);

        let entries = list_entries(&db).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].derived.saldo, dec!(107000));
        assert!(archived_periods(&db).unwrap().is_empty());
    }

    #[test]
    fn test_restore_unknown_period_errors() {
        let db = test_db();
        assert!(matches!(
            restore_period(&db, "nope", "2025-01-01T00:00:00Z"),
            Err(CashbookError::PeriodNotFound { .. })
        ));
    }

    #[test]
    fn test_period_report_totals_and_breakdown() {
        let db = test_db();
        add(&db, 1, Category::Omzet, dec!(100000), dec!(0));
        add(&db, 2, Category::Supply, dec!(0), dec!(40000));
        archive_period(
            &db,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            "Maret 2025",
        )
        .unwrap();

        let periods = archived_periods(&db).unwrap();
        let report = period_report(&db, &periods[0].label, &periods[0].archived_at).unwrap();

        assert_eq!(report["summary"]["entryCount"], 2);
        assert_eq!(report["summary"]["totalIncome"], "100000");
        assert_eq!(report["summary"]["totalExpenses"], "40000");
        assert_eq!(report["summary"]["netResult"], "60000");
        assert_eq!(report["summary"]["profitMargin"], "60.00");
        assert_eq!(report["dateRange"]["startDate"], "2025-03-01");
        assert_eq!(report["dateRange"]["endDate"], "2025-03-02");
        // Closing snapshot is the period's final derived state.
        assert_eq!(report["closingSnapshot"]["saldo"], "60000");
        assert_eq!(report["closingSnapshot"]["labaBersih"], "60000");
        assert_eq!(report["closingSnapshot"]["bagiHasilGemi"], "20000.00");
    }

    #[test]
    fn test_period_report_unknown_period_errors() {
        let db = test_db();
        assert!(matches!(
            period_report(&db, "nope", "x"),
            Err(CashbookError::PeriodNotFound { .. })
        ));
    }
}
