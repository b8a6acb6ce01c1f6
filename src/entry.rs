//! Cashbook domain types: categories, ledger rows, derived columns.
//!
//! Column vocabulary follows the `keuangan` table: Indonesian business
//! terms (omzet = revenue, saldo = running balance, kasbon = partner draw,
//! bagi hasil = profit share). Monetary values are `rust_decimal::Decimal`
//! throughout; the store layer persists them as decimal TEXT.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CashbookError, Result};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Transaction category of a cashbook entry.
///
/// Closed enumeration matching the import allow-list. Rows from the early
/// books carry free-form labels; those are preserved as [`Category::Other`]
/// and only ever move `saldo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Category {
    /// Sales revenue (cash in).
    Omzet,
    /// Receivable booked (counts as revenue on the debit side).
    Piutang,
    /// Receivable settled.
    Lunas,
    /// Plain cash movement.
    Kas,
    /// Operating expense.
    Biaya,
    /// Expense subsidy/reimbursement.
    Subsidi,
    /// Sales commission paid out.
    Komisi,
    /// Savings set-aside.
    Tabungan,
    /// Material purchase (COGS).
    Supply,
    /// Vendor debt movement (COGS side).
    Hutang,
    /// Partner Anwar personal draw/repayment.
    #[serde(rename = "PRIBADI-A")]
    PribadiA,
    /// Partner Suri personal draw/repayment.
    #[serde(rename = "PRIBADI-S")]
    PribadiS,
    /// Investor capital in/out.
    Investor,
    /// Profit distribution marker.
    Laba,
    /// Uncategorized free-form label from legacy rows.
    #[serde(untagged)]
    Other(String),
}

impl Category {
    /// Canonical stored spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Category::Omzet => "OMZET",
            Category::Piutang => "PIUTANG",
            Category::Lunas => "LUNAS",
            Category::Kas => "KAS",
            Category::Biaya => "BIAYA",
            Category::Subsidi => "SUBSIDI",
            Category::Komisi => "KOMISI",
            Category::Tabungan => "TABUNGAN",
            Category::Supply => "SUPPLY",
            Category::Hutang => "HUTANG",
            Category::PribadiA => "PRIBADI-A",
            Category::PribadiS => "PRIBADI-S",
            Category::Investor => "INVESTOR",
            Category::Laba => "LABA",
            Category::Other(raw) => raw,
        }
    }

    /// Map a stored column value to a category, preserving unknown labels.
    pub fn from_stored(raw: &str) -> Category {
        match raw {
            "OMZET" => Category::Omzet,
            "PIUTANG" => Category::Piutang,
            "LUNAS" => Category::Lunas,
            "KAS" => Category::Kas,
            "BIAYA" => Category::Biaya,
            "SUBSIDI" => Category::Subsidi,
            "KOMISI" => Category::Komisi,
            "TABUNGAN" => Category::Tabungan,
            "SUPPLY" => Category::Supply,
            "HUTANG" => Category::Hutang,
            "PRIBADI-A" => Category::PribadiA,
            "PRIBADI-S" => Category::PribadiS,
            "INVESTOR" => Category::Investor,
            "LABA" => Category::Laba,
            other => Category::Other(other.to_string()),
        }
    }

    /// Strict parser used by CSV import and entry forms.
    ///
    /// Uppercases, collapses whitespace and en/em dashes to `-`, accepts
    /// the long-form aliases `PRIBADI-ANWAR` / `PRIBADI-SURI`, and rejects
    /// anything outside the allow-list.
    pub fn parse_strict(raw: &str) -> Result<Category> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CashbookError::UnknownCategory {
                raw: raw.to_string(),
            });
        }
        let mut norm = String::with_capacity(trimmed.len());
        let mut last_dash = false;
        for c in trimmed.chars() {
            let mapped = match c {
                c if c.is_whitespace() => '-',
                '\u{2013}' | '\u{2014}' => '-', // en/em dash
                c => c.to_ascii_uppercase(),
            };
            if mapped == '-' {
                if !last_dash {
                    norm.push('-');
                }
                last_dash = true;
            } else {
                norm.push(mapped);
                last_dash = false;
            }
        }
        let norm = match norm.as_str() {
            "PRIBADI-ANWAR" => "PRIBADI-A",
            "PRIBADI-SURI" => "PRIBADI-S",
            other => other,
        };
        match Category::from_stored(norm) {
            Category::Other(_) => Err(CashbookError::UnknownCategory {
                raw: raw.to_string(),
            }),
            known => Ok(known),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived columns
// ---------------------------------------------------------------------------

/// The twelve computed running-total columns of a cashbook row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub omzet: Decimal,
    pub biaya_operasional: Decimal,
    pub biaya_bahan: Decimal,
    pub saldo: Decimal,
    pub laba_bersih: Decimal,
    pub kasbon_anwar: Decimal,
    pub kasbon_suri: Decimal,
    pub kasbon_cahaya: Decimal,
    pub kasbon_dinil: Decimal,
    pub bagi_hasil_anwar: Decimal,
    pub bagi_hasil_suri: Decimal,
    pub bagi_hasil_gemi: Decimal,
}

/// Manual-override flags, one per derived column.
///
/// A set flag pins the stored column value: the engine adopts it as the
/// running accumulator for that field instead of the formula result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub omzet: bool,
    pub biaya_operasional: bool,
    pub biaya_bahan: bool,
    pub saldo: bool,
    pub laba_bersih: bool,
    pub kasbon_anwar: bool,
    pub kasbon_suri: bool,
    pub kasbon_cahaya: bool,
    pub kasbon_dinil: bool,
    pub bagi_hasil_anwar: bool,
    pub bagi_hasil_suri: bool,
    pub bagi_hasil_gemi: bool,
}

impl Overrides {
    pub fn any(&self) -> bool {
        self.omzet
            || self.biaya_operasional
            || self.biaya_bahan
            || self.saldo
            || self.laba_bersih
            || self.kasbon_anwar
            || self.kasbon_suri
            || self.kasbon_cahaya
            || self.kasbon_dinil
            || self.bagi_hasil_anwar
            || self.bagi_hasil_suri
            || self.bagi_hasil_gemi
    }
}

/// Names one of the twelve derived columns, for override set/clear calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedField {
    Omzet,
    BiayaOperasional,
    BiayaBahan,
    Saldo,
    LabaBersih,
    KasbonAnwar,
    KasbonSuri,
    KasbonCahaya,
    KasbonDinil,
    BagiHasilAnwar,
    BagiHasilSuri,
    BagiHasilGemi,
}

impl DerivedField {
    /// All twelve fields, in ledger column order.
    pub const ALL: [DerivedField; 12] = [
        DerivedField::Omzet,
        DerivedField::BiayaOperasional,
        DerivedField::BiayaBahan,
        DerivedField::Saldo,
        DerivedField::LabaBersih,
        DerivedField::KasbonAnwar,
        DerivedField::KasbonSuri,
        DerivedField::KasbonCahaya,
        DerivedField::KasbonDinil,
        DerivedField::BagiHasilAnwar,
        DerivedField::BagiHasilSuri,
        DerivedField::BagiHasilGemi,
    ];

    /// Value column name in `keuangan`.
    pub fn column(&self) -> &'static str {
        match self {
            DerivedField::Omzet => "omzet",
            DerivedField::BiayaOperasional => "biaya_operasional",
            DerivedField::BiayaBahan => "biaya_bahan",
            DerivedField::Saldo => "saldo",
            DerivedField::LabaBersih => "laba_bersih",
            DerivedField::KasbonAnwar => "kasbon_anwar",
            DerivedField::KasbonSuri => "kasbon_suri",
            DerivedField::KasbonCahaya => "kasbon_cahaya",
            DerivedField::KasbonDinil => "kasbon_dinil",
            DerivedField::BagiHasilAnwar => "bagi_hasil_anwar",
            DerivedField::BagiHasilSuri => "bagi_hasil_suri",
            DerivedField::BagiHasilGemi => "bagi_hasil_gemi",
        }
    }

    /// Matching override-flag column name.
    pub fn flag_column(&self) -> &'static str {
        match self {
            DerivedField::Omzet => "override_omzet",
            DerivedField::BiayaOperasional => "override_biaya_operasional",
            DerivedField::BiayaBahan => "override_biaya_bahan",
            DerivedField::Saldo => "override_saldo",
            DerivedField::LabaBersih => "override_laba_bersih",
            DerivedField::KasbonAnwar => "override_kasbon_anwar",
            DerivedField::KasbonSuri => "override_kasbon_suri",
            DerivedField::KasbonCahaya => "override_kasbon_cahaya",
            DerivedField::KasbonDinil => "override_kasbon_dinil",
            DerivedField::BagiHasilAnwar => "override_bagi_hasil_anwar",
            DerivedField::BagiHasilSuri => "override_bagi_hasil_suri",
            DerivedField::BagiHasilGemi => "override_bagi_hasil_gemi",
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One `keuangan` row as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBookEntry {
    pub id: String,
    pub tanggal: NaiveDate,
    pub kategori_transaksi: Category,
    pub debit: Decimal,
    pub kredit: Decimal,
    pub keperluan: String,
    pub catatan: Option<String>,
    pub urutan_tampilan: i64,
    pub dibuat_oleh: Option<String>,
    pub dibuat_pada: String,
    pub diperbarui_pada: Option<String>,
    pub diarsipkan_pada: Option<String>,
    pub label_arsip: Option<String>,
    pub derived: DerivedFields,
    pub overrides: Overrides,
}

/// Input for creating a new trailing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub tanggal: NaiveDate,
    pub kategori_transaksi: Category,
    #[serde(default)]
    pub debit: Decimal,
    #[serde(default)]
    pub kredit: Decimal,
    #[serde(default)]
    pub keperluan: String,
    #[serde(default)]
    pub catatan: Option<String>,
    #[serde(default)]
    pub dibuat_oleh: Option<String>,
}

/// Editable columns of an existing entry. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    pub tanggal: Option<NaiveDate>,
    pub kategori_transaksi: Option<Category>,
    pub debit: Option<Decimal>,
    pub kredit: Option<Decimal>,
    pub keperluan: Option<String>,
    pub catatan: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject amounts the engine must never see: negative values, both sides
/// filled, or neither side filled.
pub fn validate_amounts(debit: Decimal, kredit: Decimal) -> Result<()> {
    if debit < Decimal::ZERO {
        return Err(CashbookError::NegativeAmount { amount: debit });
    }
    if kredit < Decimal::ZERO {
        return Err(CashbookError::NegativeAmount { amount: kredit });
    }
    if !debit.is_zero() && !kredit.is_zero() {
        return Err(CashbookError::BothSidesNonzero { debit, kredit });
    }
    if debit.is_zero() && kredit.is_zero() {
        return Err(CashbookError::BothSidesZero);
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
