//! Running-total calculation core for the cashbook.
//!
//! This module is the single source of truth for the twelve derived
//! columns. Both recompute paths (the full batch pass and the trailing
//! append fast path) fold [`Accumulator::apply`] over rows in canonical
//! order, so they cannot drift apart. Pure computation, no I/O.
//!
//! Money semantics: divisions by 3 (the profit-share splits and the gemi
//! delta) round the quotient to 2 decimal places, midpoint away from zero,
//! at the point of division. Stored derived values are therefore exact
//! 2-dp amounts and a recompute over unchanged rows is bit-identical.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::entry::{CashBookEntry, Category, DerivedFields};

/// Decimal places kept on profit-share quotients.
const SHARE_DP: u32 = 2;

fn third(value: Decimal) -> Decimal {
    (value / Decimal::from(3))
        .round_dp_with_strategy(SHARE_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

// ---------------------------------------------------------------------------
// Category gates
// ---------------------------------------------------------------------------
//
// Exhaustive matches: adding a category variant forces a decision in every
// rule instead of silently falling through.

fn feeds_omzet(cat: &Category) -> bool {
    match cat {
        Category::Omzet | Category::Piutang | Category::Lunas => true,
        Category::Kas
        | Category::Biaya
        | Category::Subsidi
        | Category::Komisi
        | Category::Tabungan
        | Category::Supply
        | Category::Hutang
        | Category::PribadiA
        | Category::PribadiS
        | Category::Investor
        | Category::Laba
        | Category::Other(_) => false,
    }
}

fn feeds_biaya_operasional(cat: &Category) -> bool {
    match cat {
        Category::Biaya | Category::Tabungan | Category::Komisi => true,
        Category::Omzet
        | Category::Piutang
        | Category::Lunas
        | Category::Kas
        | Category::Subsidi
        | Category::Supply
        | Category::Hutang
        | Category::PribadiA
        | Category::PribadiS
        | Category::Investor
        | Category::Laba
        | Category::Other(_) => false,
    }
}

fn feeds_biaya_bahan(cat: &Category) -> bool {
    match cat {
        Category::Supply | Category::Hutang => true,
        Category::Omzet
        | Category::Piutang
        | Category::Lunas
        | Category::Kas
        | Category::Biaya
        | Category::Subsidi
        | Category::Komisi
        | Category::Tabungan
        | Category::PribadiA
        | Category::PribadiS
        | Category::Investor
        | Category::Laba
        | Category::Other(_) => false,
    }
}

/// Investor-partner attribution: INVESTOR or BIAYA rows whose memo names
/// the partner.
fn feeds_investor_kasbon(cat: &Category, keperluan: &str, partner: &str) -> bool {
    matches!(cat, Category::Investor | Category::Biaya) && contains_ci(keperluan, partner)
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Running state folded across the ledger, oldest row first.
///
/// Holds the twelve derived columns plus the previous row's `laba_bersih`,
/// which the gemi delta rule needs. Everything starts at zero before the
/// first row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    pub fields: DerivedFields,
    prev_laba_bersih: Decimal,
}

impl Accumulator {
    /// Zero state: the fold seed for a full recalculation.
    pub fn zero() -> Accumulator {
        Accumulator::default()
    }

    /// Seed from the last persisted row, for appending at the tail.
    ///
    /// Valid only when `last` really is the tail of canonical order and its
    /// derived columns are current. That is the append path's contract.
    pub fn seeded_from(last: &CashBookEntry) -> Accumulator {
        Accumulator {
            prev_laba_bersih: last.derived.laba_bersih,
            fields: last.derived.clone(),
        }
    }

    /// Fold one entry into the running state and return the derived
    /// columns for that row.
    ///
    /// Override policy, applied uniformly per field: when the row's flag
    /// is set, the stored column value replaces the formula result *and*
    /// becomes the running baseline for later rows.
    pub fn apply(&mut self, entry: &CashBookEntry) -> DerivedFields {
        let cat = &entry.kategori_transaksi;
        let debit = entry.debit;
        let kredit = entry.kredit;

        // Revenue
        if entry.overrides.omzet {
            self.fields.omzet = entry.derived.omzet;
        } else if feeds_omzet(cat) {
            self.fields.omzet += debit;
        }

        // Operating expenses
        if entry.overrides.biaya_operasional {
            self.fields.biaya_operasional = entry.derived.biaya_operasional;
        } else if feeds_biaya_operasional(cat) {
            self.fields.biaya_operasional += kredit;
        }

        // Cost of materials
        if entry.overrides.biaya_bahan {
            self.fields.biaya_bahan = entry.derived.biaya_bahan;
        } else if feeds_biaya_bahan(cat) {
            self.fields.biaya_bahan += kredit;
        }

        // Running cash balance: every row moves it, category-independent.
        if entry.overrides.saldo {
            self.fields.saldo = entry.derived.saldo;
        } else {
            self.fields.saldo += debit - kredit;
        }

        // Net profit, recomputed fresh from the just-updated totals.
        if entry.overrides.laba_bersih {
            self.fields.laba_bersih = entry.derived.laba_bersih;
        } else {
            self.fields.laba_bersih =
                self.fields.omzet - self.fields.biaya_operasional - self.fields.biaya_bahan;
        }

        // Partner draws: kredit raises the balance owed, debit repays it.
        if entry.overrides.kasbon_anwar {
            self.fields.kasbon_anwar = entry.derived.kasbon_anwar;
        } else if matches!(cat, Category::PribadiA) {
            self.fields.kasbon_anwar += kredit - debit;
        }

        if entry.overrides.kasbon_suri {
            self.fields.kasbon_suri = entry.derived.kasbon_suri;
        } else if matches!(cat, Category::PribadiS) {
            self.fields.kasbon_suri += kredit - debit;
        }

        if entry.overrides.kasbon_cahaya {
            self.fields.kasbon_cahaya = entry.derived.kasbon_cahaya;
        } else if feeds_investor_kasbon(cat, &entry.keperluan, "cahaya") {
            self.fields.kasbon_cahaya += kredit - debit;
        }

        if entry.overrides.kasbon_dinil {
            self.fields.kasbon_dinil = entry.derived.kasbon_dinil;
        } else if feeds_investor_kasbon(cat, &entry.keperluan, "dinil") {
            self.fields.kasbon_dinil += kredit - debit;
        }

        // Named-partner profit shares: a third of net profit, less the
        // partner's outstanding draw. Recomputed fresh each row.
        if entry.overrides.bagi_hasil_anwar {
            self.fields.bagi_hasil_anwar = entry.derived.bagi_hasil_anwar;
        } else {
            self.fields.bagi_hasil_anwar =
                third(self.fields.laba_bersih) - self.fields.kasbon_anwar;
        }

        if entry.overrides.bagi_hasil_suri {
            self.fields.bagi_hasil_suri = entry.derived.bagi_hasil_suri;
        } else {
            self.fields.bagi_hasil_suri = third(self.fields.laba_bersih) - self.fields.kasbon_suri;
        }

        // Residual partner share: the one stateful delta rule. Carries a
        // third of each row's net-profit movement, plus direct investor
        // capital flows.
        if entry.overrides.bagi_hasil_gemi {
            self.fields.bagi_hasil_gemi = entry.derived.bagi_hasil_gemi;
        } else {
            self.fields.bagi_hasil_gemi += third(self.fields.laba_bersih - self.prev_laba_bersih);
            if matches!(cat, Category::Investor) {
                self.fields.bagi_hasil_gemi += debit - kredit;
            }
        }

        self.prev_laba_bersih = self.fields.laba_bersih;
        self.fields.clone()
    }
}

// ---------------------------------------------------------------------------
// Ordering and batch fold
// ---------------------------------------------------------------------------

/// Canonical ledger order: `urutan_tampilan` ascending, `dibuat_pada`
/// ascending as tiebreaker. Lower position = older row.
pub fn canonical_sort(entries: &mut [CashBookEntry]) {
    entries.sort_by(|a, b| {
        a.urutan_tampilan
            .cmp(&b.urutan_tampilan)
            .then_with(|| a.dibuat_pada.cmp(&b.dibuat_pada))
    });
}

/// Fold the zero accumulator across rows already in canonical order,
/// yielding each row's derived columns. The in-memory half of a batch
/// recalculation; the store half lives in `cashbook::recalculate`.
pub fn fold_derived(entries: &[CashBookEntry]) -> Vec<DerivedFields> {
    let mut acc = Accumulator::zero();
    entries.iter().map(|entry| acc.apply(entry)).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Overrides;
    use rust_decimal_macros::dec;

    fn entry(
        n: i64,
        cat: Category,
        debit: Decimal,
        kredit: Decimal,
        keperluan: &str,
    ) -> CashBookEntry {
        CashBookEntry {
            id: format!("cb-{n}"),
            tanggal: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            kategori_transaksi: cat,
            debit,
            kredit,
            keperluan: keperluan.to_string(),
            catatan: None,
            urutan_tampilan: n,
            dibuat_oleh: None,
            dibuat_pada: format!("2025-03-01T00:00:{n:02}Z"),
            diperbarui_pada: None,
            diarsipkan_pada: None,
            label_arsip: None,
            derived: DerivedFields::default(),
            overrides: Overrides::default(),
        }
    }

    #[test]
    fn test_concrete_three_entry_scenario() {
        let rows = vec![
            entry(1, Category::Omzet, dec!(100000), dec!(0), "cetak banner"),
            entry(2, Category::Supply, dec!(0), dec!(40000), "beli bahan"),
            entry(3, Category::PribadiA, dec!(5000), dec!(0), "setor anwar"),
        ];
        let derived = fold_derived(&rows);

        let r1 = &derived[0];
        assert_eq!(r1.omzet, dec!(100000));
        assert_eq!(r1.biaya_operasional, dec!(0));
        assert_eq!(r1.biaya_bahan, dec!(0));
        assert_eq!(r1.saldo, dec!(100000));
        assert_eq!(r1.laba_bersih, dec!(100000));
        assert_eq!(r1.bagi_hasil_anwar, dec!(33333.33));
        assert_eq!(r1.bagi_hasil_gemi, dec!(33333.33));

        let r2 = &derived[1];
        assert_eq!(r2.biaya_bahan, dec!(40000));
        assert_eq!(r2.saldo, dec!(60000));
        assert_eq!(r2.laba_bersih, dec!(60000));
        assert_eq!(r2.bagi_hasil_anwar, dec!(20000.00));
        // 33333.33 + (60000 - 100000)/3 = 33333.33 - 13333.33
        assert_eq!(r2.bagi_hasil_gemi, dec!(20000.00));

        let r3 = &derived[2];
        assert_eq!(r3.kasbon_anwar, dec!(-5000));
        assert_eq!(r3.saldo, dec!(65000));
        assert_eq!(r3.laba_bersih, dec!(60000));
        // 60000/3 - (-5000)
        assert_eq!(r3.bagi_hasil_anwar, dec!(25000.00));
    }

    #[test]
    fn test_lunas_counts_as_revenue() {
        let rows = vec![entry(1, Category::Lunas, dec!(75000), dec!(0), "pelunasan")];
        let derived = fold_derived(&rows);
        assert_eq!(derived[0].omzet, dec!(75000));
    }

    #[test]
    fn test_category_isolation() {
        // A SUPPLY kredit must not move omzet, opex, or any kasbon.
        let rows = vec![
            entry(1, Category::Omzet, dec!(50000), dec!(0), ""),
            entry(2, Category::Supply, dec!(0), dec!(10000), "tinta"),
        ];
        let derived = fold_derived(&rows);
        assert_eq!(derived[1].omzet, dec!(50000));
        assert_eq!(derived[1].biaya_operasional, dec!(0));
        assert_eq!(derived[1].kasbon_anwar, dec!(0));
        assert_eq!(derived[1].kasbon_cahaya, dec!(0));
    }

    #[test]
    fn test_kas_and_subsidi_touch_only_saldo() {
        let rows = vec![
            entry(1, Category::Kas, dec!(20000), dec!(0), "modal kas"),
            entry(2, Category::Subsidi, dec!(0), dec!(5000), "subsidi listrik"),
        ];
        let derived = fold_derived(&rows);
        assert_eq!(derived[1].saldo, dec!(15000));
        assert_eq!(derived[1].omzet, dec!(0));
        assert_eq!(derived[1].biaya_operasional, dec!(0));
        assert_eq!(derived[1].laba_bersih, dec!(0));
    }

    #[test]
    fn test_balance_identity() {
        let rows = vec![
            entry(1, Category::Omzet, dec!(100), dec!(0), ""),
            entry(2, Category::Biaya, dec!(0), dec!(30), ""),
            entry(3, Category::Kas, dec!(7), dec!(0), ""),
            entry(4, Category::Hutang, dec!(0), dec!(12), ""),
        ];
        let derived = fold_derived(&rows);
        let mut expected = Decimal::ZERO;
        for (row, d) in rows.iter().zip(&derived) {
            expected += row.debit - row.kredit;
            assert_eq!(d.saldo, expected);
        }
    }

    #[test]
    fn test_purpose_substring_case_insensitive() {
        for memo in ["Bayar Cahaya", "CAHAYA makmur", "ke cahaya"] {
            let rows = vec![entry(1, Category::Biaya, dec!(0), dec!(1000), memo)];
            let derived = fold_derived(&rows);
            assert_eq!(derived[0].kasbon_cahaya, dec!(1000), "memo {memo:?}");
        }
        // Prefix only, no full match.
        let rows = vec![entry(1, Category::Biaya, dec!(0), dec!(1000), "Cahay")];
        assert_eq!(fold_derived(&rows)[0].kasbon_cahaya, dec!(0));
        // Right memo, wrong category.
        let rows = vec![entry(1, Category::Supply, dec!(0), dec!(1000), "cahaya")];
        assert_eq!(fold_derived(&rows)[0].kasbon_cahaya, dec!(0));
    }

    #[test]
    fn test_investor_row_moves_gemi_and_cahaya() {
        let rows = vec![entry(
            1,
            Category::Investor,
            dec!(0),
            dec!(30000),
            "dana Cahaya masuk",
        )];
        let derived = fold_derived(&rows);
        assert_eq!(derived[0].kasbon_cahaya, dec!(30000));
        // Gemi: no profit movement, investor kredit subtracts.
        assert_eq!(derived[0].bagi_hasil_gemi, dec!(-30000));
        assert_eq!(derived[0].saldo, dec!(-30000));
    }

    #[test]
    fn test_override_pins_value_and_shifts_baseline() {
        let mut rows = vec![
            entry(1, Category::Omzet, dec!(10000), dec!(0), ""),
            entry(2, Category::Omzet, dec!(10000), dec!(0), ""),
            entry(3, Category::Omzet, dec!(10000), dec!(0), ""),
        ];
        // Pin row 2's omzet to 99000.
        rows[1].overrides.omzet = true;
        rows[1].derived.omzet = dec!(99000);

        let derived = fold_derived(&rows);
        // Row 1 unaffected.
        assert_eq!(derived[0].omzet, dec!(10000));
        // Row 2 shows the pinned value.
        assert_eq!(derived[1].omzet, dec!(99000));
        // Row 3 continues from the pin, not from the formula trajectory.
        assert_eq!(derived[2].omzet, dec!(109000));
        // Net profit downstream of the pin follows the shifted revenue.
        assert_eq!(derived[2].laba_bersih, dec!(109000));
    }

    #[test]
    fn test_gemi_carries_across_laba_override() {
        // Overriding laba_bersih at row 2 moves the gemi delta through the
        // overridden value; gemi itself keeps accumulating.
        let mut rows = vec![
            entry(1, Category::Omzet, dec!(30000), dec!(0), ""),
            entry(2, Category::Kas, dec!(1000), dec!(0), ""),
        ];
        rows[1].overrides.laba_bersih = true;
        rows[1].derived.laba_bersih = dec!(60000);

        let derived = fold_derived(&rows);
        assert_eq!(derived[0].bagi_hasil_gemi, dec!(10000));
        // Delta = 60000 - 30000 = 30000; gemi += 10000.
        assert_eq!(derived[1].laba_bersih, dec!(60000));
        assert_eq!(derived[1].bagi_hasil_gemi, dec!(20000));
    }

    #[test]
    fn test_batch_incremental_equivalence() {
        // Appending one row at a time from a seeded accumulator must match
        // the full fold after every step.
        let rows = vec![
            entry(1, Category::Omzet, dec!(100000), dec!(0), ""),
            entry(2, Category::Biaya, dec!(0), dec!(25000), "bayar dinil"),
            entry(3, Category::Supply, dec!(0), dec!(40000), ""),
            entry(4, Category::PribadiS, dec!(0), dec!(8000), ""),
            entry(5, Category::Investor, dec!(15000), dec!(0), "cahaya"),
        ];

        let mut persisted: Vec<CashBookEntry> = Vec::new();
        for row in &rows {
            let mut acc = match persisted.last() {
                Some(last) => Accumulator::seeded_from(last),
                None => Accumulator::zero(),
            };
            let mut appended = row.clone();
            appended.derived = acc.apply(row);
            persisted.push(appended);

            let prefix: Vec<CashBookEntry> = rows[..persisted.len()].to_vec();
            let batch = fold_derived(&prefix);
            for (incremental, full) in persisted.iter().zip(&batch) {
                assert_eq!(&incremental.derived, full);
            }
        }
    }

    #[test]
    fn test_fold_is_idempotent() {
        let rows = vec![
            entry(1, Category::Omzet, dec!(100000), dec!(0), ""),
            entry(2, Category::Supply, dec!(0), dec!(40000), ""),
            entry(3, Category::PribadiA, dec!(5000), dec!(0), ""),
        ];
        // Write the first fold's results back into the rows, then refold.
        let first = fold_derived(&rows);
        let mut rewritten = rows.clone();
        for (row, d) in rewritten.iter_mut().zip(&first) {
            row.derived = d.clone();
        }
        let second = fold_derived(&rewritten);
        assert_eq!(first, second);
    }

    #[test]
    fn test_canonical_sort_uses_created_tiebreaker() {
        let mut rows = vec![
            entry(2, Category::Omzet, dec!(1), dec!(0), ""),
            entry(1, Category::Omzet, dec!(1), dec!(0), ""),
        ];
        // Same position, created order decides.
        rows[0].urutan_tampilan = 1;
        rows[0].dibuat_pada = "2025-03-01T00:00:09Z".to_string();
        rows[1].dibuat_pada = "2025-03-01T00:00:01Z".to_string();
        canonical_sort(&mut rows);
        assert_eq!(rows[0].id, "cb-1");
        assert_eq!(rows[1].id, "cb-2");
    }

    #[test]
    fn test_share_rounding_is_two_dp_away_from_zero() {
        assert_eq!(third(dec!(100000)), dec!(33333.33));
        assert_eq!(third(dec!(-40000)), dec!(-13333.33));
        assert_eq!(third(dec!(0.05)), dec!(0.02));
        assert_eq!(third(dec!(-0.05)), dec!(-0.02));
    }
}
