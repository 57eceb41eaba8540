//! Текстовая ведомость для `ledgerio check`.

use std::io::Write;

use ledgeriolib::{model::round_display, ImportResult};
use rust_decimal::Decimal;

pub fn write_table<W: Write>(out: &mut W, results: &[ImportResult], digits: u32) -> anyhow::Result<()> {
    let round = |v: Decimal| round_display(v, digits);
    for result in results {
        let ds = &result.dataset;
        writeln!(
            out,
            "{} | {} {} | year {} | {} entries, {} accounts",
            ds.source_name,
            ds.company_id.as_deref().unwrap_or("-"),
            ds.company_name.as_deref().unwrap_or(""),
            ds.fiscal_year.map_or_else(|| "-".to_owned(), |y| y.to_string()),
            result.snapshot.entry_count,
            ds.accounts.len(),
        )?;
        writeln!(
            out,
            "{:<14} {:>16} {:>16} {:>16} {:>16} {:>16}",
            "account", "opening", "debit", "credit", "closing", "declared"
        )?;
        for (id, balance) in &result.snapshot.balances {
            let declared = ds
                .accounts
                .get(id)
                .and_then(|a| a.declared_closing)
                .map_or_else(|| "-".to_owned(), |v| round(v).to_string());
            writeln!(
                out,
                "{:<14} {:>16} {:>16} {:>16} {:>16} {:>16}",
                id,
                round(balance.opening),
                round(balance.debit_sum),
                round(balance.credit_sum),
                round(balance.closing),
                declared
            )?;
        }
        writeln!(
            out,
            "{:<14} {:>16} {:>16} {:>16}",
            "total",
            "",
            round(result.snapshot.total_debit),
            round(result.snapshot.total_credit)
        )?;
        for diagnostic in &ds.diagnostics {
            writeln!(out, "{diagnostic}")?;
        }
        writeln!(
            out,
            "{}\n",
            if result.reconciles() { "reconciled" } else { "NOT reconciled" }
        )?;
    }
    Ok(())
}
