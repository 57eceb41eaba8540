//! Машиночитаемая выгрузка результатов импорта.

use std::io::Write;

use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{engine::ImportResult, error::Result, model::round_display};

#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    source: &'a str,
    account_id: &'a str,
    description: Option<&'a str>,
    opening: Decimal,
    debit: Decimal,
    credit: Decimal,
    closing: Decimal,
    declared_closing: Option<Decimal>,
    declared: bool,
}

/// Одна строка CSV на строку ведомости, суммы округлены до `fractional_digits`.
pub fn write_csv<W: Write>(mut w: W, results: &[ImportResult], fractional_digits: u32) -> Result<()> {
    let mut wrt = WriterBuilder::new().from_writer(&mut w);
    let round = |v: Decimal| round_display(v, fractional_digits);

    for result in results {
        let ds = &result.dataset;
        for (id, balance) in &result.snapshot.balances {
            let account = ds.accounts.get(id);
            wrt.serialize(BalanceRow {
                source: &ds.source_name,
                account_id: id,
                description: account.and_then(|a| a.description.as_deref()),
                opening: round(balance.opening),
                debit: round(balance.debit_sum),
                credit: round(balance.credit_sum),
                closing: round(balance.closing),
                declared_closing: account.and_then(|a| a.declared_closing).map(round),
                declared: account.is_some_and(|a| a.declared),
            })?;
        }
    }
    wrt.flush()?;
    Ok(())
}

/// Полные результаты (dataset, snapshot, stats) как JSON-массив с отступами.
pub fn write_json<W: Write>(mut w: W, results: &[ImportResult]) -> Result<()> {
    serde_json::to_writer_pretty(&mut w, results)?;
    writeln!(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{
        formats::saft::{SaftWriter, SyntheticLedger},
        ImportEngine, MemorySource, Scheduler,
    };

    fn imported() -> ImportResult {
        let bytes = SaftWriter::to_bytes(&SyntheticLedger::generate(3, 40)).unwrap();
        let source = Arc::new(MemorySource::new("synthetic.xml", bytes));
        ImportEngine::default()
            .submit(&Scheduler::new(), source)
            .wait()
            .into_result()
            .unwrap()
    }

    #[test]
    fn csv_has_one_row_per_account() {
        let result = imported();
        let mut buf = Vec::new();
        write_csv(&mut buf, std::slice::from_ref(&result), 2).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("source,account_id,description,opening,debit,credit,closing,declared_closing,declared")
        );
        assert_eq!(lines.count(), result.snapshot.balances.len());
    }

    #[test]
    fn json_is_an_array_of_results() {
        let mut buf = Vec::new();
        write_json(&mut buf, &[imported()]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
        assert_eq!(value[0]["dataset"]["source_name"], "synthetic.xml");
        assert_eq!(value[0]["stats"]["entries"], 40);
    }
}
