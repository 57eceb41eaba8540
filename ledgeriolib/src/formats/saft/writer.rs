//! Запись SAF-T Financial для синтетических книг (нагрузочные тесты, фикстуры).

use chrono::NaiveDate;
use quick_xml::{
    events::{BytesDecl, BytesStart, BytesText, Event},
    Writer,
};
use rust_decimal::Decimal;
use std::io::Write;

use crate::{
    error::{LedgerError, Result},
    model::{DeclaredAccount, Direction, DocumentHeader, PeriodBound},
};

pub const SAFT_NAMESPACE: &str = "urn:StandardAuditFile-Taxation-Financial:NO";

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticLine {
    pub account_id: String,
    pub direction: Direction,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub lines: Vec<SyntheticLine>,
}

/// Всё, что нужно для записи документа. План счетов в `header.accounts`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticLedger {
    pub header: DocumentHeader,
    pub journal_id: String,
    pub transactions: Vec<SyntheticTransaction>,
}

impl SyntheticLedger {
    /// Сбалансированная книга: `accounts` счетов, не меньше `entries` строк.
    /// Заявленные исходящие остатки совпадают с результатом проводок.
    ///
    /// Суммы идут по фиксированной последовательности: при одинаковых аргументах
    /// документ тот же.
    pub fn generate(accounts: usize, entries: usize) -> Self {
        let accounts = accounts.max(2);
        let mut chart: Vec<DeclaredAccount> = (0..accounts)
            .map(|i| DeclaredAccount {
                account_id: (1000 + 10 * i).to_string(),
                description: Some(format!("Account {}", i + 1)),
                opening: Decimal::new(((i % 7) as i64 - 3) * 10_000, 2),
                closing: None,
            })
            .collect();

        let year = 2023;
        let mut transactions = Vec::with_capacity(entries.div_ceil(2));
        let mut seed: u64 = 0x2545_f491;
        for n in 0..entries.div_ceil(2) {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let debit = (seed >> 33) as usize % accounts;
            let credit = (debit + 1 + (seed >> 17) as usize % (accounts - 1)) % accounts;
            let amount = Decimal::new(((seed >> 40) % 1_000_000) as i64 + 1, 2);
            let day = (n % 28) as u32 + 1;
            let month = (n / 28 % 12) as u32 + 1;
            transactions.push(SyntheticTransaction {
                id: format!("T{}", n + 1),
                date: NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN),
                lines: vec![
                    SyntheticLine {
                        account_id: chart[debit].account_id.clone(),
                        direction: Direction::Debit,
                        amount,
                    },
                    SyntheticLine {
                        account_id: chart[credit].account_id.clone(),
                        direction: Direction::Credit,
                        amount,
                    },
                ],
            });
        }

        let mut closing: Vec<Decimal> = chart.iter().map(|a| a.opening).collect();
        let index: std::collections::HashMap<&str, usize> = chart
            .iter()
            .enumerate()
            .map(|(i, a)| (a.account_id.as_str(), i))
            .collect();
        for line in transactions.iter().flat_map(|t| &t.lines) {
            if let Some(&i) = index.get(line.account_id.as_str()) {
                match line.direction {
                    Direction::Debit => closing[i] += line.amount,
                    Direction::Credit => closing[i] -= line.amount,
                }
            }
        }
        for (acct, c) in chart.iter_mut().zip(closing) {
            acct.closing = Some(c);
        }

        Self {
            header: DocumentHeader {
                company_id: Some("999999999".into()),
                company_name: Some("Synthetic AS".into()),
                fiscal_year: Some(year),
                currency: Some("NOK".into()),
                period_start: Some(PeriodBound::Period(1)),
                period_end: Some(PeriodBound::Period(12)),
                audit_file_version: Some("1.30".into()),
                accounts: chart,
            },
            journal_id: "GL".into(),
            transactions,
        }
    }

    pub fn line_count(&self) -> usize {
        self.transactions.iter().map(|t| t.lines.len()).sum()
    }
}

pub struct SaftWriter;

impl SaftWriter {
    pub fn write<W: Write>(w: W, ledger: &SyntheticLedger) -> Result<()> {
        let mut wr = Writer::new_with_indent(w, b' ', 2);

        wr.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml)?;
        let mut root = BytesStart::new("AuditFile");
        root.push_attribute(("xmlns", SAFT_NAMESPACE));
        wr.write_event(Event::Start(root)).map_err(xml)?;

        write_header(&mut wr, &ledger.header).map_err(xml)?;

        open(&mut wr, "MasterFiles").map_err(xml)?;
        open(&mut wr, "GeneralLedgerAccounts").map_err(xml)?;
        for acct in &ledger.header.accounts {
            write_account(&mut wr, acct).map_err(xml)?;
        }
        close(&mut wr, "GeneralLedgerAccounts").map_err(xml)?;
        close(&mut wr, "MasterFiles").map_err(xml)?;

        open(&mut wr, "GeneralLedgerEntries").map_err(xml)?;
        leaf(&mut wr, "NumberOfEntries", &ledger.transactions.len().to_string()).map_err(xml)?;
        open(&mut wr, "Journal").map_err(xml)?;
        leaf(&mut wr, "JournalID", &ledger.journal_id).map_err(xml)?;
        for tx in &ledger.transactions {
            write_transaction(&mut wr, tx).map_err(xml)?;
        }
        close(&mut wr, "Journal").map_err(xml)?;
        close(&mut wr, "GeneralLedgerEntries").map_err(xml)?;

        close(&mut wr, "AuditFile").map_err(xml)?;
        let mut inner = wr.into_inner();
        inner.flush()?;
        Ok(())
    }

    /// Для тестов и источников в памяти.
    pub fn to_bytes(ledger: &SyntheticLedger) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Self::write(&mut out, ledger)?;
        Ok(out)
    }
}

type XmlResult = std::result::Result<(), quick_xml::Error>;

fn open<W: Write>(wr: &mut Writer<W>, name: &str) -> XmlResult {
    wr.write_event(Event::Start(BytesStart::new(name)))
}

fn close<W: Write>(wr: &mut Writer<W>, name: &str) -> XmlResult {
    wr.write_event(Event::End(BytesStart::new(name).to_end()))
}

fn leaf<W: Write>(wr: &mut Writer<W>, name: &str, text: &str) -> XmlResult {
    open(wr, name)?;
    wr.write_event(Event::Text(BytesText::new(text)))?;
    close(wr, name)
}

fn write_header<W: Write>(wr: &mut Writer<W>, h: &DocumentHeader) -> XmlResult {
    open(wr, "Header")?;
    leaf(wr, "AuditFileVersion", h.audit_file_version.as_deref().unwrap_or("1.30"))?;
    leaf(wr, "AuditFileCountry", "NO")?;
    open(wr, "Company")?;
    if let Some(id) = &h.company_id {
        leaf(wr, "RegistrationNumber", id)?;
    }
    if let Some(name) = &h.company_name {
        leaf(wr, "Name", name)?;
    }
    close(wr, "Company")?;
    if let Some(cur) = &h.currency {
        leaf(wr, "DefaultCurrencyCode", cur)?;
    }
    open(wr, "SelectionCriteria")?;
    if let Some(start) = h.period_start {
        leaf(wr, "PeriodStart", &bound(start))?;
    }
    if let Some(year) = h.fiscal_year {
        leaf(wr, "PeriodStartYear", &year.to_string())?;
    }
    if let Some(end) = h.period_end {
        leaf(wr, "PeriodEnd", &bound(end))?;
    }
    if let Some(year) = h.fiscal_year {
        leaf(wr, "PeriodEndYear", &year.to_string())?;
    }
    close(wr, "SelectionCriteria")?;
    close(wr, "Header")
}

fn bound(b: PeriodBound) -> String {
    match b {
        PeriodBound::Period(p) => p.to_string(),
        PeriodBound::Date(d) => d.format("%Y-%m-%d").to_string(),
    }
}

/// Неотрицательный остаток пишем в дебет, отрицательный в кредит.
fn write_balance<W: Write>(wr: &mut Writer<W>, kind: &str, value: Decimal) -> XmlResult {
    let (side, amount) = if value.is_sign_negative() {
        ("Credit", -value)
    } else {
        ("Debit", value)
    };
    leaf(wr, &format!("{kind}{side}Balance"), &amount.to_string())
}

fn write_account<W: Write>(wr: &mut Writer<W>, a: &DeclaredAccount) -> XmlResult {
    open(wr, "Account")?;
    leaf(wr, "AccountID", &a.account_id)?;
    if let Some(d) = &a.description {
        leaf(wr, "AccountDescription", d)?;
    }
    leaf(wr, "AccountType", "GL")?;
    write_balance(wr, "Opening", a.opening)?;
    if let Some(c) = a.closing {
        write_balance(wr, "Closing", c)?;
    }
    close(wr, "Account")
}

fn write_transaction<W: Write>(wr: &mut Writer<W>, tx: &SyntheticTransaction) -> XmlResult {
    open(wr, "Transaction")?;
    leaf(wr, "TransactionID", &tx.id)?;
    leaf(wr, "TransactionDate", &tx.date.format("%Y-%m-%d").to_string())?;
    for (n, line) in tx.lines.iter().enumerate() {
        open(wr, "Line")?;
        leaf(wr, "RecordID", &(n + 1).to_string())?;
        leaf(wr, "AccountID", &line.account_id)?;
        let side = match line.direction {
            Direction::Debit => "DebitAmount",
            Direction::Credit => "CreditAmount",
        };
        open(wr, side)?;
        leaf(wr, "Amount", &line.amount.to_string())?;
        close(wr, side)?;
        close(wr, "Line")?;
    }
    close(wr, "Transaction")
}

fn xml<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Xml(e.to_string())
}
