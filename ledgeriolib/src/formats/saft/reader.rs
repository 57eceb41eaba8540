//! Потоковый (pull) ридер SAF-T.
//!
//! [`SaftReader::open`] читает `Header` и `MasterFiles` и возвращает
//! [`DocumentHeader`]; дальше ридер работает как итератор по [`LedgerEntry`], по одной
//! на проводку. В буфере не больше проводок одной `Line`.

use std::collections::VecDeque;
use std::io::BufRead;

use quick_xml::{events::Event, Reader};
use rust_decimal::Decimal;

use super::counting::CountingReader;
use super::tags::Tag;
use super::text::{parse_amount, parse_date, parse_period};
use crate::{
    error::ParseError,
    model::{DeclaredAccount, Direction, DocumentHeader, LedgerEntry},
};
use chrono::NaiveDate;

/// Счёт для строк без AccountID.
pub const UNASSIGNED_ACCOUNT: &str = "(unassigned)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prelude,
    Entries,
}

enum Step {
    Start(Tag),
    Empty(Tag),
    End(Tag),
    Eof,
    Skip,
}

/// Кандидаты на id компании, в порядке приоритета.
const COMPANY_ID_SLOTS: usize = 5;

#[derive(Default)]
struct HeaderDraft {
    company_ids: [Option<String>; COMPANY_ID_SLOTS],
    company_name: Option<String>,
    fiscal_year: Option<i32>,
    currency: Option<String>,
    period_starts: [Option<String>; 4],
    period_ends: [Option<String>; 4],
    version: Option<String>,
    accounts: Vec<DeclaredAccount>,
}

impl HeaderDraft {
    fn finish(&mut self) -> DocumentHeader {
        let first = |slots: &mut [Option<String>]| slots.iter_mut().find_map(Option::take);
        DocumentHeader {
            company_id: first(&mut self.company_ids),
            company_name: self.company_name.take(),
            fiscal_year: self.fiscal_year,
            currency: self.currency.take(),
            period_start: first(&mut self.period_starts).and_then(|s| parse_period(&s)),
            period_end: first(&mut self.period_ends).and_then(|s| parse_period(&s)),
            audit_file_version: self.version.take(),
            accounts: std::mem::take(&mut self.accounts),
        }
    }
}

#[derive(Default)]
struct AccountDraft {
    id: Option<String>,
    description: Option<String>,
    opening_debit: Option<Decimal>,
    opening_credit: Option<Decimal>,
    closing_debit: Option<Decimal>,
    closing_credit: Option<Decimal>,
}

impl AccountDraft {
    /// `Ok(None)` для счёта без id; `Err` называет остаток, который не
    /// помещается в `Decimal`.
    fn finish(self) -> Result<Option<DeclaredAccount>, &'static str> {
        let net = |d: Option<Decimal>, c: Option<Decimal>| {
            d.unwrap_or(Decimal::ZERO).checked_sub(c.unwrap_or(Decimal::ZERO))
        };
        let opening = net(self.opening_debit, self.opening_credit).ok_or("opening balance")?;
        let closing = match (self.closing_debit, self.closing_credit) {
            (None, None) => None,
            (d, c) => Some(net(d, c).ok_or("closing balance")?),
        };
        Ok(self.id.map(|account_id| DeclaredAccount {
            account_id,
            description: self.description,
            opening,
            closing,
        }))
    }
}

#[derive(Default)]
struct TransactionDraft {
    id: Option<String>,
    date: Option<NaiveDate>,
}

#[derive(Default)]
struct LineDraft {
    account_id: Option<String>,
    debit: Option<Decimal>,
    credit: Option<Decimal>,
    customer: Option<String>,
    supplier: Option<String>,
}

pub struct SaftReader<R: BufRead> {
    xml: Reader<CountingReader<R>>,
    buf: Vec<u8>,
    text: String,
    stack: Vec<Tag>,
    phase: Phase,
    seen_root: bool,
    finished: bool,
    header: HeaderDraft,
    account: Option<AccountDraft>,
    journal_id: Option<String>,
    transaction: TransactionDraft,
    line: Option<LineDraft>,
    pending: VecDeque<LedgerEntry>,
    entries_read: u64,
}

fn non_empty(text: &str) -> Option<String> {
    let t = text.trim();
    (!t.is_empty()).then(|| t.to_owned())
}

fn position_error<R: BufRead>(
    xml: &Reader<CountingReader<R>>,
    message: impl Into<String>,
) -> ParseError {
    let src = xml.get_ref();
    ParseError::new(message, src.bytes_consumed(), src.line())
}

impl<R: BufRead> SaftReader<R> {
    /// Читает до первого журнала и возвращает заголовок документа.
    pub fn open(inner: R) -> Result<(DocumentHeader, Self), ParseError> {
        let mut xml = Reader::from_reader(CountingReader::new(inner));
        xml.trim_text(true);

        let mut reader = Self {
            xml,
            buf: Vec::new(),
            text: String::new(),
            stack: Vec::new(),
            phase: Phase::Prelude,
            seen_root: false,
            finished: false,
            header: HeaderDraft::default(),
            account: None,
            journal_id: None,
            transaction: TransactionDraft::default(),
            line: None,
            pending: VecDeque::with_capacity(2),
            entries_read: 0,
        };

        while reader.phase == Phase::Prelude && !reader.finished {
            reader.advance()?;
        }
        let header = reader.header.finish();
        Ok((header, reader))
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.xml.get_ref().bytes_consumed()
    }

    pub fn line(&self) -> u64 {
        self.xml.get_ref().line()
    }

    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        position_error(&self.xml, message)
    }

    /// Обработать ровно одно событие разметки.
    fn advance(&mut self) -> Result<(), ParseError> {
        self.buf.clear();
        let step = match self.xml.read_event_into(&mut self.buf) {
            Ok(Event::Start(e)) => Step::Start(Tag::from_local(e.local_name().as_ref())),
            Ok(Event::Empty(e)) => Step::Empty(Tag::from_local(e.local_name().as_ref())),
            Ok(Event::End(e)) => Step::End(Tag::from_local(e.local_name().as_ref())),
            Ok(Event::Text(t)) => match t.unescape() {
                Ok(s) => {
                    self.text.push_str(&s);
                    Step::Skip
                }
                Err(e) => return Err(position_error(&self.xml, format!("invalid text: {e}"))),
            },
            Ok(Event::CData(c)) => {
                self.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                Step::Skip
            }
            Ok(Event::Eof) => Step::Eof,
            Ok(_) => Step::Skip,
            Err(e) => return Err(position_error(&self.xml, format!("malformed XML: {e}"))),
        };

        match step {
            Step::Start(tag) => self.start(tag),
            Step::Empty(tag) => {
                self.start(tag);
                self.end(tag)?;
            }
            Step::End(tag) => self.end(tag)?,
            Step::Eof => self.eof()?,
            Step::Skip => {}
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag) {
        self.seen_root = true;
        self.text.clear();
        let parent = self.stack.last().copied();
        match (tag, parent) {
            (Tag::Account, Some(Tag::GeneralLedgerAccounts)) if self.phase == Phase::Prelude => {
                self.account = Some(AccountDraft::default());
            }
            (Tag::GeneralLedgerEntries, _) => self.phase = Phase::Entries,
            (Tag::Journal, _) => {
                self.phase = Phase::Entries;
                self.journal_id = None;
            }
            (Tag::Transaction, Some(Tag::Journal)) => {
                self.transaction = TransactionDraft::default();
            }
            (Tag::Line, Some(Tag::Transaction)) => self.line = Some(LineDraft::default()),
            _ => {}
        }
        self.stack.push(tag);
    }

    fn end(&mut self, tag: Tag) -> Result<(), ParseError> {
        self.stack.pop();
        let text = std::mem::take(&mut self.text);
        let depth = self.stack.len();
        let parent = self.stack.last().copied();
        let grandparent = depth.checked_sub(2).map(|i| self.stack[i]);

        match self.phase {
            Phase::Prelude => self.end_prelude(tag, parent, grandparent, &text)?,
            Phase::Entries => self.end_entries(tag, parent, &text)?,
        }
        self.text = text;
        self.text.clear();
        Ok(())
    }

    fn end_prelude(
        &mut self,
        tag: Tag,
        parent: Option<Tag>,
        grandparent: Option<Tag>,
        text: &str,
    ) -> Result<(), ParseError> {
        let h = &mut self.header;
        match (tag, parent) {
            (Tag::AuditFileVersion, Some(Tag::Header)) => h.version = non_empty(text),
            (Tag::DefaultCurrencyCode, Some(Tag::Header)) => h.currency = non_empty(text),
            (Tag::Name, Some(Tag::Company)) if grandparent == Some(Tag::Header) => {
                h.company_name = non_empty(text);
            }
            (Tag::RegistrationNumber, Some(Tag::Company)) => h.company_ids[0] = non_empty(text),
            (Tag::RegistrationNumber, Some(Tag::TaxRegistrationNumber)) => {
                h.company_ids[1] = non_empty(text);
            }
            (Tag::TaxRegistrationNumber, Some(Tag::Company)) => h.company_ids[2] = non_empty(text),
            (Tag::CompanyId, Some(Tag::Company)) => h.company_ids[3] = non_empty(text),
            (Tag::CompanyId, Some(Tag::TaxRegistrationNumber)) => {
                h.company_ids[4] = non_empty(text);
            }
            (Tag::PeriodEndYear, Some(Tag::SelectionCriteria)) => {
                h.fiscal_year = text.trim().parse().ok();
            }
            (Tag::PeriodStart, Some(Tag::SelectionCriteria)) => h.period_starts[0] = non_empty(text),
            (Tag::SelectionStartDate, Some(Tag::SelectionCriteria)) => {
                h.period_starts[1] = non_empty(text);
            }
            (Tag::StartDate, Some(Tag::SelectionCriteria)) => h.period_starts[2] = non_empty(text),
            (Tag::PeriodStartDate, Some(Tag::SelectionCriteria)) => {
                h.period_starts[3] = non_empty(text);
            }
            (Tag::PeriodEnd, Some(Tag::SelectionCriteria)) => h.period_ends[0] = non_empty(text),
            (Tag::SelectionEndDate, Some(Tag::SelectionCriteria)) => {
                h.period_ends[1] = non_empty(text);
            }
            (Tag::EndDate, Some(Tag::SelectionCriteria)) => h.period_ends[2] = non_empty(text),
            (Tag::PeriodEndDate, Some(Tag::SelectionCriteria)) => h.period_ends[3] = non_empty(text),
            (Tag::Account, Some(Tag::GeneralLedgerAccounts)) => {
                if let Some(draft) = self.account.take() {
                    let declared = draft
                        .finish()
                        .map_err(|what| self.error(format!("Account: {what} out of range")))?;
                    self.header.accounts.extend(declared);
                }
            }
            (_, Some(Tag::Account)) => self.end_account_field(tag, text)?,
            _ => {}
        }
        Ok(())
    }

    fn end_account_field(&mut self, tag: Tag, text: &str) -> Result<(), ParseError> {
        if self.account.is_none() {
            return Ok(());
        }
        let amount = match tag {
            Tag::OpeningDebitBalance
            | Tag::OpeningCreditBalance
            | Tag::ClosingDebitBalance
            | Tag::ClosingCreditBalance => Some(
                parse_amount(text).map_err(|e| self.error(format!("{}: {e}", tag.as_str())))?,
            ),
            _ => None,
        };
        let Some(acct) = self.account.as_mut() else {
            return Ok(());
        };
        match tag {
            Tag::AccountId => acct.id = non_empty(text),
            Tag::AccountDescription => acct.description = non_empty(text),
            Tag::OpeningDebitBalance => acct.opening_debit = amount,
            Tag::OpeningCreditBalance => acct.opening_credit = amount,
            Tag::ClosingDebitBalance => acct.closing_debit = amount,
            Tag::ClosingCreditBalance => acct.closing_credit = amount,
            _ => {}
        }
        Ok(())
    }

    fn end_entries(&mut self, tag: Tag, parent: Option<Tag>, text: &str) -> Result<(), ParseError> {
        match (tag, parent) {
            (Tag::JournalId, Some(Tag::Journal)) => self.journal_id = non_empty(text),
            (Tag::Journal, _) => self.journal_id = None,
            (Tag::TransactionId, Some(Tag::Transaction)) => self.transaction.id = non_empty(text),
            (Tag::TransactionDate, Some(Tag::Transaction)) => {
                self.transaction.date = parse_date(text);
            }
            (Tag::Amount, Some(Tag::DebitAmount | Tag::CreditAmount)) => {
                let value = self.amount(parent, text)?;
                if let Some(line) = self.line.as_mut() {
                    match parent {
                        Some(Tag::DebitAmount) => line.debit = Some(value),
                        _ => line.credit = Some(value),
                    }
                }
            }
            (Tag::DebitAmount | Tag::CreditAmount, Some(Tag::Line)) => {
                let direct = if text.trim().is_empty() {
                    None
                } else {
                    Some(self.amount(Some(tag), text)?)
                };
                if let Some(line) = self.line.as_mut() {
                    let slot = if tag == Tag::DebitAmount {
                        &mut line.debit
                    } else {
                        &mut line.credit
                    };
                    if let Some(v) = direct {
                        *slot = Some(v);
                    } else if slot.is_none() {
                        *slot = Some(Decimal::ZERO);
                    }
                }
            }
            (Tag::AccountId, Some(Tag::Line)) => {
                if let Some(line) = self.line.as_mut() {
                    line.account_id = non_empty(text);
                }
            }
            (Tag::CustomerId, Some(Tag::Line)) => {
                if let Some(line) = self.line.as_mut() {
                    line.customer = non_empty(text);
                }
            }
            (Tag::SupplierId, Some(Tag::Line)) => {
                if let Some(line) = self.line.as_mut() {
                    line.supplier = non_empty(text);
                }
            }
            (Tag::Line, Some(Tag::Transaction)) => {
                if let Some(line) = self.line.take() {
                    self.emit(line);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn amount(&self, field: Option<Tag>, text: &str) -> Result<Decimal, ParseError> {
        let name = field.map_or("amount", Tag::as_str);
        parse_amount(text).map_err(|e| self.error(format!("{name}: {e}")))
    }

    fn emit(&mut self, line: LineDraft) {
        let account_id = line
            .account_id
            .unwrap_or_else(|| UNASSIGNED_ACCOUNT.to_owned());
        let counterparty = line.customer.or(line.supplier);
        let debit = line.debit.filter(|d| !d.is_zero());
        let credit = line.credit.filter(|c| !c.is_zero());

        let parts: [Option<(Direction, Decimal)>; 2] = match (debit, credit) {
            (None, None) => [Some((Direction::Debit, Decimal::ZERO)), None],
            (Some(d), None) => [Some((Direction::Debit, d)), None],
            (None, Some(c)) => [Some((Direction::Credit, c)), None],
            (Some(d), Some(c)) => [Some((Direction::Debit, d)), Some((Direction::Credit, c))],
        };

        for (direction, amount) in parts.into_iter().flatten() {
            // отрицательная сумма уходит на противоположную сторону
            let (direction, amount) = if amount.is_sign_negative() {
                let flipped = match direction {
                    Direction::Debit => Direction::Credit,
                    Direction::Credit => Direction::Debit,
                };
                (flipped, amount.abs())
            } else {
                (direction, amount)
            };
            self.pending.push_back(LedgerEntry {
                account_id: account_id.clone(),
                amount,
                direction,
                transaction_date: self.transaction.date,
                counterparty: counterparty.clone(),
                journal_id: self.journal_id.clone(),
                transaction_id: self.transaction.id.clone(),
            });
        }
    }

    fn eof(&mut self) -> Result<(), ParseError> {
        if let Some(open) = self.stack.last() {
            let name = match open {
                Tag::Other => "element",
                t => t.as_str(),
            };
            return Err(self.error(format!(
                "unexpected end of document inside <{name}> ({} element(s) still open)",
                self.stack.len()
            )));
        }
        if !self.seen_root {
            return Err(self.error("document contains no root element"));
        }
        self.finished = true;
        Ok(())
    }
}

impl<R: BufRead> Iterator for SaftReader<R> {
    type Item = Result<LedgerEntry, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                self.entries_read += 1;
                return Some(Ok(entry));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.advance() {
                // после первой ошибки итератор исчерпан
                self.finished = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PeriodBound;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AuditFile xmlns="urn:StandardAuditFile-Taxation-Financial:NO">
  <Header>
    <AuditFileVersion>1.30</AuditFileVersion>
    <DefaultCurrencyCode>NOK</DefaultCurrencyCode>
    <Company>
      <RegistrationNumber>999999999</RegistrationNumber>
      <Name>Test AS</Name>
    </Company>
    <SelectionCriteria>
      <PeriodStart>1</PeriodStart>
      <PeriodEnd>12</PeriodEnd>
      <PeriodEndYear>2023</PeriodEndYear>
    </SelectionCriteria>
  </Header>
  <MasterFiles>
    <GeneralLedgerAccounts>
      <Account>
        <AccountID>1920</AccountID>
        <AccountDescription>Bank</AccountDescription>
        <OpeningDebitBalance>1000.00</OpeningDebitBalance>
        <ClosingDebitBalance>500.00</ClosingDebitBalance>
      </Account>
      <Account>
        <AccountID>2000</AccountID>
        <OpeningCreditBalance>1000,00</OpeningCreditBalance>
        <ClosingCreditBalance>500.00</ClosingCreditBalance>
      </Account>
    </GeneralLedgerAccounts>
  </MasterFiles>
  <GeneralLedgerEntries>
    <Journal>
      <JournalID>GL</JournalID>
      <Transaction>
        <TransactionID>T1</TransactionID>
        <TransactionDate>2023-03-01</TransactionDate>
        <Line>
          <AccountID>1920</AccountID>
          <CreditAmount><Amount>500.00</Amount></CreditAmount>
        </Line>
        <Line>
          <AccountID>2000</AccountID>
          <DebitAmount>500.00</DebitAmount>
          <CustomerID>K1</CustomerID>
        </Line>
      </Transaction>
    </Journal>
  </GeneralLedgerEntries>
</AuditFile>
"#;

    #[test]
    fn header_is_available_before_entries() {
        let (header, reader) = SaftReader::open(Cursor::new(DOC)).expect("open");
        assert_eq!(header.company_id.as_deref(), Some("999999999"));
        assert_eq!(header.company_name.as_deref(), Some("Test AS"));
        assert_eq!(header.fiscal_year, Some(2023));
        assert_eq!(header.currency.as_deref(), Some("NOK"));
        assert_eq!(header.period_start, Some(PeriodBound::Period(1)));
        assert_eq!(header.period_end, Some(PeriodBound::Period(12)));
        assert_eq!(header.audit_file_version.as_deref(), Some("1.30"));
        assert_eq!(header.accounts.len(), 2);
        assert_eq!(header.accounts[0].opening, dec!(1000.00));
        assert_eq!(header.accounts[0].closing, Some(dec!(500.00)));
        assert_eq!(header.accounts[1].opening, dec!(-1000.00));
        assert_eq!(header.accounts[1].closing, Some(dec!(-500.00)));
        assert_eq!(reader.entries_read(), 0);
    }

    #[test]
    fn entries_are_yielded_in_document_order() {
        let (_, reader) = SaftReader::open(Cursor::new(DOC)).expect("open");
        let entries: Vec<_> = reader.collect::<Result<_, _>>().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].account_id, "1920");
        assert_eq!(entries[0].direction, Direction::Credit);
        assert_eq!(entries[0].amount, dec!(500.00));
        assert_eq!(entries[0].journal_id.as_deref(), Some("GL"));
        assert_eq!(entries[0].transaction_id.as_deref(), Some("T1"));
        assert_eq!(entries[0].transaction_date, NaiveDate::from_ymd_opt(2023, 3, 1));
        assert_eq!(entries[1].direction, Direction::Debit);
        assert_eq!(entries[1].counterparty.as_deref(), Some("K1"));
    }

    #[test]
    fn line_tracks_the_whole_document() {
        let (_, mut reader) = SaftReader::open(Cursor::new(DOC)).expect("open");
        assert!(reader.line() > 1);
        for entry in reader.by_ref() {
            entry.expect("entry");
        }
        assert_eq!(reader.line(), DOC.matches('\n').count() as u64 + 1);
        assert_eq!(reader.bytes_consumed(), DOC.len() as u64);
    }

    #[test]
    fn plain_documents_without_namespace_are_read() {
        let doc = "<AuditFile><MasterFiles><GeneralLedgerAccounts><Account>\
            <AccountID>3000</AccountID></Account></GeneralLedgerAccounts></MasterFiles>\
            <GeneralLedgerEntries><Journal><Transaction><Line><AccountID>3000</AccountID>\
            <CreditAmount>10</CreditAmount></Line></Transaction></Journal>\
            </GeneralLedgerEntries></AuditFile>";
        let (header, reader) = SaftReader::open(Cursor::new(doc)).expect("open");
        assert_eq!(header.accounts[0].closing, None);
        let entries: Vec<_> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].signed_amount(), dec!(-10));
    }

    #[test]
    fn line_with_both_sides_and_negative_amount() {
        let doc = "<AuditFile><GeneralLedgerEntries><Journal><Transaction><Line>\
            <AccountID>1500</AccountID><DebitAmount>-20</DebitAmount>\
            <CreditAmount>5</CreditAmount></Line><Line><DebitAmount/></Line>\
            </Transaction></Journal></GeneralLedgerEntries></AuditFile>";
        let (_, reader) = SaftReader::open(Cursor::new(doc)).expect("open");
        let entries: Vec<_> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].direction, Direction::Credit);
        assert_eq!(entries[0].amount, dec!(20));
        assert_eq!(entries[1].direction, Direction::Credit);
        assert_eq!(entries[1].amount, dec!(5));
        assert_eq!(entries[2].account_id, UNASSIGNED_ACCOUNT);
        assert_eq!(entries[2].amount, Decimal::ZERO);
    }

    #[test]
    fn truncated_document_fails_with_position() {
        let cut = DOC.find("<DebitAmount>500.00").expect("marker") + "<DebitAmount>".len();
        let (_, reader) = SaftReader::open(Cursor::new(&DOC[..cut])).expect("open");
        let results: Vec<_> = reader.collect();
        let err = results
            .last()
            .and_then(|r| r.as_ref().err())
            .cloned()
            .expect("parse error at the end");
        assert!(err.message.contains("unexpected end of document"), "{err}");
        assert!(err.line > 30);
        assert!(err.byte_offset > 0 && err.byte_offset <= cut as u64);
        // кредитовая строка до обрыва всё же прочитана
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }

    #[test]
    fn mismatched_tags_are_a_parse_error() {
        let doc = "<AuditFile><GeneralLedgerEntries><Journal><Transaction><Line>\
            <AccountID>1</AccountID></Lin></Transaction></Journal></GeneralLedgerEntries></AuditFile>";
        let (_, mut reader) = SaftReader::open(Cursor::new(doc)).expect("open");
        let err = reader.next().expect("item").unwrap_err();
        assert!(err.message.contains("malformed XML"), "{err}");
        assert!(reader.next().is_none());
    }

    #[test]
    fn out_of_range_declared_balance_is_a_parse_error() {
        let doc = "<AuditFile><MasterFiles><GeneralLedgerAccounts><Account>\
            <AccountID>1920</AccountID>\
            <OpeningDebitBalance>79228162514264337593543950335</OpeningDebitBalance>\
            <OpeningCreditBalance>-1</OpeningCreditBalance>\
            </Account></GeneralLedgerAccounts></MasterFiles></AuditFile>";
        let err = SaftReader::open(Cursor::new(doc)).err().expect("open fails");
        assert!(err.message.contains("opening balance out of range"), "{err}");
        assert!(err.byte_offset > 0);
    }

    #[test]
    fn invalid_amount_is_a_parse_error() {
        let doc = "<AuditFile><GeneralLedgerEntries><Journal><Transaction><Line>\
            <AccountID>1</AccountID><DebitAmount>12x</DebitAmount></Line>\
            </Transaction></Journal></GeneralLedgerEntries></AuditFile>";
        let (_, mut reader) = SaftReader::open(Cursor::new(doc)).expect("open");
        let err = reader.next().expect("item").unwrap_err();
        assert!(err.message.contains("DebitAmount"), "{err}");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(SaftReader::open(Cursor::new("")).is_err());
    }
}
