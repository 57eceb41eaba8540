//! Доменные модели, общие для ридера, аккумулятора, валидатора и сверки.

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    Debit,
    Credit,
}

/// Одна проводка. Живёт один шаг накопления.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub account_id: String,
    /// Всегда неотрицательна; знак задаёт `direction`.
    pub amount: Decimal,
    pub direction: Direction,
    pub transaction_date: Option<NaiveDate>,
    /// Id клиента или поставщика, если указан в строке.
    pub counterparty: Option<String>,
    pub journal_id: Option<String>,
    pub transaction_id: Option<String>,
}

impl LedgerEntry {
    /// Влияние на остаток счёта со знаком (дебет с плюсом).
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Debit => self.amount,
            Direction::Credit => -self.amount,
        }
    }
}

/// Счёт, как он объявлен в плане счетов документа.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredAccount {
    pub account_id: String,
    pub description: Option<String>,
    pub opening: Decimal,
    pub closing: Option<Decimal>,
}

/// Граница периода: дата или номер учётного периода.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodBound {
    Date(NaiveDate),
    Period(u32),
}

impl fmt::Display for PeriodBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Period(p) => write!(f, "P{p}"),
        }
    }
}

/// Метаданные, которые ридер отдаёт до первой проводки.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub fiscal_year: Option<i32>,
    pub currency: Option<String>,
    pub period_start: Option<PeriodBound>,
    pub period_end: Option<PeriodBound>,
    pub audit_file_version: Option<String>,
    pub accounts: Vec<DeclaredAccount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub description: Option<String>,
    pub opening: Decimal,
    pub declared_closing: Option<Decimal>,
    pub debit_sum: Decimal,
    pub credit_sum: Decimal,
    pub entry_count: u64,
    /// false для счетов, встреченных только в проводках.
    pub declared: bool,
}

impl Account {
    pub fn from_declared(d: &DeclaredAccount) -> Self {
        Self {
            account_id: d.account_id.clone(),
            description: d.description.clone(),
            opening: d.opening,
            declared_closing: d.closing,
            debit_sum: Decimal::ZERO,
            credit_sum: Decimal::ZERO,
            entry_count: 0,
            declared: true,
        }
    }

    pub fn undeclared(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_owned(),
            description: None,
            opening: Decimal::ZERO,
            declared_closing: None,
            debit_sum: Decimal::ZERO,
            credit_sum: Decimal::ZERO,
            entry_count: 0,
            declared: false,
        }
    }

    /// `opening + debits - credits`; `None`, если выходит за диапазон Decimal.
    pub fn computed_closing(&self) -> Option<Decimal> {
        self.opening
            .checked_add(self.debit_sum)?
            .checked_sub(self.credit_sum)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub opening: Decimal,
    pub debit_sum: Decimal,
    pub credit_sum: Decimal,
    pub closing: Decimal,
}

/// Итоговая оборотно-сальдовая ведомость. После создания не меняется.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceSnapshot {
    pub balances: IndexMap<String, AccountBalance>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub entry_count: u64,
}

impl TrialBalanceSnapshot {
    pub fn closing(&self, account_id: &str) -> Option<Decimal> {
        self.balances.get(account_id).map(|b| b.closing)
    }

    pub fn difference(&self) -> Decimal {
        self.total_debit - self.total_credit
    }

    pub fn sum_of_closings(&self) -> Option<Decimal> {
        self.balances
            .values()
            .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.closing))
    }

    /// Исходящие остатки, округлённые для показа.
    pub fn rounded(&self, fractional_digits: u32) -> IndexMap<String, Decimal> {
        self.balances
            .iter()
            .map(|(id, b)| (id.clone(), round_display(b.closing, fractional_digits)))
            .collect()
    }
}

/// Половина округляется от нуля, одинаково для положительных и отрицательных.
pub fn round_display(value: Decimal, fractional_digits: u32) -> Decimal {
    value.round_dp_with_strategy(fractional_digits, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Subject {
    Document,
    Account(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Account(id) => write!(f, "account {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Validation,
    Reconciliation,
    Engine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub subject: Subject,
    pub origin: Origin,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Decimal>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        origin: Origin,
        subject: Subject,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            subject,
            origin,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_values(mut self, expected: Decimal, actual: Decimal) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.subject, self.message)?;
        if let (Some(e), Some(a)) = (self.expected, self.actual) {
            write!(f, " (expected {e}, actual {a})")?;
        }
        Ok(())
    }
}

/// Реквизиты и результаты одного импортированного документа.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub source_name: String,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub fiscal_year: Option<i32>,
    pub currency: Option<String>,
    pub period_start: Option<PeriodBound>,
    pub period_end: Option<PeriodBound>,
    pub audit_file_version: Option<String>,
    pub accounts: IndexMap<String, Account>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Dataset {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}
