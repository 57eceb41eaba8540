//! Накопительные итоги по счетам по потоку проводок.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::{
    error::{LedgerError, Result},
    model::{Account, AccountBalance, DeclaredAccount, Direction, LedgerEntry, TrialBalanceSnapshot},
};

pub struct TrialBalanceAccumulator {
    accounts: IndexMap<String, Account>,
    total_debit: Decimal,
    total_credit: Decimal,
    entry_count: u64,
}

impl TrialBalanceAccumulator {
    /// Начальное состояние берётся из плана счетов. Порядок объявления сохраняется;
    /// при повторе id остаётся первое объявление.
    pub fn new(declared: &[DeclaredAccount]) -> Self {
        let mut accounts = IndexMap::with_capacity(declared.len());
        for d in declared {
            accounts
                .entry(d.account_id.clone())
                .or_insert_with(|| Account::from_declared(d));
        }
        Self {
            accounts,
            total_debit: Decimal::ZERO,
            total_credit: Decimal::ZERO,
            entry_count: 0,
        }
    }

    pub fn apply(&mut self, entry: &LedgerEntry) -> Result<()> {
        let overflow = || LedgerError::Overflow {
            account: entry.account_id.clone(),
        };

        let index = match self.accounts.get_index_of(&entry.account_id) {
            Some(i) => i,
            None => {
                let account = Account::undeclared(&entry.account_id);
                self.accounts.insert_full(entry.account_id.clone(), account).0
            }
        };
        let account = &mut self.accounts[index];

        match entry.direction {
            Direction::Debit => {
                account.debit_sum = account.debit_sum.checked_add(entry.amount).ok_or_else(overflow)?;
                self.total_debit = self.total_debit.checked_add(entry.amount).ok_or_else(overflow)?;
            }
            Direction::Credit => {
                account.credit_sum = account.credit_sum.checked_add(entry.amount).ok_or_else(overflow)?;
                self.total_credit = self.total_credit.checked_add(entry.amount).ok_or_else(overflow)?;
            }
        }
        account.entry_count += 1;
        self.entry_count += 1;
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn accounts(&self) -> &IndexMap<String, Account> {
        &self.accounts
    }

    /// [`LedgerError::Overflow`], если исходящий остаток не помещается в `Decimal`.
    pub fn finalize(&self) -> Result<TrialBalanceSnapshot> {
        let balances = self
            .accounts
            .iter()
            .map(|(id, a)| {
                let closing = a.computed_closing().ok_or_else(|| LedgerError::Overflow {
                    account: id.clone(),
                })?;
                let balance = AccountBalance {
                    opening: a.opening,
                    debit_sum: a.debit_sum,
                    credit_sum: a.credit_sum,
                    closing,
                };
                Ok((id.clone(), balance))
            })
            .collect::<Result<_>>()?;
        Ok(TrialBalanceSnapshot {
            balances,
            total_debit: self.total_debit,
            total_credit: self.total_credit,
            entry_count: self.entry_count,
        })
    }

    pub fn into_accounts(self) -> IndexMap<String, Account> {
        self.accounts
    }
}

/// Когда цикл накопления сообщает прогресс: каждые `every` проводок или
/// по истечении `interval`, что наступит раньше.
pub struct ProgressThrottle {
    every: u64,
    interval: Duration,
    last_count: u64,
    last_at: Instant,
}

impl ProgressThrottle {
    pub fn new(every: u64, interval: Duration) -> Self {
        Self {
            every: every.max(1),
            interval,
            last_count: 0,
            last_at: Instant::now(),
        }
    }

    pub fn should_report(&mut self, count: u64) -> bool {
        // часы читаем только на каждой 64-й проводке
        let due = count.saturating_sub(self.last_count) >= self.every
            || (count % 64 == 0 && self.last_at.elapsed() >= self.interval);
        if due {
            self.last_count = count;
            self.last_at = Instant::now();
        }
        due
    }
}
