//! Сверка вычисленных остатков с заявленными в документе.

use rust_decimal::Decimal;

use crate::model::{
    round_display, DeclaredAccount, Diagnostic, Origin, Severity, Subject, TrialBalanceSnapshot,
};

/// Сверка `snapshot` с планом счетов. Разницы в сообщениях округляются до
/// `fractional_digits`.
///
/// Порядок диагностик фиксирован: по одной на объявленный счёт (порядок
/// плана), затем счета вне плана (порядок ведомости), затем проверка
/// дебета/кредита по документу.
pub fn reconcile(
    snapshot: &TrialBalanceSnapshot,
    declared: &[DeclaredAccount],
    tolerance: Decimal,
    fractional_digits: u32,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    // разница вне диапазона Decimal заведомо больше допуска
    let exceeds = |a: Decimal, b: Decimal| a.checked_sub(b).map_or(true, |d| d.abs() > tolerance);
    let describe = |a: Decimal, b: Decimal| {
        a.checked_sub(b).map_or_else(
            || "more than the representable range".to_owned(),
            |d| round_display(d, fractional_digits).to_string(),
        )
    };

    let mut seen = std::collections::HashSet::with_capacity(declared.len());
    for acct in declared {
        if !seen.insert(acct.account_id.as_str()) {
            continue;
        }
        let subject = Subject::Account(acct.account_id.clone());
        let computed = snapshot.closing(&acct.account_id).unwrap_or(acct.opening);
        match acct.closing {
            Some(expected) if exceeds(computed, expected) => {
                let message = format!(
                    "closing balance differs from declared by {}",
                    describe(computed, expected)
                );
                out.push(
                    Diagnostic::new(Severity::Error, Origin::Reconciliation, subject, message)
                        .with_values(expected, computed),
                );
            }
            Some(_) => {}
            None => out.push(Diagnostic::new(
                Severity::Info,
                Origin::Reconciliation,
                subject,
                "no closing balance declared",
            )),
        }
    }

    for (id, balance) in &snapshot.balances {
        if seen.contains(id.as_str()) {
            continue;
        }
        out.push(
            Diagnostic::new(
                Severity::Warning,
                Origin::Reconciliation,
                Subject::Account(id.clone()),
                "account is posted to but missing from the chart of accounts",
            )
            .with_values(Decimal::ZERO, balance.closing),
        );
    }

    if exceeds(snapshot.total_debit, snapshot.total_credit) {
        out.push(
            Diagnostic::new(
                Severity::Error,
                Origin::Reconciliation,
                Subject::Document,
                format!(
                    "total debit and total credit differ by {}",
                    describe(snapshot.total_debit, snapshot.total_credit)
                ),
            )
            .with_values(snapshot.total_debit, snapshot.total_credit),
        );
    }

    out
}
