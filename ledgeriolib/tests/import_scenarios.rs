use std::sync::Arc;

use ledgeriolib::{
    formats::saft::{SaftWriter, SyntheticLedger},
    model::{Origin, Severity, Subject},
    validator::Capabilities,
    EngineConfig, ImportEngine, LedgerError, MemorySource, Scheduler, TaskOutcome,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BALANCED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AuditFile xmlns="urn:StandardAuditFile-Taxation-Financial:NO">
  <Header>
    <AuditFileVersion>1.30</AuditFileVersion>
    <Company><RegistrationNumber>912345678</RegistrationNumber><Name>Minimal AS</Name></Company>
    <DefaultCurrencyCode>NOK</DefaultCurrencyCode>
    <SelectionCriteria><PeriodStart>1</PeriodStart><PeriodEnd>12</PeriodEnd><PeriodEndYear>2023</PeriodEndYear></SelectionCriteria>
  </Header>
  <MasterFiles>
    <GeneralLedgerAccounts>
      <Account>
        <AccountID>1920</AccountID>
        <OpeningDebitBalance>1000.00</OpeningDebitBalance>
        <ClosingDebitBalance>500.00</ClosingDebitBalance>
      </Account>
      <Account>
        <AccountID>2050</AccountID>
        <OpeningCreditBalance>1000.00</OpeningCreditBalance>
        <ClosingCreditBalance>500.00</ClosingCreditBalance>
      </Account>
    </GeneralLedgerAccounts>
  </MasterFiles>
  <GeneralLedgerEntries>
    <Journal>
      <JournalID>GL</JournalID>
      <Transaction>
        <TransactionID>1</TransactionID>
        <TransactionDate>2023-06-30</TransactionDate>
        <Line><AccountID>1920</AccountID><CreditAmount><Amount>500.00</Amount></CreditAmount></Line>
        <Line><AccountID>2050</AccountID><DebitAmount><Amount>500.00</Amount></DebitAmount></Line>
      </Transaction>
    </Journal>
  </GeneralLedgerEntries>
</AuditFile>
"#;

fn run(engine: &ImportEngine, name: &str, doc: impl Into<Vec<u8>>) -> TaskOutcome<ledgeriolib::ImportResult> {
    let source = Arc::new(MemorySource::new(name, doc.into()));
    engine.submit(&Scheduler::new(), source).wait()
}

fn completed(outcome: TaskOutcome<ledgeriolib::ImportResult>) -> ledgeriolib::ImportResult {
    match outcome {
        TaskOutcome::Completed(result) => result,
        TaskOutcome::Failed(e) => panic!("import failed: {e}"),
        TaskOutcome::Cancelled => panic!("import cancelled"),
    }
}

#[test]
fn minimal_balanced_document() {
    let result = completed(run(&ImportEngine::default(), "minimal.xml", BALANCED));
    assert_eq!(result.snapshot.closing("1920"), Some(dec!(500.00)));
    assert_eq!(result.snapshot.closing("2050"), Some(dec!(-500.00)));
    assert_eq!(result.snapshot.entry_count, 2);
    assert!(result.reconciles());
    assert!(!result.dataset.has_errors());
    assert_eq!(result.dataset.company_id.as_deref(), Some("912345678"));
    assert_eq!(result.dataset.company_name.as_deref(), Some("Minimal AS"));
    assert_eq!(result.dataset.fiscal_year, Some(2023));
    assert_eq!(result.dataset.source_name, "minimal.xml");
}

#[test]
fn closing_balance_off_by_ten() {
    let doc = BALANCED.replace(
        "<ClosingDebitBalance>500.00</ClosingDebitBalance>",
        "<ClosingDebitBalance>510.00</ClosingDebitBalance>",
    );
    let result = completed(run(&ImportEngine::default(), "off.xml", doc));
    let errors: Vec<_> = result.dataset.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].subject, Subject::Account("1920".into()));
    let (expected, actual) = (errors[0].expected.unwrap(), errors[0].actual.unwrap());
    assert_eq!((expected - actual).abs(), dec!(10.00));
    assert!(!result.reconciles());
}

#[test]
fn truncated_document_fails_with_parse_error() {
    let cut = BALANCED.find("<Line><AccountID>2050").unwrap() + "<Line><AccountID>".len();
    match run(&ImportEngine::default(), "cut.xml", &BALANCED.as_bytes()[..cut]) {
        TaskOutcome::Failed(LedgerError::Parse(e)) => {
            assert!(e.message.contains("unexpected end of document"), "{e}");
        }
        other => panic!("expected a parse failure, got {other:?}"),
    }
}

fn overflowing() -> String {
    BALANCED.replace(
        "<OpeningCreditBalance>1000.00</OpeningCreditBalance>",
        "<OpeningDebitBalance>79228162514264337593543950335</OpeningDebitBalance>",
    )
}

#[test]
fn closing_balance_overflow_fails_the_import() {
    match run(&ImportEngine::default(), "huge.xml", overflowing()) {
        TaskOutcome::Failed(LedgerError::Overflow { account }) => assert_eq!(account, "2050"),
        other => panic!("expected an overflow failure, got {other:?}"),
    }
}

#[test]
fn overflow_fails_one_batch_document_only() {
    let sources: Vec<Arc<dyn ledgeriolib::DocumentSource>> = vec![
        Arc::new(MemorySource::new("good.xml", BALANCED.as_bytes().to_vec())),
        Arc::new(MemorySource::new("huge.xml", overflowing().into_bytes())),
    ];
    let batch = ImportEngine::default()
        .submit_batch(&Scheduler::new(), sources)
        .wait()
        .into_result()
        .unwrap();
    assert_eq!(batch.succeeded().count(), 1);
    let failed: Vec<_> = batch.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "huge.xml");
    assert!(matches!(failed[0].1, LedgerError::Overflow { .. }));
}

#[test]
fn generated_document_round_trips_without_errors() {
    let ledger = SyntheticLedger::generate(12, 2_000);
    let bytes = SaftWriter::to_bytes(&ledger).unwrap();
    let result = completed(run(&ImportEngine::default(), "generated.xml", bytes));
    assert_eq!(result.dataset.errors().count(), 0);
    assert_eq!(result.snapshot.entry_count, 2_000);
    assert_eq!(result.snapshot.difference(), Decimal::ZERO);
    for account in &ledger.header.accounts {
        assert_eq!(result.snapshot.closing(&account.account_id), account.closing);
    }
}

#[test]
fn sum_identity_holds_for_any_entry_order() {
    let base = SyntheticLedger::generate(7, 600);
    let opening: Decimal = base.header.accounts.iter().map(|a| a.opening).sum();

    let mut reversed = base.clone();
    reversed.transactions.reverse();
    let mut rotated = base.clone();
    rotated.transactions.rotate_left(123);
    let mut interleaved = base.clone();
    interleaved
        .transactions
        .sort_by_key(|t| (t.lines[0].account_id.clone(), t.id.clone()));

    let engine = ImportEngine::default();
    let mut closings = Vec::new();
    for ledger in [base, reversed, rotated, interleaved] {
        let bytes = SaftWriter::to_bytes(&ledger).unwrap();
        let result = completed(run(&engine, "order.xml", bytes));
        let snap = &result.snapshot;
        assert_eq!(
            snap.sum_of_closings(),
            Some(opening + snap.total_debit - snap.total_credit)
        );
        closings.push(snap.rounded(2));
    }
    assert!(closings.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn undeclared_accounts_are_warnings() {
    let doc = BALANCED.replace(
        "<Line><AccountID>2050</AccountID>",
        "<Line><AccountID>2999</AccountID>",
    );
    let result = completed(run(&ImportEngine::default(), "undeclared.xml", doc));
    let kinds: Vec<_> = result
        .dataset
        .diagnostics
        .iter()
        .map(|d| (d.severity, d.subject.to_string()))
        .collect();
    assert_eq!(
        kinds,
        [
            (Severity::Error, "account 2050".to_owned()),
            (Severity::Warning, "account 2999".to_owned()),
        ]
    );
    assert!(!result.dataset.accounts["2999"].declared);
}

#[cfg(feature = "validation")]
#[test]
fn validation_findings_precede_reconciliation() {
    let config = EngineConfig {
        streaming_validate: true,
        ..EngineConfig::default()
    };
    let doc = BALANCED
        .replace("<TransactionDate>2023-06-30</TransactionDate>", "")
        .replace("<ClosingDebitBalance>500.00", "<ClosingDebitBalance>510.00");
    let result = completed(run(&ImportEngine::new(config), "both.xml", doc));
    let origins: Vec<_> = result.dataset.diagnostics.iter().map(|d| d.origin).collect();
    assert_eq!(origins, [Origin::Validation, Origin::Reconciliation]);
    assert!(result.stats.validated);
}

#[test]
fn unavailable_validation_is_recorded_and_skipped() {
    let config = EngineConfig {
        streaming_validate: true,
        ..EngineConfig::default()
    };
    let engine = ImportEngine::new(config).with_capabilities(Capabilities::without_schema_validation());
    let result = completed(run(&engine, "skip.xml", BALANCED));
    assert_eq!(result.dataset.diagnostics.len(), 1);
    let note = &result.dataset.diagnostics[0];
    assert_eq!(note.severity, Severity::Info);
    assert_eq!(note.origin, Origin::Engine);
    assert!(note.message.contains("skipped"));
    assert!(!result.stats.validated);
}
