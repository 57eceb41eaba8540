//! Имена элементов SAF-T Financial. Сравниваем по локальному имени, так что
//! документы с namespace и без читаются одинаково.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    AuditFile,
    Header,
    AuditFileVersion,
    DefaultCurrencyCode,
    Company,
    Name,
    RegistrationNumber,
    TaxRegistrationNumber,
    CompanyId,
    SelectionCriteria,
    PeriodStart,
    PeriodEnd,
    PeriodEndYear,
    SelectionStartDate,
    SelectionEndDate,
    StartDate,
    EndDate,
    PeriodStartDate,
    PeriodEndDate,
    MasterFiles,
    GeneralLedgerAccounts,
    Account,
    AccountId,
    AccountDescription,
    OpeningDebitBalance,
    OpeningCreditBalance,
    ClosingDebitBalance,
    ClosingCreditBalance,
    GeneralLedgerEntries,
    Journal,
    JournalId,
    Transaction,
    TransactionId,
    TransactionDate,
    Line,
    DebitAmount,
    CreditAmount,
    Amount,
    CustomerId,
    SupplierId,
    Other,
}

impl Tag {
    pub fn from_local(name: &[u8]) -> Self {
        match name {
            b"AuditFile" => Self::AuditFile,
            b"Header" => Self::Header,
            b"AuditFileVersion" => Self::AuditFileVersion,
            b"DefaultCurrencyCode" => Self::DefaultCurrencyCode,
            b"Company" => Self::Company,
            b"Name" => Self::Name,
            b"RegistrationNumber" => Self::RegistrationNumber,
            b"TaxRegistrationNumber" => Self::TaxRegistrationNumber,
            b"CompanyID" => Self::CompanyId,
            b"SelectionCriteria" => Self::SelectionCriteria,
            b"PeriodStart" => Self::PeriodStart,
            b"PeriodEnd" => Self::PeriodEnd,
            b"PeriodEndYear" => Self::PeriodEndYear,
            b"SelectionStartDate" => Self::SelectionStartDate,
            b"SelectionEndDate" => Self::SelectionEndDate,
            b"StartDate" => Self::StartDate,
            b"EndDate" => Self::EndDate,
            b"PeriodStartDate" => Self::PeriodStartDate,
            b"PeriodEndDate" => Self::PeriodEndDate,
            b"MasterFiles" => Self::MasterFiles,
            b"GeneralLedgerAccounts" => Self::GeneralLedgerAccounts,
            b"Account" => Self::Account,
            b"AccountID" => Self::AccountId,
            b"AccountDescription" => Self::AccountDescription,
            b"OpeningDebitBalance" => Self::OpeningDebitBalance,
            b"OpeningCreditBalance" => Self::OpeningCreditBalance,
            b"ClosingDebitBalance" => Self::ClosingDebitBalance,
            b"ClosingCreditBalance" => Self::ClosingCreditBalance,
            b"GeneralLedgerEntries" => Self::GeneralLedgerEntries,
            b"Journal" => Self::Journal,
            b"JournalID" => Self::JournalId,
            b"Transaction" => Self::Transaction,
            b"TransactionID" => Self::TransactionId,
            b"TransactionDate" => Self::TransactionDate,
            b"Line" => Self::Line,
            b"DebitAmount" => Self::DebitAmount,
            b"CreditAmount" => Self::CreditAmount,
            b"Amount" => Self::Amount,
            b"CustomerID" => Self::CustomerId,
            b"SupplierID" => Self::SupplierId,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuditFile => "AuditFile",
            Self::Header => "Header",
            Self::AuditFileVersion => "AuditFileVersion",
            Self::DefaultCurrencyCode => "DefaultCurrencyCode",
            Self::Company => "Company",
            Self::Name => "Name",
            Self::RegistrationNumber => "RegistrationNumber",
            Self::TaxRegistrationNumber => "TaxRegistrationNumber",
            Self::CompanyId => "CompanyID",
            Self::SelectionCriteria => "SelectionCriteria",
            Self::PeriodStart => "PeriodStart",
            Self::PeriodEnd => "PeriodEnd",
            Self::PeriodEndYear => "PeriodEndYear",
            Self::SelectionStartDate => "SelectionStartDate",
            Self::SelectionEndDate => "SelectionEndDate",
            Self::StartDate => "StartDate",
            Self::EndDate => "EndDate",
            Self::PeriodStartDate => "PeriodStartDate",
            Self::PeriodEndDate => "PeriodEndDate",
            Self::MasterFiles => "MasterFiles",
            Self::GeneralLedgerAccounts => "GeneralLedgerAccounts",
            Self::Account => "Account",
            Self::AccountId => "AccountID",
            Self::AccountDescription => "AccountDescription",
            Self::OpeningDebitBalance => "OpeningDebitBalance",
            Self::OpeningCreditBalance => "OpeningCreditBalance",
            Self::ClosingDebitBalance => "ClosingDebitBalance",
            Self::ClosingCreditBalance => "ClosingCreditBalance",
            Self::GeneralLedgerEntries => "GeneralLedgerEntries",
            Self::Journal => "Journal",
            Self::JournalId => "JournalID",
            Self::Transaction => "Transaction",
            Self::TransactionId => "TransactionID",
            Self::TransactionDate => "TransactionDate",
            Self::Line => "Line",
            Self::DebitAmount => "DebitAmount",
            Self::CreditAmount => "CreditAmount",
            Self::Amount => "Amount",
            Self::CustomerId => "CustomerID",
            Self::SupplierId => "SupplierID",
            Self::Other => "?",
        }
    }
}
