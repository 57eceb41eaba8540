//! Структурная валидация документов SAF-T.
//!
//! Валидатор делает свой проход по документу и сверяет его со статической
//! таблицей правил. Находки становятся [`Diagnostic`]; для импорта они не
//! фатальны.

use std::io::BufRead;
use std::sync::OnceLock;

use crate::{
    error::Result,
    model::Diagnostic,
    task::CancelToken,
};

/// Необязательные возможности, определяются один раз на процесс.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    schema_validation: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        static DETECTED: OnceLock<Capabilities> = OnceLock::new();
        *DETECTED.get_or_init(|| Self {
            schema_validation: cfg!(feature = "validation"),
        })
    }

    /// Возможности сборки без структурной валидации.
    pub fn without_schema_validation() -> Self {
        Self {
            schema_validation: false,
        }
    }

    pub fn schema_validation(&self) -> bool {
        self.schema_validation
    }
}

/// Семейство схем по версии: `1.3x` -> "1.30", `1.2x`/`1.1x` -> "1.20".
pub fn schema_for_version(version: &str) -> Option<&'static str> {
    let v = version.trim();
    if v.starts_with("1.3") {
        Some("1.30")
    } else if v.starts_with("1.2") || v.starts_with("1.1") {
        Some("1.20")
    } else {
        None
    }
}

/// Проверить документ из `reader`. Без фичи `validation` вернёт
/// [`LedgerError::CapabilityUnavailable`](crate::error::LedgerError::CapabilityUnavailable).
pub fn validate_document<R: BufRead>(
    reader: R,
    cancel: &CancelToken,
    max_findings: usize,
) -> Result<Vec<Diagnostic>> {
    #[cfg(feature = "validation")]
    {
        structural::StructuralValidator::new(max_findings).validate(reader, cancel)
    }
    #[cfg(not(feature = "validation"))]
    {
        let _ = (reader, cancel, max_findings);
        Err(crate::error::LedgerError::CapabilityUnavailable(
            "structural validation",
        ))
    }
}

#[cfg(feature = "validation")]
pub use structural::StructuralValidator;

#[cfg(feature = "validation")]
mod structural {
    use std::io::BufRead;

    use quick_xml::{events::Event, Reader};

    use super::schema_for_version;
    use crate::{
        error::Result,
        formats::saft::{
            counting::CountingReader,
            tags::Tag,
            text::{parse_amount, parse_date},
        },
        model::{Diagnostic, Origin, Severity, Subject},
        task::CancelToken,
    };

    /// Событий разметки между двумя проверками отмены.
    const CANCEL_CHECK_EVENTS: u64 = 256;

    struct Rule {
        element: Tag,
        parent: Option<Tag>,
        required: &'static [Tag],
    }

    const RULES: &[Rule] = &[
        Rule {
            element: Tag::AuditFile,
            parent: None,
            required: &[Tag::Header],
        },
        Rule {
            element: Tag::Header,
            parent: Some(Tag::AuditFile),
            required: &[Tag::AuditFileVersion, Tag::Company, Tag::DefaultCurrencyCode],
        },
        Rule {
            element: Tag::Account,
            parent: Some(Tag::GeneralLedgerAccounts),
            required: &[Tag::AccountId],
        },
        Rule {
            element: Tag::Transaction,
            parent: Some(Tag::Journal),
            required: &[Tag::TransactionId, Tag::TransactionDate, Tag::Line],
        },
        Rule {
            element: Tag::Line,
            parent: Some(Tag::Transaction),
            required: &[Tag::AccountId],
        },
    ];

    fn bit(tag: Tag) -> u64 {
        1u64 << (tag as u32 % 64)
    }

    struct Frame {
        tag: Tag,
        line: u64,
        seen: u64,
        /// Id элемента, когда дочерний id уже прочитан.
        label: Option<String>,
    }

    impl Frame {
        fn has(&self, tag: Tag) -> bool {
            self.seen & bit(tag) != 0
        }
    }

    struct Findings {
        out: Vec<Diagnostic>,
        max: usize,
        suppressed: usize,
    }

    impl Findings {
        fn push(&mut self, severity: Severity, subject: Subject, message: String) {
            if self.out.len() < self.max {
                self.out
                    .push(Diagnostic::new(severity, Origin::Validation, subject, message));
            } else {
                self.suppressed += 1;
            }
        }

        fn finish(mut self) -> Vec<Diagnostic> {
            if self.suppressed > 0 {
                self.out.push(Diagnostic::new(
                    Severity::Info,
                    Origin::Validation,
                    Subject::Document,
                    format!("{} further validation findings suppressed", self.suppressed),
                ));
            }
            self.out
        }
    }

    pub struct StructuralValidator {
        max_findings: usize,
    }

    impl StructuralValidator {
        pub fn new(max_findings: usize) -> Self {
            Self { max_findings }
        }

        pub fn validate<R: BufRead>(&self, reader: R, cancel: &CancelToken) -> Result<Vec<Diagnostic>> {
            let mut pass = Pass {
                xml: Reader::from_reader(CountingReader::new(reader)),
                stack: Vec::new(),
                text: String::new(),
                findings: Findings {
                    out: Vec::new(),
                    max: self.max_findings,
                    suppressed: 0,
                },
                seen_root: false,
            };
            pass.xml.trim_text(true);
            pass.run(cancel)?;
            Ok(pass.findings.finish())
        }
    }

    struct Pass<R: BufRead> {
        xml: Reader<CountingReader<R>>,
        stack: Vec<Frame>,
        text: String,
        findings: Findings,
        seen_root: bool,
    }

    enum Step {
        Start(Tag),
        Empty(Tag),
        End,
        Eof,
        Skip,
    }

    impl<R: BufRead> Pass<R> {
        fn line(&self) -> u64 {
            self.xml.get_ref().line()
        }

        fn run(&mut self, cancel: &CancelToken) -> Result<()> {
            let mut buf = Vec::new();
            let mut events = 0u64;
            loop {
                events += 1;
                if events % CANCEL_CHECK_EVENTS == 0 {
                    cancel.checkpoint()?;
                }
                buf.clear();
                let step = match self.xml.read_event_into(&mut buf) {
                    Ok(Event::Start(e)) => Step::Start(Tag::from_local(e.local_name().as_ref())),
                    Ok(Event::Empty(e)) => Step::Empty(Tag::from_local(e.local_name().as_ref())),
                    Ok(Event::End(_)) => Step::End,
                    Ok(Event::Text(t)) => {
                        match t.unescape() {
                            Ok(s) => self.text.push_str(&s),
                            Err(e) => {
                                let line = self.xml.get_ref().line();
                                self.findings.push(
                                    Severity::Error,
                                    Subject::Document,
                                    format!("line {line}: invalid character data: {e}"),
                                );
                            }
                        }
                        Step::Skip
                    }
                    Ok(Event::CData(c)) => {
                        self.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                        Step::Skip
                    }
                    Ok(Event::Eof) => Step::Eof,
                    Ok(_) => Step::Skip,
                    Err(e) => {
                        let line = self.xml.get_ref().line();
                        self.findings.push(
                            Severity::Error,
                            Subject::Document,
                            format!("line {line}: malformed XML, validation stopped: {e}"),
                        );
                        return Ok(());
                    }
                };
                match step {
                    Step::Start(tag) => self.start(tag),
                    Step::Empty(tag) => {
                        self.start(tag);
                        self.end();
                    }
                    Step::End => self.end(),
                    Step::Eof => {
                        self.eof();
                        return Ok(());
                    }
                    Step::Skip => {}
                }
            }
        }

        fn start(&mut self, tag: Tag) {
            if !self.seen_root {
                self.seen_root = true;
                if tag != Tag::AuditFile {
                    self.findings.push(
                        Severity::Error,
                        Subject::Document,
                        format!("root element is not <AuditFile> (line {})", self.line()),
                    );
                }
            }
            self.text.clear();
            self.stack.push(Frame {
                tag,
                line: self.line(),
                seen: 0,
                label: None,
            });
        }

        fn end(&mut self) {
            let Some(frame) = self.stack.pop() else {
                return;
            };
            let text = std::mem::take(&mut self.text);
            let parent = self.stack.last().map(|f| f.tag);

            self.check_text(&frame, parent, &text);
            self.check_rules(&frame, parent);

            if let Some(p) = self.stack.last_mut() {
                p.seen |= bit(frame.tag);
                let is_id = matches!(
                    (frame.tag, p.tag),
                    (Tag::AccountId, Tag::Account | Tag::Line) | (Tag::TransactionId, Tag::Transaction)
                );
                if is_id && !text.trim().is_empty() {
                    p.label = Some(text.trim().to_owned());
                }
            }
            self.text = text;
            self.text.clear();
        }

        fn subject_of(&self, frame: &Frame) -> Subject {
            match (frame.tag, &frame.label) {
                (Tag::Account | Tag::Line, Some(id)) => Subject::Account(id.clone()),
                _ => Subject::Document,
            }
        }

        fn describe(frame: &Frame) -> String {
            match &frame.label {
                Some(id) => format!("<{}> {id} (line {})", frame.tag.as_str(), frame.line),
                None => format!("<{}> at line {}", frame.tag.as_str(), frame.line),
            }
        }

        fn check_rules(&mut self, frame: &Frame, parent: Option<Tag>) {
            for rule in RULES {
                if rule.element != frame.tag || rule.parent != parent {
                    continue;
                }
                for required in rule.required {
                    if !frame.has(*required) {
                        let message = format!(
                            "{} is missing required <{}>",
                            Self::describe(frame),
                            required.as_str()
                        );
                        let subject = self.subject_of(frame);
                        self.findings.push(Severity::Error, subject, message);
                    }
                }
            }
            if frame.tag == Tag::Line && parent == Some(Tag::Transaction) {
                let sides = [Tag::DebitAmount, Tag::CreditAmount]
                    .iter()
                    .filter(|t| frame.has(**t))
                    .count();
                if sides != 1 {
                    let message = format!(
                        "{} must carry exactly one of <DebitAmount> and <CreditAmount>, found {sides}",
                        Self::describe(frame)
                    );
                    let subject = self.subject_of(frame);
                    self.findings.push(Severity::Error, subject, message);
                }
            }
        }

        fn check_text(&mut self, frame: &Frame, parent: Option<Tag>, text: &str) {
            let line = frame.line;
            match (frame.tag, parent) {
                (Tag::AuditFileVersion, Some(Tag::Header)) => {
                    if schema_for_version(text).is_none() {
                        self.findings.push(
                            Severity::Warning,
                            Subject::Document,
                            format!("no structural schema defined for audit file version {:?}", text.trim()),
                        );
                    }
                }
                (
                    Tag::OpeningDebitBalance
                    | Tag::OpeningCreditBalance
                    | Tag::ClosingDebitBalance
                    | Tag::ClosingCreditBalance
                    | Tag::Amount
                    | Tag::DebitAmount
                    | Tag::CreditAmount,
                    _,
                ) if !text.trim().is_empty() => {
                    if let Err(e) = parse_amount(text) {
                        self.findings.push(
                            Severity::Error,
                            Subject::Document,
                            format!("line {line}: <{}>: {e}", frame.tag.as_str()),
                        );
                    }
                }
                (Tag::TransactionDate, Some(Tag::Transaction)) => {
                    if parse_date(text).is_none() {
                        self.findings.push(
                            Severity::Error,
                            Subject::Document,
                            format!("line {line}: invalid <TransactionDate> {:?}", text.trim()),
                        );
                    }
                }
                _ => {}
            }
        }

        fn eof(&mut self) {
            if let Some(open) = self.stack.last() {
                let message = format!(
                    "document ends inside {} ({} element(s) still open)",
                    Self::describe(open),
                    self.stack.len()
                );
                self.findings.push(Severity::Error, Subject::Document, message);
            } else if !self.seen_root {
                self.findings.push(
                    Severity::Error,
                    Subject::Document,
                    "document contains no root element".to_owned(),
                );
            }
        }
    }
}
