//! Движок импорта: бюджет, чтение и накопление (с валидацией рядом, если
//! попросили), сверка.

use std::io::{BufRead, Cursor, Read};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::{
    accumulator::{ProgressThrottle, TrialBalanceAccumulator},
    budget::{BudgetPolicy, IngestionMode, WorkerBudget},
    config::EngineConfig,
    error::{LedgerError, Result},
    formats::saft::SaftReader,
    model::{Dataset, Diagnostic, DocumentHeader, Origin, Severity, Subject, TrialBalanceSnapshot},
    reconcile::reconcile,
    task::{panic_message, CancelToken, Scheduler, TaskContext, TaskHandle},
    traits::DocumentSource,
    validator::{validate_document, Capabilities},
};

/// Доля прогресса, которую занимает проход накопления.
const READ_START: f64 = 5.0;
const READ_SPAN: f64 = 90.0;

/// `None`: прогресс неопределён.
type Report<'a> = &'a (dyn Fn(Option<f64>, &str) + Sync);

#[derive(Debug, Clone, Serialize)]
pub struct ImportStats {
    pub size_bytes: Option<u64>,
    pub bytes_read: u64,
    pub entries: u64,
    pub mode: IngestionMode,
    pub workers: WorkerBudget,
    pub validated: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub dataset: Dataset,
    pub snapshot: TrialBalanceSnapshot,
    pub stats: ImportStats,
}

impl ImportResult {
    /// Нет ошибок сверки: все заявленные исходящие остатки и итоги
    /// дебета/кредита сходятся в пределах допуска.
    pub fn reconciles(&self) -> bool {
        !self
            .dataset
            .diagnostics
            .iter()
            .any(|d| d.is_error() && d.origin == Origin::Reconciliation)
    }
}

#[derive(Debug)]
pub struct BatchItem {
    pub source_name: String,
    pub result: Result<ImportResult>,
}

#[derive(Debug)]
pub struct BatchResult {
    pub items: Vec<BatchItem>,
    pub workers: WorkerBudget,
}

impl BatchResult {
    pub fn succeeded(&self) -> impl Iterator<Item = &ImportResult> {
        self.items.iter().filter_map(|i| i.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &LedgerError)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.source_name.as_str(), e)))
    }
}

#[derive(Debug, Clone)]
pub struct ImportEngine {
    config: EngineConfig,
    policy: BudgetPolicy,
    capabilities: Capabilities,
}

impl Default for ImportEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ImportEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            policy: BudgetPolicy::from_config(&config),
            config,
            capabilities: Capabilities::detect(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Запустить импорт одного документа фоновой задачей.
    pub fn submit(
        &self,
        scheduler: &Scheduler,
        source: Arc<dyn DocumentSource>,
    ) -> TaskHandle<ImportResult> {
        let engine = self.clone();
        scheduler.submit(format!("Import {}", source.name()), move |ctx| {
            engine.import(source.as_ref(), ctx)
        })
    }

    /// Запустить пакетный импорт одной фоновой задачей.
    pub fn submit_batch(
        &self,
        scheduler: &Scheduler,
        sources: Vec<Arc<dyn DocumentSource>>,
    ) -> TaskHandle<BatchResult> {
        let engine = self.clone();
        let description = format!("Import {} documents", sources.len());
        scheduler.submit(description, move |ctx| engine.import_batch(&sources, ctx))
    }

    /// Импорт в текущем потоке, прогресс через `ctx`.
    pub fn import(&self, source: &dyn DocumentSource, ctx: &TaskContext) -> Result<ImportResult> {
        let report = |percent: Option<f64>, message: &str| match percent {
            Some(p) => ctx.report(p, message),
            None => ctx.report_indeterminate(message),
        };
        let result = self.run(source, &ctx.cancel_token(), &report)?;
        ctx.report(100.0, "Done");
        Ok(result)
    }

    /// Импорт нескольких документов; число воркеров зависит от размера.
    ///
    /// Прогресс взвешен по размеру документов и не откатывается назад.
    /// Пакет падает, только если упали все документы.
    pub fn import_batch(
        &self,
        sources: &[Arc<dyn DocumentSource>],
        ctx: &TaskContext,
    ) -> Result<BatchResult> {
        let sizes: Vec<u64> = sources.iter().map(|s| s.size_hint().unwrap_or(0)).collect();
        let workers = self.policy.plan_batch(&sizes);
        info!(documents = sources.len(), workers = workers.get(), "batch import started");
        if sources.is_empty() {
            return Ok(BatchResult {
                items: Vec::new(),
                workers,
            });
        }

        let progress = BatchProgress::new(&sizes);
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<BatchItem>>> =
            Mutex::new((0..sources.len()).map(|_| None).collect());
        let cancel = ctx.cancel_token();

        thread::scope(|s| {
            for n in 0..workers.get().min(sources.len()) {
                let worker = || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(source) = sources.get(i) else {
                        break;
                    };
                    let name = source.name();
                    let report = |percent: Option<f64>, message: &str| {
                        if let Some(p) = percent {
                            if let Some(overall) = progress.update(i, p / 100.0) {
                                ctx.report(overall, format!("{name}: {message}"));
                            }
                        }
                    };
                    // паника роняет только этот документ
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.run(source.as_ref(), &cancel, &report)
                    }))
                    .unwrap_or_else(|payload| Err(LedgerError::WorkerPanicked(panic_message(payload))));
                    if let Some(overall) = progress.update(i, 1.0) {
                        ctx.report(overall, format!("{name}: done"));
                    }
                    slots.lock()[i] = Some(BatchItem {
                        source_name: name,
                        result,
                    });
                };
                let spawned = thread::Builder::new()
                    .name(format!("ledgerio-batch-{n}"))
                    .spawn_scoped(s, worker);
                if let Err(e) = spawned {
                    // очередь разберут остальные воркеры
                    warn!(error = %e, "failed to spawn batch worker");
                }
            }
        });

        ctx.checkpoint()?;
        let items: Vec<BatchItem> = slots
            .into_inner()
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| {
                slot.unwrap_or_else(|| BatchItem {
                    source_name: source.name(),
                    result: Err(LedgerError::WorkerPanicked("no batch worker could be started".into())),
                })
            })
            .collect();

        if items.iter().all(|i| i.result.is_err()) {
            let first = items.into_iter().find_map(|i| i.result.err());
            return Err(first.unwrap_or(LedgerError::Cancelled));
        }
        let failed = items.iter().filter(|i| i.result.is_err()).count();
        info!(documents = items.len(), failed, "batch import finished");
        Ok(BatchResult { items, workers })
    }

    fn run(
        &self,
        source: &dyn DocumentSource,
        cancel: &CancelToken,
        report: Report<'_>,
    ) -> Result<ImportResult> {
        let started = Instant::now();
        let name = source.name();
        let size = source.size_hint();
        let workers = self.policy.plan(size.unwrap_or(0));
        let mode = IngestionMode::choose(&self.config, size.unwrap_or(0));

        let span = info_span!("import", source = %name);
        let _enter = span.enter();
        info!(size_bytes = size, workers = workers.get(), ?mode, "import started");
        cancel.checkpoint()?;

        let mut diagnostics = Vec::new();
        let validate = if !self.config.streaming_validate {
            false
        } else if self.capabilities.schema_validation() {
            true
        } else {
            warn!("structural validation requested but not available");
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                Origin::Engine,
                Subject::Document,
                "structural validation skipped: not available in this build",
            ));
            false
        };
        let concurrent = validate && workers.allows_concurrent_validation();

        report(None, "Opening document");
        let input = self.open(source, mode, cancel)?;
        let validation_token = cancel.child();

        let (accumulated, joined) = thread::scope(|s| {
            let validator = if concurrent {
                let token = &validation_token;
                let spawned = thread::Builder::new()
                    .name("ledgerio-validate".into())
                    .spawn_scoped(s, move || self.validate_source(source, token));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "validator thread not started, validating afterwards");
                        None
                    }
                }
            } else {
                None
            };

            let accumulated = self.accumulate(input, size, cancel, report);
            if accumulated.is_err() {
                validation_token.cancel();
            }
            let joined = validator.map(|h| h.join());
            (accumulated, joined)
        });

        let (header, accumulator, bytes_read) = accumulated?;
        cancel.checkpoint()?;

        let validator_diagnostics = match joined {
            Some(Ok(result)) => validation_findings(result)?,
            Some(Err(payload)) => return Err(LedgerError::WorkerPanicked(panic_message(payload))),
            None if validate => {
                report(Some(READ_START + READ_SPAN), "Validating structure");
                validation_findings(self.validate_source(source, &validation_token))?
            }
            None => Vec::new(),
        };
        diagnostics.extend(validator_diagnostics);

        report(Some(97.0), "Reconciling");
        let snapshot = accumulator.finalize()?;
        let reconciliation = reconcile(
            &snapshot,
            &header.accounts,
            self.config.tolerance,
            self.config.fractional_digits,
        );
        let mismatches = reconciliation.iter().filter(|d| d.is_error()).count();
        diagnostics.extend(reconciliation);

        let stats = ImportStats {
            size_bytes: size,
            bytes_read,
            entries: snapshot.entry_count,
            mode,
            workers,
            validated: validate,
            elapsed: started.elapsed(),
        };
        let dataset = dataset(name, header, accumulator, diagnostics);

        if mismatches > 0 {
            warn!(mismatches, "trial balance does not reconcile");
        }
        info!(
            entries = stats.entries,
            accounts = dataset.accounts.len(),
            diagnostics = dataset.diagnostics.len(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "import finished"
        );
        Ok(ImportResult {
            dataset,
            snapshot,
            stats,
        })
    }

    fn open(
        &self,
        source: &dyn DocumentSource,
        mode: IngestionMode,
        cancel: &CancelToken,
    ) -> Result<Box<dyn BufRead + Send>> {
        let mut reader = source.open()?;
        match mode {
            IngestionMode::Streaming => Ok(reader),
            IngestionMode::Buffered => {
                let capacity = source.size_hint().unwrap_or(0) as usize;
                let mut bytes = Vec::with_capacity(capacity);
                reader.read_to_end(&mut bytes)?;
                cancel.checkpoint()?;
                debug!(bytes = bytes.len(), "document buffered");
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }

    fn accumulate(
        &self,
        input: Box<dyn BufRead + Send>,
        size: Option<u64>,
        cancel: &CancelToken,
        report: Report<'_>,
    ) -> Result<(DocumentHeader, TrialBalanceAccumulator, u64)> {
        let (header, mut entries) = SaftReader::open(input)?;
        debug!(
            company = header.company_id.as_deref().unwrap_or("-"),
            accounts = header.accounts.len(),
            "header read"
        );
        let mut accumulator = TrialBalanceAccumulator::new(&header.accounts);
        let mut throttle = ProgressThrottle::new(
            self.config.progress_every_entries,
            Duration::from_millis(self.config.progress_interval_ms),
        );
        let check_every = self.config.cancel_check_every.max(1);
        report(Some(READ_START), "Reading entries");

        let mut count = 0u64;
        #[allow(clippy::while_let_on_iterator)]
        while let Some(entry) = entries.next() {
            let entry = entry?;
            accumulator.apply(&entry)?;
            count += 1;
            if count % check_every == 0 {
                cancel.checkpoint()?;
            }
            if throttle.should_report(count) {
                let message = format!("{count} entries read");
                match size.filter(|s| *s > 0) {
                    Some(total) => {
                        let done = entries.bytes_consumed() as f64 / total as f64;
                        report(Some(READ_START + READ_SPAN * done.min(1.0)), &message);
                    }
                    None => report(None, &message),
                }
            }
        }
        cancel.checkpoint()?;
        debug!(entries = count, lines = entries.line(), "entry section read");
        Ok((header, accumulator, entries.bytes_consumed()))
    }

    fn validate_source(&self, source: &dyn DocumentSource, cancel: &CancelToken) -> Result<Vec<Diagnostic>> {
        let reader = source.open()?;
        validate_document(reader, cancel, self.config.max_validation_findings)
    }
}

/// Невыполненная валидация даёт предупреждение, а не ошибку. Отмена даёт ошибку.
fn validation_findings(result: Result<Vec<Diagnostic>>) -> Result<Vec<Diagnostic>> {
    match result {
        Ok(findings) => Ok(findings),
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            warn!(error = %e, "structural validation failed");
            Ok(vec![Diagnostic::new(
                Severity::Warning,
                Origin::Engine,
                Subject::Document,
                format!("structural validation could not complete: {e}"),
            )])
        }
    }
}

fn dataset(
    source_name: String,
    header: DocumentHeader,
    accumulator: TrialBalanceAccumulator,
    diagnostics: Vec<Diagnostic>,
) -> Dataset {
    Dataset {
        source_name,
        company_id: header.company_id,
        company_name: header.company_name,
        fiscal_year: header.fiscal_year,
        currency: header.currency,
        period_start: header.period_start,
        period_end: header.period_end,
        audit_file_version: header.audit_file_version,
        accounts: accumulator.into_accounts(),
        diagnostics,
    }
}

/// Общий прогресс пакета: взвешен по размеру, монотонный.
struct BatchProgress {
    weights: Vec<f64>,
    state: Mutex<(Vec<f64>, f64)>,
}

impl BatchProgress {
    fn new(sizes: &[u64]) -> Self {
        let total: f64 = sizes.iter().map(|s| *s as f64).sum();
        let weights = if total > 0.0 {
            sizes.iter().map(|s| *s as f64 / total).collect()
        } else {
            vec![1.0 / sizes.len().max(1) as f64; sizes.len()]
        };
        Self {
            state: Mutex::new((vec![0.0; sizes.len()], 0.0)),
            weights,
        }
    }

    /// Записать `fraction` для документа `i`; возвращает новый общий процент,
    /// если он вырос.
    fn update(&self, i: usize, fraction: f64) -> Option<f64> {
        let mut state = self.state.lock();
        let (fractions, last) = &mut *state;
        let slot = fractions.get_mut(i)?;
        *slot = slot.max(fraction.clamp(0.0, 1.0));
        let overall: f64 = fractions
            .iter()
            .zip(&self.weights)
            .map(|(f, w)| f * w * 100.0)
            .sum();
        if overall > *last {
            *last = overall;
            Some(overall)
        } else {
            None
        }
    }
}
