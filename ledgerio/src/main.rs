use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ledgeriolib::{
    formats::saft::{SaftWriter, SyntheticLedger},
    report, DocumentSource, EngineConfig, FileSource, ImportEngine, ImportResult, Scheduler, TaskOutcome,
};
use tracing::info;

mod output;
mod progress;

#[derive(Parser, Debug)]
#[command(name = "ledgerio", version, about = "Проверка оборотно-сальдовой ведомости по выгрузкам SAF-T")]
struct Cli {
    /// Файл конфигурации (по умолчанию ./ledgerio.toml, если есть)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Не показывать прогресс
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Импорт документов, вывод ведомости и диагностик
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Запустить структурную валидацию вместе с импортом
        #[arg(long)]
        validate: bool,

        /// Читать потоково даже документы меньше порога
        #[arg(long)]
        stream: bool,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Записать синтетический сбалансированный документ
    Generate {
        #[arg(long, default_value_t = 20)]
        accounts: usize,

        #[arg(long, default_value_t = 10_000)]
        entries: usize,

        /// Выходной файл (по умолчанию stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Csv,
    Json,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("ledgerio error: {error:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing()?;

    match cli.command {
        Command::Check {
            files,
            validate,
            stream,
            format,
        } => {
            let mut config = EngineConfig::load_from(cli.config.as_deref())
                .context("failed to load configuration")?;
            config.streaming_validate |= validate;
            config.streaming_enabled |= stream;
            check(config, files, format, cli.quiet)
        }
        Command::Generate {
            accounts,
            entries,
            output,
        } => {
            generate(accounts, entries, output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LEDGERIO_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

fn check(
    config: EngineConfig,
    files: Vec<PathBuf>,
    format: Format,
    quiet: bool,
) -> anyhow::Result<ExitCode> {
    let digits = config.fractional_digits;
    let engine = ImportEngine::new(config);
    let mut scheduler = Scheduler::new();
    if !quiet {
        scheduler = scheduler.with_observer(Arc::new(progress::ProgressObserver::new()));
    }

    let sources: Vec<Arc<dyn DocumentSource>> = files
        .iter()
        .map(|path| Arc::new(FileSource::new(path)) as Arc<dyn DocumentSource>)
        .collect();

    let mut results: Vec<ImportResult> = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    if sources.len() == 1 {
        let source = Arc::clone(&sources[0]);
        let name = source.name();
        match engine.submit(&scheduler, source).wait() {
            TaskOutcome::Completed(result) => results.push(result),
            TaskOutcome::Failed(e) => failures.push((name, e.to_string())),
            TaskOutcome::Cancelled => failures.push((name, "cancelled".into())),
        }
    } else {
        let batch = engine
            .submit_batch(&scheduler, sources)
            .wait()
            .into_result()
            .context("no document could be imported")?;
        info!(workers = batch.workers.get(), "batch finished");
        for item in batch.items {
            match item.result {
                Ok(result) => results.push(result),
                Err(e) => failures.push((item.source_name, e.to_string())),
            }
        }
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match format {
        Format::Table => output::write_table(&mut out, &results, digits)?,
        Format::Csv => report::write_csv(&mut out, &results, digits)?,
        Format::Json => report::write_json(&mut out, &results)?,
    }
    out.flush()?;

    for (name, error) in &failures {
        eprintln!("{name}: import failed: {error}");
    }

    let clean = failures.is_empty() && results.iter().all(ImportResult::reconciles);
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn generate(accounts: usize, entries: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let ledger = SyntheticLedger::generate(accounts, entries);
    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    SaftWriter::write(BufWriter::new(writer), &ledger)?;
    info!(
        accounts = ledger.header.accounts.len(),
        lines = ledger.line_count(),
        "synthetic document written"
    );
    Ok(())
}
