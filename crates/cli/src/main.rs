mod args;
mod config;
mod discover;
mod error;
mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser as _;
use engine::parser::LineParser;
use engine::{GroupBy, MapReduce, Parser, PipelineError, PipelineSummary, Record};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::{
    args::Args,
    config::{GroupByConfig, LogFormat, LogOutput, NxConfig},
    discover::discover,
    error::{CliError, CliResult},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Phase 1: Basic tracing so we can log during config loading
    // Uses set_default (thread-local) so it can be replaced by Phase 2's global subscriber
    let basic_tracing = init_tracing_basic();

    debug!("Starting nxreduce v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NxConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config);

    config.validate()
        .context("Configuration validation failed")?;

    // Phase 2: Re-initialize tracing with config (format, level, output)
    drop(basic_tracing);
    init_tracing_from_config(&config)
        .context("Failed to initialize logging")?;

    let parser: Arc<dyn LineParser> = Arc::new(
        build_parser(&config)
            .await
            .context("Failed to build log parser")?,
    );
    info!(format = parser.format(), "log format compiled");

    let files = if args.files.is_empty() {
        discover(&config.input.directory, &config.input.pattern).with_context(|| {
            format!(
                "Failed to search '{}' for log files",
                config.input.directory.display()
            )
        })?
    } else {
        args.files.clone()
    };

    if files.is_empty() {
        warn!(
            directory = %config.input.directory.display(),
            pattern = %config.input.pattern,
            "no log files found"
        );
        return Ok(());
    }
    info!(files = files.len(), concurrency = config.input.concurrency, "processing log files");

    let (tx, rx) = mpsc::channel::<(Arc<str>, Record)>(config.input.concurrency);
    let printer = tokio::spawn(print_records(rx));

    let mut runs = JoinSet::new();
    for path in files {
        runs.spawn(process_file(
            path,
            parser.clone(),
            config.group_by.clone(),
            config.input.concurrency,
            tx.clone(),
        ));
    }
    drop(tx);

    let total = runs.len();
    let mut failed = 0usize;
    while let Some(done) = runs.join_next().await {
        match done {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                failed += 1;
                error!(error = %e, "log file failed");
            }
            Err(e) => {
                failed += 1;
                error!(error = %e, "log file task panicked");
            }
        }
    }

    printer
        .await
        .context("Output task panicked")?
        .context("Failed to write results")?;

    if failed > 0 {
        anyhow::bail!("{} of {} log files failed", failed, total);
    }
    Ok(())
}

/// Compile the configured format, reading it from nginx config when set.
async fn build_parser(config: &NxConfig) -> CliResult<Parser> {
    let template = match &config.format.nginx {
        Some(nginx) => {
            let conf = tokio::fs::read_to_string(&nginx.path)
                .await
                .map_err(|source| CliError::NginxConfig {
                    path: nginx.path.clone(),
                    source,
                })?;
            engine::format::extract_log_format(&conf, &nginx.name)?
        }
        None => config.format.template.clone(),
    };

    let mut builder = Parser::builder(&template).refinements(config.refinements.iter().cloned());
    if let Some(retry) = &config.format.retry {
        builder = builder.retry(retry);
    }
    Ok(builder.build()?)
}

/// Run one pipeline over `path` and forward its records to the printer.
async fn process_file(
    path: PathBuf,
    parser: Arc<dyn LineParser>,
    group_by: GroupByConfig,
    concurrency: usize,
    out: mpsc::Sender<(Arc<str>, Record)>,
) -> CliResult<PipelineSummary> {
    let source = input::open(&path).await.map_err(|source| CliError::Open {
        path: path.clone(),
        source,
    })?;
    debug!(file = %path.display(), "pipeline started");

    let reducer = GroupBy::new(group_by.keys, group_by.aggregators);
    let (mut records, task) = MapReduce::new(source, parser, reducer, concurrency)
        .run()
        .split();

    let file: Arc<str> = Arc::from(path.display().to_string());
    while let Some(record) = records.next().await {
        if out.send((file.clone(), record)).await.is_err() {
            break;
        }
    }

    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => Err(PipelineError::from(e)),
    };
    let summary = outcome.map_err(|source| CliError::Pipeline {
        path: path.clone(),
        source,
    })?;

    info!(
        file = %path.display(),
        lines = summary.metrics.lines_read,
        parsed = summary.metrics.records_parsed,
        rejected = summary.metrics.lines_rejected,
        groups = summary.metrics.records_emitted,
        "log file processed"
    );
    Ok(summary)
}

/// `file` is [`crate::config::FILE_FIELD`], which `validate` keeps out of records.
#[derive(Serialize)]
struct OutputLine<'a> {
    file: &'a str,
    #[serde(flatten)]
    record: &'a Record,
}

/// Write every record as one JSON line on stdout.
async fn print_records(mut rx: mpsc::Receiver<(Arc<str>, Record)>) -> CliResult<u64> {
    let mut stdout = BufWriter::new(tokio::io::stdout());
    let mut written = 0u64;

    while let Some((file, record)) = rx.recv().await {
        let mut line = serde_json::to_vec(&OutputLine {
            file: &file,
            record: &record,
        })
        .map_err(std::io::Error::from)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        written += 1;
    }

    stdout.flush().await?;
    Ok(written)
}

/// Phase 1: thread-local subscriber used while configuration loads.
fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nxreduce=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

/// Phase 2: install the global subscriber described by the configuration.
fn init_tracing_from_config(config: &NxConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Prefer RUST_LOG env var, fall back to config level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match (&config.logging.format, &config.logging.output) {
        (LogFormat::Json, LogOutput::Stderr) => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        (LogFormat::Json, LogOutput::File { path }) => {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(Arc::new(open_log_file(path)?));
            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        (LogFormat::Pretty, LogOutput::Stderr) => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        (LogFormat::Pretty, LogOutput::File { path }) => {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false)
                .with_writer(Arc::new(open_log_file(path)?));
            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }
    Ok(())
}

fn open_log_file(path: &str) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(path))
        .with_context(|| format!("Failed to open log file '{}'", path))
}
