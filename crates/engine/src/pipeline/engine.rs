use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::parser::{LineParser, ParseError};
use crate::record::Record;
use crate::reduce::Reducer;

use super::metrics::{MetricsSnapshot, PipelineMetrics};
use super::reader::read_lines;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read input: {0}")]
    Read(#[from] std::io::Error),

    #[error("pipeline task failed: {0}")]
    Join(#[from] JoinError),
}

/// Totals of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub metrics: MetricsSnapshot,
    pub elapsed: Duration,
}

/// Bounded-concurrency map-reduce over the lines of one byte stream.
///
/// One reader task splits the source into lines, at most `limit` parse
/// workers run at once, and one task folds parsed records into the reducer.
/// Stages are connected by channels of capacity `limit`, so a slow reducer
/// throttles the workers and in turn the reader.
pub struct MapReduce<R> {
    source: R,
    parser: Arc<dyn LineParser>,
    reducer: Box<dyn Reducer>,
    limit: usize,
    metrics: Arc<PipelineMetrics>,
}

impl<R> MapReduce<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    /// `limit` is clamped to at least 1.
    pub fn new(
        source: R,
        parser: Arc<dyn LineParser>,
        reducer: impl Reducer,
        limit: usize,
    ) -> Self {
        Self {
            source,
            parser,
            reducer: Box::new(reducer),
            limit: limit.max(1),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Report into an existing metrics handle instead of a fresh one.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Start the pipeline on the current runtime.
    pub fn run(self) -> Output {
        let (tx, rx) = mpsc::channel(self.limit);
        let task = tokio::spawn(drive(self, tx));
        Output { records: rx, task }
    }
}

async fn drive<R>(
    pipeline: MapReduce<R>,
    output: mpsc::Sender<Record>,
) -> Result<PipelineSummary, PipelineError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let MapReduce {
        source,
        parser,
        reducer,
        limit,
        metrics,
    } = pipeline;
    let started = Instant::now();

    let (line_tx, line_rx) = mpsc::channel::<String>(limit);
    let (entry_tx, entry_rx) = mpsc::channel::<Record>(limit);

    let reader = tokio::spawn(read_lines(source, line_tx, metrics.clone()));
    let dispatcher = tokio::spawn(dispatch(
        line_rx,
        entry_tx,
        parser,
        limit,
        metrics.clone(),
    ));
    let folder = tokio::spawn(fold_entries(entry_rx, reducer, metrics.clone()));

    // Join order: reader, then every parse worker, then the reducer.
    let read = reader.await?;
    dispatcher.await?;
    let mut reducer = folder.await?;

    let lines = read.map_err(|e| {
        error!(error = %e, "input read failed, discarding partial results");
        e
    })?;

    let records = reducer.finish();
    let mut emitted = 0u64;
    for record in records {
        if output.send(record).await.is_err() {
            debug!("output consumer closed, dropping remaining records");
            break;
        }
        emitted += 1;
    }
    metrics.record_emitted(emitted);

    let summary = PipelineSummary {
        metrics: metrics.snapshot(),
        elapsed: started.elapsed(),
    };
    info!(
        lines,
        parsed = summary.metrics.records_parsed,
        rejected = summary.metrics.lines_rejected,
        emitted,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "pipeline finished"
    );
    if summary.metrics.lines_rejected > 0 {
        warn!(
            rejected = summary.metrics.lines_rejected,
            "lines did not match the log format"
        );
    }
    Ok(summary)
}

/// Spawn one parse worker per line, never more than `limit` at a time.
async fn dispatch(
    mut lines: mpsc::Receiver<String>,
    entries: mpsc::Sender<Record>,
    parser: Arc<dyn LineParser>,
    limit: usize,
    metrics: Arc<PipelineMetrics>,
) {
    let permits = Arc::new(Semaphore::new(limit));
    let mut workers = JoinSet::new();

    while let Some(line) = lines.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        while let Some(done) = workers.try_join_next() {
            reap(done, &metrics);
        }

        let entries = entries.clone();
        let parser = parser.clone();
        let metrics = metrics.clone();
        workers.spawn(async move {
            // Reserve before parsing: a worker holding a parsed record always
            // has a place to put it.
            let Ok(slot) = entries.reserve().await else {
                drop(permit);
                return;
            };

            let started = Instant::now();
            match parser.parse(&line) {
                Ok(record) => {
                    // Counted before publishing, so `in_flight` never lags
                    // the channel contents.
                    metrics.record_parsed(started.elapsed().as_nanos() as u64);
                    slot.send(record);
                }
                Err(ParseError::NoMatch { .. }) => {
                    metrics.record_rejected();
                    debug!(line = %line, format = parser.format(), "line does not match log format");
                }
            }
            drop(permit);
        });
    }

    while let Some(done) = workers.join_next().await {
        reap(done, &metrics);
    }
}

fn reap(done: Result<(), JoinError>, metrics: &PipelineMetrics) {
    if let Err(e) = done {
        metrics.record_panic();
        error!(error = %e, "parse worker failed");
    }
}

async fn fold_entries(
    mut entries: mpsc::Receiver<Record>,
    mut reducer: Box<dyn Reducer>,
    metrics: Arc<PipelineMetrics>,
) -> Box<dyn Reducer> {
    while let Some(record) = entries.recv().await {
        metrics.record_received();
        if reducer.fold(record).is_err() {
            metrics.record_fold_error();
        }
    }
    reducer
}

/// Output side of a running pipeline.
///
/// Records arrive only after the input is exhausted and fully reduced. The
/// outcome of the run, including read failures, comes from
/// [`Output::finish`].
pub struct Output {
    records: mpsc::Receiver<Record>,
    task: JoinHandle<Result<PipelineSummary, PipelineError>>,
}

impl Output {
    /// Next output record, `None` once the pipeline has completed.
    pub async fn recv(&mut self) -> Option<Record> {
        self.records.recv().await
    }

    /// Split into a record stream and the handle resolving to the outcome.
    pub fn split(
        self,
    ) -> (
        ReceiverStream<Record>,
        JoinHandle<Result<PipelineSummary, PipelineError>>,
    ) {
        (ReceiverStream::new(self.records), self.task)
    }

    /// Wait for the pipeline, discarding records not yet received.
    pub async fn finish(self) -> Result<PipelineSummary, PipelineError> {
        drop(self.records);
        self.task.await?
    }

    /// Receive every record, then wait for the outcome.
    pub async fn collect(mut self) -> Result<(Vec<Record>, PipelineSummary), PipelineError> {
        let mut out = Vec::new();
        while let Some(record) = self.records.recv().await {
            out.push(record);
        }
        let summary = self.task.await??;
        Ok((out, summary))
    }
}
