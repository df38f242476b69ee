/// Map-reduce pipeline module
///
/// Streams lines from a byte source through bounded parallel parsing into a
/// single sequential reducer.
///
/// # Architecture
///
/// - `engine.rs`: `MapReduce` coordinator, parse workers and `Output`
/// - `reader.rs`: newline-delimited line decoding
/// - `metrics.rs`: per-run counters
///
/// # Completion
///
/// The output stream closes only after the reader, every parse worker and
/// the reducer have been joined, in that order. A read failure closes the
/// line stream, so downstream stages always terminate.

pub mod engine;
pub mod metrics;
pub mod reader;

pub use engine::{MapReduce, Output, PipelineError, PipelineSummary};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use reader::LineReader;

/// Concurrency limit used when none is configured.
pub const DEFAULT_LIMIT: usize = 1000;
