use thiserror::Error;

/// Per-line failure. Never fatal to a pipeline: the line is reported and
/// dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Access log line '{line}' does not match given format '{format}'")]
    NoMatch { line: String, format: String },
}
