use std::io;
use std::path::PathBuf;

use engine::{FormatError, PipelineError};
use thiserror::Error;

/// Failure of one input file. Other files keep running.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Pipeline for '{}' failed: {source}", path.display())]
    Pipeline {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },

    #[error("Failed to read nginx config '{}': {source}", path.display())]
    NginxConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid log format: {0}")]
    Format(#[from] FormatError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

pub type CliResult<T> = Result<T, CliError>;
