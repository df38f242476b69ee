use thiserror::Error;

/// Setup-time failures. None of these can surface while lines are parsed.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid log format '{template}': {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid log format '{template}': placeholder ${name} is used more than once")]
    DuplicatePlaceholder { template: String, name: String },

    #[error("Invalid refinement pattern for field '{field}': {source}")]
    InvalidRefinement {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("`log_format {0}` not found in given config")]
    DirectiveNotFound(String),
}
