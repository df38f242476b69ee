// Access log parsing and concurrent aggregation.

// Data model
pub mod record;

// Parsing
pub mod format;
pub mod parser;

// Aggregation
pub mod pipeline;
pub mod reduce;

pub use format::{CompiledFormat, FormatError, LinePattern};
pub use parser::{LineParser, ParseError, Parser, ParserBuilder};
pub use pipeline::{MapReduce, Output, PipelineError, PipelineSummary};
pub use record::{Record, RecordError};
pub use reduce::{Aggregator, GroupBy, Reducer};
