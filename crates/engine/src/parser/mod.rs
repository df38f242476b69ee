/// Line parsing module
///
/// Applies a compiled log format to single lines and produces records.
///
/// # Architecture
///
/// - `traits.rs`: the `LineParser` capability consumed by the pipeline
/// - `line.rs`: template-driven `Parser` and its builder
/// - `refine.rs`: per-field refinement rules applied after matching
/// - `model.rs`: per-line errors

pub mod traits;
pub mod model;
pub mod line;
pub mod refine;

// Re-export commonly used types
pub use traits::LineParser;
pub use model::ParseError;
pub use line::{Parser, ParserBuilder};
pub use refine::{Refinement, RefinementKind, RefinementSpec};
