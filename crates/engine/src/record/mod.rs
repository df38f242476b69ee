//! The name/value container produced by parsing one line.

pub mod model;
mod serde_utils;

pub use model::{Record, RecordError};
