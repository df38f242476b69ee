pub use super::model::ParseError;
use crate::record::Record;

pub trait LineParser: Send + Sync {
    /// parse one log line into a record
    fn parse(&self, line: &str) -> Result<Record, ParseError>;
    fn format(&self) -> &str;
}
