use crate::record::{Record, RecordError};

/// Terminal reducer driven by the pipeline.
///
/// `fold` is called once per parsed record, from a single task, in arrival
/// order (which is not input order). `finish` is called once after the last
/// record and returns the summary records.
pub trait Reducer: Send + 'static {
    /// fold one record into the reducer state
    fn fold(&mut self, record: Record) -> Result<(), RecordError>;
    fn finish(&mut self) -> Vec<Record>;
}

impl Reducer for Box<dyn Reducer> {
    fn fold(&mut self, record: Record) -> Result<(), RecordError> {
        (**self).fold(record)
    }

    fn finish(&mut self) -> Vec<Record> {
        (**self).finish()
    }
}
