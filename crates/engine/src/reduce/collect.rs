use crate::record::{Record, RecordError};

use super::traits::Reducer;

/// Reducer that keeps every record and emits them all at the end.
#[derive(Debug, Default)]
pub struct Collect {
    records: Vec<Record>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reducer for Collect {
    fn fold(&mut self, record: Record) -> Result<(), RecordError> {
        self.records.push(record);
        Ok(())
    }

    fn finish(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }
}
