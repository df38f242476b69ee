use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::record::{Record, RecordError};

use super::aggregate::{Accumulator, Aggregator};
use super::traits::Reducer;

#[derive(Debug)]
struct Group {
    key: Vec<String>,
    accumulators: Vec<Accumulator>,
}

/// Partition records by a tuple of key fields and fold every aggregator per
/// group. Terminal: nothing is emitted before [`Reducer::finish`].
#[derive(Debug)]
pub struct GroupBy {
    keys: Vec<String>,
    aggregators: Vec<Aggregator>,
    index: HashMap<Vec<String>, usize>,
    // first-seen order
    groups: Vec<Group>,
    reported: HashSet<String>,
}

impl GroupBy {
    pub fn new<K, A>(keys: K, aggregators: A) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        A: IntoIterator<Item = Aggregator>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            aggregators: aggregators.into_iter().collect(),
            index: HashMap::new(),
            groups: Vec::new(),
            reported: HashSet::new(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn aggregators(&self) -> &[Aggregator] {
        &self.aggregators
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn key_of(&self, record: &Record) -> Result<Vec<String>, RecordError> {
        self.keys
            .iter()
            .map(|name| record.field(name).map(str::to_string))
            .collect()
    }

    /// Warn the first time a field fails, then drop to debug so a bad column
    /// does not flood the log.
    fn report(&mut self, err: &RecordError) {
        let field = match err {
            RecordError::MissingField(field) => field,
            RecordError::InvalidNumber { field, .. } => field,
        };
        if self.reported.insert(field.clone()) {
            warn!(error = %err, "skipping record contribution");
        } else {
            debug!(error = %err, "skipping record contribution");
        }
    }
}

impl Reducer for GroupBy {
    fn fold(&mut self, record: Record) -> Result<(), RecordError> {
        let key = match self.key_of(&record) {
            Ok(key) => key,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };

        let slot = match self.index.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let slot = self.groups.len();
                self.groups.push(Group {
                    key: entry.key().clone(),
                    accumulators: self.aggregators.iter().map(Aggregator::accumulator).collect(),
                });
                entry.insert(slot);
                slot
            }
        };

        let mut first_err = None;
        let group = &mut self.groups[slot];
        for (aggregator, acc) in self.aggregators.iter().zip(group.accumulators.iter_mut()) {
            if let Err(err) = acc.fold(aggregator, &record) {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => {
                self.report(&err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Vec<Record> {
        self.index.clear();
        let groups = std::mem::take(&mut self.groups);

        groups
            .into_iter()
            .map(|group| {
                let mut out = Record::with_capacity(self.keys.len() + self.aggregators.len());
                for (name, value) in self.keys.iter().zip(group.key) {
                    out.set_field(name.as_str(), value);
                }
                for (aggregator, acc) in self.aggregators.iter().zip(&group.accumulators) {
                    acc.write(aggregator, &mut out);
                }
                out
            })
            .collect()
    }
}
