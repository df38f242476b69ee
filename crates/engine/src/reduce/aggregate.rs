use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordError};

/// Per-group aggregation applied to every record of the group.
///
/// In configuration files aggregators are tagged by `kind`:
///
/// ```toml
/// aggregators = [
///     { kind = "sum", field = "body_bytes_sent" },
///     { kind = "count" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregator {
    /// Running total of a numeric field, written to `<field>`.
    Sum { field: String },
    /// Number of records, written to `count`.
    Count,
    /// Mean of a numeric field, written to `<field>_avg`.
    Avg { field: String },
}

impl Aggregator {
    pub fn sum(field: impl Into<String>) -> Self {
        Aggregator::Sum { field: field.into() }
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Aggregator::Avg { field: field.into() }
    }

    /// Name of the field this aggregator writes into each output record.
    pub fn output_name(&self) -> String {
        match self {
            Aggregator::Sum { field } => field.clone(),
            Aggregator::Count => "count".to_string(),
            Aggregator::Avg { field } => format!("{field}_avg"),
        }
    }

    /// Input field read by this aggregator, if any.
    pub fn source_field(&self) -> Option<&str> {
        match self {
            Aggregator::Sum { field } | Aggregator::Avg { field } => Some(field),
            Aggregator::Count => None,
        }
    }

    pub(crate) fn accumulator(&self) -> Accumulator {
        match self {
            Aggregator::Sum { .. } => Accumulator::Sum(0.0),
            Aggregator::Count => Accumulator::Count(0),
            Aggregator::Avg { .. } => Accumulator::Avg { total: 0.0, samples: 0 },
        }
    }
}

/// Running state of one aggregator inside one group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Accumulator {
    Sum(f64),
    Count(u64),
    Avg { total: f64, samples: u64 },
}

impl Accumulator {
    /// Fold `record` in. On error the record contributes nothing.
    pub(crate) fn fold(&mut self, aggregator: &Aggregator, record: &Record) -> Result<(), RecordError> {
        let value = match aggregator.source_field() {
            Some(field) => record.float_field(field)?,
            None => 0.0,
        };

        match self {
            Accumulator::Sum(total) => *total += value,
            Accumulator::Count(n) => *n += 1,
            Accumulator::Avg { total, samples } => {
                *total += value;
                *samples += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn write(&self, aggregator: &Aggregator, out: &mut Record) {
        let name = aggregator.output_name();
        match self {
            Accumulator::Sum(total) => out.set_float_field(name, *total),
            Accumulator::Count(n) => out.set_uint_field(name, *n),
            Accumulator::Avg { total, samples } => {
                let mean = if *samples > 0 { total / *samples as f64 } else { 0.0 };
                out.set_field(name, format!("{mean:.2}"));
            }
        }
    }
}
