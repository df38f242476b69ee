use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::serde_utils::{deserialize_fields_from_map, serialize_fields_as_map};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Field '{0}' does not exist in record")]
    MissingField(String),

    #[error("Field '{field}' is not a number: {value:?}")]
    InvalidNumber { field: String, value: String },
}

/// One parsed log line: field name to raw string value.
///
/// Fields keep the order in which they were first set, which for parser
/// output is the order of the placeholders in the format template. Names are
/// unique; setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a field, replacing the previous value if the name already exists.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Set a float field using its shortest lossless representation.
    /// Integral values are written without a fractional part.
    pub fn set_float_field(&mut self, name: impl Into<String>, value: f64) {
        self.set_field(name, format_float(value));
    }

    pub fn set_uint_field(&mut self, name: impl Into<String>, value: u64) {
        self.set_field(name, value.to_string());
    }

    pub fn field(&self, name: &str) -> Result<&str, RecordError> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| RecordError::MissingField(name.to_string()))
    }

    pub fn int_field(&self, name: &str) -> Result<i64, RecordError> {
        let raw = self.field(name)?;
        raw.trim().parse().map_err(|_| RecordError::InvalidNumber {
            field: name.to_string(),
            value: raw.to_string(),
        })
    }

    /// Finite float value of `name`. `nan` and `inf` are rejected.
    pub fn float_field(&self, name: &str) -> Result<f64, RecordError> {
        let raw = self.field(name)?;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| RecordError::InvalidNumber {
                field: name.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == name)
    }

    /// Copy of this record restricted to `names`, in the order given.
    /// Names that are not present are skipped.
    pub fn partial(&self, names: &[&str]) -> Record {
        let mut out = Record::with_capacity(names.len());
        for name in names {
            if let Ok(value) = self.field(name) {
                out.set_field(*name, value);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn into_fields(self) -> Vec<(String, String)> {
        self.fields
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set_field(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_fields_as_map(&self.fields, serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Route through set_field so duplicate keys collapse to the last value.
        deserialize_fields_from_map(deserializer).map(Record::from_iter)
    }
}

fn format_float(value: f64) -> String {
    // Below 2^53 every integral f64 is exact, so the integer form is lossless.
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
