//! Refine: narrow a captured field value with a secondary pattern.
//!
//! A `$request` capture such as `GET /api/users?id=1 HTTP/1.1` can be cut
//! down to the method, the path, or (two levels deep) a value whose pattern
//! depends on what the first level found.

use std::borrow::Cow;
use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::format::FormatError;

#[derive(Debug, Clone)]
pub enum Refinement {
    /// Keep the raw value.
    None,
    /// Replace the value with the first substring matching the pattern.
    Match(Regex),
    /// Replace the value with the pattern's first capture group. When the
    /// captured string is a key of `inner`, that pattern is applied to the
    /// original raw value and its first capture group wins instead.
    SubMatch {
        pattern: Regex,
        inner: HashMap<String, Regex>,
    },
}

impl Refinement {
    /// Refine `raw`. Anything that does not match leaves `raw` unchanged.
    pub fn apply<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        match self {
            Refinement::None => Cow::Borrowed(raw),
            Refinement::Match(pattern) => match pattern.find(raw) {
                Some(m) if !m.is_empty() => Cow::Borrowed(m.as_str()),
                _ => Cow::Borrowed(raw),
            },
            Refinement::SubMatch { pattern, inner } => {
                if pattern.captures_len() < 2 {
                    return Cow::Borrowed(raw);
                }
                let Some(caps) = pattern.captures(raw) else {
                    return Cow::Borrowed(raw);
                };
                let candidate = caps.get(1).map_or("", |m| m.as_str());

                let nested = inner
                    .get(candidate)
                    .and_then(|second| second.captures(raw))
                    .and_then(|caps| caps.get(1));

                match nested {
                    Some(m) => Cow::Borrowed(m.as_str()),
                    None => Cow::Borrowed(candidate),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementKind {
    #[default]
    None,
    Match,
    SubMatch,
}

/// Declarative form of a refinement, as found in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementSpec {
    pub field: String,
    #[serde(default)]
    pub kind: RefinementKind,
    #[serde(default)]
    pub pattern: String,
    /// Second-level patterns keyed by the first-level capture (SubMatch only).
    #[serde(default)]
    pub inner: HashMap<String, String>,
}

impl RefinementSpec {
    pub fn compile(&self) -> Result<Refinement, FormatError> {
        let regex = |source: &str| {
            Regex::new(source).map_err(|source| FormatError::InvalidRefinement {
                field: self.field.clone(),
                source,
            })
        };

        Ok(match self.kind {
            RefinementKind::None => Refinement::None,
            RefinementKind::Match => Refinement::Match(regex(&self.pattern)?),
            RefinementKind::SubMatch => Refinement::SubMatch {
                pattern: regex(&self.pattern)?,
                inner: self
                    .inner
                    .iter()
                    .map(|(key, source)| -> Result<(String, Regex), FormatError> {
                        Ok((key.clone(), regex(source)?))
                    })
                    .collect::<Result<_, _>>()?,
            },
        })
    }
}
