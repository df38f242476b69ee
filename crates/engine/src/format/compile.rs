use regex::Regex;

use super::error::FormatError;

/// Delimiter assumed after a placeholder that ends the template.
const TRAILING_DELIMITER: char = ' ';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Split a template into literal text and `$name` placeholders.
///
/// A `$` that is not followed by an identifier character is literal.
/// Placeholders may follow each other directly (`$a$b`).
fn segments(template: &str) -> Vec<Segment<'_>> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' {
            let name_end = bytes[i + 1..]
                .iter()
                .position(|b| !is_ident_byte(*b))
                .map_or(bytes.len(), |n| i + 1 + n);

            if name_end > i + 1 {
                if literal_start < i {
                    out.push(Segment::Literal(&template[literal_start..i]));
                }
                out.push(Segment::Placeholder(&template[i + 1..name_end]));
                i = name_end;
                literal_start = name_end;
                continue;
            }
        }
        i += 1;
    }

    if literal_start < bytes.len() {
        out.push(Segment::Literal(&template[literal_start..]));
    }
    out
}

/// Terminator of a placeholder: the first character of the literal text that
/// follows it. Directly adjacent placeholders are skipped, so every member of
/// a run like `$a$b "` shares the same terminator.
fn terminator(rest: &[Segment<'_>]) -> char {
    rest.iter()
        .find_map(|segment| match segment {
            Segment::Literal(text) => text.chars().next(),
            Segment::Placeholder(_) => None,
        })
        .unwrap_or(TRAILING_DELIMITER)
}

/// Group name of the placeholder at `index`. Placeholder names may start
/// with a digit, which the regex engine rejects as a group name.
fn group_name(index: usize) -> String {
    format!("f{index}")
}

/// Build the pattern source for a template without compiling it, together
/// with the placeholder names in group order.
fn pattern_source(template: &str) -> Result<(String, Vec<String>), FormatError> {
    let segments = segments(template.trim_matches(' '));
    let mut pattern = String::from("^");
    let mut fields: Vec<String> = Vec::new();

    for (idx, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
            Segment::Placeholder(name) => {
                if fields.iter().any(|field| field == name) {
                    return Err(FormatError::DuplicatePlaceholder {
                        template: template.to_string(),
                        name: name.to_string(),
                    });
                }
                let delimiter = terminator(&segments[idx + 1..]);
                let mut buf = [0u8; 4];
                let escaped = regex::escape(delimiter.encode_utf8(&mut buf));
                pattern.push_str(&format!(
                    "(?P<{}>[^{escaped}]*)",
                    group_name(fields.len())
                ));
                fields.push(name.to_string());
            }
        }
    }
    Ok((pattern, fields))
}

/// A compiled template: a start-anchored pattern with one group per
/// placeholder, plus the placeholder names in template order.
#[derive(Debug, Clone)]
pub struct LinePattern {
    regex: Regex,
    fields: Vec<String>,
}

impl LinePattern {
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Placeholder names, in template order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Captured `(name, value)` pairs in template order, or `None` when the
    /// line does not match.
    pub fn captures<'p, 't>(
        &'p self,
        line: &'t str,
    ) -> Option<impl Iterator<Item = (&'p str, &'t str)>> {
        let caps = self.regex.captures(line)?;
        Some(self.fields.iter().enumerate().map(move |(i, name)| {
            let value = caps.get(i + 1).map_or("", |m| m.as_str());
            (name.as_str(), value)
        }))
    }
}

/// Compile a log-format template into a start-anchored pattern with one
/// group per placeholder, in template order.
///
/// Each placeholder matches everything up to the literal character that
/// follows it in the template. When placeholders are directly concatenated
/// the leading one is greedy and consumes the whole run; the others match
/// the empty string. Invalid templates (for example a placeholder used twice)
/// fail here rather than on every line.
pub fn compile(template: &str) -> Result<LinePattern, FormatError> {
    let (source, fields) = pattern_source(template)?;
    tracing::trace!(template, pattern = %source, "compiled log format");

    let regex = Regex::new(&source).map_err(|source| FormatError::InvalidTemplate {
        template: template.to_string(),
        source,
    })?;
    Ok(LinePattern { regex, fields })
}

/// Primary pattern plus an optional retry pattern tried when the primary
/// does not match. Immutable and cheap to share between parse workers.
#[derive(Debug, Clone)]
pub struct CompiledFormat {
    primary: LinePattern,
    fallback: Option<LinePattern>,
}

impl CompiledFormat {
    pub fn new(template: &str) -> Result<Self, FormatError> {
        Ok(Self {
            primary: compile(template)?,
            fallback: None,
        })
    }

    pub fn with_retry(template: &str, retry: &str) -> Result<Self, FormatError> {
        Ok(Self {
            primary: compile(template)?,
            fallback: Some(compile(retry)?),
        })
    }

    pub fn primary(&self) -> &LinePattern {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&LinePattern> {
        self.fallback.as_ref()
    }

    /// Match `line` against the primary pattern, then the fallback.
    /// Returns the pattern that matched and its captures.
    pub fn captures<'p, 't>(
        &'p self,
        line: &'t str,
    ) -> Option<(&'p LinePattern, impl Iterator<Item = (&'p str, &'t str)>)> {
        if let Some(caps) = self.primary.captures(line) {
            return Some((&self.primary, caps));
        }
        let fallback = self.fallback.as_ref()?;
        fallback.captures(line).map(|caps| (fallback, caps))
    }
}
