use std::collections::HashMap;

use crate::format::{extract_log_format, CompiledFormat, FormatError};
use crate::record::Record;

use super::model::ParseError;
use super::refine::{Refinement, RefinementKind, RefinementSpec};
use super::traits::LineParser;

/// Template-driven access log parser.
///
/// Built once, then shared (`Arc<Parser>`) by every parse worker of a
/// pipeline. All state is read-only after construction.
#[derive(Debug, Clone)]
pub struct Parser {
    format: String,
    compiled: CompiledFormat,
    refinements: HashMap<String, Refinement>,
}

impl Parser {
    /// Parser for `format` with no retry format and no refinements.
    pub fn new(format: &str) -> Result<Self, FormatError> {
        ParserBuilder::new(format).build()
    }

    pub fn builder(format: &str) -> ParserBuilder {
        ParserBuilder::new(format)
    }

    /// Parser for the `log_format <name>` directive found in nginx
    /// configuration text.
    pub fn from_nginx_config(conf: &str, name: &str) -> Result<Self, FormatError> {
        let format = extract_log_format(conf, name)?;
        Self::new(&format)
    }

    pub fn compiled(&self) -> &CompiledFormat {
        &self.compiled
    }
}

impl LineParser for Parser {
    fn parse(&self, line: &str) -> Result<Record, ParseError> {
        let (pattern, captures) = self
            .compiled
            .captures(line)
            .ok_or_else(|| ParseError::NoMatch {
                line: line.to_string(),
                format: self.format.clone(),
            })?;

        let mut record = Record::with_capacity(pattern.fields().len());
        for (name, raw) in captures {
            let value = match self.refinements.get(name) {
                Some(refinement) => refinement.apply(raw),
                None => raw.into(),
            };
            record.set_field(name, value.into_owned());
        }
        Ok(record)
    }

    fn format(&self) -> &str {
        &self.format
    }
}

#[derive(Debug, Clone)]
enum PendingRefinement {
    Spec(RefinementSpec),
    Ready(String, Refinement),
}

/// Collects a format, an optional retry format and field refinements.
/// Patterns are compiled by [`ParserBuilder::build`], so every setup error
/// surfaces there.
#[derive(Debug, Clone)]
pub struct ParserBuilder {
    format: String,
    retry: Option<String>,
    // call order
    refinements: Vec<PendingRefinement>,
}

impl ParserBuilder {
    pub fn new(format: &str) -> Self {
        Self {
            format: format.to_string(),
            retry: None,
            refinements: Vec::new(),
        }
    }

    /// Format tried when a line does not match the primary one.
    pub fn retry(mut self, format: &str) -> Self {
        self.retry = Some(format.to_string());
        self
    }

    pub fn refine(mut self, field: &str, refinement: Refinement) -> Self {
        self.refinements
            .push(PendingRefinement::Ready(field.to_string(), refinement));
        self
    }

    pub fn refine_match(self, field: &str, pattern: &str) -> Self {
        self.spec(field, RefinementKind::Match, pattern, HashMap::new())
    }

    pub fn refine_submatch(self, field: &str, pattern: &str) -> Self {
        self.spec(field, RefinementKind::SubMatch, pattern, HashMap::new())
    }

    /// Two-level refinement: `inner` maps a first-level capture to the
    /// pattern applied to the raw value next.
    pub fn refine_nested<I, K, V>(self, field: &str, pattern: &str, inner: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let inner = inner
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.spec(field, RefinementKind::SubMatch, pattern, inner)
    }

    pub fn refinements<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = RefinementSpec>,
    {
        self.refinements
            .extend(specs.into_iter().map(PendingRefinement::Spec));
        self
    }

    fn spec(
        mut self,
        field: &str,
        kind: RefinementKind,
        pattern: &str,
        inner: HashMap<String, String>,
    ) -> Self {
        self.refinements.push(PendingRefinement::Spec(RefinementSpec {
            field: field.to_string(),
            kind,
            pattern: pattern.to_string(),
            inner,
        }));
        self
    }

    pub fn build(self) -> Result<Parser, FormatError> {
        let compiled = match &self.retry {
            Some(retry) => CompiledFormat::with_retry(&self.format, retry)?,
            None => CompiledFormat::new(&self.format)?,
        };

        // A later rule for the same field replaces an earlier one.
        let mut refinements = HashMap::new();
        for pending in self.refinements {
            match pending {
                PendingRefinement::Spec(spec) => {
                    let refinement = spec.compile()?;
                    refinements.insert(spec.field, refinement);
                }
                PendingRefinement::Ready(field, refinement) => {
                    refinements.insert(field, refinement);
                }
            }
        }

        Ok(Parser {
            format: self.format,
            compiled,
            refinements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED: &str = "$remote_addr - $remote_user [$time_local] \"$request\" $status $body_bytes_sent \"$http_referer\" \"$http_user_agent\"";

    #[test]
    fn test_parse_example_line() {
        let parser = Parser::new("$remote_addr [$time_local]").unwrap();
        let record = parser.parse("10.0.0.1 [1/Jan/2024]").unwrap();

        let fields: Vec<_> = record.iter().collect();
        assert_eq!(
            fields,
            vec![("remote_addr", "10.0.0.1"), ("time_local", "1/Jan/2024")]
        );
    }

    #[test]
    fn test_parse_combined_log_format() {
        let parser = Parser::new(COMBINED).unwrap();
        let line = r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326 "http://www.example.com/start.html" "Mozilla/4.08 [en] (Win98; I ;Nav)""#;
        let record = parser.parse(line).unwrap();

        assert_eq!(record.len(), 8);
        assert_eq!(record.field("remote_addr"), Ok("127.0.0.1"));
        assert_eq!(record.field("remote_user"), Ok("frank"));
        assert_eq!(record.field("time_local"), Ok("10/Oct/2000:13:55:36 -0700"));
        assert_eq!(record.field("request"), Ok("GET /apache_pb.gif HTTP/1.0"));
        assert_eq!(record.int_field("status"), Ok(200));
        assert_eq!(record.int_field("body_bytes_sent"), Ok(2326));
        assert_eq!(record.field("http_referer"), Ok("http://www.example.com/start.html"));
        assert_eq!(record.field("http_user_agent"), Ok("Mozilla/4.08 [en] (Win98; I ;Nav)"));
    }

    #[test]
    fn test_round_trip_of_substituted_values() {
        let template = "$a|$b [$c] \"$d\" $e";
        let values = [("a", "x1"), ("b", "y-2"), ("c", "z 3"), ("d", "w [4]"), ("e", "v5")];
        let mut line = template.to_string();
        for (name, value) in values {
            line = line.replacen(&format!("${name}"), value, 1);
        }

        let record = Parser::new(template).unwrap().parse(&line).unwrap();
        assert_eq!(record.len(), values.len());
        for (name, value) in values {
            assert_eq!(record.field(name), Ok(value), "field {name}");
        }
    }

    #[test]
    fn test_no_match_error() {
        let parser = Parser::new("[$time_local] $status").unwrap();
        let err = parser.parse("garbage").unwrap_err();
        assert_eq!(
            err,
            ParseError::NoMatch {
                line: "garbage".to_string(),
                format: "[$time_local] $status".to_string(),
            }
        );
    }

    #[test]
    fn test_retry_format_used_after_primary_fails() {
        let parser = Parser::builder("$remote_addr [$time_local] \"$request\"")
            .retry("$remote_addr [$time_local]")
            .build()
            .unwrap();

        let full = parser.parse("1.1.1.1 [now] \"GET /\"").unwrap();
        assert_eq!(full.len(), 3);

        let short = parser.parse("1.1.1.1 [now]").unwrap();
        assert_eq!(short.len(), 2);
        assert_eq!(short.field("time_local"), Ok("now"));
        assert!(!short.has_field("request"));
    }

    #[test]
    fn test_primary_wins_when_both_match() {
        let parser = Parser::builder("$first $second")
            .retry("$whole")
            .build()
            .unwrap();
        let record = parser.parse("a b").unwrap();
        assert_eq!(record.field("first"), Ok("a"));
        assert!(!record.has_field("whole"));
    }

    #[test]
    fn test_neither_format_matches() {
        let parser = Parser::builder("[$a]").retry("<$b>").build().unwrap();
        assert!(matches!(parser.parse("{c}"), Err(ParseError::NoMatch { .. })));
    }

    #[test]
    fn test_refinements_are_applied() {
        let parser = Parser::builder("\"$request\" $status")
            .refine_match("request", r"/[^ ?]*")
            .refine_submatch("status", r"^(\d)")
            .build()
            .unwrap();

        let record = parser.parse("\"GET /api?q=1 HTTP/1.1\" 404").unwrap();
        assert_eq!(record.field("request"), Ok("/api"));
        assert_eq!(record.field("status"), Ok("4"));
    }

    #[test]
    fn test_nested_refinement() {
        let parser = Parser::builder("\"$request\"")
            .refine_nested(
                "request",
                r"^\S+ /(\w+)/",
                [("videos", r"/videos/(\d+)")],
            )
            .build()
            .unwrap();

        let record = parser.parse("\"GET /videos/42/play HTTP/1.1\"").unwrap();
        assert_eq!(record.field("request"), Ok("42"));
    }

    #[test]
    fn test_later_refinement_replaces_earlier() {
        let parser = Parser::builder("$status")
            .refine_match("status", r"\d")
            .refine("status", Refinement::None)
            .build()
            .unwrap();
        assert_eq!(parser.parse("503").unwrap().field("status"), Ok("503"));
    }

    #[test]
    fn test_refinement_after_ready_made_one_wins() {
        let parser = Parser::builder("$status")
            .refine("status", Refinement::None)
            .refine_match("status", r"\d")
            .build()
            .unwrap();
        assert_eq!(parser.parse("503").unwrap().field("status"), Ok("5"));
    }

    #[test]
    fn test_declarative_refinements_keep_call_order() {
        let spec = RefinementSpec {
            field: "status".to_string(),
            kind: RefinementKind::SubMatch,
            pattern: r"^(\d\d)".to_string(),
            inner: HashMap::new(),
        };
        let parser = Parser::builder("$status")
            .refine_match("status", r"\d")
            .refinements([spec])
            .build()
            .unwrap();
        assert_eq!(parser.parse("503").unwrap().field("status"), Ok("50"));
    }

    #[test]
    fn test_digit_led_placeholder_round_trip() {
        let parser = Parser::new("$remote_addr $1").unwrap();
        let record = parser.parse("10.0.0.1 abc").unwrap();
        let fields: Vec<_> = record.iter().collect();
        assert_eq!(fields, vec![("remote_addr", "10.0.0.1"), ("1", "abc")]);
    }

    #[test]
    fn test_bad_refinement_fails_build() {
        let result = Parser::builder("$status").refine_match("status", "(").build();
        assert!(matches!(result, Err(FormatError::InvalidRefinement { .. })));
    }

    #[test]
    fn test_bad_template_fails_build() {
        assert!(matches!(
            Parser::new("$a $a"),
            Err(FormatError::DuplicatePlaceholder { .. })
        ));
    }

    #[test]
    fn test_from_nginx_config() {
        let conf = "log_format main '$remote_addr [$time_local]';";
        let parser = Parser::from_nginx_config(conf, "main").unwrap();
        assert_eq!(parser.format(), "$remote_addr [$time_local]");
        assert!(parser.parse("10.0.0.1 [1/Jan/2024]").is_ok());

        assert!(matches!(
            Parser::from_nginx_config(conf, "other"),
            Err(FormatError::DirectiveNotFound(_))
        ));
    }

    #[test]
    fn test_parser_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parser>();
    }
}
