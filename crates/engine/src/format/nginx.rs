//! nginx: pull a `log_format` template out of nginx configuration text.
//!
//! ```text
//! log_format main '$remote_addr - $remote_user [$time_local] '
//!                 '"$request" $status $body_bytes_sent';
//! ```
//!
//! The quoted fragments of the directive are concatenated until the unquoted
//! `;` terminator. Unquoted parameters such as `escape=json` are ignored.

use super::error::FormatError;

/// Return the body of `line` after `log_format <name>`, or `None` if the line
/// is not that directive.
fn directive_body<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.trim_start().strip_prefix("log_format")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix(name)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest)
}

#[derive(Default)]
struct Collector {
    template: String,
    quote: Option<char>,
    escaped: bool,
}

impl Collector {
    /// Feed one line of directive text. Returns true once the terminator has
    /// been seen.
    fn feed(&mut self, text: &str) -> bool {
        for c in text.chars() {
            match self.quote {
                Some(_) if self.escaped => {
                    self.template.push(c);
                    self.escaped = false;
                }
                Some(_) if c == '\\' => self.escaped = true,
                Some(q) if c == q => self.quote = None,
                Some(_) => self.template.push(c),
                None => match c {
                    '\'' | '"' => self.quote = Some(c),
                    ';' => return true,
                    '#' => break,
                    _ => {}
                },
            }
        }
        false
    }
}

/// Find `log_format <name>` in `conf` and return its template.
pub fn extract_log_format(conf: &str, name: &str) -> Result<String, FormatError> {
    let mut lines = conf.lines();
    let body = lines
        .by_ref()
        .find_map(|line| directive_body(line, name))
        .ok_or_else(|| FormatError::DirectiveNotFound(name.to_string()))?;

    let mut collector = Collector::default();
    if !collector.feed(body) {
        for line in lines {
            if collector.feed(line) {
                break;
            }
        }
    }

    tracing::debug!(name, template = %collector.template, "extracted nginx log_format");
    Ok(collector.template)
}
