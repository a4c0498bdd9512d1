//! Log-format template compiler.
//!
//! A template such as
//! `$remote_addr - $remote_user [$time_local] "$request" $status`
//! becomes an anchored regex in which every `$name` is a lazy named capture
//! and everything else is matched literally.

use std::collections::HashSet;

use regex::{Captures, Regex};

/// Errors produced while compiling a log-format template.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("log format template is empty")]
    Empty,

    #[error("log format template has no $placeholders: {0}")]
    NoPlaceholders(String),

    #[error("placeholder ${0} appears more than once")]
    DuplicateField(String),

    #[error("log format compiles to an invalid expression `{pattern}`: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Literal(&'a str),
    Field(&'a str),
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Split a template into literal runs and `$identifier` placeholders.
/// A `$` not followed by an identifier character stays literal.
fn tokenize(template: &str) -> Vec<Token<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && is_ident_byte(bytes[i + 1]) {
            if literal_start < i {
                tokens.push(Token::Literal(&template[literal_start..i]));
            }
            let name_start = i + 1;
            let mut end = name_start;
            while end < bytes.len() && is_ident_byte(bytes[end]) {
                end += 1;
            }
            tokens.push(Token::Field(&template[name_start..end]));
            i = end;
            literal_start = end;
        } else {
            i += 1;
        }
    }
    if literal_start < bytes.len() {
        tokens.push(Token::Literal(&template[literal_start..]));
    }
    tokens
}

/// A compiled log-format template.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    template: String,
    regex: Regex,
    fields: Vec<String>,
}

impl CompiledPattern {
    /// Compile `template` into a matcher.
    ///
    /// Literal text is escaped wholesale, so `[`, `]`, `.`, `(` and friends
    /// in the template never act as regex syntax.
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        if template.trim().is_empty() {
            return Err(PatternError::Empty);
        }

        let mut pattern = String::with_capacity(template.len() * 2);
        let mut fields: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        pattern.push('^');
        for token in tokenize(template) {
            match token {
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
                Token::Field(name) => {
                    if !seen.insert(name) {
                        return Err(PatternError::DuplicateField(name.to_string()));
                    }
                    pattern.push_str("(?P<");
                    pattern.push_str(name);
                    pattern.push_str(">.*?)");
                    fields.push(name.to_string());
                }
            }
        }
        pattern.push('$');

        if fields.is_empty() {
            return Err(PatternError::NoPlaceholders(template.to_string()));
        }

        let regex = Regex::new(&pattern).map_err(|source| PatternError::Invalid {
            pattern: pattern.clone(),
            source,
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            fields,
        })
    }

    /// Placeholder names in order of appearance.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The generated expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn captures<'l>(&self, line: &'l str) -> Option<Captures<'l>> {
        self.regex.captures(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NGINX_COMBINED: &str = r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent""#;

    #[test]
    fn tokenizes_placeholders_and_literals() {
        let tokens = tokenize("[$time_local] $status");
        assert_eq!(
            tokens,
            vec![
                Token::Literal("["),
                Token::Field("time_local"),
                Token::Literal("] "),
                Token::Field("status"),
            ]
        );
    }

    #[test]
    fn lone_dollar_is_literal() {
        let tokens = tokenize("cost $ $amount$");
        assert_eq!(
            tokens,
            vec![
                Token::Literal("cost $ "),
                Token::Field("amount"),
                Token::Literal("$"),
            ]
        );
    }

    #[test]
    fn collects_fields_in_order() {
        let pattern = CompiledPattern::compile(NGINX_COMBINED).unwrap();
        assert_eq!(
            pattern.fields(),
            &[
                "remote_addr",
                "remote_user",
                "time_local",
                "request",
                "status",
                "body_bytes_sent",
                "http_referer",
                "http_user_agent",
            ]
        );
    }

    #[test]
    fn extracts_one_value_per_placeholder() {
        let pattern = CompiledPattern::compile(NGINX_COMBINED).unwrap();
        let values = [
            "203.0.113.9",
            "alice",
            "10/Oct/2000:13:55:36 -0700",
            "GET /a.gif HTTP/1.0",
            "200",
            "2326",
            "http://example.com/start",
            "Mozilla/4.08 [en] (Win98; I ;Nav)",
        ];
        let mut line = NGINX_COMBINED.to_string();
        for (field, value) in pattern.fields().iter().zip(values) {
            line = line.replacen(&format!("${field}"), value, 1);
        }

        let caps = pattern.captures(&line).expect("line should match");
        for (field, value) in pattern.fields().iter().zip(values) {
            assert_eq!(caps.name(field).unwrap().as_str(), value, "field {field}");
        }
        // group 0 plus one group per placeholder
        assert_eq!(caps.len(), pattern.fields().len() + 1);
    }

    #[test]
    fn brackets_are_literal() {
        let pattern = CompiledPattern::compile("[$time_local] $remote_addr").unwrap();
        let caps = pattern
            .captures("[18/Oct/2026:10:00:00 +0000] 10.0.0.1")
            .unwrap();
        assert_eq!(&caps["time_local"], "18/Oct/2026:10:00:00 +0000");
        assert_eq!(&caps["remote_addr"], "10.0.0.1");
        assert!(pattern.as_str().contains(r"\["));
    }

    #[test]
    fn other_metacharacters_are_literal() {
        let pattern = CompiledPattern::compile("($status).$bytes").unwrap();
        assert!(pattern.captures("(200).512").is_some());
        assert!(pattern.captures("(200)x512").is_none());
    }

    #[test]
    fn trailing_placeholder_takes_rest_of_line() {
        let pattern = CompiledPattern::compile("$status $body_bytes_sent").unwrap();
        let caps = pattern.captures("200 4096").unwrap();
        assert_eq!(&caps["body_bytes_sent"], "4096");
    }

    #[test]
    fn non_matching_line_yields_none() {
        let pattern = CompiledPattern::compile("[$time_local] $status").unwrap();
        assert!(pattern.captures("no brackets here").is_none());
    }

    #[test]
    fn compilation_is_deterministic() {
        let a = CompiledPattern::compile(NGINX_COMBINED).unwrap();
        let b = CompiledPattern::compile(NGINX_COMBINED).unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert_eq!(a.fields(), b.fields());
        assert_eq!(a.template(), NGINX_COMBINED);
    }

    #[test]
    fn rejects_empty_template() {
        assert!(matches!(CompiledPattern::compile("   "), Err(PatternError::Empty)));
    }

    #[test]
    fn rejects_template_without_placeholders() {
        assert!(matches!(
            CompiledPattern::compile("just text"),
            Err(PatternError::NoPlaceholders(_))
        ));
    }

    #[test]
    fn rejects_duplicate_placeholders() {
        let err = CompiledPattern::compile("$status $status").unwrap_err();
        assert!(matches!(err, PatternError::DuplicateField(ref f) if f == "status"));
    }

    #[test]
    fn rejects_names_the_regex_engine_cannot_capture() {
        let err = CompiledPattern::compile("$1st $status").unwrap_err();
        assert!(matches!(err, PatternError::Invalid { .. }));
    }
}
