//! Line parser: applies a [`CompiledPattern`] to one raw line and builds an
//! [`Event`], or explains why the line was rejected.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use logwarden_core::event::ABSENT;
use logwarden_core::{Enrichment, Event, Request};
use regex::Captures;

use crate::pattern::CompiledPattern;

/// `time_local` layout, e.g. `10/Oct/2000:13:55:36 -0700`.
pub const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Why a line produced no event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("line does not match the log format")]
    NoMatch,

    #[error("request is the broken-connection placeholder")]
    BrokenConnection,

    #[error("status code is zero")]
    ZeroStatus,

    #[error("request line has fewer than three tokens: {0:?}")]
    MalformedRequest(String),

    #[error("${field} is not a number: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

impl Rejection {
    /// Expected noise from dropped connections and junk requests. These are
    /// discarded without logging; everything else is worth a log line.
    pub fn is_noise(&self) -> bool {
        matches!(
            self,
            Rejection::BrokenConnection | Rejection::ZeroStatus | Rejection::MalformedRequest(_)
        )
    }
}

/// Parses lines of one project's log.
#[derive(Debug, Clone)]
pub struct LineParser {
    project: String,
    host: String,
    pattern: Arc<CompiledPattern>,
}

impl LineParser {
    pub fn new(
        project: impl Into<String>,
        host: impl Into<String>,
        pattern: Arc<CompiledPattern>,
    ) -> Self {
        Self {
            project: project.into(),
            host: host.into(),
            pattern,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Parse one line into an [`Event`].
    pub fn parse(&self, line: &str) -> Result<Event, Rejection> {
        let caps = self.pattern.captures(line).ok_or(Rejection::NoMatch)?;

        let request = field(&caps, "request");
        if request == ABSENT {
            return Err(Rejection::BrokenConnection);
        }

        let status = match caps.name("status") {
            Some(m) => parse_number::<u16>("status", m.as_str())?,
            None => 0,
        };
        if status == 0 {
            return Err(Rejection::ZeroStatus);
        }

        let body_bytes_sent = match field(&caps, "body_bytes_sent") {
            "" | ABSENT => 0,
            raw => parse_number::<u64>("body_bytes_sent", raw)?,
        };

        let time_local = field(&caps, "time_local");
        let timestamp = parse_time_local(time_local);

        let parsed = self.split_request(request)?;

        let remote_user = match field(&caps, "remote_user") {
            "" | ABSENT => None,
            user => Some(user.to_string()),
        };

        Ok(Event {
            project: self.project.clone(),
            remote_addr: field(&caps, "remote_addr").to_string(),
            remote_user,
            time_local: time_local.to_string(),
            timestamp,
            request: request.to_string(),
            parsed,
            status,
            body_bytes_sent,
            referer: field(&caps, "http_referer").to_string(),
            user_agent: field(&caps, "http_user_agent").to_string(),
            enrichment: Enrichment::default(),
        })
    }

    /// `METHOD TARGET PROTOCOL`; extra tokens are ignored.
    fn split_request(&self, request: &str) -> Result<Request, Rejection> {
        let mut tokens = request.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(method), Some(target), Some(protocol)) => Ok(Request {
                method: method.to_string(),
                uri: normalize_uri(&self.host, target),
                protocol: protocol.to_string(),
            }),
            _ => Err(Rejection::MalformedRequest(request.to_string())),
        }
    }
}

fn field<'l>(caps: &Captures<'l>, name: &str) -> &'l str {
    caps.name(name).map(|m| m.as_str()).unwrap_or("")
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, Rejection> {
    raw.trim().parse().map_err(|_| Rejection::InvalidField {
        field,
        value: raw.to_string(),
    })
}

/// Parse a `time_local` value; `None` when it does not follow
/// [`TIME_LOCAL_FORMAT`].
pub fn parse_time_local(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw.trim(), TIME_LOCAL_FORMAT).ok()
}

/// Qualify a request target with `host`.
///
/// Absolute-form (`http://other/x`) and authority-form (`other:443`, as
/// sent with `CONNECT`) targets are kept verbatim. Relative targets are
/// joined with exactly one `/` between host and path.
pub fn normalize_uri(host: &str, target: &str) -> String {
    if is_authority_form(target) {
        return target.to_string();
    }
    if let Ok(url) = url::Url::parse(target) {
        if url.has_host() {
            return target.to_string();
        }
    }

    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return target.to_string();
    }
    let path = target.trim_start_matches('/');
    format!("{host}/{path}")
}

/// `host:port` with no path.
fn is_authority_form(target: &str) -> bool {
    match target.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !target.contains('/')
                && !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
