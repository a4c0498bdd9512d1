use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Placeholder a web server writes for an absent value.
pub const ABSENT: &str = "-";

/// Decomposed request line: `METHOD URI PROTOCOL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    /// Absolute URI (relative request targets are joined to the project host).
    pub uri: String,
    pub protocol: String,
}

/// Best-effort fields attached after parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub location: Option<String>,
    pub bot: Option<String>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.location.is_none() && self.bot.is_none()
    }
}

/// One normalized access-log entry.
///
/// Built by the line parser, optionally decorated with [`Enrichment`], then
/// handed to the router as an owned value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub project: String,
    pub remote_addr: String,
    pub remote_user: Option<String>,
    /// Timestamp exactly as it appeared in the log.
    pub time_local: String,
    /// `None` when `time_local` did not parse; such events are never
    /// bucketed into a day nor alerted on.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Raw request line.
    pub request: String,
    pub parsed: Request,
    pub status: u16,
    pub body_bytes_sent: u64,
    pub referer: String,
    pub user_agent: String,
    #[serde(default)]
    pub enrichment: Enrichment,
}

impl Event {
    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }
}

/// Response status classes counted in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
    /// Anything outside 200-599.
    Other,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }
}

impl std::fmt::Display for StatusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusClass::Success => write!(f, "2xx"),
            StatusClass::Redirect => write!(f, "3xx"),
            StatusClass::ClientError => write!(f, "4xx"),
            StatusClass::ServerError => write!(f, "5xx"),
            StatusClass::Other => write!(f, "other"),
        }
    }
}
