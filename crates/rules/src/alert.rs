//! Live alert evaluation.

use chrono::{DateTime, Utc};
use logwarden_core::config::AlertSettings;
use logwarden_core::Event;

/// Decides which events are pushed to chat as they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Lowest status that alerts.
    pub min_status: u16,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self { min_status: 500 }
    }
}

impl From<&AlertSettings> for AlertPolicy {
    fn from(settings: &AlertSettings) -> Self {
        Self {
            min_status: settings.min_status,
        }
    }
}

impl AlertPolicy {
    /// True for events logged strictly after `started_at` whose status
    /// reaches the threshold. Lines already in the file at startup and lines
    /// with an unparseable timestamp never alert.
    pub fn should_alert(&self, event: &Event, started_at: DateTime<Utc>) -> bool {
        let Some(ts) = event.timestamp else {
            return false;
        };
        ts.with_timezone(&Utc) > started_at && event.status >= self.min_status
    }
}

/// Visual weight of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// `Warning` for 4xx, `Critical` for 5xx and above, `None` below 400.
    pub fn of(status: u16) -> Option<Self> {
        match status {
            400..=499 => Some(Severity::Warning),
            500..=u16::MAX => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Severity::Warning => "🟨",
            Severity::Critical => "🟥",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};
    use logwarden_core::{Enrichment, Request};

    fn event_at(ts: Option<DateTime<Utc>>, status: u16) -> Event {
        Event {
            project: "shop".into(),
            remote_addr: "192.0.2.10".into(),
            remote_user: None,
            time_local: String::new(),
            timestamp: ts.map(|t| t.with_timezone(&FixedOffset::east_opt(3 * 3600).unwrap())),
            request: "GET /checkout HTTP/1.1".into(),
            parsed: Request {
                method: "GET".into(),
                uri: "https://shop.example.com/checkout".into(),
                protocol: "HTTP/1.1".into(),
            },
            status,
            body_bytes_sent: 0,
            referer: "-".into(),
            user_agent: "-".into(),
            enrichment: Enrichment::default(),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn alerts_on_new_server_error() {
        let policy = AlertPolicy::default();
        let event = event_at(Some(start() + Duration::seconds(5)), 503);
        assert!(policy.should_alert(&event, start()));
    }

    #[test]
    fn ignores_events_from_before_start() {
        let policy = AlertPolicy::default();
        let before = event_at(Some(start() - Duration::minutes(1)), 500);
        assert!(!policy.should_alert(&before, start()));
        // strictly after
        assert!(!policy.should_alert(&event_at(Some(start()), 500), start()));
    }

    #[test]
    fn ignores_statuses_below_threshold() {
        let policy = AlertPolicy::default();
        let later = Some(start() + Duration::seconds(1));
        assert!(!policy.should_alert(&event_at(later, 404), start()));
        assert!(!policy.should_alert(&event_at(later, 499), start()));
        assert!(policy.should_alert(&event_at(later, 500), start()));
    }

    #[test]
    fn lowered_threshold_includes_client_errors() {
        let policy = AlertPolicy { min_status: 404 };
        let later = Some(start() + Duration::seconds(1));
        assert!(policy.should_alert(&event_at(later, 404), start()));
        assert!(!policy.should_alert(&event_at(later, 403), start()));
    }

    #[test]
    fn missing_timestamp_never_alerts() {
        assert!(!AlertPolicy::default().should_alert(&event_at(None, 500), start()));
    }

    #[test]
    fn severity_markers() {
        assert_eq!(Severity::of(302), None);
        assert_eq!(Severity::of(404), Some(Severity::Warning));
        assert_eq!(Severity::of(500), Some(Severity::Critical));
        assert_eq!(Severity::of(599), Some(Severity::Critical));
        assert_eq!(Severity::Warning.marker(), "🟨");
        assert_eq!(Severity::Critical.marker(), "🟥");
    }
}
