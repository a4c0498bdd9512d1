//! Minijinja rendering of alert and report messages.
//!
//! Output is Telegram HTML: only `<b>` and `<pre>` markup, with every
//! interpolated value passed through the `html` filter.

use chrono::{DateTime, TimeZone};
use logwarden_core::Event;
use logwarden_rules::{ReportSummary, Severity};

use crate::traits::NotifyError;

const ALERT_TEMPLATE: &str = "\
{% if marker %}{{ marker }} {% endif %}<b>{{ status }}</b>: {{ uri | html }}

<b>IP</b>: {{ remote_addr | html }}
<b>DATE</b>: {{ date | html }}
<b>METHOD</b>: {{ method | html }} / {{ protocol | html }}
{% if location %}<b>LOCATION</b>: {{ location | html }}
{% endif %}{% if bot %}<b>BOT</b>: {{ bot | html }}
{% endif %}
<pre>{{ user_agent | html }}</pre>";

const REPORT_TEMPLATE: &str = "\
ℹ️ <b>REPORT {{ project | html }} - {{ window | html }}</b>

<b>5xx</b>:  {{ summary.class_5xx }}
<b>4xx</b>:  {{ summary.class_4xx }}
<b>3xx</b>:  {{ summary.class_3xx }}
<b>2xx</b>:  {{ summary.class_2xx }}

<b>TOTAL</b>: {{ summary.total }}";

/// Values exposed to the alert template.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext<'a> {
    pub marker: &'static str,
    pub status: u16,
    pub uri: &'a str,
    pub remote_addr: &'a str,
    pub date: String,
    pub method: &'a str,
    pub protocol: &'a str,
    pub user_agent: &'a str,
    pub location: Option<&'a str>,
    pub bot: Option<&'a str>,
}

impl<'a> AlertContext<'a> {
    pub fn new(event: &'a Event, severity: Option<Severity>) -> Self {
        let date = match event.timestamp {
            Some(ts) => ts.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            None => event.time_local.clone(),
        };
        Self {
            marker: severity.map_or("", Severity::marker),
            status: event.status,
            uri: &event.parsed.uri,
            remote_addr: &event.remote_addr,
            date,
            method: &event.parsed.method,
            protocol: &event.parsed.protocol,
            user_agent: &event.user_agent,
            location: event.enrichment.location.as_deref(),
            bot: event.enrichment.bot.as_deref(),
        }
    }
}

/// Values exposed to the report template.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReportContext<'a> {
    pub project: &'a str,
    pub window: &'a str,
    pub summary: &'a ReportSummary,
}

/// Renders alert and report messages.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: minijinja::Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            env: Self::build_env(),
        }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("html", html_filter);
        env
    }

    /// Render an arbitrary template string with `ctx`.
    pub fn render<S: serde::Serialize>(
        &self,
        template_str: &str,
        ctx: &S,
    ) -> Result<String, NotifyError> {
        self.env
            .render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Live alert for one event.
    pub fn render_alert(
        &self,
        event: &Event,
        severity: Option<Severity>,
    ) -> Result<String, NotifyError> {
        self.render(ALERT_TEMPLATE, &AlertContext::new(event, severity))
    }

    /// Periodic summary for one project. `window_label` names the flush
    /// moment, see [`format_rfc1123`].
    pub fn render_report(
        &self,
        summary: &ReportSummary,
        project: &str,
        window_label: &str,
    ) -> Result<String, NotifyError> {
        self.render(
            REPORT_TEMPLATE,
            &ReportContext {
                project,
                window: window_label,
                summary,
            },
        )
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn html_filter(value: String) -> String {
    escape_html(&value)
}

/// `Sun, 18 Oct 2026 09:00:00 UTC`
pub fn format_rfc1123<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%a, %d %b %Y %H:%M:%S %Z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use logwarden_core::{Enrichment, Request};

    fn sample_event() -> Event {
        Event {
            project: "shop".into(),
            remote_addr: "203.0.113.9".into(),
            remote_user: None,
            time_local: "18/Oct/2026:09:15:02 +0200".into(),
            timestamp: Some(
                FixedOffset::east_opt(2 * 3600)
                    .unwrap()
                    .with_ymd_and_hms(2026, 10, 18, 9, 15, 2)
                    .unwrap(),
            ),
            request: "GET /search?q=<script>&x=1 HTTP/1.1".into(),
            parsed: Request {
                method: "GET".into(),
                uri: "https://shop.example.com/search?q=<script>&x=1".into(),
                protocol: "HTTP/1.1".into(),
            },
            status: 502,
            body_bytes_sent: 0,
            referer: "-".into(),
            user_agent: "Mozilla/5.0 \"quoted\"".into(),
            enrichment: Enrichment::default(),
        }
    }

    #[test]
    fn renders_alert_layout() {
        let renderer = TemplateRenderer::new();
        let text = renderer
            .render_alert(&sample_event(), Some(Severity::Critical))
            .unwrap();
        let expected = "🟥 <b>502</b>: https://shop.example.com/search?q=&lt;script&gt;&amp;x=1\n\
             \n\
             <b>IP</b>: 203.0.113.9\n\
             <b>DATE</b>: 2026-10-18 09:15:02 +0200\n\
             <b>METHOD</b>: GET / HTTP/1.1\n\
             \n\
             <pre>Mozilla/5.0 &quot;quoted&quot;</pre>";
        assert_eq!(text, expected);
    }

    #[test]
    fn alert_includes_enrichment_when_present() {
        let renderer = TemplateRenderer::new();
        let event = sample_event().with_enrichment(Enrichment {
            location: Some("Berlin".into()),
            bot: Some("Googlebot".into()),
        });
        let text = renderer.render_alert(&event, Some(Severity::Critical)).unwrap();
        assert!(text.contains("<b>LOCATION</b>: Berlin\n"));
        assert!(text.contains("<b>BOT</b>: Googlebot\n"));
    }

    #[test]
    fn alert_without_severity_has_no_marker() {
        let renderer = TemplateRenderer::new();
        let mut event = sample_event();
        event.status = 302;
        let text = renderer.render_alert(&event, Severity::of(302)).unwrap();
        assert!(text.starts_with("<b>302</b>"));
    }

    #[test]
    fn alert_falls_back_to_raw_time() {
        let renderer = TemplateRenderer::new();
        let mut event = sample_event();
        event.timestamp = None;
        event.time_local = "sometime".into();
        let text = renderer.render_alert(&event, Some(Severity::Warning)).unwrap();
        assert!(text.starts_with("🟨 "));
        assert!(text.contains("<b>DATE</b>: sometime\n"));
    }

    #[test]
    fn renders_report_counts() {
        let renderer = TemplateRenderer::new();
        let summary = ReportSummary::from_statuses([200, 200, 404, 500]);
        let text = renderer
            .render_report(&summary, "shop", "Sun, 18 Oct 2026 09:00:00 UTC")
            .unwrap();
        let expected = "ℹ️ <b>REPORT shop - Sun, 18 Oct 2026 09:00:00 UTC</b>\n\
             \n\
             <b>5xx</b>:  1\n\
             <b>4xx</b>:  1\n\
             <b>3xx</b>:  0\n\
             <b>2xx</b>:  2\n\
             \n\
             <b>TOTAL</b>: 4";
        assert_eq!(text, expected);
    }

    #[test]
    fn report_escapes_project_name() {
        let renderer = TemplateRenderer::new();
        let text = renderer
            .render_report(&ReportSummary::default(), "a<b>", "now")
            .unwrap();
        assert!(text.contains("REPORT a&lt;b&gt; - now"));
        assert!(text.contains("<b>TOTAL</b>: 0"));
    }

    #[test]
    fn escape_html_leaves_slashes_alone() {
        assert_eq!(escape_html("a/b & <c>"), "a/b &amp; &lt;c&gt;");
    }

    #[test]
    fn rfc1123_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        assert_eq!(format_rfc1123(&at), "Sun, 18 Oct 2026 09:00:00 UTC");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("{{ unclosed", &serde_json::json!({}));
        assert!(matches!(result, Err(NotifyError::Template(_))));
    }
}
