//! Best-effort enrichment applied to parsed events before routing.
//!
//! Enrichers never reject an event: a lookup that fails or overruns its
//! budget simply leaves its field empty.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::IpNet;
use logwarden_core::config::EnrichmentSettings;
use logwarden_core::{Enrichment, Event};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("invalid network '{cidr}': {source}")]
    InvalidNetwork {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("remote address is not an IP: {0:?}")]
    InvalidAddress(String),

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// Which [`Enrichment`] field an enricher fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentField {
    Location,
    Bot,
}

/// A single enrichment source.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Value for this enricher's field, or `None` when nothing applies.
    async fn lookup(&self, event: &Event) -> Result<Option<String>, EnrichError>;

    fn field(&self) -> EnrichmentField;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

// ── Bot classifier ────────────────────────────────────────────

const BOT_MARKERS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "slurp",
    "curl",
    "wget",
    "python-requests",
    "httpclient",
    "headless",
];

/// Flags crawler and scripted user agents by product token.
#[derive(Debug, Clone)]
pub struct BotClassifier {
    markers: Vec<String>,
}

impl Default for BotClassifier {
    fn default() -> Self {
        Self {
            markers: BOT_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl BotClassifier {
    /// Product name of the first user-agent token carrying a bot marker,
    /// e.g. `Googlebot` for `Mozilla/5.0 (compatible; Googlebot/2.1; ...)`.
    pub fn classify(&self, user_agent: &str) -> Option<String> {
        user_agent
            .split(|c: char| c.is_whitespace() || matches!(c, ';' | '(' | ')' | ','))
            .filter(|token| !token.is_empty() && !token.starts_with('+'))
            .find(|token| {
                let lower = token.to_ascii_lowercase();
                self.markers.iter().any(|m| lower.contains(m.as_str()))
            })
            .map(|token| token.split('/').next().unwrap_or(token).to_string())
    }
}

#[async_trait]
impl Enricher for BotClassifier {
    async fn lookup(&self, event: &Event) -> Result<Option<String>, EnrichError> {
        Ok(self.classify(&event.user_agent))
    }

    fn field(&self) -> EnrichmentField {
        EnrichmentField::Bot
    }

    fn name(&self) -> &str {
        "bots"
    }
}

// ── Geo table ─────────────────────────────────────────────────

/// Static network → location table, longest prefix wins.
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    networks: Vec<(IpNet, String)>,
}

impl GeoTable {
    pub fn new(entries: impl IntoIterator<Item = (IpNet, String)>) -> Self {
        let mut networks: Vec<(IpNet, String)> = entries.into_iter().collect();
        networks.sort_by(|a, b| b.0.prefix_len().cmp(&a.0.prefix_len()));
        Self { networks }
    }

    pub fn from_settings(settings: &EnrichmentSettings) -> Result<Self, EnrichError> {
        let entries = settings
            .geo
            .iter()
            .map(|g| {
                IpNet::from_str(g.cidr.trim())
                    .map(|net| (net, g.location.clone()))
                    .map_err(|source| EnrichError::InvalidNetwork {
                        cidr: g.cidr.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn locate(&self, addr: IpAddr) -> Option<&str> {
        self.networks
            .iter()
            .find(|(net, _)| net.contains(&addr))
            .map(|(_, location)| location.as_str())
    }
}

#[async_trait]
impl Enricher for GeoTable {
    async fn lookup(&self, event: &Event) -> Result<Option<String>, EnrichError> {
        let addr = IpAddr::from_str(event.remote_addr.trim())
            .map_err(|_| EnrichError::InvalidAddress(event.remote_addr.clone()))?;
        Ok(self.locate(addr).map(str::to_string))
    }

    fn field(&self) -> EnrichmentField {
        EnrichmentField::Location
    }

    fn name(&self) -> &str {
        "geo"
    }
}

// ── Stage ─────────────────────────────────────────────────────

/// Ordered set of enrichers sharing one per-lookup time budget.
pub struct EnrichmentStage {
    enrichers: Vec<Box<dyn Enricher>>,
    budget: Duration,
}

impl EnrichmentStage {
    pub fn new(budget: Duration) -> Self {
        Self {
            enrichers: Vec::new(),
            budget,
        }
    }

    /// A stage that passes events through untouched.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with(mut self, enricher: impl Enricher + 'static) -> Self {
        self.enrichers.push(Box::new(enricher));
        self
    }

    /// Build the stage described by the `enrichment` config section.
    pub fn from_settings(settings: &EnrichmentSettings) -> Result<Self, EnrichError> {
        let mut stage = Self::new(Duration::from_millis(settings.timeout_ms));
        if settings.bots {
            stage = stage.with(BotClassifier::default());
        }
        let geo = GeoTable::from_settings(settings)?;
        if !geo.is_empty() {
            stage = stage.with(geo);
        }
        Ok(stage)
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    /// Run every enricher against `event`. Always returns the event.
    pub async fn apply(&self, event: Event) -> Event {
        if self.enrichers.is_empty() {
            return event;
        }

        let mut enrichment = Enrichment::default();
        for enricher in &self.enrichers {
            let value = match tokio::time::timeout(self.budget, enricher.lookup(&event)).await {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    debug!(enricher = enricher.name(), error = %e, "enrichment lookup failed");
                    None
                }
                Err(_) => {
                    debug!(
                        enricher = enricher.name(),
                        budget_ms = self.budget.as_millis() as u64,
                        "enrichment lookup timed out"
                    );
                    None
                }
            };
            let Some(value) = value else { continue };
            match enricher.field() {
                EnrichmentField::Location => enrichment.location.get_or_insert(value),
                EnrichmentField::Bot => enrichment.bot.get_or_insert(value),
            };
        }
        event.with_enrichment(enrichment)
    }
}

impl std::fmt::Debug for EnrichmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.enrichers.iter().map(|e| e.name()).collect();
        f.debug_struct("EnrichmentStage")
            .field("enrichers", &names)
            .field("budget", &self.budget)
            .finish()
    }
}
