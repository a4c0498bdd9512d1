use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Env var consulted when the config file carries no bot token.
pub const TOKEN_ENV: &str = "LOGWARDEN_TELEGRAM_TOKEN";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Resolve a `${VAR}` reference against the environment; other values pass through.
pub fn resolve_env_ref(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if !trimmed.starts_with("${") {
        return Ok(trimmed.to_string());
    }
    let var_name = trimmed
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| {
            ConfigError::Validation(format!("Malformed env var reference: {trimmed}"))
        })?;
    env_opt(var_name).ok_or_else(|| ConfigError::MissingEnv(var_name.to_string()))
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project name → per-project settings.
    pub projects: BTreeMap<String, ProjectConfig>,
    /// Telegram bot token, literal or `${VAR}`.
    #[serde(default, alias = "tgtoken")]
    pub telegram_token: String,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

impl Config {
    /// Read, parse and validate a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate YAML text. The bot token is resolved from the
    /// environment when it is a `${VAR}` reference or missing.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.telegram_token = if config.telegram_token.trim().is_empty() {
            env_opt(TOKEN_ENV).ok_or_else(|| ConfigError::MissingEnv(TOKEN_ENV.to_string()))?
        } else {
            resolve_env_ref(&config.telegram_token)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Structural validation. Format templates and cron expressions are
    /// compiled (and rejected) by their owning crates right after this.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.projects.is_empty() {
            return Err(ConfigError::Validation(
                "at least one project must be configured".to_string(),
            ));
        }
        if self.telegram_token.is_empty() {
            return Err(ConfigError::Validation(
                "Telegram bot token must not be empty".to_string(),
            ));
        }
        for (name, project) in &self.projects {
            project.validate(name)?;
        }
        if !(100..=599).contains(&self.alerts.min_status) {
            return Err(ConfigError::Validation(format!(
                "alerts.min_status must be a HTTP status code, got {}",
                self.alerts.min_status
            )));
        }
        Ok(())
    }

    /// Chat id → names of the projects reporting into that chat.
    pub fn projects_by_chat(&self) -> HashMap<i64, Vec<String>> {
        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        for (name, project) in &self.projects {
            map.entry(project.chat_id).or_default().push(name.clone());
        }
        map
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded ({} projects):", self.projects.len());
        for (name, project) in &self.projects {
            tracing::info!(
                "  {name}: log={}, host={}, schedule='{}', chat={}",
                project.log.display(),
                project.host,
                project.report_schedule,
                project.chat_id
            );
        }
        tracing::info!("  alerts:      min_status={}", self.alerts.min_status);
        tracing::info!(
            "  enrichment:  bots={}, geo_networks={}",
            self.enrichment.bots,
            self.enrichment.geo.len()
        );
    }
}

// ── Project ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Access log to follow.
    pub log: PathBuf,
    /// Public host used to qualify relative request URIs.
    #[serde(default)]
    pub host: String,
    /// Log-format template with `$name` placeholders.
    pub format: String,
    /// 5- or 6-field cron expression (UTC) for the daily report.
    #[serde(alias = "reportschedule")]
    pub report_schedule: String,
    /// Destination chat for alerts, reports and exports.
    #[serde(alias = "tgchat")]
    pub chat_id: i64,
    /// Informational only (e.g. `nginx`).
    #[serde(default)]
    pub webserver: Option<String>,
}

impl ProjectConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation("project name must not be empty".to_string()));
        }
        if self.log.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("project '{name}': log path is empty")));
        }
        if self.format.trim().is_empty() {
            return Err(ConfigError::Validation(format!("project '{name}': format is empty")));
        }
        if self.report_schedule.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "project '{name}': report_schedule is empty"
            )));
        }
        if self.chat_id == 0 {
            return Err(ConfigError::Validation(format!("project '{name}': chat_id is missing")));
        }
        Ok(())
    }
}

// ── Alerts ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Lowest status code that triggers a live alert.
    #[serde(default = "default_min_status")]
    pub min_status: u16,
}

fn default_min_status() -> u16 {
    500
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            min_status: default_min_status(),
        }
    }
}

// ── Enrichment ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Classify crawler/bot user agents.
    #[serde(default)]
    pub bots: bool,
    /// Static network → location table.
    #[serde(default)]
    pub geo: Vec<GeoNetwork>,
    /// Per-lookup time budget.
    #[serde(default = "default_enrichment_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_enrichment_timeout_ms() -> u64 {
    200
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            bots: false,
            geo: Vec::new(),
            timeout_ms: default_enrichment_timeout_ms(),
        }
    }
}

impl EnrichmentSettings {
    pub fn is_enabled(&self) -> bool {
        self.bots || !self.geo.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoNetwork {
    /// CIDR block, e.g. `10.0.0.0/8`.
    pub cidr: String,
    pub location: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
telegram_token: "123:ABC"
projects:
  shop:
    log: /var/log/nginx/shop.access.log
    host: https://shop.example.com
    format: '$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent'
    report_schedule: "0 9 * * *"
    chat_id: -100123
  blog:
    log: /var/log/nginx/blog.access.log
    format: '[$time_local] $remote_addr "$request" $status $body_bytes_sent'
    reportschedule: "0 21 * * *"
    tgchat: -100123
"#;

    #[test]
    fn parses_projects_and_aliases() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.projects.len(), 2);
        let blog = &config.projects["blog"];
        assert_eq!(blog.report_schedule, "0 21 * * *");
        assert_eq!(blog.chat_id, -100123);
        assert_eq!(blog.host, "");
        assert_eq!(config.alerts.min_status, 500);
        assert!(!config.enrichment.is_enabled());
    }

    #[test]
    fn groups_projects_by_chat() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let by_chat = config.projects_by_chat();
        assert_eq!(by_chat.len(), 1);
        assert_eq!(by_chat[&-100123], vec!["blog".to_string(), "shop".to_string()]);
    }

    #[test]
    fn rejects_empty_project_list() {
        let err = Config::from_yaml("telegram_token: x\nprojects: {}\n").unwrap_err();
        assert!(err.to_string().contains("at least one project"));
    }

    #[test]
    fn rejects_missing_chat_id() {
        let yaml = r#"
telegram_token: x
projects:
  shop:
    log: /tmp/a.log
    format: '$status'
    report_schedule: "0 9 * * *"
    chat_id: 0
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("chat_id")));
    }

    #[test]
    fn rejects_out_of_range_alert_threshold() {
        let yaml = format!("{SAMPLE}alerts:\n  min_status: 42\n");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn resolves_token_from_env_reference() {
        std::env::set_var("LOGWARDEN_TEST_TOKEN_REF", "999:XYZ");
        let yaml = SAMPLE.replace("\"123:ABC\"", "\"${LOGWARDEN_TEST_TOKEN_REF}\"");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.telegram_token, "999:XYZ");
        std::env::remove_var("LOGWARDEN_TEST_TOKEN_REF");
    }

    #[test]
    fn missing_env_reference_is_an_error() {
        let err = resolve_env_ref("${LOGWARDEN_DEFINITELY_UNSET_XYZ}").unwrap_err();
        assert!(err.to_string().contains("LOGWARDEN_DEFINITELY_UNSET_XYZ"));
    }

    #[test]
    fn malformed_env_reference_is_an_error() {
        assert!(matches!(
            resolve_env_ref("${UNCLOSED"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn reads_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logwarden.yml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert!(config.projects.contains_key("shop"));
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = Config::from_file("/definitely/not/here.yml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yml"));
    }

    #[test]
    fn parses_enrichment_section() {
        let yaml = format!(
            "{SAMPLE}enrichment:\n  bots: true\n  geo:\n    - cidr: 10.0.0.0/8\n      location: office\n"
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert!(config.enrichment.bots);
        assert_eq!(config.enrichment.geo[0].location, "office");
        assert_eq!(config.enrichment.timeout_ms, 200);
    }
}
