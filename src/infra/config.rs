//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::code::{parse_code, InputSource};
use crate::domain::guest::GuestRecord;
use anyhow::{bail, Context};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Event identifier, used as the metrics `site` label
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "drinks".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// API port (0 lets the OS pick one)
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_server_port() }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    5001
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_email")]
    pub email: String,
    #[serde(default = "default_auth_password")]
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { email: default_auth_email(), password: default_auth_password() }
    }
}

fn default_auth_email() -> String {
    "atendente@teste.com".to_string()
}

fn default_auth_password() -> String {
    "123456".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LedgerConfig {
    /// Artificial latency before each drink commit (ms)
    #[serde(default)]
    pub commit_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrinkLogConfig {
    /// File path for the drink log (JSONL format), empty to disable
    #[serde(default = "default_drink_log_file")]
    pub file: String,
}

impl Default for DrinkLogConfig {
    fn default() -> Self {
        Self { file: default_drink_log_file() }
    }
}

fn default_drink_log_file() -> String {
    "drinks.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestSeed {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub allowance: u32,
    #[serde(default)]
    pub consumed: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub drink_log: DrinkLogConfig,
    /// Seed guests; when absent the built-in test set is used
    #[serde(default)]
    pub guests: Option<Vec<GuestSeed>>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    bind_address: String,
    port: u16,
    auth_email: String,
    auth_password: String,
    commit_delay_ms: u64,
    metrics_interval_secs: u64,
    drink_log_file: String,
    guests: Vec<GuestRecord>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            bind_address: default_bind_address(),
            port: default_server_port(),
            auth_email: default_auth_email(),
            auth_password: default_auth_password(),
            commit_delay_ms: 0,
            metrics_interval_secs: default_metrics_interval(),
            drink_log_file: default_drink_log_file(),
            guests: Self::default_guests(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_seeds() -> Vec<GuestSeed> {
        let seed = |code: &str, name: Option<&str>, allowance| GuestSeed {
            code: code.to_string(),
            name: name.map(str::to_string),
            allowance,
            consumed: 0,
        };
        vec![
            seed("ABC123", Some("João Silva"), 3),
            seed("XYZ789", Some("Maria Santos"), 2),
            seed("DEF456", None, 4),
        ]
    }

    fn default_guests() -> Vec<GuestRecord> {
        // The built-in seeds are known to be valid
        Self::build_guests(Self::default_seeds()).unwrap_or_default()
    }

    /// Validate seed entries and turn them into ledger records
    fn build_guests(seeds: Vec<GuestSeed>) -> anyhow::Result<Vec<GuestRecord>> {
        let mut seen = FxHashSet::default();
        let mut guests = Vec::with_capacity(seeds.len());

        for seed in seeds {
            let code = parse_code(&seed.code, InputSource::Scanned)
                .with_context(|| format!("Invalid guest code in seed '{}'", seed.code))?;
            if !seen.insert(code.clone()) {
                bail!("Duplicate guest code {}", code);
            }
            if seed.consumed > seed.allowance {
                bail!(
                    "Guest {} has consumed {} above allowance {}",
                    code,
                    seed.consumed,
                    seed.allowance
                );
            }
            guests.push(
                GuestRecord::new(code, seed.name.as_deref(), seed.allowance)
                    .with_consumed(seed.consumed),
            );
        }

        Ok(guests)
    }

    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", origin))?;

        let guests = match toml_config.guests {
            Some(seeds) => Self::build_guests(seeds)
                .with_context(|| format!("Invalid [[guests]] in {}", origin))?,
            None => Self::default_guests(),
        };

        Ok(Self {
            site_id: toml_config.site.id,
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            auth_email: toml_config.auth.email,
            auth_password: toml_config.auth.password,
            commit_delay_ms: toml_config.ledger.commit_delay_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            drink_log_file: toml_config.drink_log.file,
            guests,
            config_file: origin.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `bind_address:port`
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn auth_email(&self) -> &str {
        &self.auth_email
    }

    pub fn auth_password(&self) -> &str {
        &self.auth_password
    }

    pub fn commit_delay_ms(&self) -> u64 {
        self.commit_delay_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn drink_log_file(&self) -> &str {
        &self.drink_log_file
    }

    pub fn drink_log_enabled(&self) -> bool {
        !self.drink_log_file.is_empty()
    }

    pub fn guests(&self) -> &[GuestRecord] {
        &self.guests
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and the offline desk
    pub fn with_commit_delay_ms(mut self, ms: u64) -> Self {
        self.commit_delay_ms = ms;
        self
    }

    /// Builder method for tests to replace the seed set
    pub fn with_guests(mut self, guests: Vec<GuestRecord>) -> Self {
        self.guests = guests;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "drinks");
        assert_eq!(config.port(), 5001);
        assert_eq!(config.server_addr(), "0.0.0.0:5001");
        assert_eq!(config.auth_email(), "atendente@teste.com");
        assert_eq!(config.commit_delay_ms(), 0);
        assert!(config.drink_log_enabled());
    }

    #[test]
    fn test_default_guests() {
        let config = Config::default();
        let codes: Vec<&str> = config.guests().iter().map(|g| g.code.as_str()).collect();
        assert_eq!(codes, vec!["ABC123", "XYZ789", "DEF456"]);

        let abc = &config.guests()[0];
        assert_eq!(abc.allowance, 3);
        assert_eq!(abc.consumed, 0);
        assert_eq!(abc.name.as_deref(), Some("João Silva"));
        assert!(config.guests()[2].name.is_none());
    }

    #[test]
    fn test_resolve_config_path_from_cli() {
        assert_eq!(Config::resolve_config_path(Some("config/party.toml")), "config/party.toml");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("", "inline").unwrap();
        assert_eq!(config.port(), 5001);
        assert_eq!(config.guests().len(), 3);
        assert_eq!(config.config_file(), "inline");
    }

    #[test]
    fn test_seed_codes_are_normalized() {
        let config = Config::from_toml_str(
            r#"
[[guests]]
code = " abc123 "
allowance = 1
"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.guests()[0].code.as_str(), "ABC123");
    }

    #[test]
    fn test_seed_rejects_legacy_codes() {
        let err = Config::from_toml_str(
            r#"
[[guests]]
code = "usr_a49fd8"
allowance = 3
"#,
            "inline",
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("usr_a49fd8"));
    }

    #[test]
    fn test_seed_rejects_duplicates() {
        let result = Config::from_toml_str(
            r#"
[[guests]]
code = "ABC123"
allowance = 3

[[guests]]
code = "abc123"
allowance = 1
"#,
            "inline",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_seed_rejects_consumed_above_allowance() {
        let result = Config::from_toml_str(
            r#"
[[guests]]
code = "ABC123"
allowance = 1
consumed = 2
"#,
            "inline",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_drink_log_can_be_disabled() {
        let config = Config::from_toml_str("[drink_log]\nfile = \"\"\n", "inline").unwrap();
        assert!(!config.drink_log_enabled());
    }
}
