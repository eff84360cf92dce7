use crate::llm::LlmSettings;
use crate::security::{
    DEFAULT_LIMITER_SWEEP_INTERVAL, ForwardedHeaderMode, ForwardedHeaders, RateLimitConfig,
};
use crate::session::{DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `DOCAI_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "DOCAI";

const CWD_CONFIG: &str = "config.yaml";

/// Upper bound for every lifetime and interval setting (7 days).
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub rate_limit: RateLimitSettings,
    pub security: SecurityConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionsConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_upload_bytes: usize,
    /// Uploads whose extracted text is shorter than this are rejected.
    pub min_document_chars: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            max_upload_bytes: crate::document::DEFAULT_MAX_BYTES,
            min_document_chars: 10,
        }
    }
}

impl SessionsConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub capacity: f64,
    pub refill_interval_ms: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let limiter = RateLimitConfig::default();
        Self {
            enabled: true,
            capacity: limiter.capacity,
            refill_interval_ms: limiter.refill_interval.as_millis() as u64,
            sweep_interval_secs: DEFAULT_LIMITER_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl RateLimitSettings {
    #[must_use]
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            capacity: self.capacity,
            refill_interval: Duration::from_millis(self.refill_interval_ms),
        }
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub forwarded_headers: ForwardedHeaderMode,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            forwarded_headers: ForwardedHeaderMode::Trusted,
            trusted_proxies: vec![
                IpAddr::from([127, 0, 0, 1]),
                IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1]),
            ],
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn forwarded_headers(&self) -> ForwardedHeaders {
        ForwardedHeaders::from_mode(self.forwarded_headers, &self.trusted_proxies)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layering, lowest first: defaults, YAML file, `DOCAI_` environment,
    /// CLI flags (which also read their own plain env vars).
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(CWD_CONFIG).exists() {
            builder = builder.add_source(File::with_name(CWD_CONFIG).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("security.trusted_proxies")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("rate_limit.enabled", rl)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: &str| Err(config::ConfigError::Message(msg.to_string()));
        let in_range = |secs: u64| (1..=MAX_DURATION_SECS).contains(&secs);
        if !in_range(self.sessions.ttl_secs) {
            return invalid("sessions.ttl_secs must be between 1 and 604800");
        }
        if !in_range(self.sessions.sweep_interval_secs)
            || !in_range(self.rate_limit.sweep_interval_secs)
        {
            return invalid("sweep intervals must be between 1 and 604800 seconds");
        }
        // Also rejects NaN.
        if !(self.rate_limit.capacity >= 1.0) || self.rate_limit.capacity.is_infinite() {
            return invalid("rate_limit.capacity must be a finite number of at least 1");
        }
        if self.rate_limit.refill_interval_ms == 0
            || self.rate_limit.refill_interval_ms / 1000 > MAX_DURATION_SECS
        {
            return invalid("rate_limit.refill_interval_ms must be between 1 and 604800000");
        }
        Ok(())
    }
}

pub fn load_llm_settings() -> Result<LlmSettings, String> {
    load_llm_settings_from(|key| std::env::var(key).ok())
}

/// Build [`LlmSettings`] from a variable lookup.
pub fn load_llm_settings_from(
    var: impl Fn(&str) -> Option<String>,
) -> Result<LlmSettings, String> {
    let non_empty = |key: &str| var(key).filter(|s| !s.trim().is_empty());

    let api_key = non_empty("LLM_API_KEY")
        .or_else(|| non_empty("VENICE_API_KEY"))
        .ok_or_else(|| "Missing required env var: LLM_API_KEY".to_string())?;

    let mut settings = LlmSettings::new(api_key);
    if let Some(base_url) = non_empty("LLM_BASE_URL") {
        settings.base_url = base_url;
    }
    if let Some(model) = non_empty("LLM_MODEL") {
        settings.model = model;
    }
    if let Some(raw) = non_empty("LLM_TEMPERATURE") {
        settings.temperature = raw
            .parse()
            .map_err(|_| format!("LLM_TEMPERATURE is not a number: {raw}"))?;
    }
    if let Some(raw) = non_empty("LLM_MAX_TOKENS") {
        settings.max_tokens = raw
            .parse()
            .map_err(|_| format!("LLM_MAX_TOKENS is not a positive integer: {raw}"))?;
    }
    if let Some(raw) = non_empty("LLM_TIMEOUT_SECS") {
        let secs: u64 = raw
            .parse()
            .map_err(|_| format!("LLM_TIMEOUT_SECS is not a positive integer: {raw}"))?;
        settings.request_timeout = Duration::from_secs(secs);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_baseline() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.sessions.ttl(), Duration::from_secs(1800));
        assert_eq!(cfg.sessions.sweep_interval(), Duration::from_secs(300));
        assert_eq!(cfg.sessions.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.rate_limit.sweep_interval(), Duration::from_secs(600));

        let limiter = cfg.rate_limit.limiter_config();
        assert!((limiter.capacity - 10.0).abs() < f64::EPSILON);
        assert_eq!(limiter.refill_interval, Duration::from_secs(6));

        assert_eq!(cfg.security.forwarded_headers(), ForwardedHeaders::default());

        assert_eq!(cfg.sessions.ttl(), DEFAULT_SESSION_TTL);
        assert_eq!(cfg.sessions.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(cfg.rate_limit.sweep_interval(), DEFAULT_LIMITER_SWEEP_INTERVAL);
        assert_eq!(limiter.refill_interval, RateLimitConfig::default().refill_interval);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_nan_and_infinite_capacity() {
        let mut cfg = AppConfig::default();
        cfg.rate_limit.capacity = f64::NAN;
        assert!(cfg.validate().is_err());

        cfg.rate_limit.capacity = f64::INFINITY;
        assert!(cfg.validate().is_err());

        cfg.rate_limit.capacity = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        let mut cfg = AppConfig::default();
        cfg.sessions.ttl_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.sessions.sweep_interval_secs = MAX_DURATION_SECS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.rate_limit.sweep_interval_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.rate_limit.refill_interval_ms = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.sessions.ttl_secs = MAX_DURATION_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_llm_settings_require_key() {
        assert!(load_llm_settings_from(lookup(&[])).is_err());
        assert!(load_llm_settings_from(lookup(&[("LLM_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn test_llm_settings_defaults_and_overrides() {
        let s = load_llm_settings_from(lookup(&[("LLM_API_KEY", "k")])).unwrap();
        assert_eq!(s.base_url, llm::DEFAULT_BASE_URL);
        assert_eq!(s.model, llm::DEFAULT_MODEL);
        assert_eq!(s.max_tokens, 2048);

        let s = load_llm_settings_from(lookup(&[
            ("VENICE_API_KEY", "k"),
            ("LLM_MODEL", "other-model"),
            ("LLM_MAX_TOKENS", "512"),
        ]))
        .unwrap();
        assert_eq!(s.api_key, "k");
        assert_eq!(s.model, "other-model");
        assert_eq!(s.max_tokens, 512);

        assert!(
            load_llm_settings_from(lookup(&[("LLM_API_KEY", "k"), ("LLM_TEMPERATURE", "hot")]))
                .is_err()
        );
    }
}
