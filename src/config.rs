use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::core::matcher::MatchOptions;
use crate::core::profiles::LookupTtl;
use crate::core::similarity::SimilarityMetric;

const ENV_PREFIX: &str = "MATCHBREW";
const AGENT_TOKEN_PREFIX: &str = "TELEGRAM_BOT_TOKEN_";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_empty_ttl")]
    pub empty_ttl_secs: u64,
    pub l1_cache_size: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: default_redis_url(),
            ttl_secs: default_cache_ttl(),
            empty_ttl_secs: default_empty_ttl(),
            l1_cache_size: None,
        }
    }
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_cache_ttl() -> u64 { 3600 }
fn default_empty_ttl() -> u64 { 300 }

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_endpoint() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_llm_timeout() -> u64 { 60 }

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    pub bot_token: Option<String>,
    /// Keyed by agent name; keys are normalised before lookup
    #[serde(default)]
    pub agent_tokens: HashMap<String, String>,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api(),
            bot_token: None,
            agent_tokens: HashMap::new(),
        }
    }
}

fn default_telegram_api() -> String { "https://api.telegram.org".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default)]
    pub metric: SimilarityMetric,
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,
    #[serde(default = "default_index_settle")]
    pub index_settle_ms: u64,
    #[serde(default = "default_index_poll")]
    pub index_poll_ms: u64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            num_candidates: default_num_candidates(),
            search_limit: default_search_limit(),
            metric: SimilarityMetric::default(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            index_settle_ms: default_index_settle(),
            index_poll_ms: default_index_poll(),
        }
    }
}

fn default_daily_limit() -> u32 { 2 }
fn default_num_candidates() -> usize { 100 }
fn default_search_limit() -> usize { 7 }
fn default_collaborator_timeout() -> u64 { 30 }
fn default_index_settle() -> u64 { 5000 }
fn default_index_poll() -> u64 { 250 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with MATCHBREW__)
    /// 5. Well-known variables (DATABASE_URL, OPENAI_API_KEY, ...)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., MATCHBREW__LLM__API_KEY -> llm.api_key
            .add_source(env_source())
            .build()?;

        let settings = substitute_env_vars(settings, std::env::vars())?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        settings.try_deserialize()
    }

    /// Fail fast on settings no pipeline can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.llm.api_key.trim().is_empty() {
            problems.push("llm.api_key is required");
        }
        if self.store.backend == StoreBackend::Postgres && self.database.url.trim().is_empty() {
            problems.push("database.url is required for the postgres backend");
        }
        if self.llm.embedding_dimension == 0 {
            problems.push("llm.embedding_dimension must be positive");
        }
        if self.matching.daily_limit == 0 {
            problems.push("matching.daily_limit must be positive");
        }
        if self.matching.search_limit == 0 || self.matching.num_candidates == 0 {
            problems.push("matching.search_limit and matching.num_candidates must be positive");
        }
        if self.matching.search_limit > self.matching.num_candidates {
            problems.push("matching.search_limit cannot exceed matching.num_candidates");
        }
        if self.matching.index_poll_ms == 0 {
            problems.push("matching.index_poll_ms must be positive");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(problems.join("; ")))
        }
    }

    /// The configured embedding dimension must equal the one the vector
    /// index column was created with
    pub fn check_index_dimension(&self, index_dimension: Option<usize>) -> Result<(), ConfigError> {
        match index_dimension {
            Some(index) if index != self.llm.embedding_dimension => Err(ConfigError::Message(format!(
                "llm.embedding_dimension is {} but the index column holds {}-dimensional vectors",
                self.llm.embedding_dimension, index
            ))),
            _ => Ok(()),
        }
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            daily_limit: self.matching.daily_limit,
            num_candidates: self.matching.num_candidates,
            search_limit: self.matching.search_limit,
            metric: self.matching.metric,
            collaborator_timeout: Duration::from_secs(self.matching.collaborator_timeout_secs),
            index_settle: Duration::from_millis(self.matching.index_settle_ms),
            index_poll: Duration::from_millis(self.matching.index_poll_ms),
        }
    }

    pub fn lookup_ttl(&self) -> LookupTtl {
        LookupTtl {
            present_secs: self.cache.ttl_secs,
            empty_secs: self.cache.empty_ttl_secs,
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Apply well-known environment variables on top of the layered config.
///
/// `DATABASE_URL`, `REDIS_URL`, `OPENAI_API_KEY` and `TELEGRAM_BOT_TOKEN`
/// fill their settings; every `TELEGRAM_BOT_TOKEN_<AGENT>` becomes an
/// agent-specific bot token.
fn substitute_env_vars<I>(settings: Config, vars: I) -> Result<Config, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut builder = Config::builder().add_source(settings);

    for (key, value) in vars {
        if value.is_empty() {
            continue;
        }
        builder = match key.as_str() {
            "DATABASE_URL" => builder.set_override("database.url", value)?,
            "REDIS_URL" => builder.set_override("cache.redis_url", value)?,
            "OPENAI_API_KEY" => builder.set_override("llm.api_key", value)?,
            "TELEGRAM_BOT_TOKEN" => builder.set_override("telegram.bot_token", value)?,
            _ => match key.strip_prefix(AGENT_TOKEN_PREFIX) {
                Some(agent) if !agent.is_empty() => builder.set_override(
                    format!("telegram.agent_tokens.{}", agent.to_lowercase()),
                    value,
                )?,
                _ => builder,
            },
        };
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        let mut settings = Settings::default();
        settings.llm.api_key = "sk-test".to_string();
        settings.store.backend = StoreBackend::Memory;
        settings
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.matching.daily_limit, 2);
        assert_eq!(settings.matching.num_candidates, 100);
        assert_eq!(settings.matching.search_limit, 7);
        assert_eq!(settings.cache.ttl_secs, 3600);
        assert_eq!(settings.cache.empty_ttl_secs, 300);
        assert_eq!(settings.logging.format, "json");
    }

    #[test]
    fn test_validate_requires_api_key_and_database() {
        assert!(valid().validate().is_ok());

        let mut no_key = valid();
        no_key.llm.api_key.clear();
        assert!(no_key.validate().is_err());

        let mut postgres = valid();
        postgres.store.backend = StoreBackend::Postgres;
        let err = postgres.validate().unwrap_err().to_string();
        assert!(err.contains("database.url"));

        let mut zero = valid();
        zero.matching.daily_limit = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_index_dimension_must_match_config() {
        let mut settings = valid();
        settings.llm.embedding_dimension = 768;

        let err = settings.check_index_dimension(Some(1536)).unwrap_err().to_string();
        assert!(err.contains("768"));
        assert!(err.contains("1536"));

        assert!(settings.check_index_dimension(Some(768)).is_ok());
        assert!(settings.check_index_dimension(None).is_ok());
    }

    #[test]
    fn test_well_known_env_vars() {
        let vars = vec![
            ("OPENAI_API_KEY".to_string(), "sk-env".to_string()),
            ("TELEGRAM_BOT_TOKEN".to_string(), "default".to_string()),
            ("TELEGRAM_BOT_TOKEN_DATABARISTA".to_string(), "agent".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];

        let settings: Settings = substitute_env_vars(Config::default(), vars)
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.llm.api_key, "sk-env");
        assert_eq!(settings.telegram.bot_token.as_deref(), Some("default"));
        assert_eq!(
            settings.telegram.agent_tokens.get("databarista").map(String::as_str),
            Some("agent")
        );
    }

    #[test]
    fn test_match_options_mapping() {
        let mut settings = valid();
        settings.matching.index_settle_ms = 1500;

        let options = settings.match_options();
        assert_eq!(options.daily_limit, 2);
        assert_eq!(options.index_settle, Duration::from_millis(1500));
    }
}
