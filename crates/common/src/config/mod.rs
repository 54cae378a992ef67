//! Configuration management for Switchyard services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use crate::context::classifier::{DEFAULT_ACCESS_TERMS, DEFAULT_DOMAIN_TERMS, DEFAULT_ROLE_TERMS};
use crate::models::SourceKind;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Knowledge sources, one connector each
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    /// Aggregation layer configuration
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Query classifier term sets
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Specialist lookup table configuration
    #[serde(default)]
    pub lookup: LookupConfig,

    /// Answer composer configuration
    #[serde(default)]
    pub composer: ComposerConfig,

    /// Harvest job configuration
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashed
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension; known OpenAI models fall back to their published
    /// size, the hashed embedder to 384
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for bulk (cold-start) embedding
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Bulk embedding calls allowed per second
    #[serde(default = "default_embedding_rate")]
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Provenance tag, unique across sources
    pub name: String,

    /// How searchable text is derived for this collection
    pub kind: SourceKind,

    /// JSON file backing the collection; in-memory when absent
    pub path: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Results requested from each source
    #[serde(default = "default_per_source_k")]
    pub per_source_k: usize,

    /// Maximum merged results
    #[serde(default = "default_total_cap")]
    pub total_cap: usize,

    /// Per-source search timeout in milliseconds
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Tie-break order for equal scores; unlisted sources follow, alphabetically
    #[serde(default = "default_source_priority")]
    pub source_priority: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Terms whose presence routes straight to the specialist path
    #[serde(default = "default_domain_terms")]
    pub domain_terms: Vec<String>,

    /// Role or position vocabulary for the contextual rule
    #[serde(default = "default_role_terms")]
    pub role_terms: Vec<String>,

    /// Access or permission vocabulary for the contextual rule
    #[serde(default = "default_access_terms")]
    pub access_terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LookupConfig {
    /// JSON file of lookup entities; empty table when absent
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComposerConfig {
    /// Composer provider: openai, extractive
    #[serde(default = "default_composer_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_composer_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_composer_model")]
    pub model: String,

    /// Timeout in seconds
    #[serde(default = "default_composer_timeout")]
    pub timeout_secs: u64,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarvestConfig {
    /// Seconds between runs
    #[serde(default = "default_harvest_interval")]
    pub interval_secs: u64,

    /// JSON feed of candidate facts
    pub feed_url: Option<String>,

    /// Processed-identifier state file
    #[serde(default = "default_harvest_state_path")]
    pub state_path: String,

    /// Source receiving harvested facts
    #[serde(default = "default_harvest_target")]
    pub target_source: String,

    /// Keywords marking a candidate as a probable solution
    #[serde(default = "default_solution_keywords")]
    pub solution_keywords: Vec<String>,

    /// Feed request timeout in seconds
    #[serde(default = "default_harvest_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "hashed".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_embedding_rate() -> u32 { 10 }
fn default_per_source_k() -> usize { 5 }
fn default_total_cap() -> usize { 12 }
fn default_source_timeout_ms() -> u64 { 4000 }
fn default_source_priority() -> Vec<String> {
    ["articles", "wiki", "tickets", "harvested"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "articles".to_string(),
            kind: SourceKind::Articles,
            path: Some("data/articles.json".to_string()),
            enabled: true,
        },
        SourceConfig {
            name: "wiki".to_string(),
            kind: SourceKind::Wiki,
            path: Some("data/wiki.json".to_string()),
            enabled: true,
        },
        SourceConfig {
            name: "harvested".to_string(),
            kind: SourceKind::Tickets,
            path: Some("data/harvested.json".to_string()),
            enabled: true,
        },
    ]
}
fn default_domain_terms() -> Vec<String> { to_strings(DEFAULT_DOMAIN_TERMS) }
fn default_role_terms() -> Vec<String> { to_strings(DEFAULT_ROLE_TERMS) }
fn default_access_terms() -> Vec<String> { to_strings(DEFAULT_ACCESS_TERMS) }
fn default_composer_provider() -> String { "extractive".to_string() }
fn default_composer_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_composer_model() -> String { "gpt-4o-mini".to_string() }
fn default_composer_timeout() -> u64 { 60 }
fn default_max_tokens() -> usize { 800 }
fn default_temperature() -> f32 { 0.2 }
fn default_harvest_interval() -> u64 { 900 }
fn default_harvest_state_path() -> String { "data/harvest_processed.json".to_string() }
fn default_harvest_target() -> String { "harvested".to_string() }
fn default_solution_keywords() -> Vec<String> {
    to_strings(&["solution", "resolved", "fixed", "workaround", "resolution", "steps to"])
}
fn default_harvest_timeout() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

fn to_strings(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get per-source aggregation timeout as Duration
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregation.source_timeout_ms)
    }

    /// Get harvest period as Duration
    pub fn harvest_interval(&self) -> Duration {
        Duration::from_secs(self.harvest.interval_secs.max(1))
    }

    /// Enabled sources in declaration order
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Find a source by provenance tag
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: None,
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            requests_per_second: default_embedding_rate(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            per_source_k: default_per_source_k(),
            total_cap: default_total_cap(),
            source_timeout_ms: default_source_timeout_ms(),
            source_priority: default_source_priority(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            domain_terms: default_domain_terms(),
            role_terms: default_role_terms(),
            access_terms: default_access_terms(),
        }
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            provider: default_composer_provider(),
            endpoint: default_composer_endpoint(),
            api_key: None,
            model: default_composer_model(),
            timeout_secs: default_composer_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_harvest_interval(),
            feed_url: None,
            state_path: default_harvest_state_path(),
            target_source: default_harvest_target(),
            solution_keywords: default_solution_keywords(),
            timeout_secs: default_harvest_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            embedding: EmbeddingConfig::default(),
            sources: default_sources(),
            aggregation: AggregationConfig::default(),
            classifier: ClassifierConfig::default(),
            lookup: LookupConfig::default(),
            composer: ComposerConfig::default(),
            harvest: HarvestConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
