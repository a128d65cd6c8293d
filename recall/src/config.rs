use serde::Deserialize;
use std::env;

use crate::models::StrategyKind;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse `RETRIEVAL_STRATEGIES`.
/// Format: comma-separated strategy names, e.g. `vector,lexical,graph`
fn parse_strategies() -> Vec<StrategyKind> {
    match env::var("RETRIEVAL_STRATEGIES") {
        Ok(val) if !val.trim().is_empty() => {
            let mut strategies = Vec::new();
            for name in val.split(',') {
                match name.trim().parse::<StrategyKind>() {
                    Ok(kind) if !strategies.contains(&kind) => strategies.push(kind),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("{} in RETRIEVAL_STRATEGIES, skipping", e);
                    }
                }
            }
            strategies
        }
        _ => StrategyKind::ALL.to_vec(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub retrieval: RetrievalConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
    pub embeddings: Option<EmbeddingsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Reciprocal rank fusion constant.
    pub rrf_k: u32,
    /// Per-strategy candidate headroom: each strategy returns up to `limit * overfetch`.
    pub overfetch: u32,
    pub default_limit: u32,
    pub max_limit: u32,
    pub default_threshold: f32,
    pub strategy_timeout_ms: u64,
    pub query_timeout_ms: u64,
    /// Dimensionality every query vector must match.
    pub dimensions: usize,
    pub enabled_strategies: Vec<StrategyKind>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub max_hops: u32,
    pub max_hops_limit: u32,
    pub decay_factor: f32,
    pub max_paths: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
}

/// OpenAI-compatible embedding endpoint used to embed query text.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: crate::search::DEFAULT_RRF_K,
            overfetch: 2,
            default_limit: 10,
            max_limit: 100,
            default_threshold: 0.5,
            strategy_timeout_ms: 800,
            query_timeout_ms: 2000,
            dimensions: 384,
            enabled_strategies: StrategyKind::ALL.to_vec(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_hops: 2,
            max_hops_limit: 4,
            decay_factor: 0.5,
            max_paths: 2000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl Default for Config {
    fn default() -> Self {
        let retrieval_defaults = RetrievalConfig::default();
        let graph_defaults = GraphConfig::default();
        let cache_defaults = CacheConfig::default();

        Self {
            retrieval: RetrievalConfig {
                rrf_k: parse_env_or("RRF_K", retrieval_defaults.rrf_k),
                overfetch: parse_env_or("RETRIEVAL_OVERFETCH", retrieval_defaults.overfetch)
                    .max(1),
                default_limit: parse_env_or(
                    "RETRIEVAL_DEFAULT_LIMIT",
                    retrieval_defaults.default_limit,
                ),
                max_limit: parse_env_or("RETRIEVAL_MAX_LIMIT", retrieval_defaults.max_limit),
                default_threshold: parse_env_or(
                    "RETRIEVAL_DEFAULT_THRESHOLD",
                    retrieval_defaults.default_threshold,
                ),
                strategy_timeout_ms: parse_env_or(
                    "STRATEGY_TIMEOUT_MS",
                    retrieval_defaults.strategy_timeout_ms,
                ),
                query_timeout_ms: parse_env_or(
                    "QUERY_TIMEOUT_MS",
                    retrieval_defaults.query_timeout_ms,
                ),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", retrieval_defaults.dimensions),
                enabled_strategies: parse_strategies(),
            },
            graph: GraphConfig {
                max_hops: parse_env_or("GRAPH_MAX_HOPS", graph_defaults.max_hops),
                max_hops_limit: parse_env_or("GRAPH_MAX_HOPS_LIMIT", graph_defaults.max_hops_limit),
                decay_factor: parse_env_or("GRAPH_DECAY_FACTOR", graph_defaults.decay_factor),
                max_paths: parse_env_or("GRAPH_MAX_PATHS", graph_defaults.max_paths),
            },
            cache: CacheConfig {
                capacity: parse_env_or("EXTRACTION_CACHE_SIZE", cache_defaults.capacity),
            },
            embeddings: env::var("EMBEDDING_MODEL")
                .ok()
                .map(|model| EmbeddingsConfig {
                    model,
                    base_url: env::var("EMBEDDING_BASE_URL").ok(),
                    api_key: env::var("EMBEDDING_API_KEY").ok(),
                    timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 30),
                    max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
                }),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known embedding providers that use OpenAI-compatible APIs
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("openai", model)
}
