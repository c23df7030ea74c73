use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the DocuChat server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible API serving embeddings and completions.
    pub llm_base_url: String,
    /// Bearer credential required by the embedding and generation capabilities.
    pub llm_api_key: String,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Chat model used to generate answers.
    pub generation_model: String,
    /// Target token budget per chunk during ingestion.
    pub chunk_size: usize,
    /// Token overlap carried between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Seconds a cached answer stays valid.
    pub query_cache_ttl_secs: u64,
    /// Directory where uploaded documents are stored.
    pub upload_dir: String,
    /// Directory where per-session vector indexes are persisted.
    pub index_dir: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o";
const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_RETRIEVAL_TOP_K: usize = 4;
const DEFAULT_QUERY_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_UPLOAD_DIR: &str = "data/uploads";
const DEFAULT_INDEX_DIR: &str = "data/indexes";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            llm_base_url: load_env_optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_api_key: load_env("LLM_API_KEY")?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            chunk_size: parse_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            retrieval_top_k: parse_or("RETRIEVAL_TOP_K", DEFAULT_RETRIEVAL_TOP_K)?,
            query_cache_ttl_secs: parse_or("QUERY_CACHE_TTL_SECS", DEFAULT_QUERY_CACHE_TTL_SECS)?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            index_dir: load_env_optional("INDEX_DIR")
                .unwrap_or_else(|| DEFAULT_INDEX_DIR.to_string()),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        llm_base_url = %config.llm_base_url,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        chunk_size = config.chunk_size,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
