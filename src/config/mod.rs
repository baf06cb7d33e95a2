/// Configuration system for docchat
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, DocChatError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Embedding model configuration
    pub embedding: EmbeddingConfig,

    /// Passage chunking configuration
    pub chunking: ChunkingConfig,

    /// Retrieval planner configuration
    pub retrieval: RetrievalConfig,

    /// Answer generation configuration
    pub generation: GenerationConfig,

    /// Persistence configuration
    pub storage: StorageConfig,

    /// HTTP server configuration
    pub server: ServerConfig,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Batch size for embedding generation during ingestion
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum retry attempts for rate-limited embedding calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries, in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

/// Passage chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum passage length in characters
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    /// Trailing characters repeated at the start of the next passage
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

/// Retrieval planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a passage to count as relevant (0.0 to 1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Number of passages to retrieve per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity for previously cited passages to stay in context
    #[serde(default = "default_carry_score")]
    pub carry_score: f32,
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generation provider: "extractive" or "openai"
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// OpenAI-compatible endpoint base URL (openai provider only)
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Model name for the openai provider
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted documents, indexes, and session history
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

// Default value functions
fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    250
}

fn default_target_size() -> usize {
    1200
}

fn default_overlap() -> usize {
    200
}

fn default_min_score() -> f32 {
    0.36
}

fn default_top_k() -> usize {
    6
}

fn default_carry_score() -> f32 {
    0.30
}

fn default_generation_provider() -> String {
    "extractive".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_data_dir() -> PathBuf {
    crate::paths::PlatformPaths::default_data_dir()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8900".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            overlap: default_overlap(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            top_k: default_top_k(),
            carry_score: default_carry_score(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, DocChatError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, DocChatError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), DocChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), DocChatError> {
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.batch_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.chunking.target_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunking.target_size".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        // Overlap must leave room for the chunker to make forward progress
        if self.chunking.overlap >= self.chunking.target_size {
            return Err(ConfigError::InvalidValue {
                key: "chunking.overlap".to_string(),
                reason: format!(
                    "must be less than target_size ({}), got {}",
                    self.chunking.target_size, self.chunking.overlap
                ),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(ConfigError::InvalidValue {
                key: "retrieval.min_score".to_string(),
                reason: format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.retrieval.min_score
                ),
            }
            .into());
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retrieval.top_k".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.generation.provider != "extractive" && self.generation.provider != "openai" {
            return Err(ConfigError::InvalidValue {
                key: "generation.provider".to_string(),
                reason: format!(
                    "must be 'extractive' or 'openai', got '{}'",
                    self.generation.provider
                ),
            }
            .into());
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("DOCCHAT_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(batch_size) = std::env::var("DOCCHAT_BATCH_SIZE") {
            if let Ok(size) = batch_size.parse() {
                self.embedding.batch_size = size;
            }
        }

        if let Ok(min_score) = std::env::var("DOCCHAT_MIN_SCORE") {
            if let Ok(score) = min_score.parse() {
                self.retrieval.min_score = score;
            }
        }

        if let Ok(top_k) = std::env::var("DOCCHAT_TOP_K") {
            if let Ok(k) = top_k.parse() {
                self.retrieval.top_k = k;
            }
        }

        if let Ok(provider) = std::env::var("DOCCHAT_GENERATION_PROVIDER") {
            self.generation.provider = provider;
        }

        if let Ok(dir) = std::env::var("DOCCHAT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Ok(addr) = std::env::var("DOCCHAT_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, DocChatError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
