/// Centralized error types for docchat using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for the document chat system
#[derive(Error, Debug)]
pub enum DocChatError {
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while turning PDF bytes into page text
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("PDF container could not be parsed: {0}")]
    Corrupt(String),

    #[error("PDF is password-protected")]
    Encrypted,

    #[error("Document contains no extractable text")]
    Empty,
}

/// Errors raised by embedding providers
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding model: {0}")]
    InitializationFailed(String),

    #[error("Embedding provider rate limited: {0}")]
    RateLimited(String),

    #[error("Input exceeds the model's length limit ({length} chars)")]
    InputTooLong { length: usize },

    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the vector index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Embedding model mismatch: index built with '{index_model}' ({index_dimension} dims), got '{vector_model}' ({vector_dimension} dims)")]
    ModelMismatch {
        index_model: String,
        index_dimension: usize,
        vector_model: String,
        vector_dimension: usize,
    },
}

/// Errors raised during answer generation
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation interrupted mid-stream: {0}")]
    Interrupted(String),

    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by conversation sessions
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is busy processing a previous question")]
    Busy,

    #[error("Document is no longer available")]
    DocumentUnavailable,

    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Errors raised by the document ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Embedding failed after {attempts} attempts: {source}")]
    EmbeddingExhausted {
        attempts: u32,
        source: EmbeddingError,
    },

    #[error("Index build failed: {0}")]
    Index(#[from] IndexError),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Ingestion was cancelled")]
    Cancelled,

    #[error("Ingestion failed: {0}")]
    Internal(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

// Conversion from anyhow::Error to DocChatError
impl From<anyhow::Error> for DocChatError {
    fn from(err: anyhow::Error) -> Self {
        DocChatError::Other(format!("{:#}", err))
    }
}

impl DocChatError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        DocChatError::Other(msg.into())
    }

    /// Check if this is a user error (bad request, not found) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DocChatError::Session(SessionError::Busy)
                | DocChatError::Session(SessionError::NotFound(_))
                | DocChatError::Extraction(_)
                | DocChatError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DocChatError::Embedding(EmbeddingError::RateLimited(_))
                | DocChatError::Generation(GenerationError::Unavailable(_))
                | DocChatError::Io(_)
        )
    }

    /// Stable error kind string for the wire envelope
    pub fn kind(&self) -> &'static str {
        match self {
            DocChatError::Extraction(_) => "extraction",
            DocChatError::Embedding(_) => "embedding",
            DocChatError::Index(_) => "index",
            DocChatError::Generation(_) => "generation",
            DocChatError::Session(SessionError::Busy) => "busy",
            DocChatError::Session(SessionError::DocumentUnavailable) => "document_unavailable",
            DocChatError::Session(SessionError::NotFound(_)) => "not_found",
            DocChatError::Ingest(_) => "ingest",
            DocChatError::Config(_) => "config",
            DocChatError::Io(_) => "io",
            DocChatError::Other(_) => "internal",
        }
    }
}
