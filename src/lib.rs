//! # docchat - Document-Grounded Retrieval and Chat
//!
//! A retrieval-augmented chat service over uploaded PDF documents. Users
//! upload a PDF, the service indexes it, and conversation sessions answer
//! questions grounded strictly in that document's content, with page-level
//! citations for every claim.
//!
//! ## Overview
//!
//! Ingestion extracts per-page text, splits it into overlapping passages,
//! embeds each passage locally, and builds an exact cosine-similarity
//! index per document. Questions are answered by retrieving the most
//! relevant passages above a similarity threshold and generating a cited
//! answer from them; questions the document cannot answer get a fixed
//! fallback with zero citations rather than an invented reply.
//!
//! ## Key Features
//!
//! - **Local Embeddings**: FastEmbed (all-MiniLM-L6-v2), no external service
//! - **Grounded Answers**: every claim cites the passage and page it came from
//! - **Streaming**: answers arrive as NDJSON fragments with cooperative cancellation
//! - **Follow-up Aware**: pronoun-bearing questions are rewritten with prior context
//! - **Crash-safe Persistence**: documents, indexes, and histories survive restarts
//!
//! ## Architecture
//!
//! ```text
//! upload в”Җв”Җв–ә extract в”Җв”Җв–ә chunk в”Җв”Җв–ә embed в”Җв”Җв–ә index      (ingestion)
//!
//! question в”Җв”Җв–ә rewrite в”Җв”Җв–ә retrieve в”Җв”Җв–ә generate в”Җв”Җв–ә stream  (session)
//! ```
//!
//! ## Modules
//!
//! - [`extract`]: PDF to per-page plain text
//! - [`chunk`]: sentence-aware passage splitting with overlap
//! - [`embedding`]: embedding provider trait and FastEmbed implementation
//! - [`index`]: per-document exact cosine-similarity vector index
//! - [`retrieval`]: question rewriting, threshold retrieval, citation carry-over
//! - [`generation`]: answer generators (extractive, optional OpenAI-compatible)
//! - [`session`]: conversation state machine, streaming, cancellation
//! - [`ingest`]: background ingestion pipeline with retry
//! - [`store`]: document and session persistence
//! - [`server`]: HTTP API surface
//! - [`config`]: configuration with environment variable support
//! - [`types`]: core domain and wire types
//! - [`error`]: error types and utilities
//! - [`paths`]: platform data and config directories
//!
//! ## Usage Example
//!
//! ```no_run
//! use docchat::config::Config;
//! use docchat::embedding::FastEmbedder;
//! use docchat::generation::ExtractiveGenerator;
//! use docchat::ingest::IngestPipeline;
//! use docchat::retrieval::RetrievalPlanner;
//! use docchat::server::{AppState, InMemoryFileRegistry, serve};
//! use docchat::session::SessionRegistry;
//! use docchat::store::DocumentStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::new()?;
//!     let store = Arc::new(DocumentStore::open(config.storage.data_dir.clone())?);
//!     let embedder = Arc::new(FastEmbedder::from_model_name(&config.embedding.model_name)?);
//!     let planner = Arc::new(RetrievalPlanner::new(embedder.clone(), config.retrieval.clone()));
//!     let generator = Arc::new(ExtractiveGenerator::new());
//!     let state = AppState {
//!         store: store.clone(),
//!         pipeline: Arc::new(IngestPipeline::new(
//!             embedder,
//!             store.clone(),
//!             config.chunking.clone(),
//!             config.embedding.clone(),
//!         )),
//!         sessions: Arc::new(SessionRegistry::new(store, planner, generator)),
//!         files: Arc::new(InMemoryFileRegistry::new()),
//!     };
//!     serve(state, &config.server.bind_addr).await?;
//!     Ok(())
//! }
//! ```

/// Sentence-aware passage chunking with overlap
pub mod chunk;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding generation using FastEmbed (all-MiniLM-L6-v2)
pub mod embedding;

/// Error types and utilities
pub mod error;

/// PDF text extraction, one text block per page
pub mod extract;

/// Grounded answer generation with streaming
pub mod generation;

/// Per-document exact cosine-similarity vector index
pub mod index;

/// Background document ingestion pipeline
pub mod ingest;

/// Platform data and config directory resolution
pub mod paths;

/// Question rewriting and threshold-based passage retrieval
pub mod retrieval;

/// HTTP API surface
pub mod server;

/// Conversation session state machine and answer streaming
pub mod session;

/// Document and session persistence
pub mod store;

/// Core domain and wire types
pub mod types;
