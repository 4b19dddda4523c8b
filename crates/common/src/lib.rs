//! ragstream Common Library
//!
//! Shared code for the ragstream services including:
//! - The streaming query pipeline (connection handler and query session)
//! - Vector index backends and the embedding client abstraction
//! - Streaming generation client
//! - Context assembly and prompt templating
//! - Corpus loading and the passage repository
//! - Error types, configuration, logging and metrics

pub mod config;
pub mod context;
pub mod corpus;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod generation;
pub mod metrics;
pub mod pipeline;
pub mod retrieval;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result, TransportClosed};
pub use generation::Generator;
pub use pipeline::{ConnectionHandler, QueryOutcome, QuerySession};
pub use retrieval::{RetrievedPassage, VectorIndex};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
