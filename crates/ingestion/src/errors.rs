//! Ingestion error types

use ragstream_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Corpus source not found: {0}")]
    SourceNotFound(String),

    #[error("Corpus error: {0}")]
    CorpusError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::EmbeddingError { message } => IngestionError::EmbeddingError(message),
            AppError::Configuration { message } => IngestionError::ConfigError(message),
            AppError::Serialization(e) => IngestionError::CorpusError(e.to_string()),
            other => IngestionError::DatabaseError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_mapping() {
        let e: IngestionError = AppError::EmbeddingError { message: "429".into() }.into();
        assert!(matches!(e, IngestionError::EmbeddingError(ref m) if m == "429"));

        let e: IngestionError = AppError::Configuration { message: "bad".into() }.into();
        assert!(matches!(e, IngestionError::ConfigError(_)));

        let e: IngestionError = AppError::DatabaseConnection { message: "refused".into() }.into();
        assert!(matches!(e, IngestionError::DatabaseError(_)));
    }
}
