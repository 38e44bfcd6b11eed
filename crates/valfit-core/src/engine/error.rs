use thiserror::Error;

pub use super::config::ConfigError;
pub use crate::core::io::exclusions::PatternError;
pub use crate::core::models::records::DataError;
use crate::core::forcefield::params::ForceFieldError;
use crate::core::io::collections::CollectionError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Exclusion list error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Dataset error: {0}")]
    Collection(#[from] CollectionError),

    #[error("Force field error: {0}")]
    ForceField(#[from] ForceFieldError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Modified Seminario produced no bond or angle guesses ({failed} records failed)")]
    NoMsmGuesses { failed: usize },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization failed for '{path}': {message}")]
    Serialization { path: String, message: String },

    #[error("Formatting failed: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}
