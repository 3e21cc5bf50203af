use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemanticError>;

#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Source for collection '{collection}' unavailable at {}: {source}", path.display())]
    SourceUnavailable {
        collection: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed source for collection '{collection}': {message}")]
    MalformedSource { collection: String, message: String },

    #[error("Embedding error: {0}")]
    EmbeddingFailure(String),

    #[error("Dimension mismatch: index has {expected} dimensions, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot index zero-length vectors")]
    ZeroDimension,

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Sync unavailable: {0}")]
    SyncUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod collection;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod mcp;
pub mod registry;
pub mod search;
pub mod sync;
