//! Error types for feature resolution.

use thiserror::Error;

/// Errors raised while resolving, storing or querying features.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// No resolver is registered and no value is stored for the feature.
    #[error("Feature `{0}` is not defined")]
    UndefinedFeature(String),

    /// The scope cannot be turned into a stable storage key.
    #[error("Unable to resolve scope key: {0}")]
    UnresolvableScope(String),

    /// A single-value request was made against several scopes.
    #[error("Values can only be retrieved for a single scope, {0} scopes given")]
    MultipleScopes(usize),

    /// A resolver failed. The whole batch is aborted.
    #[error("Resolver for feature `{feature}` failed: {source}")]
    Resolver {
        feature: String,
        #[source]
        source: anyhow::Error,
    },

    /// The requested store is not configured.
    #[error("Feature store `{0}` is not configured")]
    UnknownStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for feature operations
pub type Result<T> = std::result::Result<T, FeatureError>;
