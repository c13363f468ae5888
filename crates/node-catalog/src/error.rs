//! Error types for the node catalog

use thiserror::Error;

/// Result type alias using CatalogError
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while ingesting or querying a catalog
///
/// Query operations report data-shape problems through their return
/// values; these errors cover ingestion and missing-catalog preconditions.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Manifest document could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Manifest document decoded but has an unsupported shape
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// An operation required a registered catalog
    #[error("No manifest has been registered")]
    NotRegistered,
}
