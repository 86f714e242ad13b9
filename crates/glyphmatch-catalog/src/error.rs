//! Error types for the catalogue layer.

/// Errors that can occur while loading a theme catalogue.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalogue file could not be read.
    #[error("failed to read catalogue file: {0}")]
    Read(#[source] std::io::Error),

    /// The catalogue file is not valid JSON or has the wrong shape.
    #[error("failed to parse catalogue: {0}")]
    Parse(#[source] serde_json::Error),

    /// A template is structurally unusable (zero capacity, blank id).
    #[error("invalid template {id:?}: {reason}")]
    InvalidTemplate { id: String, reason: String },
}
