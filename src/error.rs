//! Error types for the encoding engine.

/// Error type for fitting, transforming, and persisting encoding providers.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// The configuration is internally inconsistent, or conflicts with
    /// another training setting (e.g. forced splits on a categorical feature
    /// without raw passthrough).
    #[error("config conflict: {0}")]
    ConfigConflict(String),

    /// A serialized provider or encoder could not be parsed.
    #[error("model format error: {0}")]
    ModelFormat(String),

    /// A label-mean target encoder was used before its prior was set.
    #[error("label-mean target encoder is not ready: prior is not set")]
    UnsetPrior,

    /// Unrecoverable failure during the fit (parser or collective failure).
    /// No partial-fit state is retained.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodingError {
    /// Shorthand for a [`EncodingError::ModelFormat`] with a formatted message.
    pub(crate) fn format(message: impl Into<String>) -> Self {
        EncodingError::ModelFormat(message.into())
    }

    /// Shorthand for a [`EncodingError::ConfigConflict`] with a formatted message.
    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        EncodingError::ConfigConflict(message.into())
    }
}
