use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("precondition violated: {message}")]
    PreconditionViolation { message: String },
    #[error("cache entry {key} is corrupt: {message}")]
    CacheCorruption { key: String, message: String },
    #[error("numeric degeneracy: {message}")]
    NumericDegeneracy { message: String },
    #[error("dataset scan cancelled after {processed} examples")]
    Cancelled { processed: usize },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl EvaluationError {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            message: message.into(),
        }
    }

    pub(crate) fn cache_corruption(key: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::CacheCorruption {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn degenerate(message: impl Into<String>) -> Self {
        Self::NumericDegeneracy {
            message: message.into(),
        }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::PreconditionViolation { .. })
    }
}
