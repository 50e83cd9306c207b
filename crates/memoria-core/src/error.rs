use thiserror::Error;

/// The error kinds named in the propagation policy: library methods never
/// throw for ordinary miss cases (unknown id, empty extraction, similarity
/// below threshold) — they throw only on `InvalidArgument` and uncaught
/// `StoreFailure`. Every other kind is either swallowed at the point it
/// occurs or mapped into one of these before crossing a public boundary.
#[derive(Debug, Error)]
pub enum MemoriaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("capability failure ({capability}): {message}")]
    CapabilityFailure {
        capability: &'static str,
        message: String,
    },

    #[error("store failure: {0}")]
    StoreFailure(String),

    #[error("failed to parse provider output: {0}")]
    ParseFailure(String),
}

impl MemoriaError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn capability(capability: &'static str, message: impl Into<String>) -> Self {
        Self::CapabilityFailure {
            capability,
            message: message.into(),
        }
    }

    /// `true` for the two kinds the propagation policy says are allowed to
    /// escape a library method; everything else should have been handled
    /// (swallowed, defaulted, or downgraded) before this point.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::StoreFailure(_))
    }
}
