//! Error types for deck-core operations.

/// All errors surfaced by deck-core operations.
///
/// Nothing here is fatal to the process: every fault degrades the affected
/// slice (no auto-switch, no persistence) rather than halting.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Cannot remove the last remaining rule")]
    LastRule,

    #[error("Malformed payload: {details}")]
    MalformedPayload { details: String },

    #[error("Host transport unavailable")]
    TransportUnavailable,
}

/// Convenience type alias for Results using DeckError.
pub type Result<T> = std::result::Result<T, DeckError>;
