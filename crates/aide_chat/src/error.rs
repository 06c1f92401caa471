//! Error types for the chat system.

use thiserror::Error;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Chat system errors
#[derive(Error, Debug)]
pub enum ChatError {
    /// The session for this subject has already expired
    #[error("Chat session expired: {0}")]
    SessionExpired(String),

    /// LLM is not configured
    #[error("LLM not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    LlmNotConfigured,

    /// LLM request failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// The LLM answered with something we could not interpret
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    /// User profile store failure
    #[error("User store error: {0}")]
    Store(String),

    /// A reply or notification could not be delivered
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ChatError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ChatError {
    /// Whether this error came from an external collaborator (LLM, store, transport)
    /// rather than from local state.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::Llm(_)
                | Self::LlmNotConfigured
                | Self::InvalidResponse(_)
                | Self::Store(_)
                | Self::Delivery(_)
        )
    }
}
