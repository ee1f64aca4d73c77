//! # Provider Error Types Module
//!
//! Structured errors raised inside a recognition provider adapter. They never
//! cross the adapter boundary as `Err`: `OcrProvider::extract` folds them into
//! a failed `ExtractionAttempt` whose `error` field carries the rendered text.

/// Custom error types for recognition provider calls
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The image encoding is not accepted by this provider
    Format(String),
    /// Connection, TLS or request-building failures
    Transport(String),
    /// Non-success HTTP status
    Status { code: u16, body: String },
    /// Response body could not be interpreted
    Payload(String),
    /// The attempt exceeded its time budget
    Timeout(String),
    /// The attempt was cancelled before it started work
    Cancelled,
    /// The provider cannot run in this process (missing engine, bad setup)
    Unavailable(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Format(msg) => {
                write!(f, "[PROVIDER_FORMAT] Unsupported image encoding: {}", msg)
            }
            ProviderError::Transport(msg) => {
                write!(f, "[PROVIDER_TRANSPORT] Request to provider failed: {}", msg)
            }
            ProviderError::Status { code, body } => {
                write!(f, "[PROVIDER_STATUS] Provider returned HTTP {}: {}", code, body)
            }
            ProviderError::Payload(msg) => {
                write!(f, "[PROVIDER_PAYLOAD] Malformed provider response: {}", msg)
            }
            ProviderError::Timeout(msg) => write!(f, "[PROVIDER_TIMEOUT] {}", msg),
            ProviderError::Cancelled => write!(f, "[PROVIDER_CANCELLED] Attempt was cancelled"),
            ProviderError::Unavailable(msg) => {
                write!(f, "[PROVIDER_UNAVAILABLE] Provider cannot run: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Whether a later retry of the same provider could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::Status { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Payload(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Payload(err.to_string())
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}
