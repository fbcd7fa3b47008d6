//! Error types for the cardwire domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all cardwire operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Card API errors ---
    #[error("Card error: {0}")]
    Card(#[from] CardError),

    // --- Access token errors ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Instance store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Inbound event errors ---
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Credentials not configured: {0}")]
    NotConfigured(String),

    #[error("Token request failed: {0}")]
    RequestFailed(String),

    #[error("Token endpoint returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum CardError {
    #[error("Cannot obtain access token for {operation}: {source}")]
    Auth {
        operation: &'static str,
        #[source]
        source: AuthError,
    },

    #[error("Unsupported conversation type '{0}'")]
    UnsupportedConversation(String),

    #[error("{operation} rejected by platform: {body}")]
    Rejected {
        operation: &'static str,
        body: String,
    },

    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} transport failure: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
    },
}

impl CardError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Only transport failures and server-side statuses qualify; a business
    /// rejection (`success: false`) is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            CardError::Transport { .. } => true,
            CardError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed event body on topic {topic}: {reason}")]
    MalformedBody { topic: String, reason: String },

    #[error("Missing callback parameter: {0}")]
    MissingParam(String),

    #[error("Event source disconnected: {0}")]
    Disconnected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_error_displays_correctly() {
        let err = Error::Card(CardError::Status {
            operation: "update",
            status: 502,
            body: "bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("update"));
    }

    #[test]
    fn only_transport_and_server_errors_retry() {
        assert!(CardError::Transport {
            operation: "create",
            reason: "connection reset".into(),
        }
        .is_retryable());
        assert!(CardError::Status {
            operation: "create",
            status: 503,
            body: String::new(),
        }
        .is_retryable());
        assert!(!CardError::Status {
            operation: "create",
            status: 400,
            body: String::new(),
        }
        .is_retryable());
        assert!(!CardError::Rejected {
            operation: "create",
            body: "{\"success\":false}".into(),
        }
        .is_retryable());
    }
}
