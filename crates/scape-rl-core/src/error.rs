//! Error types for scape-rl

use thiserror::Error;

/// Result type for scape-rl operations
pub type Result<T> = std::result::Result<T, ScapeRLError>;

/// scape-rl error types
#[derive(Debug, Error)]
pub enum ScapeRLError {
    /// Transport unreachable or closed. Recovered automatically only inside
    /// the frame retry path; fatal everywhere else.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or unexpected response shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No response within the allowed bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Subordinate process failed to start or a required artifact is missing
    #[error("Launch error: {0}")]
    Launch(String),

    /// Action rejected by the action space
    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

impl ScapeRLError {
    /// Whether the error came from the transport layer (as opposed to a
    /// well-formed but unexpected response).
    pub fn is_transport(&self) -> bool {
        matches!(self, ScapeRLError::Connection(_) | ScapeRLError::Timeout(_))
    }
}

impl From<serde_json::Error> for ScapeRLError {
    fn from(err: serde_json::Error) -> Self {
        ScapeRLError::Protocol(err.to_string())
    }
}
