//! Unified error handling for the sync core.
//!
//! Every failure inside the crate is classified into one of these variants
//! before it reaches a boundary. The `ApiClient` and the providers never let
//! a `BeaconError` escape: operations fold it into an `ApiResult` message or
//! a default sampled value.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for sync-core operations.
#[derive(Debug, Clone, Error)]
pub enum BeaconError {
    /// Transport-level failure: DNS, connect, TLS, or a dropped body stream.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The operation-specific deadline expired before a response arrived.
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The server rejected the credentials (HTTP 401/403).
    #[error("Authentication rejected (HTTP {status})")]
    Auth { status: u16 },

    /// Any other non-200 response.
    #[error("Server error (HTTP {status})")]
    Server { status: u16 },

    /// Response body was not the JSON object the API contract promises.
    #[error("Invalid response format from server")]
    Parse,

    /// A platform capability (location, battery, network info) is unavailable.
    #[error("Permission denied: {capability}")]
    PermissionDenied { capability: String },
}

impl BeaconError {
    /// Classify a failed `reqwest` send into the taxonomy. `deadline` is the
    /// per-operation timeout that was in force, so the message can name it.
    pub fn from_send_error(err: &reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            BeaconError::Timeout {
                seconds: deadline.as_secs(),
            }
        } else if err.is_connect() {
            BeaconError::Network {
                message: format!("connection failed: {err}"),
            }
        } else {
            BeaconError::Network {
                message: err.to_string(),
            }
        }
    }

    /// True for the variants a caller may treat as a credential problem.
    pub fn is_auth(&self) -> bool {
        matches!(self, BeaconError::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_classifications() {
        let err = BeaconError::Timeout { seconds: 8 };
        assert_eq!(err.to_string(), "Request timed out after 8s");

        let err = BeaconError::Auth { status: 401 };
        assert_eq!(err.to_string(), "Authentication rejected (HTTP 401)");

        let err = BeaconError::Parse;
        assert_eq!(err.to_string(), "Invalid response format from server");

        let err = BeaconError::Network {
            message: "connection failed: refused".to_string(),
        };
        assert!(err.to_string().starts_with("Network error:"));
    }

    #[test]
    fn test_is_auth() {
        assert!(BeaconError::Auth { status: 403 }.is_auth());
        assert!(!BeaconError::Server { status: 500 }.is_auth());
    }
}
