//! Error types for the tree-store client.
//!
//! # Design
//! The set of failures is closed so callers can branch on kind. `Timeout`
//! is kept apart from `Transport` because a slow network or an unresponsive
//! server usually calls for a different reaction than a refused connection.
//! Non-2xx replies land in `Response` with the raw status code and body.

use std::error::Error as StdError;
use std::time::Duration;

use crate::transport::Phase;

/// Errors returned by `Reference` construction and data operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The dial or header deadline expired.
    #[error("timed out in {phase} phase after {elapsed:?}")]
    Timeout { phase: Phase, elapsed: Duration },

    /// The connection failed for a reason other than the configured deadline
    /// (refused, DNS, TLS, malformed reply).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// The remote store answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Response { status: u16, body: String },

    /// The URL given to `Reference::new` could not be used as an endpoint.
    #[error("invalid URL {url:?}: {reason}")]
    Construction { url: String, reason: String },

    /// A request payload could not be encoded or a reply decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error::Transport(err.into())
    }

    pub(crate) fn construction(url: &str, reason: impl Into<String>) -> Self {
        Error::Construction {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_distinguishable() {
        let err = Error::Timeout {
            phase: Phase::Dialing,
            elapsed: Duration::from_millis(5),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timed out in dial phase after 5ms");

        let err = Error::transport("connection refused");
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn response_error_carries_status_and_body() {
        let err = Error::Response {
            status: 400,
            body: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 400: bad");
    }
}
