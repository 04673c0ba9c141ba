//! Harness error types.
//!
//! Every failure a test case can hit is one of these variants.  All of
//! them are local to the case that produced them: the runner records the
//! case as failed and moves on.

use std::time::Duration;

use thiserror::Error;

use crate::verify::Mismatch;

/// Errors raised while building, sending or checking a request.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Body digest computation failed, so no request was built.
    #[error("failed to build request: {0}")]
    Build(#[source] std::io::Error),

    /// The request could not be addressed (bad endpoint, bucket or key).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, DNS, TLS or body-read failure.  Never retried.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request did not finish within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The target answered, but not the way S3 does.
    #[error(transparent)]
    Mismatch(#[from] Mismatch),

    /// A fixture cannot be used for the requested check.
    #[error("invalid fixture: {0}")]
    Fixture(String),
}

impl HarnessError {
    /// True when the target was never reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, HarnessError::Transport(_) | HarnessError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_display_is_transparent() {
        let err: HarnessError = Mismatch::Status {
            expected: 204,
            actual: 409,
        }
        .into();
        assert_eq!(err.to_string(), "Unexpected Status: wanted 204, got 409");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_timeout_is_transport() {
        assert!(HarnessError::Timeout(Duration::from_secs(5)).is_transport());
        assert!(!HarnessError::Fixture("empty".into()).is_transport());
    }
}
