//! RFC 8628 wire errors.
//!
//! Every failure the device flow reports to a client is one of a closed set of
//! codes. Clients branch on [`ProtocolErrorCode::disposition`], never on the
//! description text.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes defined by RFC 8628 §3.5 and RFC 6749 §5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolErrorCode {
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    InvalidGrant,
    InvalidRequest,
    ServerError,
}

/// What a polling client should do after receiving a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDisposition {
    /// Wait `interval` seconds and poll again.
    KeepPolling,
    /// Increase the interval by 5 seconds, then poll again.
    SlowDown,
    /// Stop; the user must start a new login.
    Restart,
    /// Stop and surface the error.
    Fail,
}

impl ProtocolErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolErrorCode::AuthorizationPending => "authorization_pending",
            ProtocolErrorCode::SlowDown => "slow_down",
            ProtocolErrorCode::AccessDenied => "access_denied",
            ProtocolErrorCode::ExpiredToken => "expired_token",
            ProtocolErrorCode::InvalidGrant => "invalid_grant",
            ProtocolErrorCode::InvalidRequest => "invalid_request",
            ProtocolErrorCode::ServerError => "server_error",
        }
    }

    pub fn disposition(&self) -> PollDisposition {
        match self {
            ProtocolErrorCode::AuthorizationPending => PollDisposition::KeepPolling,
            ProtocolErrorCode::SlowDown => PollDisposition::SlowDown,
            ProtocolErrorCode::AccessDenied
            | ProtocolErrorCode::ExpiredToken
            | ProtocolErrorCode::InvalidGrant => PollDisposition::Restart,
            ProtocolErrorCode::InvalidRequest | ProtocolErrorCode::ServerError => {
                PollDisposition::Fail
            }
        }
    }
}

impl fmt::Display for ProtocolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ "error": ..., "error_description": ... }` body.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error}: {error_description}")]
pub struct ProtocolError {
    pub error: ProtocolErrorCode,
    pub error_description: String,
}

impl ProtocolError {
    pub fn new(error: ProtocolErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: description.into(),
        }
    }

    pub fn authorization_pending() -> Self {
        Self::new(
            ProtocolErrorCode::AuthorizationPending,
            "The authorization request is still pending",
        )
    }

    pub fn slow_down() -> Self {
        Self::new(
            ProtocolErrorCode::SlowDown,
            "Polling too frequently; increase the interval by 5 seconds",
        )
    }

    pub fn expired_token() -> Self {
        Self::new(
            ProtocolErrorCode::ExpiredToken,
            "The device code has expired. Please restart the login process.",
        )
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ProtocolErrorCode::InvalidGrant, description)
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ProtocolErrorCode::InvalidRequest, description)
    }

    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new(ProtocolErrorCode::AccessDenied, description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(ProtocolErrorCode::ServerError, description)
    }

    pub fn disposition(&self) -> PollDisposition {
        self.error.disposition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_rfc_strings() {
        let body = serde_json::to_value(ProtocolError::authorization_pending()).unwrap();
        assert_eq!(body["error"], "authorization_pending");
        assert!(body["error_description"].is_string());

        let parsed: ProtocolError = serde_json::from_str(
            r#"{"error":"expired_token","error_description":"gone"}"#,
        )
        .unwrap();
        assert_eq!(parsed.error, ProtocolErrorCode::ExpiredToken);
    }

    #[test]
    fn dispositions_separate_wait_restart_and_fail() {
        assert_eq!(
            ProtocolError::authorization_pending().disposition(),
            PollDisposition::KeepPolling
        );
        assert_eq!(ProtocolError::slow_down().disposition(), PollDisposition::SlowDown);
        assert_eq!(ProtocolError::expired_token().disposition(), PollDisposition::Restart);
        assert_eq!(
            ProtocolError::access_denied("no").disposition(),
            PollDisposition::Restart
        );
        assert_eq!(
            ProtocolError::server_error("boom").disposition(),
            PollDisposition::Fail
        );
    }

    #[test]
    fn display_includes_code() {
        let e = ProtocolError::invalid_grant("Invalid or unknown device code");
        assert_eq!(e.to_string(), "invalid_grant: Invalid or unknown device code");
    }
}
