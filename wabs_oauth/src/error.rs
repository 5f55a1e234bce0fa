//! Errors raised while talking to the authority

use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::{client::TokenTypeHint, transport::TransportError};

/// The status code and raw body of an unsuccessful response
///
/// The body is kept verbatim so that provider-specific error payloads can be
/// inspected by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    /// The HTTP status code returned by the authority
    pub status_code: u16,
    /// The response body, as returned
    pub body: String,
}

impl ErrorDetail {
    pub(crate) fn new(status: StatusCode, body: String) -> Self {
        Self {
            status_code: status.as_u16(),
            body,
        }
    }

    /// Attempts to interpret the body as JSON, such as an RFC 6749
    /// `{"error": "...", "error_description": "..."}` payload
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}: {}", self.status_code, self.body)
    }
}

/// The discovery document could not be fetched or understood
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The request for the discovery document could not be completed
    #[error("error requesting discovery document")]
    Transport(#[from] TransportError),
    /// The discovery endpoint responded with an unsuccessful status
    #[error("discovery endpoint returned an error ({0})")]
    Status(ErrorDetail),
    /// The discovery document was not valid
    #[error("error deserializing discovery document")]
    Body(#[from] serde_json::Error),
}

/// A token could not be obtained from the authority
#[derive(Debug, Error)]
pub enum TokenExchangeError {
    /// The authority refused the request
    #[error("unable to get access token ({0})")]
    Rejected(ErrorDetail),
    /// The request could not be completed
    #[error("error sending request to authority")]
    Transport(#[from] TransportError),
    /// The authority accepted the request but the token body was not valid
    #[error("error deserializing token body from authority")]
    TokenBody(#[from] serde_json::Error),
}

impl TokenExchangeError {
    /// The status code returned by the authority, if it refused the request
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected(detail) => Some(detail.status_code),
            _ => None,
        }
    }

    /// The raw response body returned by the authority, if it refused the request
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Rejected(detail) => Some(&detail.body),
            _ => None,
        }
    }
}

/// A single revocation request failed
#[derive(Debug, Error)]
pub enum RevokeRequestError {
    /// The authority does not advertise a revocation endpoint
    #[error("authority does not advertise a revocation endpoint")]
    Unsupported,
    /// The authority refused the request
    #[error("revocation rejected ({0})")]
    Rejected(ErrorDetail),
    /// The request could not be completed
    #[error("error sending revocation request to authority")]
    Transport(#[from] TransportError),
}

/// The revocation of one token failed
#[derive(Debug, Error)]
#[error("failed to revoke {hint}")]
pub struct RevocationFailure {
    /// The kind of token whose revocation failed
    pub hint: TokenTypeHint,
    /// Why the revocation failed
    #[source]
    pub error: RevokeRequestError,
}

/// One or more revocations failed
///
/// Revocations are independent. Any revocation not listed here succeeded and
/// has already taken effect at the authority.
#[derive(Debug, Error)]
#[error("failed to revoke {}", FailedHints(.failures))]
pub struct RevocationError {
    failures: Vec<RevocationFailure>,
}

impl RevocationError {
    pub(crate) fn new(failures: Vec<RevocationFailure>) -> Self {
        Self { failures }
    }

    /// Every failed revocation
    pub fn failures(&self) -> &[RevocationFailure] {
        &self.failures
    }

    /// The kinds of token that could not be revoked
    pub fn failed_hints(&self) -> impl Iterator<Item = TokenTypeHint> + '_ {
        self.failures.iter().map(|f| f.hint)
    }

    /// Whether revoking the access token failed
    pub fn access_token_failed(&self) -> bool {
        self.failed_hints().any(|h| h == TokenTypeHint::AccessToken)
    }

    /// Whether revoking the refresh token failed
    pub fn refresh_token_failed(&self) -> bool {
        self.failed_hints().any(|h| h == TokenTypeHint::RefreshToken)
    }
}

struct FailedHints<'a>(&'a [RevocationFailure]);

impl fmt::Display for FailedHints<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, failure) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" and ")?;
            }
            fmt::Display::fmt(&failure.hint, f)?;
        }
        Ok(())
    }
}

/// The claims of an ID token could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The token has no payload segment
    #[error("ID token has no payload segment")]
    MissingPayload,
    /// The payload segment is not valid base64
    #[error("ID token payload is not valid base64")]
    Base64(#[from] base64::DecodeError),
    /// The payload is not a valid JSON claims object
    #[error("ID token payload is not a valid claims object")]
    Json(#[from] serde_json::Error),
}
