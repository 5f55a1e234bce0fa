use aliri_braid::braid;
use std::fmt;

/// Writes a secret for diagnostics
///
/// Plain formatting prints only a `***LABEL***` placeholder. Alternate
/// formatting reveals at most `visible` leading characters (or the formatter
/// width, when one is given) followed by an ellipsis.
fn redact(secret: &str, label: &str, visible: usize, f: &mut fmt::Formatter) -> fmt::Result {
    if !f.alternate() {
        return write!(f, "***{}***", label);
    }

    let visible = f.width().unwrap_or(visible);
    match secret.char_indices().nth(visible) {
        Some((idx, _)) => {
            f.write_str(&secret[..idx])?;
            f.write_str("…")
        }
        None => f.write_str(secret),
    }
}

macro_rules! redacted {
    ($ty:ty: $label:literal, $visible:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                redact(self.as_str(), $label, $visible, f)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                redact(self.as_str(), $label, $visible, f)
            }
        }
    };
}

/// A client ID
#[braid(serde)]
pub struct ClientId;

/// A client secret
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

redacted!(ClientSecretRef: "CLIENT SECRET", 0);

/// An OAuth2 authorization code, as received on the redirect URI
#[braid(serde, debug = "owned", display = "owned")]
pub struct AuthorizationCode;

redacted!(AuthorizationCodeRef: "AUTHORIZATION CODE", 4);

/// An access token
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted!(AccessTokenRef: "ACCESS TOKEN", 12);

/// A refresh token
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

redacted!(RefreshTokenRef: "REFRESH TOKEN", 4);

/// An OpenID Connect ID token in compact serialization
#[braid(serde)]
pub struct IdToken;
