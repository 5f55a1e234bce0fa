//! Best-effort extraction of resource owner claims from an ID token
//!
//! The ID token's signature is **not** verified. The claims decoded here are
//! informational: they were received over TLS directly from the authority
//! in the same response as the access token, but they must not be used as
//! proof of identity when received from anywhere else.

use std::ops;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde::{Deserialize, Serialize};
use wabs_clock::UnixTime;

use crate::{error::DecodeError, IdToken, IdTokenRef};

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// The audience of an ID token, which may be a single value or a list
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience
    Single(String),
    /// Multiple audiences
    Multiple(Vec<String>),
}

impl Audience {
    /// Iterates over every audience
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(aud) => std::slice::from_ref(aud),
            Self::Multiple(auds) => auds,
        };
        values.iter().map(String::as_str)
    }

    /// Whether `aud` is one of the audiences
    pub fn contains(&self, aud: &str) -> bool {
        self.iter().any(|a| a == aud)
    }
}

/// Claims about the resource owner carried by an ID token
///
/// Claims absent from the token are `None`, as are claims whose value has an
/// unexpected type. Timestamps given as numeric strings are accepted. Claims
/// not listed here are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct IdentityClaims {
    /// Access token hash
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub at_hash: Option<String>,
    /// Audience
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub aud: Option<Audience>,
    /// Time of authentication, in seconds since the epoch
    #[serde(
        deserialize_with = "crate::de::lenient_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_time: Option<u64>,
    /// Authorized party
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub azp: Option<String>,
    /// BYU ID
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub byu_id: Option<String>,
    /// Expiration, in seconds since the epoch
    #[serde(
        deserialize_with = "crate::de::lenient_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<u64>,
    /// Issued at, in seconds since the epoch
    #[serde(
        deserialize_with = "crate::de::lenient_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<u64>,
    /// Issuer
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub iss: Option<String>,
    /// Net ID
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub net_id: Option<String>,
    /// Person ID
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub person_id: Option<String>,
    /// Preferred first name
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub preferred_first_name: Option<String>,
    /// Name prefix
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub prefix: Option<String>,
    /// Given names
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub rest_of_name: Option<String>,
    /// Name in sortable form, such as `Surname, Given`
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort_name: Option<String>,
    /// Subject
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub: Option<String>,
    /// Name suffix
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub suffix: Option<String>,
    /// Surname
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub surname: Option<String>,
    /// Position of the surname within the full name
    #[serde(
        deserialize_with = "crate::de::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub surname_position: Option<String>,
}

impl IdentityClaims {
    /// The time the resource owner authenticated
    pub fn authenticated_at(&self) -> Option<UnixTime> {
        self.auth_time.map(UnixTime::from_secs)
    }

    /// The time the ID token expires
    pub fn expires_at(&self) -> Option<UnixTime> {
        self.exp.map(UnixTime::from_secs)
    }

    /// The time the ID token was issued
    pub fn issued_at(&self) -> Option<UnixTime> {
        self.iat.map(UnixTime::from_secs)
    }
}

/// The resource owner identified by an ID token
///
/// Dereferences to the decoded [`IdentityClaims`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceOwner {
    jwt: IdToken,
    claims: IdentityClaims,
}

impl ResourceOwner {
    /// The ID token the claims were decoded from
    pub fn jwt(&self) -> &IdTokenRef {
        &self.jwt
    }

    /// The decoded claims
    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// Takes ownership of the decoded claims
    pub fn into_claims(self) -> IdentityClaims {
        self.claims
    }
}

impl ops::Deref for ResourceOwner {
    type Target = IdentityClaims;

    fn deref(&self) -> &Self::Target {
        &self.claims
    }
}

/// Decodes the claims of an ID token without verifying its signature
pub fn decode(id_token: &IdTokenRef) -> Result<ResourceOwner, DecodeError> {
    let payload = id_token
        .as_str()
        .split('.')
        .nth(1)
        .filter(|p| !p.is_empty())
        .ok_or(DecodeError::MissingPayload)?;

    let raw = decode_segment(payload)?;
    let claims = serde_json::from_slice(&raw)?;

    Ok(ResourceOwner {
        jwt: id_token.to_owned(),
        claims,
    })
}

/// JWT segments are base64url, but some issuers emit the standard alphabet
fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if segment.contains(['+', '/']) {
        STANDARD_LENIENT.decode(segment)
    } else {
        URL_SAFE_LENIENT.decode(segment)
    }
}
