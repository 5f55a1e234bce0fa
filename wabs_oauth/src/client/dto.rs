//! DTOs for interacting with the authority's token endpoint

use serde::Deserialize;
use wabs_clock::DurationSecs;

use crate::{AccessToken, IdToken, RefreshToken};

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: AccessToken,
    pub token_type: String,
    #[serde(deserialize_with = "crate::de::duration_secs")]
    pub expires_in: DurationSecs,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub refresh_token: Option<RefreshToken>,
    #[serde(default)]
    pub id_token: Option<IdToken>,
}

/// Serializes form fields as `application/x-www-form-urlencoded`
pub(super) fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
