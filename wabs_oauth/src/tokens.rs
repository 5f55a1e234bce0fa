use wabs_clock::{Clock, DurationSecs, System, UnixTime};

use crate::{identity::ResourceOwner, AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// A token as returned by the authority with its computed expiration
///
/// Results are never shared or updated by the client. Storing and reusing
/// them is up to the caller.
#[derive(Clone, Debug)]
pub struct TokenResult {
    pub(crate) access_token: AccessToken,
    pub(crate) expires_at: UnixTime,
    pub(crate) expires_in: DurationSecs,
    pub(crate) scope: String,
    pub(crate) token_type: String,
    pub(crate) refresh_token: Option<RefreshToken>,
    pub(crate) resource_owner: Option<ResourceOwner>,
}

impl TokenResult {
    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the time at which the access token expires
    ///
    /// Clamped to [`UnixTime::MAX`] for exceptionally long lifetimes.
    #[inline]
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    /// Gets the lifetime reported by the authority
    #[inline]
    pub fn expires_in(&self) -> DurationSecs {
        self.expires_in
    }

    /// Gets the granted scopes, space-delimited
    #[inline]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Gets the token type, usually `Bearer`
    #[inline]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Gets the refresh token, if the authority issued one
    #[inline]
    pub fn refresh_token(&self) -> Option<&RefreshTokenRef> {
        self.refresh_token.as_deref()
    }

    /// Gets the resource owner, if an ID token was issued and could be decoded
    #[inline]
    pub fn resource_owner(&self) -> Option<&ResourceOwner> {
        self.resource_owner.as_ref()
    }

    /// Whether the access token has expired according to the system clock
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_clock(&System)
    }

    /// Whether the access token has expired according to the provided clock
    #[inline]
    pub fn is_expired_with_clock<C: Clock>(&self, clock: &C) -> bool {
        clock.now() >= self.expires_at
    }
}
