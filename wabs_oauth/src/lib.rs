//! OAuth2 and OpenID Connect client token management
//!
//! This crate manages the lifecycle of tokens held by a confidential client
//! of an OpenID Connect authority. It obtains, refreshes, and revokes tokens
//! using endpoints learned from the authority's discovery document.
//!
//! The discovery document is fetched once when a [`TokenClient`] is
//! constructed and then kept fresh in the background. The document is
//! re-fetched when the `max-age` advertised in its `Cache-Control` header
//! elapses, or after ten minutes when no `max-age` is given. If a refresh
//! fails, the previous document remains in use and another attempt is made
//! later. Every token request reads its endpoint from whichever document is
//! current at the time of the call.
//!
//! Tokens are handed back to the caller as a [`TokenResult`] and are never
//! stored by the client. When the authority issues an ID token alongside
//! the access token, its claims are decoded into a [`ResourceOwner`]. The
//! ID token's signature is **not** verified.
//!
//! # Example
//!
//! ```no_run
//! use wabs_oauth::{ClientConfig, ClientId, ClientSecret, TokenClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::for_issuer(
//!     "https://idp.example.com",
//!     ClientId::from_static("my-client"),
//!     ClientSecret::from_static("my-secret"),
//! );
//!
//! let client = TokenClient::new(config).await?;
//!
//! let token = client.client_grant_token().await?;
//! tracing::info!(
//!     token = format_args!("{:#?}", token.access_token()),
//!     expires_at = token.expires_at().as_secs(),
//!     "obtained client token"
//! );
//!
//! client.revoke_token(Some(token.access_token()), None).await?;
//! client.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `reqwest` (default): Provides [`ReqwestTransport`][transport::ReqwestTransport] and
//!   [`TokenClient::new`]. Without it, supply your own [`HttpTransport`].
//! * `rustls-tls`: Enables TLS in `reqwest` through `rustls`.
//! * `default-tls`: Enables TLS in `reqwest` through the platform's native library.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod client;
pub mod config;
mod de;
pub mod discovery;
pub mod error;
pub mod identity;
mod tokens;
pub mod transport;

#[cfg(test)]
mod test_util;

pub use braids::*;
pub use client::{TokenClient, TokenTypeHint};
pub use config::{ClientConfig, DiscoveryConfig};
pub use discovery::{DiscoveryCache, DiscoveryDocument};
pub use error::{
    DecodeError, DiscoveryError, ErrorDetail, RevocationError, RevocationFailure,
    RevokeRequestError, TokenExchangeError,
};
pub use identity::{Audience, IdentityClaims, ResourceOwner};
pub use tokens::TokenResult;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
pub use wabs_clock;
