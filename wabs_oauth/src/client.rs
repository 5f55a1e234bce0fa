//! The token client and its grant flows

use std::{error, fmt, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use futures::future::OptionFuture;
use http::{header, HeaderValue, StatusCode};
use wabs_clock::{Clock, System};

use crate::{
    config::ClientConfig,
    discovery::{DiscoveryCache, DiscoveryDocument},
    error::{
        DiscoveryError, ErrorDetail, RevocationError, RevocationFailure, RevokeRequestError,
        TokenExchangeError,
    },
    identity,
    transport::{HttpRequest, HttpResponse, HttpTransport},
    AccessTokenRef, AuthorizationCodeRef, ClientId, ClientIdRef, ClientSecret, RefreshTokenRef,
    TokenResult,
};

mod dto;

/// The kind of token being revoked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenTypeHint {
    /// An access token
    AccessToken,
    /// A refresh token
    RefreshToken,
}

impl TokenTypeHint {
    /// The `token_type_hint` value sent to the authority
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Credentials {
    client_id: ClientId,
    authorization: HeaderValue,
}

impl Credentials {
    fn new(client_id: ClientId, client_secret: &ClientSecret) -> Self {
        let encoded = STANDARD.encode(format!("{}:{}", client_id, client_secret.as_str()));
        let mut authorization = HeaderValue::from_str(&format!("Basic {}", encoded))
            .expect("only valid header bytes");
        authorization.set_sensitive(true);

        Self {
            client_id,
            authorization,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// A client for obtaining, refreshing, and revoking tokens
///
/// Endpoints are read from the current discovery document on every call, so
/// a background refresh of the document takes effect on the next request.
///
/// Clones share the same discovery cache.
#[derive(Clone, Debug)]
pub struct TokenClient<C = System> {
    discovery: DiscoveryCache,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<Credentials>,
    request_timeout: Option<Duration>,
    clock: C,
}

impl TokenClient {
    /// Constructs a client that talks to the authority using `reqwest`
    ///
    /// The discovery document is fetched before this returns. Must be called
    /// from within a Tokio runtime.
    #[cfg(feature = "reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    pub async fn new(config: ClientConfig) -> Result<Self, DiscoveryError> {
        let transport = crate::transport::ReqwestTransport::new()
            .map_err(crate::transport::TransportError::new)?;

        Self::with_transport(config, Arc::new(transport)).await
    }

    /// Constructs a client that talks to the authority through `transport`
    ///
    /// The discovery document is fetched before this returns. Must be called
    /// from within a Tokio runtime.
    pub async fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, DiscoveryError> {
        let ClientConfig {
            discovery_url,
            client_id,
            client_secret,
            discovery,
            request_timeout,
        } = config;

        let discovery = DiscoveryCache::initialize(transport.clone(), discovery_url, discovery).await?;

        Ok(Self {
            discovery,
            transport,
            credentials: Arc::new(Credentials::new(client_id, &client_secret)),
            request_timeout,
            clock: System,
        })
    }

    /// Constructs a client on top of an existing discovery cache
    ///
    /// Useful when several clients of the same authority should share a
    /// single cache.
    pub fn with_discovery(
        discovery: DiscoveryCache,
        transport: Arc<dyn HttpTransport>,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Self {
        Self {
            discovery,
            transport,
            credentials: Arc::new(Credentials::new(client_id, &client_secret)),
            request_timeout: None,
            clock: System,
        }
    }
}

impl<C> TokenClient<C> {
    /// Uses `clock` to compute token expirations
    pub fn with_clock<D: Clock>(self, clock: D) -> TokenClient<D> {
        TokenClient {
            discovery: self.discovery,
            transport: self.transport,
            credentials: self.credentials,
            request_timeout: self.request_timeout,
            clock,
        }
    }

    /// Sets a timeout to be applied to every token and revocation request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The client ID presented to the authority
    pub fn client_id(&self) -> &ClientIdRef {
        &self.credentials.client_id
    }

    /// The discovery cache backing this client
    pub fn discovery(&self) -> &DiscoveryCache {
        &self.discovery
    }

    /// The current discovery document
    pub fn discovery_document(&self) -> Arc<DiscoveryDocument> {
        self.discovery.current()
    }

    /// Stops refreshing the discovery document in the background
    ///
    /// The client remains usable with the last fetched document. Other clients
    /// sharing the same cache are affected as well.
    pub fn close(&self) {
        self.discovery.close();
    }

    /// Builds the URL to send a user to in order to obtain an authorization code
    ///
    /// Requests the `openid` scope. No state is sent when `state` is `None`.
    ///
    /// Every query value is percent-encoded, including the client ID, so IDs
    /// containing reserved characters still produce a well-formed URL.
    pub fn authorization_url(&self, redirect_uri: &str, state: Option<&str>) -> String {
        tracing::debug!("get authorization url");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope=openid&state={}",
            self.discovery.current().authorization_endpoint(),
            urlencoding::encode(self.credentials.client_id.as_str()),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state.unwrap_or_default()),
        )
    }

    fn authorized_post(&self, url: &str, fields: &[(&str, &str)]) -> HttpRequest {
        HttpRequest::post_form(url, dto::form_body(fields))
            .with_header(header::AUTHORIZATION, self.credentials.authorization.clone())
            .with_timeout(self.request_timeout)
    }
}

impl<C: Clock + Send + Sync> TokenClient<C> {
    /// Obtains a token for the client itself using the client credentials grant
    #[tracing::instrument(
        skip(self),
        fields(credentials.grant_type = "client_credentials", credentials.client_id = %self.credentials.client_id),
    )]
    pub async fn client_grant_token(&self) -> Result<TokenResult, TokenExchangeError> {
        tracing::debug!("getting client grant access token");
        self.exchange(&[("grant_type", "client_credentials")]).await
    }

    /// Exchanges an authorization code for tokens
    ///
    /// `redirect_uri` must match the one used to build the authorization URL.
    #[tracing::instrument(
        skip(self, code),
        fields(credentials.grant_type = "authorization_code", credentials.client_id = %self.credentials.client_id),
    )]
    pub async fn auth_code_grant_token(
        &self,
        code: &AuthorizationCodeRef,
        redirect_uri: &str,
    ) -> Result<TokenResult, TokenExchangeError> {
        tracing::debug!("getting auth code grant token");
        self.exchange(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    /// Obtains new tokens using a refresh token
    ///
    /// If the authority rotates refresh tokens, the new refresh token is
    /// available on the result.
    #[tracing::instrument(
        skip(self, refresh_token),
        fields(credentials.grant_type = "refresh_token", credentials.client_id = %self.credentials.client_id),
    )]
    pub async fn refresh_token(
        &self,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenResult, TokenExchangeError> {
        tracing::debug!("refreshing access token");
        self.exchange(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ])
        .await
    }

    /// Revokes an access token, a refresh token, or both
    ///
    /// Missing or empty tokens are skipped. When both are given, the two
    /// revocations are sent concurrently and this waits for both to settle.
    ///
    /// Revocations are not transactional. If one succeeds and the other
    /// fails, an error listing only the failed revocation is returned, but the
    /// successful revocation has already taken effect at the authority.
    #[tracing::instrument(skip_all, fields(credentials.client_id = %self.credentials.client_id))]
    pub async fn revoke_token(
        &self,
        access_token: Option<&AccessTokenRef>,
        refresh_token: Option<&RefreshTokenRef>,
    ) -> Result<(), RevocationError> {
        let endpoint = self
            .discovery
            .current()
            .revocation_endpoint()
            .map(ToOwned::to_owned);
        let endpoint = endpoint.as_deref();

        let access: OptionFuture<_> = access_token
            .map(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| self.revoke(endpoint, t, TokenTypeHint::AccessToken))
            .into();
        let refresh: OptionFuture<_> = refresh_token
            .map(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| self.revoke(endpoint, t, TokenTypeHint::RefreshToken))
            .into();

        let (access, refresh) = futures::join!(access, refresh);

        let failures: Vec<_> = [access, refresh]
            .into_iter()
            .flatten()
            .filter_map(Result::err)
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RevocationError::new(failures))
        }
    }

    async fn revoke(
        &self,
        endpoint: Option<&str>,
        token: &str,
        hint: TokenTypeHint,
    ) -> Result<(), RevocationFailure> {
        tracing::debug!(token_type_hint = %hint, "revoking token");
        match self.send_revocation(endpoint, token, hint).await {
            Ok(()) => {
                tracing::debug!(token_type_hint = %hint, "revoked token");
                Ok(())
            }
            Err(error) => {
                let err: &dyn error::Error = &error;
                tracing::warn!(error = err, token_type_hint = %hint, "failed to revoke token");
                Err(RevocationFailure { hint, error })
            }
        }
    }

    async fn send_revocation(
        &self,
        endpoint: Option<&str>,
        token: &str,
        hint: TokenTypeHint,
    ) -> Result<(), RevokeRequestError> {
        let endpoint = endpoint.ok_or(RevokeRequestError::Unsupported)?;
        let request =
            self.authorized_post(endpoint, &[("token", token), ("token_type_hint", hint.as_str())]);

        let response = self.transport.request(request).await?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(RevokeRequestError::Rejected(ErrorDetail::new(
                response.status,
                response.text(),
            )))
        }
    }

    async fn exchange(&self, fields: &[(&str, &str)]) -> Result<TokenResult, TokenExchangeError> {
        let token_endpoint = self.discovery.current().token_endpoint().to_owned();
        let request = self.authorized_post(&token_endpoint, fields);

        let response = self.transport.request(request).await?;

        tracing::debug!(
            http.status_code = response.status.as_u16(),
            "received token response from issuing authority"
        );

        evaluate_token_response(response, &self.clock)
    }
}

fn evaluate_token_response<C: Clock>(
    response: HttpResponse,
    clock: &C,
) -> Result<TokenResult, TokenExchangeError> {
    if response.status != StatusCode::OK {
        tracing::debug!("unable to get access token");
        return Err(TokenExchangeError::Rejected(ErrorDetail::new(
            response.status,
            response.text(),
        )));
    }

    let body: dto::TokenResponse = serde_json::from_slice(&response.body)?;

    let resource_owner = body
        .id_token
        .as_deref()
        .filter(|t| !t.as_str().is_empty())
        .and_then(|id_token| match identity::decode(id_token) {
            Ok(owner) => Some(owner),
            Err(err) => {
                let error: &dyn error::Error = &err;
                tracing::warn!(error, "unable to decode id token");
                None
            }
        });

    let token = TokenResult {
        expires_at: clock.now() + body.expires_in,
        expires_in: body.expires_in,
        access_token: body.access_token,
        scope: body.scope,
        token_type: body.token_type,
        refresh_token: body.refresh_token.filter(|t| !t.as_str().is_empty()),
        resource_owner,
    };

    tracing::info!(
        has_refresh_token = token.refresh_token.is_some(),
        has_resource_owner = token.resource_owner.is_some(),
        lifetime = token.expires_in.0,
        expiry = token.expires_at.as_millis(),
        "retrieved access token"
    );

    Ok(token)
}
