//! A self-refreshing cache of the authority's OpenID Connect discovery document

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

use arc_swap::ArcSwap;
use http::{header, HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio::task::AbortHandle;
use wabs_clock::{Clock, DurationSecs, System, UnixTime};

use crate::{
    config::DiscoveryConfig,
    error::{DiscoveryError, ErrorDetail},
    transport::{HttpRequest, HttpTransport},
};

static MAX_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|,|\s)max-age=(\d+)(?:,|\s|$)").expect("max-age pattern is valid")
});

/// Refreshes are never scheduled more often than this, even for `max-age=0`
const MIN_LIFETIME: DurationSecs = DurationSecs(1);

/// The authority's discovery metadata
///
/// A document is immutable once published. Refreshes replace the whole
/// document rather than updating it in place.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    #[serde(default)]
    revocation_endpoint: Option<String>,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    jwks_uri: Option<String>,
    #[serde(default, rename = "id_token_signing_alg_values_supported")]
    id_token_signing_algorithms: BTreeSet<String>,
    #[serde(default)]
    response_types_supported: BTreeSet<String>,
    #[serde(default)]
    scopes_supported: BTreeSet<String>,
    #[serde(default)]
    subject_types_supported: BTreeSet<String>,
    #[serde(default, rename = "userinfo_endpoint")]
    user_info_endpoint: Option<String>,
    #[serde(skip)]
    cache_expires_at: UnixTime,
}

impl DiscoveryDocument {
    /// The endpoint users are redirected to in order to authorize the client
    pub fn authorization_endpoint(&self) -> &str {
        &self.authorization_endpoint
    }

    /// The endpoint tokens are requested from
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// The endpoint tokens are revoked at, if the authority supports revocation
    pub fn revocation_endpoint(&self) -> Option<&str> {
        self.revocation_endpoint.as_deref()
    }

    /// The issuer identifier of the authority
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// The location of the authority's JSON Web Key Set
    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref()
    }

    /// Algorithms the authority may use to sign ID tokens
    pub fn id_token_signing_algorithms(&self) -> &BTreeSet<String> {
        &self.id_token_signing_algorithms
    }

    /// Supported `response_type` values
    pub fn response_types_supported(&self) -> &BTreeSet<String> {
        &self.response_types_supported
    }

    /// Supported scopes
    pub fn scopes_supported(&self) -> &BTreeSet<String> {
        &self.scopes_supported
    }

    /// Supported subject identifier types
    pub fn subject_types_supported(&self) -> &BTreeSet<String> {
        &self.subject_types_supported
    }

    /// The OpenID Connect UserInfo endpoint
    pub fn user_info_endpoint(&self) -> Option<&str> {
        self.user_info_endpoint.as_deref()
    }

    /// When this document becomes due for a refresh
    pub fn cache_expires_at(&self) -> UnixTime {
        self.cache_expires_at
    }
}

#[derive(Debug)]
struct Inner {
    current: ArcSwap<DiscoveryDocument>,
    discovery_url: String,
    transport: Arc<dyn HttpTransport>,
    config: DiscoveryConfig,
    refresh_lock: tokio::sync::Mutex<()>,
    refresher: Mutex<Option<AbortHandle>>,
    closed: AtomicBool,
}

impl Inner {
    #[tracing::instrument(skip(self), fields(discovery.url = %self.discovery_url))]
    async fn refresh(&self) -> Result<DurationSecs, DiscoveryError> {
        let _guard = self.refresh_lock.lock().await;

        tracing::debug!("refreshing discovery document");
        match fetch(self.transport.as_ref(), &self.discovery_url, &self.config).await {
            Ok((document, lifetime)) => {
                self.current.store(Arc::new(document));
                tracing::info!(lifetime = lifetime.0, "discovery document refreshed");
                Ok(lifetime)
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "discovery refresh failed; keeping stale document");
                Err(err)
            }
        }
    }

    fn stop_refreshing(&self) {
        let handle = self
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_refreshing();
    }
}

/// A cache holding the authority's current [`DiscoveryDocument`]
///
/// The cache refreshes itself in the background whenever the document's
/// cache lifetime lapses. Failed refreshes are logged and the stale document
/// continues to be served until a later refresh succeeds.
///
/// Clones share the same document and the same background refresh. The
/// refresh stops when [`close()`][Self::close()] is called or when the last
/// clone is dropped. The refresh task never keeps the runtime alive on its own.
#[derive(Clone, Debug)]
#[must_use]
pub struct DiscoveryCache {
    inner: Arc<Inner>,
}

impl DiscoveryCache {
    /// Fetches the discovery document and starts refreshing it in the background
    ///
    /// Must be called from within a Tokio runtime.
    #[tracing::instrument(skip_all, fields(discovery.url = %discovery_url))]
    pub async fn initialize(
        transport: Arc<dyn HttpTransport>,
        discovery_url: String,
        config: DiscoveryConfig,
    ) -> Result<Self, DiscoveryError> {
        tracing::debug!("getting fresh discovery document");
        let (document, lifetime) = fetch(transport.as_ref(), &discovery_url, &config).await?;

        tracing::info!(lifetime = lifetime.0, "discovery document loaded");

        let inner = Arc::new(Inner {
            current: ArcSwap::from_pointee(document),
            discovery_url,
            transport,
            config,
            refresh_lock: tokio::sync::Mutex::new(()),
            refresher: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let join = tokio::spawn(refresh_forever(Arc::downgrade(&inner), lifetime));
        *inner
            .refresher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(join.abort_handle());

        Ok(Self { inner })
    }

    /// The current discovery document
    pub fn current(&self) -> Arc<DiscoveryDocument> {
        self.inner.current.load_full()
    }

    /// The URL the discovery document is fetched from
    pub fn discovery_url(&self) -> &str {
        &self.inner.discovery_url
    }

    /// Refreshes the discovery document now
    ///
    /// Waits for any refresh already in flight. If the refresh fails, the
    /// current document is left in place.
    pub async fn refresh(&self) -> Result<(), DiscoveryError> {
        self.inner.refresh().await.map(|_| ())
    }

    /// Stops the background refresh
    ///
    /// The last fetched document remains available.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(discovery.url = %self.inner.discovery_url, "stopping discovery refresh");
        }
        self.inner.stop_refreshing();
    }

    /// Whether the background refresh has been stopped
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

async fn refresh_forever(inner: Weak<Inner>, mut lifetime: DurationSecs) {
    loop {
        tokio::time::sleep(lifetime.max(MIN_LIFETIME).into()).await;

        let Some(inner) = inner.upgrade() else {
            tracing::debug!("discovery cache dropped, halting refreshes");
            return;
        };

        tracing::debug!("discovery document cache expired");
        if let Ok(next) = inner.refresh().await {
            lifetime = next;
        }
    }
}

async fn fetch(
    transport: &dyn HttpTransport,
    discovery_url: &str,
    config: &DiscoveryConfig,
) -> Result<(DiscoveryDocument, DurationSecs), DiscoveryError> {
    let request = HttpRequest::get(discovery_url)
        .with_header(header::ACCEPT, HeaderValue::from_static("application/json"))
        .with_timeout(config.request_timeout);

    let response = transport.request(request).await?;

    if !response.status.is_success() {
        tracing::warn!(
            http.status_code = response.status.as_u16(),
            "discovery endpoint returned an unexpected response status",
        );
        return Err(DiscoveryError::Status(ErrorDetail::new(
            response.status,
            response.text(),
        )));
    }

    let mut document = parse_document(&response.body)?;
    let lifetime = max_age(&response.headers).unwrap_or(config.default_lifetime);
    document.cache_expires_at = System.now() + lifetime;

    Ok((document, lifetime))
}

/// Parses a discovery document
///
/// Some gateways deliver the document as a JSON string wrapping the actual
/// JSON object; both forms are accepted.
fn parse_document(body: &[u8]) -> Result<DiscoveryDocument, serde_json::Error> {
    match serde_json::from_slice(body)? {
        serde_json::Value::String(inner) => serde_json::from_str(&inner),
        value => serde_json::from_value(value),
    }
}

/// Extracts the `max-age` directive from any `Cache-Control` header
fn max_age(headers: &HeaderMap) -> Option<DurationSecs> {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            let captures = MAX_AGE.captures(value)?;
            captures[1].parse().ok().map(DurationSecs)
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use color_eyre::Result;
    use http::StatusCode;

    use super::*;
    use crate::test_util::{
        discovery_body, discovery_response, json_response, FakeTransport, SlowTransport,
    };

    const DISCOVERY_URL: &str = "https://idp.example.com/.well-known/openid-configuration";

    fn cache_control(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn max_age_is_read_from_cache_control() {
        assert_eq!(max_age(&cache_control("max-age=120")), Some(DurationSecs(120)));
        assert_eq!(
            max_age(&cache_control("public, max-age=30, must-revalidate")),
            Some(DurationSecs(30))
        );
        assert_eq!(max_age(&cache_control("public,max-age=45")), Some(DurationSecs(45)));
    }

    #[test]
    fn max_age_requires_delimiters() {
        assert_eq!(max_age(&cache_control("s-max-age=120")), None);
        assert_eq!(max_age(&cache_control("max-age=12x")), None);
        assert_eq!(max_age(&cache_control("no-cache")), None);
        assert_eq!(max_age(&HeaderMap::new()), None);
    }

    #[test]
    fn max_age_ignores_overflowing_values() {
        assert_eq!(
            max_age(&cache_control("max-age=99999999999999999999999")),
            None
        );
    }

    #[test]
    fn parses_provider_field_names() -> Result<()> {
        let doc = parse_document(discovery_body("https://idp.example.com").as_bytes())?;

        assert_eq!(
            doc.authorization_endpoint(),
            "https://idp.example.com/authorize"
        );
        assert_eq!(doc.token_endpoint(), "https://idp.example.com/token");
        assert_eq!(
            doc.revocation_endpoint(),
            Some("https://idp.example.com/revoke")
        );
        assert_eq!(doc.issuer(), Some("https://idp.example.com"));
        assert_eq!(doc.jwks_uri(), Some("https://idp.example.com/jwks"));
        assert_eq!(
            doc.user_info_endpoint(),
            Some("https://idp.example.com/userinfo")
        );
        assert!(doc.id_token_signing_algorithms().contains("RS256"));
        assert!(doc.response_types_supported().contains("code"));
        assert!(doc.scopes_supported().contains("openid"));
        assert!(doc.subject_types_supported().contains("public"));
        Ok(())
    }

    #[test]
    fn accepts_string_wrapped_documents() -> Result<()> {
        let wrapped = serde_json::to_string(&discovery_body("https://idp.example.com"))?;
        let doc = parse_document(wrapped.as_bytes())?;
        assert_eq!(doc.token_endpoint(), "https://idp.example.com/token");
        Ok(())
    }

    #[test]
    fn optional_metadata_may_be_absent() -> Result<()> {
        let doc = parse_document(
            br#"{"authorization_endpoint":"https://a/authorize","token_endpoint":"https://a/token"}"#,
        )?;
        assert_eq!(doc.revocation_endpoint(), None);
        assert!(doc.scopes_supported().is_empty());
        Ok(())
    }

    #[test]
    fn missing_token_endpoint_is_rejected() {
        assert!(parse_document(br#"{"authorization_endpoint":"https://a/authorize"}"#).is_err());
    }

    #[tokio::test]
    async fn initialize_uses_max_age_for_expiry() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(
            DISCOVERY_URL,
            discovery_response("https://idp.example.com", Some(300)),
        );

        let before = System.now();
        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;

        let expires = cache.current().cache_expires_at();
        assert!(expires >= before + DurationSecs(300));
        assert!(expires <= System.now() + DurationSecs(300));
        assert_eq!(transport.requests_to(DISCOVERY_URL).len(), 1);

        cache.close();
        Ok(())
    }

    #[tokio::test]
    async fn initialize_defaults_to_ten_minutes() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://idp.example.com", None));

        let before = System.now();
        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;

        assert!(cache.current().cache_expires_at() >= before + DurationSecs(600));
        cache.close();
        Ok(())
    }

    #[tokio::test]
    async fn initialize_fails_on_error_status() {
        let transport = FakeTransport::new();
        transport.get(
            DISCOVERY_URL,
            json_response(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"down"}"#),
        );

        let err =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await
                .unwrap_err();

        match err {
            DiscoveryError::Status(detail) => {
                assert_eq!(detail.status_code, 503);
                assert_eq!(detail.body, r#"{"error":"down"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn initialize_fails_on_transport_error() {
        let transport = FakeTransport::new();

        let err =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await
                .unwrap_err();

        assert!(matches!(err, DiscoveryError::Transport(_)));
    }

    #[tokio::test]
    async fn discovery_requests_carry_the_configured_timeout() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://idp.example.com", None));

        let config = DiscoveryConfig::default().with_request_timeout(Duration::from_secs(3));
        let cache = DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), config).await?;

        let requests = transport.requests_to(DISCOVERY_URL);
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(3)));
        cache.close();
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_after_max_age() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://first.example.com", Some(1)));
        transport.get(DISCOVERY_URL, discovery_response("https://second.example.com", Some(60)));

        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;
        assert_eq!(
            cache.current().token_endpoint(),
            "https://first.example.com/token"
        );

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(transport.requests_to(DISCOVERY_URL).len(), 2);
        assert_eq!(
            cache.current().token_endpoint(),
            "https://second.example.com/token"
        );

        cache.close();
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_document() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://first.example.com", Some(2)));
        transport.get(
            DISCOVERY_URL,
            json_response(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
        );

        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(transport.requests_to(DISCOVERY_URL).len(), 2);
        assert_eq!(
            cache.current().token_endpoint(),
            "https://first.example.com/token"
        );

        // rescheduled with the last known lifetime
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.requests_to(DISCOVERY_URL).len(), 3);

        cache.close();
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_refreshing() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://idp.example.com", Some(1)));

        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;
        cache.close();
        assert!(cache.is_closed());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.requests_to(DISCOVERY_URL).len(), 1);
        assert_eq!(
            cache.current().token_endpoint(),
            "https://idp.example.com/token"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_cache_stops_refreshing() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://idp.example.com", Some(1)));

        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;
        drop(cache);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.requests_to(DISCOVERY_URL).len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn explicit_refresh_swaps_document() -> Result<()> {
        let transport = FakeTransport::new();
        transport.get(DISCOVERY_URL, discovery_response("https://first.example.com", None));
        transport.get(DISCOVERY_URL, discovery_response("https://second.example.com", None));

        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;
        let before = cache.current();

        cache.refresh().await?;

        assert_eq!(before.token_endpoint(), "https://first.example.com/token");
        assert_eq!(
            cache.current().token_endpoint(),
            "https://second.example.com/token"
        );
        cache.close();
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_refresh_waits_for_background_refresh() -> Result<()> {
        let fake = FakeTransport::new();
        fake.get(DISCOVERY_URL, discovery_response("https://idp.example.com", Some(1)));
        let transport = SlowTransport::new(fake.clone(), Duration::from_secs(5));

        let cache =
            DiscoveryCache::initialize(transport.clone(), DISCOVERY_URL.into(), Default::default())
                .await?;

        // the background refresh starts after one second and takes five
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(transport.in_flight(), 1);

        cache.refresh().await?;

        assert_eq!(transport.max_in_flight(), 1);
        assert_eq!(fake.requests_to(DISCOVERY_URL).len(), 3);

        cache.close();
        Ok(())
    }
}
