use std::time::Duration;

use wabs_clock::DurationSecs;

use crate::{ClientId, ClientSecret};

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Construction-time configuration for a [`TokenClient`][crate::TokenClient]
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) discovery_url: String,
    pub(crate) client_id: ClientId,
    pub(crate) client_secret: ClientSecret,
    pub(crate) discovery: DiscoveryConfig,
    pub(crate) request_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Configures a client against an explicit discovery document URL
    pub fn new(
        discovery_url: impl Into<String>,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            client_id,
            client_secret,
            discovery: DiscoveryConfig::default(),
            request_timeout: None,
        }
    }

    /// Configures a client against an issuer, using its
    /// `/.well-known/openid-configuration` document
    pub fn for_issuer(issuer: &str, client_id: ClientId, client_secret: ClientSecret) -> Self {
        let discovery_url = format!("{}{}", issuer.trim_end_matches('/'), WELL_KNOWN_PATH);
        Self::new(discovery_url, client_id, client_secret)
    }

    /// Sets the discovery cache configuration
    pub fn with_discovery_config(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Sets a timeout to be applied to every request sent to the authority
    ///
    /// By default, no timeout beyond that of the transport is applied.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self.discovery.request_timeout = Some(timeout);
        self
    }

    /// The URL of the discovery document
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// The client ID presented to the authority
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

/// Configuration for how the discovery document is cached
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub(crate) default_lifetime: DurationSecs,
    pub(crate) request_timeout: Option<Duration>,
}

impl Default for DiscoveryConfig {
    /// Default discovery configuration
    ///
    /// Caches the document for 10 minutes when the authority does not send a
    /// `Cache-Control: max-age` directive.
    fn default() -> Self {
        Self {
            default_lifetime: DurationSecs(600),
            request_timeout: None,
        }
    }
}

impl DiscoveryConfig {
    /// Constructs a configuration using `default_lifetime` when the authority
    /// does not say how long its discovery document may be cached
    pub fn new(default_lifetime: DurationSecs) -> Self {
        Self {
            default_lifetime,
            request_timeout: None,
        }
    }

    /// Sets a timeout for discovery requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
