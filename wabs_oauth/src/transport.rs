//! The HTTP seam between the token client and the network
//!
//! The client never talks to the network directly. Every discovery fetch,
//! token exchange, and revocation is expressed as an [`HttpRequest`] and
//! handed to an [`HttpTransport`]. With the default `reqwest` feature,
//! [`ReqwestTransport`] provides a production implementation.

use std::{error::Error as StdError, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use thiserror::Error;

#[cfg(feature = "reqwest")]
mod reqwest;

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub use self::reqwest::ReqwestTransport;

/// An outbound request
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// The request method
    pub method: Method,
    /// The absolute URL to request
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// The request body, if any
    pub body: Option<String>,
    /// The maximum time to wait for a response, if the caller configured one
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// A `GET` request with no body
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// A `POST` request carrying a URL-encoded form body
    pub fn post_form(url: impl Into<String>, body: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        Self {
            method: Method::POST,
            url: url.into(),
            headers,
            body: Some(body),
            timeout: None,
        }
    }

    /// Adds a header to the request
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the timeout to be enforced by the transport
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A response received from the remote server
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// The response status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// The raw response body
    pub body: Bytes,
}

impl HttpResponse {
    /// The response body as text, replacing invalid UTF-8 sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The request could not be completed by the transport
#[derive(Debug, Error)]
#[error("HTTP transport failed")]
pub struct TransportError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl TransportError {
    /// Wraps an underlying transport failure
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// A capability to perform HTTP requests
///
/// Implementations own connection handling, TLS, and socket-level retries.
/// A non-success status code is a successful transport call and must be
/// returned as an [`HttpResponse`], not as an error.
#[async_trait]
pub trait HttpTransport: fmt::Debug + Send + Sync {
    /// Performs the request and returns the complete response
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).request(request).await
    }
}
