use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// An [`HttpTransport`] backed by a [`reqwest::Client`]
///
/// This crate does not enable any TLS backend in `reqwest` on its own. If
/// nothing else in your dependency tree does, enable the `rustls-tls` or
/// `default-tls` feature to reach HTTPS endpoints.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
}

impl ReqwestTransport {
    /// Constructs a transport with a client identifying itself as this crate
    pub fn new() -> Result<Self, ::reqwest::Error> {
        let client = ::reqwest::Client::builder()
            .user_agent(concat!("wabs_oauth/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

impl From<::reqwest::Client> for ReqwestTransport {
    fn from(client: ::reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[tracing::instrument(
        level = "trace",
        skip_all,
        fields(http.method = %request.method, http.url = %request.url),
    )]
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(TransportError::new)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::new)?;

        tracing::trace!(http.status_code = status.as_u16(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
