//! A scripted transport for exercising the client without a network

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

#[derive(Clone, Debug)]
enum Reply {
    Respond(HttpResponse),
    Fail,
}

/// Replays canned responses per method and URL and records every request
///
/// Replies registered for a body fragment win over the per-route queue.
/// Responses queued for a route are handed out in order. The last one is
/// repeated once the queue is down to a single entry. Requests to a route
/// with nothing queued fail at the transport level.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    by_body: Mutex<Vec<(String, String, Reply)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, url.to_owned()))
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn get(&self, url: &str, response: HttpResponse) {
        self.push(Method::GET, url, Reply::Respond(response));
    }

    pub(crate) fn post(&self, url: &str, response: HttpResponse) {
        self.push(Method::POST, url, Reply::Respond(response));
    }

    pub(crate) fn fail_post(&self, url: &str) {
        self.push(Method::POST, url, Reply::Fail);
    }

    pub(crate) fn post_when(&self, url: &str, body_contains: &str, response: HttpResponse) {
        self.by_body.lock().unwrap().push((
            url.to_owned(),
            body_contains.to_owned(),
            Reply::Respond(response),
        ));
    }

    pub(crate) fn fail_post_when(&self, url: &str, body_contains: &str) {
        self.by_body
            .lock()
            .unwrap()
            .push((url.to_owned(), body_contains.to_owned(), Reply::Fail));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let key = (request.method.clone(), request.url.clone());
        let matched = self
            .by_body
            .lock()
            .unwrap()
            .iter()
            .find(|(url, needle, _)| {
                *url == request.url
                    && request
                        .body
                        .as_deref()
                        .is_some_and(|body| body.contains(needle.as_str()))
            })
            .map(|(_, _, reply)| reply.clone());
        self.requests.lock().unwrap().push(request);

        let reply = if matched.is_some() {
            matched
        } else {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail) => Err(TransportError::new("connection reset")),
            None => Err(TransportError::new(format!("no route for {} {}", key.0, key.1))),
        }
    }
}

/// Holds every POST until `parties` POSTs are waiting, then forwards them
#[derive(Debug)]
pub(crate) struct BarrierTransport {
    inner: Arc<FakeTransport>,
    barrier: tokio::sync::Barrier,
}

impl BarrierTransport {
    pub(crate) fn new(inner: Arc<FakeTransport>, parties: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            barrier: tokio::sync::Barrier::new(parties),
        })
    }
}

#[async_trait]
impl HttpTransport for BarrierTransport {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if request.method == Method::POST {
            self.barrier.wait().await;
        }
        self.inner.request(request).await
    }
}

/// Delays every request and records how many were in flight at once
#[derive(Debug)]
pub(crate) struct SlowTransport {
    inner: Arc<FakeTransport>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowTransport {
    pub(crate) fn new(inner: Arc<FakeTransport>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for SlowTransport {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let response = self.inner.request(request).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

pub(crate) fn json_response(status: StatusCode, body: &str) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    HttpResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(body.as_bytes()),
    }
}

pub(crate) fn discovery_body(base: &str) -> String {
    serde_json::json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "revocation_endpoint": format!("{base}/revoke"),
        "jwks_uri": format!("{base}/jwks"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "id_token_signing_alg_values_supported": ["RS256"],
        "response_types_supported": ["code", "token"],
        "scopes_supported": ["openid", "profile"],
        "subject_types_supported": ["public"],
    })
    .to_string()
}

pub(crate) fn discovery_response(base: &str, max_age: Option<u64>) -> HttpResponse {
    let mut response = json_response(StatusCode::OK, &discovery_body(base));
    if let Some(max_age) = max_age {
        let value = format!("public, max-age={max_age}");
        response
            .headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_str(&value).unwrap());
    }
    response
}

/// An unsigned compact JWT carrying `claims` as its payload
pub(crate) fn id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
