//! HTTP and DNS primitives behind traits, so the state machines never touch
//! sockets directly and tests can substitute canned responses.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};

use crate::error::NetworkErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully prepared request (headers included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A completed exchange. Error statuses are still responses; classification
/// happens in the networking layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// URL that produced this response
    pub url: Url,
    pub status: u16,
    /// `Location` header, if any
    pub location: Option<String>,
    pub body: Vec<u8>,
}

/// The request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            NetworkErrorKind::ConnectionRefused
        } else {
            NetworkErrorKind::Transport
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>>;
}

pub trait HostResolver: Send + Sync {
    fn lookup(&self, host: String) -> BoxFuture<'static, io::Result<Vec<IpAddr>>>;
}

/// reqwest-backed transport. Redirects are not followed here; the networking
/// layer decides how to re-issue them.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .redirect(Policy::none())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub fn shared() -> Result<Arc<dyn HttpTransport>> {
        Ok(Arc::new(Self::new()?))
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        let client = self.client.clone();
        async move {
            let mut builder = match request.method {
                HttpMethod::Get => client.get(request.url),
                HttpMethod::Post => client.post(request.url).body(request.body),
            };
            for (name, value) in request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let url = response.url().clone();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?.to_vec();

            Ok::<_, TransportError>(HttpResponse {
                url,
                status,
                location,
                body,
            })
        }
        .boxed()
    }
}

/// System resolver via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioResolver;

impl HostResolver for TokioResolver {
    fn lookup(&self, host: String) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
        async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
            Ok::<_, io::Error>(ips)
        }
        .boxed()
    }
}
