//! Single-host reverse proxy.
//!
//! # Responsibilities
//! - Rewrite the request URI scheme/authority and `Host` to the backend
//! - Strip hop-by-hop headers in both directions
//! - Forward through a hyper client and buffer the response into the sink
//!
//! # Design Decisions
//! - Path and query are kept as sent by the peer; the target's own path is ignored
//! - Backend errors map to 502, deadline overruns to 504
//! - Only plain `http` backends are supported

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use axum::body::Body;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{self, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::forward::Forward;
use crate::http::{DecodedRequest, ResponseSink};
use crate::security::headers::filter_hop_by_hop_headers;

/// Invalid forwarding target.
#[derive(Debug, Error)]
pub enum ProxyTargetError {
    #[error("proxy target must be set")]
    Missing,
    #[error("invalid proxy target: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("unsupported proxy target scheme {0:?}, only http is supported")]
    UnsupportedScheme(String),
    #[error("proxy target has no host")]
    MissingHost,
    #[error("invalid proxy target authority {0:?}")]
    InvalidAuthority(String),
}

/// Parsed backend location.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    authority: Authority,
    host_header: HeaderValue,
}

impl ProxyTarget {
    pub fn parse(target: &str) -> Result<Self, ProxyTargetError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ProxyTargetError::Missing);
        }
        let url = Url::parse(target)?;
        if url.scheme() != "http" {
            return Err(ProxyTargetError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(ProxyTargetError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let host_header = HeaderValue::from_str(&authority)
            .map_err(|_| ProxyTargetError::InvalidAuthority(authority.clone()))?;
        let authority = Authority::from_str(&authority)
            .map_err(|_| ProxyTargetError::InvalidAuthority(authority.clone()))?;
        Ok(Self {
            authority,
            host_header,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }
}

/// Failure talking to the backend.
#[derive(Debug, Error)]
enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("reading body failed: {0}")]
    Body(#[from] axum::Error),
}

/// Forwards every request to one HTTP backend.
#[derive(Clone)]
pub struct ReverseProxy {
    client: Client<HttpConnector, Body>,
    target: ProxyTarget,
    timeout: Duration,
    max_response_bytes: usize,
}

impl fmt::Debug for ReverseProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverseProxy")
            .field("target", &self.target.authority.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReverseProxy {
    /// Create a proxy for the configured upstream.
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyTargetError> {
        let target = ProxyTarget::parse(&config.target)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            client,
            target,
            timeout: config.timeout(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn target(&self) -> &ProxyTarget {
        &self.target
    }

    /// Rewrites `req` so it is addressed to the backend.
    fn rewrite(&self, req: DecodedRequest) -> Result<Request<Body>, http::Error> {
        let (mut parts, body) = req.into_parts();
        filter_hop_by_hop_headers(&mut parts.headers);

        let mut uri_parts = parts.uri.into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(self.target.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        parts.uri = Uri::from_parts(uri_parts)?;
        parts
            .headers
            .insert(header::HOST, self.target.host_header.clone());

        Ok(Request::from_parts(parts, Body::from(body)))
    }

    async fn round_trip(
        &self,
        req: Request<Body>,
    ) -> Result<(http::response::Parts, Bytes), UpstreamError> {
        let response: Response<Incoming> = self.client.request(req).await?;
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes).await?;
        Ok((parts, body))
    }

    async fn proxy(&self, req: DecodedRequest, sink: &mut ResponseSink) {
        let start_time = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let req = match self.rewrite(req) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(method = %method, path = %path, error = %e, "Failed to rewrite request");
                sink.set_status(StatusCode::BAD_GATEWAY);
                return;
            }
        };

        tracing::debug!(
            method = %method,
            path = %path,
            backend = %self.target.authority,
            "Proxying request"
        );

        match tokio::time::timeout(self.timeout, self.round_trip(req)).await {
            Ok(Ok((mut parts, body))) => {
                filter_hop_by_hop_headers(&mut parts.headers);
                tracing::debug!(
                    method = %method,
                    path = %path,
                    status = %parts.status,
                    body_len = body.len(),
                    elapsed = ?start_time.elapsed(),
                    "Upstream responded"
                );
                sink.set_status(parts.status);
                *sink.headers_mut() = parts.headers;
                if !body.is_empty() {
                    sink.write_body(&body);
                }
            }
            Ok(Err(e)) => {
                tracing::error!(method = %method, path = %path, error = %e, "Upstream error");
                sink.set_status(StatusCode::BAD_GATEWAY);
            }
            Err(_) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    timeout = ?self.timeout,
                    "Upstream timed out"
                );
                sink.set_status(StatusCode::GATEWAY_TIMEOUT);
            }
        }
    }
}

impl Forward for ReverseProxy {
    fn forward<'a>(&'a self, req: DecodedRequest, sink: &'a mut ResponseSink) -> BoxFuture<'a, ()> {
        Box::pin(self.proxy(req, sink))
    }
}
