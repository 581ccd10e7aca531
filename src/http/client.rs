//! Client side of the bridge: issue one HTTP request over a peer stream.
//!
//! The dialing peer writes a plain HTTP/1.1 request onto the stream and reads
//! the response back off it. Used by tools and tests that talk to a bridge.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::BridgeError;
use crate::http::framing::{self, BodyFraming, FramingError};
use crate::http::request::MAX_HEADERS;

/// Bounds for reading a response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ResponseLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Serializes a request in origin-form.
///
/// Adds `Host` from the URI authority when missing, and `Content-Length`
/// for a non-empty body without explicit framing.
pub fn encode_request(req: &Request<Bytes>) -> Bytes {
    let mut out = BytesMut::with_capacity(256 + req.body().len());
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");
    let version = if req.version() == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    out.put_slice(format!("{} {} {}\r\n", req.method(), target, version).as_bytes());

    let headers = req.headers();
    for (name, value) in headers {
        put_header(&mut out, name, value);
    }
    if !headers.contains_key(header::HOST) {
        if let Some(Ok(host)) = req
            .uri()
            .authority()
            .map(|a| HeaderValue::from_str(a.as_str()))
        {
            put_header(&mut out, &header::HOST, &host);
        }
    }
    if !req.body().is_empty()
        && !headers.contains_key(header::CONTENT_LENGTH)
        && !headers.contains_key(header::TRANSFER_ENCODING)
    {
        put_header(&mut out, &header::CONTENT_LENGTH, &HeaderValue::from(req.body().len()));
    }
    out.put_slice(b"\r\n");
    out.put_slice(req.body());
    out.freeze()
}

fn put_header(out: &mut BytesMut, name: &HeaderName, value: &HeaderValue) {
    out.put_slice(name.as_str().as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}

/// Sends `req` over `stream` and reads back one response.
pub async fn fetch<S>(stream: &mut S, req: Request<Bytes>) -> Result<Response<Bytes>, BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fetch_with_limits(stream, req, &ResponseLimits::default()).await
}

pub async fn fetch_with_limits<S>(
    stream: &mut S,
    req: Request<Bytes>,
    limits: &ResponseLimits,
) -> Result<Response<Bytes>, BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let wire = encode_request(&req);
    stream
        .write_all(&wire)
        .await
        .map_err(BridgeError::WriteFailure)?;
    stream.flush().await.map_err(BridgeError::WriteFailure)?;

    let mut buf = BytesMut::new();
    let (status, headers) =
        framing::read_head(stream, &mut buf, limits.max_header_bytes, parse_response_head)
            .await
            .map_err(malformed_response)?;

    let body_framing = if req.method() == Method::HEAD {
        BodyFraming::Empty
    } else {
        framing::response_framing(status, &headers).map_err(malformed_response)?
    };
    let body = framing::read_body(stream, &mut buf, body_framing, limits.max_body_bytes)
        .await
        .map_err(malformed_response)?;

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(usize, (StatusCode, HeaderMap))>, String> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);
    let len = match resp
        .parse(buf)
        .map_err(|e| format!("invalid response head: {e}"))?
    {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };
    let status = resp
        .code
        .ok_or("missing status code")
        .and_then(|c| StatusCode::from_u16(c).map_err(|_| "invalid status code"))?;

    let mut map = HeaderMap::with_capacity(resp.headers.len());
    for h in resp.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| format!("invalid header name {:?}", h.name))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| format!("invalid value for header {}", h.name))?;
        map.append(name, value);
    }
    Ok(Some((len, (status, map))))
}

fn malformed_response(err: FramingError) -> BridgeError {
    BridgeError::MalformedResponse(err.to_string())
}
