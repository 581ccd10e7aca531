//! Request decoding.
//!
//! # Responsibilities
//! - Read exactly one HTTP/1.1 request (request line, headers, body) off a stream
//! - Enforce header-section and body size limits
//! - Report every failure as `BridgeError::MalformedRequest`
//!
//! # Design Decisions
//! - The body is fully buffered; the forwarding handler gets `Request<Bytes>`
//! - Chunked bodies are de-chunked and re-labelled with Content-Length
//! - The decoder never closes the stream

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Uri, Version};
use tokio::io::AsyncRead;

use crate::error::BridgeError;
use crate::http::framing::{self, BodyFraming, FramingError};

/// A request decoded from a peer stream.
pub type DecodedRequest = Request<Bytes>;

/// Maximum number of header fields in a request head.
pub const MAX_HEADERS: usize = 64;

/// Size bounds applied while decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: 8192,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Parsed request head, before the body is read.
#[derive(Debug)]
struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

/// Reads one request from `reader`.
///
/// I/O errors, including timeouts raised by the transport, surface as
/// `MalformedRequest`.
pub async fn decode_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &DecodeLimits,
) -> Result<DecodedRequest, BridgeError> {
    let mut buf = BytesMut::new();
    let head = framing::read_head(reader, &mut buf, limits.max_header_bytes, parse_head)
        .await
        .map_err(into_bridge_error)?;

    let body_framing = framing::request_framing(&head.headers).map_err(into_bridge_error)?;
    let body = framing::read_body(reader, &mut buf, body_framing, limits.max_body_bytes)
        .await
        .map_err(into_bridge_error)?;

    let mut headers = head.headers;
    if body_framing == BodyFraming::Chunked {
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    let mut request = Request::new(body);
    *request.method_mut() = head.method;
    *request.uri_mut() = head.uri;
    *request.version_mut() = head.version;
    *request.headers_mut() = headers;
    Ok(request)
}

fn parse_head(buf: &[u8]) -> Result<Option<(usize, RequestHead)>, String> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let len = match req.parse(buf).map_err(|e| format!("invalid request head: {e}"))? {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };

    let method = req
        .method
        .ok_or("missing method")?
        .parse::<Method>()
        .map_err(|e| format!("invalid method: {e}"))?;
    let uri = req
        .path
        .ok_or("missing request target")?
        .parse::<Uri>()
        .map_err(|e| format!("invalid request target: {e}"))?;
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        other => return Err(format!("unsupported http version {other:?}")),
    };

    let mut header_map = HeaderMap::with_capacity(req.headers.len());
    for h in req.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| format!("invalid header name {:?}", h.name))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| format!("invalid value for header {}", h.name))?;
        header_map.append(name, value);
    }

    Ok(Some((
        len,
        RequestHead {
            method,
            uri,
            version,
            headers: header_map,
        },
    )))
}

fn into_bridge_error(err: FramingError) -> BridgeError {
    match err {
        FramingError::Io(e) => BridgeError::from_read(e),
        other => BridgeError::malformed(other.to_string()),
    }
}
