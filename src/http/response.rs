//! Response encoding.
//!
//! # Responsibilities
//! - Serialize a `CapturedResponse` as HTTP/1.1 onto the stream
//! - Always frame with Content-Length, never chunked
//! - Emit headers in a deterministic order
//!
//! # Design Decisions
//! - The body is already fully buffered, so Transfer-Encoding is dropped
//! - Header names are written in canonical Title-Case
//! - Any write error is returned as `WriteFailure`; nothing panics

use bytes::{BufMut, BytesMut};
use http::header::{self, HeaderValue};
use http::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::BridgeError;
use crate::http::sink::CapturedResponse;

/// Writes `resp` to `writer` and flushes.
pub async fn encode_response<W: AsyncWrite + Unpin>(
    resp: &CapturedResponse,
    writer: &mut W,
) -> Result<(), BridgeError> {
    let head = encode_head(resp);
    writer
        .write_all(&head)
        .await
        .map_err(BridgeError::WriteFailure)?;
    writer
        .write_all(&resp.body)
        .await
        .map_err(BridgeError::WriteFailure)?;
    writer.flush().await.map_err(BridgeError::WriteFailure)
}

/// Status line, headers and the blank line that ends the head.
pub fn encode_head(resp: &CapturedResponse) -> BytesMut {
    let mut out = BytesMut::with_capacity(256);
    out.put_slice(status_line(resp.status).as_bytes());

    let mut headers = resp.headers.clone();
    headers.remove(header::TRANSFER_ENCODING);
    if !headers.contains_key(header::CONTENT_LENGTH) && !is_bodiless(resp.status) {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(resp.body.len()));
    }

    let mut names: Vec<_> = headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for name in names {
        let canonical = canonical_name(name.as_str());
        for value in headers.get_all(name) {
            out.put_slice(canonical.as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_slice(b"\r\n");
        }
    }
    out.put_slice(b"\r\n");
    out
}

/// Statuses that never carry a body.
fn is_bodiless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP/1.1 {} {}\r\n", status.as_u16(), reason),
        None => format!("HTTP/1.1 {} status code {}\r\n", status.as_u16(), status.as_u16()),
    }
}

/// `content-length` -> `Content-Length`.
pub(crate) fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper = c == '-';
    }
    out
}
