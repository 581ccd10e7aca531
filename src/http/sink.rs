//! In-memory response capture.
//!
//! [`ResponseSink`] stands in for a live HTTP connection so that an ordinary
//! handler can set a status, headers and body without a socket behind it.
//! Nothing here performs I/O.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

/// A complete response, captured in memory and ready to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    /// A response with no headers and no body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Write side of a response, as seen by a forwarding handler.
///
/// The first body write commits the response: the status (200 unless set
/// earlier) and a snapshot of the headers are fixed from then on.
#[derive(Debug, Default)]
pub struct ResponseSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code. Ignored once the response is committed.
    pub fn set_status(&mut self, status: StatusCode) {
        if let Some((committed, _)) = &self.committed {
            tracing::debug!(
                committed = %committed,
                ignored = %status,
                "status set after body write, ignoring"
            );
            return;
        }
        self.status = Some(status);
    }

    pub fn status(&self) -> StatusCode {
        match &self.committed {
            Some((status, _)) => *status,
            None => self.status.unwrap_or(StatusCode::OK),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable header access. Edits made after the first body write are not sent.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Appends body bytes, committing the response on first call.
    pub fn write_body(&mut self, data: &[u8]) -> usize {
        if self.committed.is_none() {
            let status = self.status.unwrap_or(StatusCode::OK);
            self.committed = Some((status, self.headers.clone()));
        }
        self.body.extend_from_slice(data);
        data.len()
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// Bytes written to the body so far.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Freezes everything captured so far. Consumes the sink.
    pub fn build(self) -> CapturedResponse {
        let (status, headers) = match self.committed {
            Some(committed) => committed,
            None => (self.status.unwrap_or(StatusCode::OK), self.headers),
        };
        CapturedResponse {
            status,
            headers,
            body: self.body.freeze(),
        }
    }
}

impl io::Write for ResponseSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_body(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{self, HeaderValue};
    use std::io::Write;

    #[test]
    fn defaults_to_200_with_empty_body() {
        let resp = ResponseSink::new().build();
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.headers.is_empty());
        assert!(resp.body.is_empty());
    }

    #[test]
    fn status_without_body_is_kept() {
        let mut sink = ResponseSink::new();
        sink.set_status(StatusCode::NO_CONTENT);
        assert_eq!(sink.build().status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn first_write_commits_default_status() {
        let mut sink = ResponseSink::new();
        sink.write_body(b"hello ");
        sink.set_status(StatusCode::NOT_FOUND);
        sink.write_body(b"world");
        assert!(sink.is_committed());
        assert_eq!(sink.status(), StatusCode::OK);

        let resp = sink.build();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(&resp.body[..], b"hello world");
    }

    #[test]
    fn headers_freeze_at_commit() {
        let mut sink = ResponseSink::new();
        sink.set_status(StatusCode::CREATED);
        sink.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        write!(sink, "id={}", 7).unwrap();
        sink.headers_mut()
            .insert("x-late", HeaderValue::from_static("dropped"));

        let resp = sink.build();
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.headers[header::CONTENT_TYPE], "text/plain");
        assert!(resp.headers.get("x-late").is_none());
        assert_eq!(&resp.body[..], b"id=7");
    }

    #[test]
    fn sinks_are_independent() {
        let mut a = ResponseSink::new();
        let mut b = ResponseSink::new();
        a.headers_mut().insert("x-a", HeaderValue::from_static("1"));
        a.write_body(b"a");
        b.write_body(b"b");
        let (a, b) = (a.build(), b.build());
        assert_eq!(&a.body[..], b"a");
        assert_eq!(&b.body[..], b"b");
        assert!(b.headers.get("x-a").is_none());
    }
}
