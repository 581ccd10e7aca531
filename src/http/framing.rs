//! HTTP/1.1 message framing shared by the request decoder and the client.
//!
//! Bytes are accumulated in a `BytesMut` owned by the caller so that a head
//! parser and the body reader consume from the same buffer.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderMap};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4 * 1024;
/// Upper bound for a chunk-size line or a trailer line.
const MAX_LINE: usize = 4 * 1024;

/// Why a message could not be framed.
#[derive(Debug)]
pub(crate) enum FramingError {
    Io(io::Error),
    UnexpectedEof,
    TooLarge(&'static str),
    Invalid(String),
}

impl std::fmt::Display for FramingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FramingError::Io(e) => write!(f, "read failed: {}", e),
            FramingError::UnexpectedEof => write!(f, "stream ended before message was complete"),
            FramingError::TooLarge(what) => write!(f, "{} exceeds limit", what),
            FramingError::Invalid(reason) => write!(f, "{}", reason),
        }
    }
}

/// How the body of a message is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
    UntilEof,
}

/// Reads more bytes into `buf`. Returns 0 at end of stream.
pub(crate) async fn fill<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<usize, FramingError> {
    buf.reserve(READ_CHUNK);
    reader.read_buf(buf).await.map_err(FramingError::Io)
}

/// Buffers until `parse` recognizes a complete head, then drops the head bytes.
///
/// `parse` returns `Ok(None)` while the head is incomplete and
/// `Ok(Some((head_len, value)))` once it is complete.
pub(crate) async fn read_head<R, T, F>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_head: usize,
    mut parse: F,
) -> Result<T, FramingError>
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> Result<Option<(usize, T)>, String>,
{
    loop {
        if !buf.is_empty() {
            if let Some((len, value)) = parse(&buf[..]).map_err(FramingError::Invalid)? {
                if len > max_head {
                    return Err(FramingError::TooLarge("header section"));
                }
                buf.advance(len);
                return Ok(value);
            }
        }
        if buf.len() >= max_head {
            return Err(FramingError::TooLarge("header section"));
        }
        if fill(reader, buf).await? == 0 {
            return Err(FramingError::UnexpectedEof);
        }
    }
}

/// Body framing of a request: chunked, then Content-Length, else no body.
pub(crate) fn request_framing(headers: &HeaderMap) -> Result<BodyFraming, FramingError> {
    if let Some(chunked) = transfer_encoding_is_chunked(headers) {
        if !chunked {
            return Err(FramingError::Invalid(
                "unsupported transfer-encoding on request".to_string(),
            ));
        }
        return Ok(BodyFraming::Chunked);
    }
    match content_length(headers)? {
        Some(0) | None => Ok(BodyFraming::Empty),
        Some(n) => Ok(BodyFraming::Length(n)),
    }
}

/// Body framing of a response to a request that was not HEAD.
pub(crate) fn response_framing(
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<BodyFraming, FramingError> {
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::RESET_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyFraming::Empty);
    }
    match transfer_encoding_is_chunked(headers) {
        Some(true) => return Ok(BodyFraming::Chunked),
        Some(false) => return Ok(BodyFraming::UntilEof),
        None => {}
    }
    match content_length(headers)? {
        Some(0) => Ok(BodyFraming::Empty),
        Some(n) => Ok(BodyFraming::Length(n)),
        None => Ok(BodyFraming::UntilEof),
    }
}

/// `None` without a Transfer-Encoding header, otherwise whether the final coding is chunked.
fn transfer_encoding_is_chunked(headers: &HeaderMap) -> Option<bool> {
    let values: Vec<_> = headers.get_all(header::TRANSFER_ENCODING).iter().collect();
    let last = values.last()?;
    let last_coding = last
        .to_str()
        .ok()
        .and_then(|v| v.rsplit(',').next())
        .map(|v| v.trim().eq_ignore_ascii_case("chunked"));
    Some(last_coding.unwrap_or(false))
}

/// Parses Content-Length; repeated values must all agree.
pub(crate) fn content_length(headers: &HeaderMap) -> Result<Option<u64>, FramingError> {
    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let value = value
            .to_str()
            .map_err(|_| FramingError::Invalid("non-ascii content-length".to_string()))?;
        for part in value.split(',') {
            let part = part.trim();
            // 1*DIGIT only; `u64::from_str` would also take a leading '+'.
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(FramingError::Invalid(format!(
                    "invalid content-length {:?}",
                    part
                )));
            }
            let n: u64 = part.parse().map_err(|_| {
                FramingError::Invalid(format!("invalid content-length {:?}", part))
            })?;
            match length {
                Some(prev) if prev != n => {
                    return Err(FramingError::Invalid(
                        "conflicting content-length values".to_string(),
                    ))
                }
                _ => length = Some(n),
            }
        }
    }
    Ok(length)
}

/// Reads a complete body according to `framing`, consuming from `buf` first.
pub(crate) async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
    framing: BodyFraming,
    max_body: usize,
) -> Result<Bytes, FramingError> {
    match framing {
        BodyFraming::Empty => Ok(Bytes::new()),
        BodyFraming::Length(n) => {
            let n = usize::try_from(n)
                .ok()
                .filter(|n| *n <= max_body)
                .ok_or(FramingError::TooLarge("body"))?;
            while buf.len() < n {
                if fill(reader, buf).await? == 0 {
                    return Err(FramingError::UnexpectedEof);
                }
            }
            Ok(buf.split_to(n).freeze())
        }
        BodyFraming::Chunked => read_chunked(reader, buf, max_body).await,
        BodyFraming::UntilEof => {
            while fill(reader, buf).await? > 0 {
                if buf.len() > max_body {
                    return Err(FramingError::TooLarge("body"));
                }
            }
            Ok(buf.split().freeze())
        }
    }
}

async fn read_chunked<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_body: usize,
) -> Result<Bytes, FramingError> {
    let mut body = BytesMut::new();
    loop {
        let size = loop {
            match httparse::parse_chunk_size(&buf[..]) {
                Ok(httparse::Status::Complete((consumed, size))) => {
                    buf.advance(consumed);
                    break size;
                }
                Ok(httparse::Status::Partial) => {
                    if buf.len() > MAX_LINE {
                        return Err(FramingError::TooLarge("chunk size line"));
                    }
                    if fill(reader, buf).await? == 0 {
                        return Err(FramingError::UnexpectedEof);
                    }
                }
                Err(_) => return Err(FramingError::Invalid("invalid chunk size".to_string())),
            }
        };

        if size == 0 {
            skip_trailers(reader, buf).await?;
            return Ok(body.freeze());
        }

        let size = usize::try_from(size)
            .ok()
            .filter(|s| body.len().saturating_add(*s) <= max_body)
            .ok_or(FramingError::TooLarge("body"))?;
        while buf.len() < size + 2 {
            if fill(reader, buf).await? == 0 {
                return Err(FramingError::UnexpectedEof);
            }
        }
        body.extend_from_slice(&buf[..size]);
        if &buf[size..size + 2] != b"\r\n" {
            return Err(FramingError::Invalid("chunk not terminated by CRLF".to_string()));
        }
        buf.advance(size + 2);
    }
}

/// Discards trailer fields up to and including the terminating empty line.
async fn skip_trailers<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
) -> Result<(), FramingError> {
    loop {
        match buf.windows(2).position(|w| w == b"\r\n") {
            Some(0) => {
                buf.advance(2);
                return Ok(());
            }
            Some(end) => buf.advance(end + 2),
            None => {
                if buf.len() > MAX_LINE {
                    return Err(FramingError::TooLarge("trailer line"));
                }
                if fill(reader, buf).await? == 0 {
                    return Err(FramingError::UnexpectedEof);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    async fn body_of(raw: &'static [u8], framing: BodyFraming) -> Result<Bytes, FramingError> {
        let mut reader = raw;
        let mut buf = BytesMut::new();
        read_body(&mut reader, &mut buf, framing, 1024).await
    }

    #[tokio::test]
    async fn chunked_body_with_trailers() {
        let body = body_of(
            b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nExpires: never\r\n\r\n",
            BodyFraming::Chunked,
        )
        .await
        .unwrap();
        assert_eq!(&body[..], b"Wikipedia");
    }

    #[tokio::test]
    async fn chunked_body_missing_crlf() {
        let err = body_of(b"4\r\nWikiXX0\r\n\r\n", BodyFraming::Chunked)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::Invalid(_)));
    }

    #[tokio::test]
    async fn length_body_truncated() {
        let err = body_of(b"abc", BodyFraming::Length(10)).await.unwrap_err();
        assert!(matches!(err, FramingError::UnexpectedEof));
    }

    #[tokio::test]
    async fn length_over_limit() {
        let err = body_of(b"", BodyFraming::Length(4096)).await.unwrap_err();
        assert!(matches!(err, FramingError::TooLarge(_)));
    }

    #[tokio::test]
    async fn until_eof_reads_everything() {
        let body = body_of(b"all of it", BodyFraming::UntilEof).await.unwrap();
        assert_eq!(&body[..], b"all of it");
    }

    #[test]
    fn conflicting_content_lengths() {
        let mut headers = HeaderMap::new();
        headers.append(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        headers.append(header::CONTENT_LENGTH, HeaderValue::from_static("6"));
        assert!(content_length(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.append(header::CONTENT_LENGTH, HeaderValue::from_static("5, 5"));
        assert_eq!(content_length(&headers).unwrap(), Some(5));
    }

    #[test]
    fn content_length_is_digits_only() {
        for bad in ["+3", "-1", "", " ", "3x", "0x10"] {
            let mut headers = HeaderMap::new();
            headers.append(header::CONTENT_LENGTH, HeaderValue::from_str(bad).unwrap());
            assert!(
                matches!(content_length(&headers), Err(FramingError::Invalid(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn head_completed_past_limit_is_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(1500));
        raw.extend_from_slice(b"\r\n\r\n");
        let mut reader = &raw[..];
        let mut buf = BytesMut::new();
        let err = read_head(&mut reader, &mut buf, 1024, |b| {
            let mut headers = [httparse::EMPTY_HEADER; 4];
            match httparse::Request::new(&mut headers).parse(b) {
                Ok(httparse::Status::Complete(len)) => Ok(Some((len, ()))),
                Ok(httparse::Status::Partial) => Ok(None),
                Err(e) => Err(e.to_string()),
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, FramingError::TooLarge("header section")));
    }

    #[test]
    fn response_framing_rules() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            response_framing(StatusCode::NO_CONTENT, &headers).unwrap(),
            BodyFraming::Empty
        );
        assert_eq!(
            response_framing(StatusCode::OK, &headers).unwrap(),
            BodyFraming::UntilEof
        );
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("gzip, chunked"));
        assert_eq!(
            response_framing(StatusCode::OK, &headers).unwrap(),
            BodyFraming::Chunked
        );
    }

    #[test]
    fn request_rejects_unknown_transfer_coding() {
        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("gzip"));
        assert!(request_framing(&headers).is_err());
    }
}
