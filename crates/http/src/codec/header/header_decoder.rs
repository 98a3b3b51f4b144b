//! Decoder for HTTP/1.x response heads.
//!
//! Parses the status line and header fields with `httparse`, then works out how
//! the body that follows is framed (RFC 9112 section 6.3).
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Response, StatusCode};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, ResponseHeader};

/// Maximum number of headers allowed in a response
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire head section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a [`ResponseHeader`] and the [`PayloadSize`] of the body behind it.
///
/// Whether a body may follow depends on the request, so the decoder is told about
/// `HEAD` requests through [`HeaderDecoder::expect_body`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderDecoder {
    expect_body: bool,
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self { expect_body: true }
    }
}

impl HeaderDecoder {
    /// `false` when the request was a `HEAD`: the response never has a body then.
    pub fn expect_body(&mut self, expect_body: bool) {
        self.expect_body = expect_body;
    }
}

impl Decoder for HeaderDecoder {
    type Item = (ResponseHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest possible head is "HTTP/1.1 200\r\n\r\n"
        if src.len() < 16 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut resp = httparse::Response::new(&mut headers);

        let parsed_result = resp.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, "parsed response head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match resp.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            _ => return Err(ParseError::InvalidVersion(resp.version)),
        };

        let status = resp
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or(ParseError::InvalidStatus(resp.code))?;

        let mut builder = Response::builder().status(status).version(version);
        if let Some(header_map) = builder.headers_mut() {
            header_map.reserve(resp.headers.len());
            for header in resp.headers.iter() {
                let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
                header_map.append(name, value);
            }
        }

        let header = ResponseHeader::from(builder.body(()).map_err(ParseError::invalid_header)?);
        let _ = src.split_to(body_offset);

        let payload_size = if self.expect_body { parse_payload(&header)? } else { PayloadSize::Empty };
        Ok(Some((header, payload_size)))
    }
}

/// Determines how the response body is framed.
///
/// - no body for `1xx`, `204` and `304`
/// - chunked when `chunked` is the final transfer coding
/// - read until close for any other transfer coding, or when no length is given
/// - `Content-Length` otherwise
fn parse_payload(header: &ResponseHeader) -> Result<PayloadSize, ParseError> {
    if header.forbids_body() {
        return Ok(PayloadSize::Empty);
    }

    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (Some(te_value), _) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (None, None) => Ok(PayloadSize::UntilClose),
    }
}

/// `chunked` must be the last transfer coding when it is applied.
fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
