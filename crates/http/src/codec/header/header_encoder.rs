//! Encoder for HTTP/1.1 request heads.
//!
//! Writes the request line in origin form followed by the header fields. `Host`
//! and the body framing headers are filled in from the request itself when the
//! caller did not set them.

use bytes::{BufMut, BytesMut};
use http::{header, HeaderValue, Method, Version};
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{HttpRequest, SendError};

/// Initial buffer size allocated for head serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encodes the head of an [`HttpRequest`]; the body is written by the caller.
#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<&HttpRequest> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, request: &HttpRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        match request.version() {
            Version::HTTP_11 => {
                write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", request.method().as_str(), request.request_target())?;
            }
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::UnsupportedVersion(v));
            }
        }

        let headers = request.headers();

        if !headers.contains_key(header::HOST) {
            let authority = request.authority().ok_or_else(|| SendError::invalid_uri("request uri has no authority"))?;
            put_header(dst, header::HOST.as_str().as_bytes(), authority.as_str().as_bytes());
        }

        let body_len = request.body_bytes().len();
        let method_has_body = matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH);
        if !headers.contains_key(header::CONTENT_LENGTH) && (body_len > 0 || method_has_body) {
            let value = HeaderValue::from(body_len);
            put_header(dst, header::CONTENT_LENGTH.as_str().as_bytes(), value.as_bytes());
        }

        for (header_name, header_value) in headers.iter() {
            put_header(dst, header_name.as_str().as_bytes(), header_value.as_bytes());
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[inline]
fn put_header(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.put_slice(name);
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

/// `io::Write` over a `BytesMut` that has already reserved its space.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
