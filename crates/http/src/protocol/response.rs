//! HTTP response head handling.
//!
//! The head is decoded before any body byte is read and is shared between every
//! consumer of a response, so it wraps an `http::Response<()>` and is usually held
//! behind an `Arc`.

use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};

/// Status line and headers of an HTTP response.
#[derive(Debug)]
pub struct ResponseHeader {
    inner: Response<()>,
}

impl AsRef<Response<()>> for ResponseHeader {
    fn as_ref(&self) -> &Response<()> {
        &self.inner
    }
}

impl ResponseHeader {
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// The parsed `Content-Type`, if present and well formed.
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers().get(http::header::CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    /// Informational (`1xx`) heads precede the final response and carry no body.
    pub fn is_informational(&self) -> bool {
        self.status().is_informational()
    }

    /// Whether the status code forbids a response body, regardless of headers.
    pub fn forbids_body(&self) -> bool {
        let status = self.status();
        status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
    }
}

impl From<Parts> for ResponseHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Response::from_parts(parts, ()) }
    }
}

impl From<Response<()>> for ResponseHeader {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}
