//! Outgoing HTTP request description.
//!
//! [`HttpRequest`] is an owned, cloneable request: unlike `http::Request` it can be
//! copied freely, so the untouched original can be handed to every adaptation
//! attempt while each attempt works on its own copy.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::uri::Authority;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::protocol::SendError;

/// An HTTP request ready to be adapted and sent.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, version: Version::HTTP_11, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Creates a `GET` request for `uri`.
    pub fn get<U>(uri: U) -> Result<Self, SendError>
    where
        U: TryInto<Uri>,
        U::Error: Into<http::Error>,
    {
        Self::with_method(Method::GET, uri)
    }

    /// Creates a `POST` request for `uri`.
    pub fn post<U>(uri: U) -> Result<Self, SendError>
    where
        U: TryInto<Uri>,
        U::Error: Into<http::Error>,
    {
        Self::with_method(Method::POST, uri)
    }

    pub fn with_method<U>(method: Method, uri: U) -> Result<Self, SendError>
    where
        U: TryInto<Uri>,
        U::Error: Into<http::Error>,
    {
        let uri = uri.try_into().map_err(|e| SendError::invalid_uri(e.into()))?;
        Ok(Self::new(method, uri))
    }

    /// Appends a header, returning the request for chaining.
    pub fn header<K, V>(mut self, name: K, value: V) -> Result<Self, SendError>
    where
        K: TryInto<HeaderName>,
        K::Error: Into<http::Error>,
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        let name = name.try_into().map_err(|e| SendError::invalid_header(e.into()))?;
        let value = value.try_into().map_err(|e| SendError::invalid_header(e.into()))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Replaces the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn uri_mut(&mut self) -> &mut Uri {
        &mut self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// The `host[:port]` authority of an absolute request URI.
    pub fn authority(&self) -> Option<&Authority> {
        self.uri.authority()
    }

    /// The origin-form target written on the request line, e.g. `/stream/1?x=y`.
    pub fn request_target(&self) -> &str {
        self.uri.path_and_query().map_or("/", |path_and_query| path_and_query.as_str())
    }

    /// Whether a response to this request can carry a body at all.
    pub fn expects_response_body(&self) -> bool {
        self.method != Method::HEAD
    }
}

impl From<HttpRequest> for Request<Bytes> {
    fn from(request: HttpRequest) -> Self {
        let mut builder = Request::builder().method(request.method).uri(request.uri).version(request.version);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        // every part was validated when the HttpRequest was built
        builder.body(request.body).unwrap_or_default()
    }
}

impl From<Request<Bytes>> for HttpRequest {
    fn from(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self { method: parts.method, uri: parts.uri, version: parts.version, headers: parts.headers, body }
    }
}
