use crate::error::{BoxError, StreamError};
use crate::interceptor::{Interceptor, RetryDecision};
use crate::request::StreamRequest;
use async_trait::async_trait;
use micro_stream_http::protocol::HttpRequest;
use std::fmt;

/// An interceptor that only adapts, built from an async closure.
pub struct AdapterFn<F> {
    f: F,
}

/// An interceptor that only decides retries, built from an async closure.
pub struct RetrierFn<F> {
    f: F,
}

/// ```
/// use micro_stream::interceptor::adapter_fn;
///
/// let interceptor = adapter_fn(|request: micro_stream::HttpRequest| async move {
///     request.header("authorization", "Bearer token").map_err(Into::into)
/// });
/// # let _ = interceptor;
/// ```
pub fn adapter_fn<F, Fut>(f: F) -> AdapterFn<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpRequest, BoxError>> + Send + 'static,
{
    AdapterFn { f }
}

pub fn retrier_fn<F, Fut>(f: F) -> RetrierFn<F>
where
    F: Fn(StreamRequest, StreamError) -> Fut + Send + Sync,
    Fut: Future<Output = RetryDecision> + Send + 'static,
{
    RetrierFn { f }
}

#[async_trait]
impl<F, Fut> Interceptor for AdapterFn<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HttpRequest, BoxError>> + Send + 'static,
{
    async fn adapt(&self, request: HttpRequest, _stream_request: &StreamRequest) -> Result<HttpRequest, BoxError> {
        (self.f)(request).await
    }
}

#[async_trait]
impl<F, Fut> Interceptor for RetrierFn<F>
where
    F: Fn(StreamRequest, StreamError) -> Fut + Send + Sync,
    Fut: Future<Output = RetryDecision> + Send + 'static,
{
    async fn retry(&self, request: &StreamRequest, error: &StreamError) -> RetryDecision {
        (self.f)(request.clone(), error.clone()).await
    }
}

impl<F> fmt::Debug for AdapterFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFn").finish_non_exhaustive()
    }
}

impl<F> fmt::Debug for RetrierFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrierFn").finish_non_exhaustive()
    }
}
