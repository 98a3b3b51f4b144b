//! Request adaptation and retry.
//!
//! An [`Interceptor`] gets two hooks into every request: [`adapt`](Interceptor::adapt)
//! rewrites the request before each attempt, and [`retry`](Interceptor::retry)
//! decides what happens after an attempt failed. [`Interceptors`] chains several
//! of them.

mod closure;
mod retry_policy;

pub use closure::{AdapterFn, RetrierFn, adapter_fn, retrier_fn};
pub use retry_policy::RetryPolicy;

use crate::error::{BoxError, StreamError};
use crate::request::StreamRequest;
use async_trait::async_trait;
use micro_stream_http::protocol::HttpRequest;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What to do after an attempt failed.
#[derive(Debug)]
pub enum RetryDecision {
    /// Finish with the attempt's error.
    DoNotRetry,
    /// Start the next attempt right away.
    Retry,
    /// Start the next attempt once the delay has passed.
    RetryWithDelay(Duration),
    /// Stop, reporting this error alongside the one that caused the attempt to fail.
    DoNotRetryWithError(BoxError),
}

impl RetryDecision {
    /// How long to wait before the next attempt, if any.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::RetryWithDelay(delay) => Some(*delay),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Rewrites the request for the next attempt. Every attempt starts from the
    /// request the session was given, never from an earlier adaptation.
    async fn adapt(&self, request: HttpRequest, _stream_request: &StreamRequest) -> Result<HttpRequest, BoxError> {
        Ok(request)
    }

    /// Decides what follows a failed attempt. Adaptation, transport and
    /// validation failures all end up here; decoding errors never do.
    async fn retry(&self, _request: &StreamRequest, _error: &StreamError) -> RetryDecision {
        RetryDecision::DoNotRetry
    }
}

#[async_trait]
impl<I: Interceptor + ?Sized> Interceptor for Arc<I> {
    async fn adapt(&self, request: HttpRequest, stream_request: &StreamRequest) -> Result<HttpRequest, BoxError> {
        (**self).adapt(request, stream_request).await
    }

    async fn retry(&self, request: &StreamRequest, error: &StreamError) -> RetryDecision {
        (**self).retry(request, error).await
    }
}

/// An ordered chain of interceptors.
///
/// Adaptation runs through every interceptor in order, each one receiving the
/// previous one's output. Retry asks each interceptor in order and stops at the
/// first vote other than [`RetryDecision::DoNotRetry`].
pub struct Interceptors {
    inner: Vec<Arc<dyn Interceptor>>,
}

#[async_trait]
impl Interceptor for Interceptors {
    async fn adapt(&self, request: HttpRequest, stream_request: &StreamRequest) -> Result<HttpRequest, BoxError> {
        let mut request = request;
        for interceptor in &self.inner {
            request = interceptor.adapt(request, stream_request).await?;
        }
        Ok(request)
    }

    async fn retry(&self, request: &StreamRequest, error: &StreamError) -> RetryDecision {
        for interceptor in &self.inner {
            match interceptor.retry(request, error).await {
                RetryDecision::DoNotRetry => {}
                decision => return decision,
            }
        }
        RetryDecision::DoNotRetry
    }
}

impl Interceptors {
    pub fn builder() -> InterceptorsBuilder {
        InterceptorsBuilder::new()
    }
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors").field("len", &self.inner.len()).finish()
    }
}

#[derive(Default)]
pub struct InterceptorsBuilder {
    inner: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorsBuilder {
    fn new() -> Self {
        Self { inner: vec![] }
    }

    /// Appends `interceptor`; it adapts after, and votes after, every one added so far.
    pub fn add_last<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.inner.push(Arc::new(interceptor));
        self
    }

    /// Prepends `interceptor`, ahead of every one added so far.
    pub fn add_first<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.inner.insert(0, Arc::new(interceptor));
        self
    }

    pub(crate) fn add_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.inner.push(interceptor);
        self
    }

    pub fn build(self) -> Interceptors {
        Interceptors { inner: self.inner }
    }
}

impl fmt::Debug for InterceptorsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorsBuilder").field("len", &self.inner.len()).finish()
    }
}
