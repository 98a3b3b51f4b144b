use crate::error::{StreamError, TransportError};
use crate::interceptor::{Interceptor, RetryDecision};
use crate::request::StreamRequest;
use async_trait::async_trait;
use http::Method;
use std::collections::HashSet;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Retries idempotent requests that failed for transient reasons, backing off
/// exponentially: the n-th retry waits `scale * base^n` seconds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_limit: usize,
    exponential_backoff_base: u32,
    exponential_backoff_scale: f64,
    retryable_methods: HashSet<Method>,
    retryable_status_codes: HashSet<u16>,
    retryable_io_error_kinds: HashSet<io::ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            exponential_backoff_base: 2,
            exponential_backoff_scale: 0.5,
            retryable_methods: [Method::DELETE, Method::GET, Method::HEAD, Method::OPTIONS, Method::PUT, Method::TRACE].into_iter().collect(),
            retryable_status_codes: [408, 500, 502, 503, 504].into_iter().collect(),
            retryable_io_error_kinds: [
                io::ErrorKind::ConnectionRefused,
                io::ErrorKind::ConnectionReset,
                io::ErrorKind::ConnectionAborted,
                io::ErrorKind::NotConnected,
                io::ErrorKind::BrokenPipe,
                io::ErrorKind::TimedOut,
                io::ErrorKind::UnexpectedEof,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    #[must_use]
    pub fn with_exponential_backoff(mut self, base: u32, scale: f64) -> Self {
        self.exponential_backoff_base = base;
        self.exponential_backoff_scale = scale;
        self
    }

    #[must_use]
    pub fn with_retryable_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.retryable_methods = methods.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_retryable_io_error_kinds(mut self, kinds: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        self.retryable_io_error_kinds = kinds.into_iter().collect();
        self
    }

    pub fn retry_limit(&self) -> usize {
        self.retry_limit
    }

    /// The wait before retry number `retry_count + 1`.
    pub fn delay(&self, retry_count: usize) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let seconds = f64::from(self.exponential_backoff_base).powi(exponent) * self.exponential_backoff_scale;
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    fn is_retryable_transport_error(&self, error: &TransportError) -> bool {
        error.is_timeout() || error.io_error().is_some_and(|e| self.retryable_io_error_kinds.contains(&e.kind()))
    }

    fn should_retry(&self, request: &StreamRequest, error: &StreamError) -> bool {
        if !self.retryable_methods.contains(request.initial_request().method()) {
            return false;
        }

        if let Some(status) = request.response().map(|response| response.status().as_u16()) {
            if self.retryable_status_codes.contains(&status) {
                return true;
            }
        }

        match error {
            StreamError::SessionTaskFailed { source } => self.is_retryable_transport_error(source),
            _ => false,
        }
    }
}

#[async_trait]
impl Interceptor for RetryPolicy {
    async fn retry(&self, request: &StreamRequest, error: &StreamError) -> RetryDecision {
        let retry_count = request.retry_count();
        if retry_count >= self.retry_limit || !self.should_retry(request, error) {
            return RetryDecision::DoNotRetry;
        }

        let delay = self.delay(retry_count);
        debug!(request_id = %request.id(), retry_count, ?delay, cause = %error, "retry policy schedules retry");
        RetryDecision::RetryWithDelay(delay)
    }
}
