use crate::error::StreamError;
use crate::monitor::EventMonitor;
use crate::request::StreamRequest;
use crate::transport::{AuthChallenge, TaskId, TaskMetrics};
use bytes::Bytes;
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::fmt;

type Hook<F> = Option<Box<F>>;

/// A monitor assembled from closures, one optional closure per event.
///
/// ```
/// use micro_stream::monitor::ClosureEventMonitor;
///
/// let monitor = ClosureEventMonitor::new()
///     .on_request_did_finish(|request| println!("{} finished", request.id()));
/// # let _ = monitor;
/// ```
#[derive(Default)]
pub struct ClosureEventMonitor {
    task_did_receive_challenge: Hook<dyn Fn(&StreamRequest, TaskId, &AuthChallenge) + Send + Sync>,
    task_did_finish_collecting_metrics: Hook<dyn Fn(&StreamRequest, TaskId, &TaskMetrics) + Send + Sync>,
    data_task_did_receive_data: Hook<dyn Fn(&StreamRequest, TaskId, &Bytes) + Send + Sync>,
    data_task_will_cache_response: Hook<dyn Fn(&StreamRequest, TaskId, &ResponseHeader) + Send + Sync>,
    request_did_create_initial_request: Hook<dyn Fn(&StreamRequest, &HttpRequest) + Send + Sync>,
    request_did_adapt_request: Hook<dyn Fn(&StreamRequest, &HttpRequest, &HttpRequest) + Send + Sync>,
    request_did_fail_to_adapt_request: Hook<dyn Fn(&StreamRequest, &HttpRequest, &StreamError) + Send + Sync>,
    request_did_create_request: Hook<dyn Fn(&StreamRequest, &HttpRequest) + Send + Sync>,
    request_did_create_task: Hook<dyn Fn(&StreamRequest, TaskId) + Send + Sync>,
    request_did_resume_task: Hook<dyn Fn(&StreamRequest, TaskId) + Send + Sync>,
    request_did_cancel_task: Hook<dyn Fn(&StreamRequest, TaskId) + Send + Sync>,
    request_did_gather_metrics: Hook<dyn Fn(&StreamRequest, &TaskMetrics) + Send + Sync>,
    request_did_complete_task: Hook<dyn Fn(&StreamRequest, TaskId, Option<&StreamError>) + Send + Sync>,
    request_did_validate_response: Hook<dyn Fn(&StreamRequest, &HttpRequest, &ResponseHeader, Result<(), &StreamError>) + Send + Sync>,
    request_is_retrying: Hook<dyn Fn(&StreamRequest) + Send + Sync>,
    request_did_resume: Hook<dyn Fn(&StreamRequest) + Send + Sync>,
    request_did_cancel: Hook<dyn Fn(&StreamRequest) + Send + Sync>,
    request_did_finish: Hook<dyn Fn(&StreamRequest) + Send + Sync>,
}

impl ClosureEventMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_task_did_receive_challenge(mut self, f: impl Fn(&StreamRequest, TaskId, &AuthChallenge) + Send + Sync + 'static) -> Self {
        self.task_did_receive_challenge = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_task_did_finish_collecting_metrics(mut self, f: impl Fn(&StreamRequest, TaskId, &TaskMetrics) + Send + Sync + 'static) -> Self {
        self.task_did_finish_collecting_metrics = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_data_task_did_receive_data(mut self, f: impl Fn(&StreamRequest, TaskId, &Bytes) + Send + Sync + 'static) -> Self {
        self.data_task_did_receive_data = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_data_task_will_cache_response(mut self, f: impl Fn(&StreamRequest, TaskId, &ResponseHeader) + Send + Sync + 'static) -> Self {
        self.data_task_will_cache_response = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_create_initial_request(mut self, f: impl Fn(&StreamRequest, &HttpRequest) + Send + Sync + 'static) -> Self {
        self.request_did_create_initial_request = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_adapt_request(mut self, f: impl Fn(&StreamRequest, &HttpRequest, &HttpRequest) + Send + Sync + 'static) -> Self {
        self.request_did_adapt_request = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_fail_to_adapt_request(
        mut self,
        f: impl Fn(&StreamRequest, &HttpRequest, &StreamError) + Send + Sync + 'static,
    ) -> Self {
        self.request_did_fail_to_adapt_request = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_create_request(mut self, f: impl Fn(&StreamRequest, &HttpRequest) + Send + Sync + 'static) -> Self {
        self.request_did_create_request = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_create_task(mut self, f: impl Fn(&StreamRequest, TaskId) + Send + Sync + 'static) -> Self {
        self.request_did_create_task = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_resume_task(mut self, f: impl Fn(&StreamRequest, TaskId) + Send + Sync + 'static) -> Self {
        self.request_did_resume_task = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_cancel_task(mut self, f: impl Fn(&StreamRequest, TaskId) + Send + Sync + 'static) -> Self {
        self.request_did_cancel_task = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_gather_metrics(mut self, f: impl Fn(&StreamRequest, &TaskMetrics) + Send + Sync + 'static) -> Self {
        self.request_did_gather_metrics = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_complete_task(mut self, f: impl Fn(&StreamRequest, TaskId, Option<&StreamError>) + Send + Sync + 'static) -> Self {
        self.request_did_complete_task = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_validate_response(
        mut self,
        f: impl Fn(&StreamRequest, &HttpRequest, &ResponseHeader, Result<(), &StreamError>) + Send + Sync + 'static,
    ) -> Self {
        self.request_did_validate_response = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_is_retrying(mut self, f: impl Fn(&StreamRequest) + Send + Sync + 'static) -> Self {
        self.request_is_retrying = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_resume(mut self, f: impl Fn(&StreamRequest) + Send + Sync + 'static) -> Self {
        self.request_did_resume = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_cancel(mut self, f: impl Fn(&StreamRequest) + Send + Sync + 'static) -> Self {
        self.request_did_cancel = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_request_did_finish(mut self, f: impl Fn(&StreamRequest) + Send + Sync + 'static) -> Self {
        self.request_did_finish = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for ClosureEventMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureEventMonitor").finish_non_exhaustive()
    }
}

impl EventMonitor for ClosureEventMonitor {
    fn task_did_receive_challenge(&self, request: &StreamRequest, task: TaskId, challenge: &AuthChallenge) {
        if let Some(f) = &self.task_did_receive_challenge {
            f(request, task, challenge);
        }
    }

    fn task_did_finish_collecting_metrics(&self, request: &StreamRequest, task: TaskId, metrics: &TaskMetrics) {
        if let Some(f) = &self.task_did_finish_collecting_metrics {
            f(request, task, metrics);
        }
    }

    fn data_task_did_receive_data(&self, request: &StreamRequest, task: TaskId, data: &Bytes) {
        if let Some(f) = &self.data_task_did_receive_data {
            f(request, task, data);
        }
    }

    fn data_task_will_cache_response(&self, request: &StreamRequest, task: TaskId, response: &ResponseHeader) {
        if let Some(f) = &self.data_task_will_cache_response {
            f(request, task, response);
        }
    }

    fn request_did_create_initial_request(&self, request: &StreamRequest, initial: &HttpRequest) {
        if let Some(f) = &self.request_did_create_initial_request {
            f(request, initial);
        }
    }

    fn request_did_adapt_request(&self, request: &StreamRequest, initial: &HttpRequest, adapted: &HttpRequest) {
        if let Some(f) = &self.request_did_adapt_request {
            f(request, initial, adapted);
        }
    }

    fn request_did_fail_to_adapt_request(&self, request: &StreamRequest, initial: &HttpRequest, error: &StreamError) {
        if let Some(f) = &self.request_did_fail_to_adapt_request {
            f(request, initial, error);
        }
    }

    fn request_did_create_request(&self, request: &StreamRequest, http_request: &HttpRequest) {
        if let Some(f) = &self.request_did_create_request {
            f(request, http_request);
        }
    }

    fn request_did_create_task(&self, request: &StreamRequest, task: TaskId) {
        if let Some(f) = &self.request_did_create_task {
            f(request, task);
        }
    }

    fn request_did_resume_task(&self, request: &StreamRequest, task: TaskId) {
        if let Some(f) = &self.request_did_resume_task {
            f(request, task);
        }
    }

    fn request_did_cancel_task(&self, request: &StreamRequest, task: TaskId) {
        if let Some(f) = &self.request_did_cancel_task {
            f(request, task);
        }
    }

    fn request_did_gather_metrics(&self, request: &StreamRequest, metrics: &TaskMetrics) {
        if let Some(f) = &self.request_did_gather_metrics {
            f(request, metrics);
        }
    }

    fn request_did_complete_task(&self, request: &StreamRequest, task: TaskId, error: Option<&StreamError>) {
        if let Some(f) = &self.request_did_complete_task {
            f(request, task, error);
        }
    }

    fn request_did_validate_response(
        &self,
        request: &StreamRequest,
        http_request: &HttpRequest,
        response: &ResponseHeader,
        result: Result<(), &StreamError>,
    ) {
        if let Some(f) = &self.request_did_validate_response {
            f(request, http_request, response, result);
        }
    }

    fn request_is_retrying(&self, request: &StreamRequest) {
        if let Some(f) = &self.request_is_retrying {
            f(request);
        }
    }

    fn request_did_resume(&self, request: &StreamRequest) {
        if let Some(f) = &self.request_did_resume {
            f(request);
        }
    }

    fn request_did_cancel(&self, request: &StreamRequest) {
        if let Some(f) = &self.request_did_cancel {
            f(request);
        }
    }

    fn request_did_finish(&self, request: &StreamRequest) {
        if let Some(f) = &self.request_did_finish {
            f(request);
        }
    }
}
