//! Lifecycle notifications.
//!
//! Every hook of [`EventMonitor`] has an empty default body, so a monitor only
//! implements the events it cares about. A session fans each event out to all
//! of its monitors, in registration order, through a [`CompositeEventMonitor`].
//!
//! Hooks are called synchronously from the request driver and should return
//! quickly.

mod closure;
mod logging;

pub use closure::ClosureEventMonitor;
pub use logging::LoggingEventMonitor;

use crate::error::StreamError;
use crate::request::StreamRequest;
use crate::transport::{AuthChallenge, TaskId, TaskMetrics};
use bytes::Bytes;
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::fmt;
use std::sync::Arc;

/// Observes the lifecycle of every request of a session.
///
/// `task_*` and `data_task_*` hooks report what a transport task did; `request_*`
/// hooks report what the request did with it.
#[allow(unused_variables, reason = "every hook is optional")]
pub trait EventMonitor: Send + Sync {
    fn task_did_receive_challenge(&self, request: &StreamRequest, task: TaskId, challenge: &AuthChallenge) {}

    fn task_did_finish_collecting_metrics(&self, request: &StreamRequest, task: TaskId, metrics: &TaskMetrics) {}

    fn data_task_did_receive_data(&self, request: &StreamRequest, task: TaskId, data: &Bytes) {}

    fn data_task_will_cache_response(&self, request: &StreamRequest, task: TaskId, response: &ResponseHeader) {}

    fn request_did_create_initial_request(&self, request: &StreamRequest, initial: &HttpRequest) {}

    fn request_did_adapt_request(&self, request: &StreamRequest, initial: &HttpRequest, adapted: &HttpRequest) {}

    fn request_did_fail_to_adapt_request(&self, request: &StreamRequest, initial: &HttpRequest, error: &StreamError) {}

    fn request_did_create_request(&self, request: &StreamRequest, http_request: &HttpRequest) {}

    fn request_did_create_task(&self, request: &StreamRequest, task: TaskId) {}

    fn request_did_resume_task(&self, request: &StreamRequest, task: TaskId) {}

    fn request_did_cancel_task(&self, request: &StreamRequest, task: TaskId) {}

    fn request_did_gather_metrics(&self, request: &StreamRequest, metrics: &TaskMetrics) {}

    fn request_did_complete_task(&self, request: &StreamRequest, task: TaskId, error: Option<&StreamError>) {}

    /// Called once per validator, with that validator's result.
    fn request_did_validate_response(
        &self,
        request: &StreamRequest,
        http_request: &HttpRequest,
        response: &ResponseHeader,
        result: Result<(), &StreamError>,
    ) {
    }

    fn request_is_retrying(&self, request: &StreamRequest) {}

    fn request_did_resume(&self, request: &StreamRequest) {}

    fn request_did_cancel(&self, request: &StreamRequest) {}

    /// Called before any handler receives `Complete`.
    fn request_did_finish(&self, request: &StreamRequest) {}
}

/// Fans every event out to its monitors in registration order.
#[derive(Clone, Default)]
pub struct CompositeEventMonitor {
    monitors: Vec<Arc<dyn EventMonitor>>,
}

impl CompositeEventMonitor {
    pub fn new(monitors: Vec<Arc<dyn EventMonitor>>) -> Self {
        Self { monitors }
    }

    pub fn push(&mut self, monitor: Arc<dyn EventMonitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn EventMonitor)) {
        for monitor in &self.monitors {
            f(monitor.as_ref());
        }
    }
}

impl fmt::Debug for CompositeEventMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeEventMonitor").field("len", &self.monitors.len()).finish()
    }
}

impl EventMonitor for CompositeEventMonitor {
    fn task_did_receive_challenge(&self, request: &StreamRequest, task: TaskId, challenge: &AuthChallenge) {
        self.each(|m| m.task_did_receive_challenge(request, task, challenge));
    }

    fn task_did_finish_collecting_metrics(&self, request: &StreamRequest, task: TaskId, metrics: &TaskMetrics) {
        self.each(|m| m.task_did_finish_collecting_metrics(request, task, metrics));
    }

    fn data_task_did_receive_data(&self, request: &StreamRequest, task: TaskId, data: &Bytes) {
        self.each(|m| m.data_task_did_receive_data(request, task, data));
    }

    fn data_task_will_cache_response(&self, request: &StreamRequest, task: TaskId, response: &ResponseHeader) {
        self.each(|m| m.data_task_will_cache_response(request, task, response));
    }

    fn request_did_create_initial_request(&self, request: &StreamRequest, initial: &HttpRequest) {
        self.each(|m| m.request_did_create_initial_request(request, initial));
    }

    fn request_did_adapt_request(&self, request: &StreamRequest, initial: &HttpRequest, adapted: &HttpRequest) {
        self.each(|m| m.request_did_adapt_request(request, initial, adapted));
    }

    fn request_did_fail_to_adapt_request(&self, request: &StreamRequest, initial: &HttpRequest, error: &StreamError) {
        self.each(|m| m.request_did_fail_to_adapt_request(request, initial, error));
    }

    fn request_did_create_request(&self, request: &StreamRequest, http_request: &HttpRequest) {
        self.each(|m| m.request_did_create_request(request, http_request));
    }

    fn request_did_create_task(&self, request: &StreamRequest, task: TaskId) {
        self.each(|m| m.request_did_create_task(request, task));
    }

    fn request_did_resume_task(&self, request: &StreamRequest, task: TaskId) {
        self.each(|m| m.request_did_resume_task(request, task));
    }

    fn request_did_cancel_task(&self, request: &StreamRequest, task: TaskId) {
        self.each(|m| m.request_did_cancel_task(request, task));
    }

    fn request_did_gather_metrics(&self, request: &StreamRequest, metrics: &TaskMetrics) {
        self.each(|m| m.request_did_gather_metrics(request, metrics));
    }

    fn request_did_complete_task(&self, request: &StreamRequest, task: TaskId, error: Option<&StreamError>) {
        self.each(|m| m.request_did_complete_task(request, task, error));
    }

    fn request_did_validate_response(
        &self,
        request: &StreamRequest,
        http_request: &HttpRequest,
        response: &ResponseHeader,
        result: Result<(), &StreamError>,
    ) {
        self.each(|m| m.request_did_validate_response(request, http_request, response, result));
    }

    fn request_is_retrying(&self, request: &StreamRequest) {
        self.each(|m| m.request_is_retrying(request));
    }

    fn request_did_resume(&self, request: &StreamRequest) {
        self.each(|m| m.request_did_resume(request));
    }

    fn request_did_cancel(&self, request: &StreamRequest) {
        self.each(|m| m.request_did_cancel(request));
    }

    fn request_did_finish(&self, request: &StreamRequest) {
        self.each(|m| m.request_did_finish(request));
    }
}
