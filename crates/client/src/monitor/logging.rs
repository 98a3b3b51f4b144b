use crate::error::StreamError;
use crate::monitor::EventMonitor;
use crate::request::StreamRequest;
use crate::transport::{AuthChallenge, TaskId, TaskMetrics};
use bytes::Bytes;
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use tracing::{debug, info, trace, warn};

/// Reports the lifecycle of every request through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventMonitor;

impl EventMonitor for LoggingEventMonitor {
    fn task_did_receive_challenge(&self, request: &StreamRequest, task: TaskId, challenge: &AuthChallenge) {
        debug!(request_id = %request.id(), %task, scheme = %challenge.scheme, "received authentication challenge");
    }

    fn task_did_finish_collecting_metrics(&self, request: &StreamRequest, task: TaskId, metrics: &TaskMetrics) {
        trace!(request_id = %request.id(), %task, duration = ?metrics.duration(), bytes = metrics.response_body_bytes, "collected task metrics");
    }

    fn data_task_did_receive_data(&self, request: &StreamRequest, task: TaskId, data: &Bytes) {
        trace!(request_id = %request.id(), %task, len = data.len(), "received data");
    }

    fn request_did_adapt_request(&self, request: &StreamRequest, _initial: &HttpRequest, adapted: &HttpRequest) {
        debug!(request_id = %request.id(), method = %adapted.method(), uri = %adapted.uri(), "adapted request");
    }

    fn request_did_fail_to_adapt_request(&self, request: &StreamRequest, _initial: &HttpRequest, error: &StreamError) {
        warn!(request_id = %request.id(), cause = %error, "failed to adapt request");
    }

    fn request_did_create_task(&self, request: &StreamRequest, task: TaskId) {
        debug!(request_id = %request.id(), %task, "created task");
    }

    fn request_did_cancel_task(&self, request: &StreamRequest, task: TaskId) {
        debug!(request_id = %request.id(), %task, "cancelled task");
    }

    fn request_did_complete_task(&self, request: &StreamRequest, task: TaskId, error: Option<&StreamError>) {
        match error {
            Some(error) => warn!(request_id = %request.id(), %task, cause = %error, "task failed"),
            None => debug!(request_id = %request.id(), %task, "task completed"),
        }
    }

    fn request_did_validate_response(
        &self,
        request: &StreamRequest,
        _http_request: &HttpRequest,
        response: &ResponseHeader,
        result: Result<(), &StreamError>,
    ) {
        if let Err(error) = result {
            debug!(request_id = %request.id(), status = %response.status(), cause = %error, "response failed validation");
        }
    }

    fn request_is_retrying(&self, request: &StreamRequest) {
        info!(request_id = %request.id(), retry_count = request.retry_count(), "retrying request");
    }

    fn request_did_resume(&self, request: &StreamRequest) {
        debug!(request_id = %request.id(), uri = %request.initial_request().uri(), "resumed request");
    }

    fn request_did_cancel(&self, request: &StreamRequest) {
        info!(request_id = %request.id(), "cancelled request");
    }

    fn request_did_finish(&self, request: &StreamRequest) {
        match request.error() {
            Some(error) => info!(request_id = %request.id(), cause = %error, "request finished with error"),
            None => info!(
                request_id = %request.id(),
                status = ?request.response().map(|response| response.status()),
                "request finished"
            ),
        }
    }
}
