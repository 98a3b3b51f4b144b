use crate::error::{StreamError, TransportError};
use crate::event::{Completion, StreamEvent};
use crate::monitor::EventMonitor;
use crate::request::StreamRequest;
use crate::session::Session;
use crate::transport::{AuthChallenge, TaskId, TaskMetrics, Transport, TransportEvent, TransportTask, TransportTaskHandle};
use bytes::Bytes;
use http::Response;
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub(crate) enum Script {
    /// Sends these events, in order, as soon as the task is created.
    Events(Vec<TransportEvent>),
    /// Hands the producing half to the test.
    Manual(oneshot::Sender<TransportTaskHandle>),
}

/// A transport that plays one script per executed request.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    executed: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self { scripts: Arc::new(Mutex::new(scripts.into_iter().collect())), executed: Arc::default() }
    }

    pub(crate) fn executed(&self) -> Vec<HttpRequest> {
        self.executed.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: HttpRequest) -> TransportTask {
        self.executed.lock().unwrap().push(request);
        let (mut handle, task) = TransportTask::channel(16);

        match self.scripts.lock().unwrap().pop_front() {
            Some(Script::Events(events)) => {
                tokio::spawn(async move {
                    for event in events {
                        if !handle.send(event).await {
                            break;
                        }
                    }
                });
            }
            Some(Script::Manual(sender)) => {
                let _ = sender.send(handle);
            }
            None => {
                tokio::spawn(async move {
                    handle.send(TransportEvent::Completed(Some(TransportError::other("no script left")))).await;
                });
            }
        }
        task
    }
}

pub(crate) fn response_header(status: u16, headers: &[(&str, &str)]) -> ResponseHeader {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    ResponseHeader::from(builder.body(()).unwrap())
}

/// A successful exchange: a `200` head, `chunks`, then completion.
pub(crate) fn ok_script(content_type: &str, chunks: &[&'static str]) -> Script {
    let mut events = vec![TransportEvent::HeadersReceived(response_header(200, &[("content-type", content_type)]))];
    events.extend(chunks.iter().map(|chunk| TransportEvent::Data(Bytes::from_static(chunk.as_bytes()))));
    events.push(TransportEvent::Completed(None));
    Script::Events(events)
}

/// A request that is never resumed, on a session that never starts requests by itself.
pub(crate) fn idle_request() -> (Session, StreamRequest) {
    let session = Session::builder()
        .transport(ScriptedTransport::default())
        .start_requests_immediately(false)
        .build()
        .unwrap();
    let request = session.stream_request(HttpRequest::get("http://localhost/idle").unwrap());
    (session, request)
}

/// A handler that forwards every event to an [`Events`] receiver.
pub(crate) fn event_channel<T, E>() -> (impl FnMut(StreamEvent<T, E>) + Send + 'static, Events<T, E>)
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let handler = move |event: StreamEvent<T, E>| {
        let _ = sender.send(event);
    };
    (handler, Events(receiver))
}

pub(crate) struct Events<T, E>(mpsc::UnboundedReceiver<StreamEvent<T, E>>);

impl<T, E> Events<T, E> {
    /// Collects the values up to `Complete` and checks nothing follows it.
    pub(crate) async fn collect(mut self) -> (Vec<Result<T, E>>, Completion) {
        tokio::time::timeout(Duration::from_secs(5), async move {
            let mut values = Vec::new();
            loop {
                match self.0.recv().await.expect("handler dropped before Complete") {
                    StreamEvent::Stream(value) => values.push(value),
                    StreamEvent::Complete(completion) => {
                        assert!(self.0.recv().await.is_none(), "event delivered after Complete");
                        return (values, completion);
                    }
                }
            }
        })
        .await
        .expect("request did not complete in time")
    }
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Records the name of every monitor hook it sees, in order.
#[derive(Clone, Default)]
pub(crate) struct RecordingMonitor {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingMonitor {
    pub(crate) fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, name: &'static str) {
        self.events.lock().unwrap().push(name);
    }
}

impl EventMonitor for RecordingMonitor {
    fn task_did_receive_challenge(&self, _: &StreamRequest, _: TaskId, _: &AuthChallenge) {
        self.record("task_did_receive_challenge");
    }

    fn task_did_finish_collecting_metrics(&self, _: &StreamRequest, _: TaskId, _: &TaskMetrics) {
        self.record("task_did_finish_collecting_metrics");
    }

    fn data_task_did_receive_data(&self, _: &StreamRequest, _: TaskId, _: &Bytes) {
        self.record("data_task_did_receive_data");
    }

    fn data_task_will_cache_response(&self, _: &StreamRequest, _: TaskId, _: &ResponseHeader) {
        self.record("data_task_will_cache_response");
    }

    fn request_did_create_initial_request(&self, _: &StreamRequest, _: &HttpRequest) {
        self.record("request_did_create_initial_request");
    }

    fn request_did_adapt_request(&self, _: &StreamRequest, _: &HttpRequest, _: &HttpRequest) {
        self.record("request_did_adapt_request");
    }

    fn request_did_fail_to_adapt_request(&self, _: &StreamRequest, _: &HttpRequest, _: &StreamError) {
        self.record("request_did_fail_to_adapt_request");
    }

    fn request_did_create_request(&self, _: &StreamRequest, _: &HttpRequest) {
        self.record("request_did_create_request");
    }

    fn request_did_create_task(&self, _: &StreamRequest, _: TaskId) {
        self.record("request_did_create_task");
    }

    fn request_did_resume_task(&self, _: &StreamRequest, _: TaskId) {
        self.record("request_did_resume_task");
    }

    fn request_did_cancel_task(&self, _: &StreamRequest, _: TaskId) {
        self.record("request_did_cancel_task");
    }

    fn request_did_gather_metrics(&self, _: &StreamRequest, _: &TaskMetrics) {
        self.record("request_did_gather_metrics");
    }

    fn request_did_complete_task(&self, _: &StreamRequest, _: TaskId, _: Option<&StreamError>) {
        self.record("request_did_complete_task");
    }

    fn request_did_validate_response(&self, _: &StreamRequest, _: &HttpRequest, _: &ResponseHeader, _: Result<(), &StreamError>) {
        self.record("request_did_validate_response");
    }

    fn request_is_retrying(&self, _: &StreamRequest) {
        self.record("request_is_retrying");
    }

    fn request_did_resume(&self, _: &StreamRequest) {
        self.record("request_did_resume");
    }

    fn request_did_cancel(&self, _: &StreamRequest) {
        self.record("request_did_cancel");
    }

    fn request_did_finish(&self, _: &StreamRequest) {
        self.record("request_did_finish");
    }
}
