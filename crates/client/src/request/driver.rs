use super::{State, StreamRequest};
use crate::error::{StreamError, TransportError};
use crate::event::Completion;
use crate::interceptor::RetryDecision;
use crate::monitor::EventMonitor;
use crate::transport::{TaskId, TransportEvent, TransportTask};
use bytes::Bytes;
use futures::StreamExt;
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

impl StreamRequest {
    /// The request's timeline: every attempt, every retry decision, then `finish`.
    pub(super) async fn run(self) {
        let error = self.perform().await.err();
        self.finish(error);
    }

    async fn perform(&self) -> Result<(), StreamError> {
        loop {
            let error = match self.attempt().await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            {
                let mut state = self.lock();
                if state.cancelled {
                    return Err(state.error.clone().unwrap_or(StreamError::ExplicitlyCancelled));
                }
                state.error = Some(error.clone());
            }

            let decision = match &self.inner.interceptor {
                Some(interceptor) => tokio::select! {
                    biased;
                    _ = self.inner.cancel_token.cancelled() => return Err(self.cancellation_error()),
                    decision = interceptor.retry(self, &error) => decision,
                },
                None => RetryDecision::DoNotRetry,
            };

            match decision {
                RetryDecision::DoNotRetry => return Err(error),
                RetryDecision::DoNotRetryWithError(retry_error) => return Err(StreamError::retry_failed(retry_error, error)),
                retry => self.prepare_retry(retry.delay()).await?,
            }
        }
    }

    async fn prepare_retry(&self, delay: Option<Duration>) -> Result<(), StreamError> {
        {
            let mut state = self.lock();
            if state.cancelled {
                return Err(state.error.clone().unwrap_or(StreamError::ExplicitlyCancelled));
            }
            state.state = State::Retrying;
            state.retry_count += 1;
            state.response = None;
            state.error = None;
            for consumer in &mut state.consumers {
                consumer.reset();
            }
        }

        self.monitor().request_is_retrying(self);

        if let Some(delay) = delay {
            trace!(request_id = %self.id(), ?delay, "waiting before retry");
            tokio::select! {
                biased;
                _ = self.inner.cancel_token.cancelled() => return Err(self.cancellation_error()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    async fn attempt(&self) -> Result<(), StreamError> {
        let initial = &self.inner.initial_request;
        if self.retry_count() == 0 {
            self.monitor().request_did_create_initial_request(self, initial);
        }

        let request = match &self.inner.interceptor {
            Some(interceptor) => {
                let adapted = tokio::select! {
                    biased;
                    _ = self.inner.cancel_token.cancelled() => return Err(self.cancellation_error()),
                    adapted = interceptor.adapt(initial.clone(), self) => adapted,
                };
                match adapted {
                    Ok(adapted) => {
                        self.monitor().request_did_adapt_request(self, initial, &adapted);
                        adapted
                    }
                    Err(e) => {
                        let error = StreamError::adaptation_failed(e);
                        self.monitor().request_did_fail_to_adapt_request(self, initial, &error);
                        return Err(error);
                    }
                }
            }
            None => initial.clone(),
        };

        let request = Arc::new(request);
        self.monitor().request_did_create_request(self, &request);

        {
            let mut state = self.lock();
            if state.cancelled {
                return Err(state.error.clone().unwrap_or(StreamError::ExplicitlyCancelled));
            }
            state.requests.push(Arc::clone(&request));
            state.state = State::Resumed;
        }

        let mut task = self.inner.context.transport.execute(HttpRequest::clone(&request));
        let task_id = task.id();
        self.lock().tasks.push(task_id);
        self.monitor().request_did_create_task(self, task_id);
        self.monitor().request_did_resume_task(self, task_id);
        debug!(request_id = %self.id(), task = %task_id, uri = %request.uri(), "started task");

        let result = self.drive(&mut task, &request).await;
        self.monitor().request_did_complete_task(self, task_id, result.as_ref().err());
        result
    }

    async fn drive(&self, task: &mut TransportTask, request: &HttpRequest) -> Result<(), StreamError> {
        let task_id = task.id();
        loop {
            let event = tokio::select! {
                biased;
                _ = self.inner.cancel_token.cancelled() => {
                    task.cancel();
                    self.monitor().request_did_cancel_task(self, task_id);
                    return Err(self.cancellation_error());
                }
                event = task.next() => event,
            };

            let Some(event) = event else {
                return Err(StreamError::session_task_failed(TransportError::Terminated));
            };

            match event {
                TransportEvent::HeadersReceived(response) => {
                    if let Err(error) = self.did_receive_response(request, response) {
                        task.cancel();
                        return Err(error);
                    }
                }
                TransportEvent::Data(data) => self.did_receive_data(task_id, &data),
                TransportEvent::Challenge(challenge) => self.monitor().task_did_receive_challenge(self, task_id, &challenge),
                TransportEvent::WillCacheResponse => {
                    if let Some(response) = self.response() {
                        self.monitor().data_task_will_cache_response(self, task_id, &response);
                    }
                }
                TransportEvent::Metrics(metrics) => {
                    self.lock().metrics.push(metrics.clone());
                    self.monitor().task_did_finish_collecting_metrics(self, task_id, &metrics);
                    self.monitor().request_did_gather_metrics(self, &metrics);
                }
                TransportEvent::Completed(None) => return Ok(()),
                TransportEvent::Completed(Some(error)) => return Err(StreamError::session_task_failed(error)),
            }
        }
    }

    fn did_receive_response(&self, request: &HttpRequest, response: ResponseHeader) -> Result<(), StreamError> {
        let response = Arc::new(response);
        let validators = {
            let mut state = self.lock();
            if state.cancelled {
                return Err(state.error.clone().unwrap_or(StreamError::ExplicitlyCancelled));
            }
            state.response = Some(Arc::clone(&response));
            for consumer in &mut state.consumers {
                consumer.prepare(&response);
            }
            if !state.validators.is_empty() {
                state.state = State::Validating;
            }
            state.validators.clone()
        };

        let mut first_error = None;
        for validator in validators {
            let result = validator(request, &response);
            self.monitor().request_did_validate_response(self, request, &response, result.as_ref().map(|_| ()));
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn did_receive_data(&self, task: TaskId, data: &Bytes) {
        self.monitor().data_task_did_receive_data(self, task, data);

        let mut state = self.lock();
        if state.cancelled || state.state == State::Finished {
            return;
        }
        for consumer in &mut state.consumers {
            consumer.consume(data);
        }
    }

    /// Moves the request to `Finished` and completes every consumer. Only the
    /// first call has any effect.
    pub(super) fn finish(&self, error: Option<StreamError>) {
        let (completion, consumers) = {
            let mut state = self.lock();
            if state.state == State::Finished {
                return;
            }
            state.state = State::Finished;
            if !state.cancelled {
                state.error = error;
            }

            // an attempt cut short by validation or cancel leaves no metrics of its own
            let last_task = state.tasks.last().copied();
            let completion = Completion {
                request: state.requests.last().cloned(),
                response: state.response.clone(),
                metrics: state.metrics.iter().rev().find(|metrics| Some(metrics.task) == last_task).cloned(),
                error: state.error.clone(),
            };
            state.completion = Some(completion.clone());
            (completion, std::mem::take(&mut state.consumers))
        };

        self.monitor().request_did_finish(self);
        for consumer in consumers {
            consumer.complete(completion.clone());
        }

        self.inner.context.forget(self.id());
        self.inner.finished.send_replace(true);
    }

    fn cancellation_error(&self) -> StreamError {
        self.error().unwrap_or(StreamError::ExplicitlyCancelled)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{BoxError, StreamError, TransportError};
    use crate::interceptor::{Interceptor, RetryDecision, RetryPolicy, adapter_fn, retrier_fn};
    use crate::request::{State, StreamRequest};
    use crate::session::Session;
    use crate::test_support::{RecordingMonitor, Script, ScriptedTransport, event_channel, init_tracing, ok_script, response_header};
    use crate::transport::{TaskMetrics, TransportEvent};
    use async_trait::async_trait;
    use bytes::Bytes;
    use micro_stream_http::protocol::HttpRequest;
    use serde::Deserialize;
    use std::convert::Infallible;
    use std::io::{self, Read};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Line {
        id: u32,
    }

    fn get(path: &str) -> HttpRequest {
        HttpRequest::get(format!("http://localhost{path}")).unwrap()
    }

    fn session(transport: ScriptedTransport) -> Session {
        Session::builder().transport(transport).build().unwrap()
    }

    #[tokio::test]
    async fn delivers_chunks_then_one_completion() {
        init_tracing();
        let session = session(ScriptedTransport::new([ok_script("application/octet-stream", &["ab", "cd"])]));
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/bytes/4")).on_stream(handler);
        let (values, completion) = events.collect().await;

        let body: Vec<u8> = values.into_iter().flat_map(|value| value.unwrap().to_vec()).collect();
        assert_eq!(body, b"abcd");
        assert!(completion.is_success());
        assert_eq!(completion.response.unwrap().status(), 200);
        assert_eq!(completion.request.unwrap().uri(), "http://localhost/bytes/4");

        request.finished().await;
        assert_eq!(request.state(), State::Finished);
        assert!(session.active_requests().is_empty());
    }

    #[tokio::test]
    async fn every_consumer_decodes_independently() {
        let script = ok_script("application/json", &["{\"id\": 1}\n{\"i", "d\": 2}\n{\"id\": 3}"]);
        let session = session(ScriptedTransport::new([script]));
        let (raw, raw_events) = event_channel::<Bytes, Infallible>();
        let (text, text_events) = event_channel::<String, Infallible>();
        let (lines, line_events) = event_channel::<Line, StreamError>();

        let _request = session.stream_request(get("/stream/3")).on_stream(raw).on_stream_string(text).on_stream_decodable(lines);

        let (raw, raw_completion) = raw_events.collect().await;
        let (text, _) = text_events.collect().await;
        let (lines, line_completion) = line_events.collect().await;

        assert_eq!(raw.len(), 2);
        assert_eq!(text.into_iter().map(Result::unwrap).collect::<String>(), "{\"id\": 1}\n{\"id\": 2}\n{\"id\": 3}");
        assert_eq!(lines.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![Line { id: 1 }, Line { id: 2 }, Line { id: 3 }]);
        assert!(raw_completion.is_success());
        assert!(line_completion.is_success());
    }

    #[tokio::test]
    async fn undecodable_frame_is_reported_in_place() {
        let session = session(ScriptedTransport::new([ok_script("application/json", &["{\"id\": 1}\nnot json\n{\"id\": 3}\n"])]));
        let (lines, events) = event_channel::<Line, StreamError>();

        let _request = session.stream_request(get("/stream/3")).on_stream_decodable(lines);
        let (values, completion) = events.collect().await;

        assert_eq!(values.len(), 3);
        assert_eq!(values[0].as_ref().unwrap(), &Line { id: 1 });
        assert!(values[1].as_ref().unwrap_err().is_response_serialization_error());
        assert_eq!(values[2].as_ref().unwrap(), &Line { id: 3 });
        assert!(completion.is_success());
    }

    #[tokio::test]
    async fn failed_validation_delivers_no_data() {
        let script = Script::Events(vec![
            TransportEvent::HeadersReceived(response_header(401, &[("content-type", "text/plain")])),
            TransportEvent::Data(Bytes::from_static(b"unauthorized")),
            TransportEvent::Completed(None),
        ]);
        let monitor = RecordingMonitor::default();
        let session = Session::builder().transport(ScriptedTransport::new([script])).event_monitor(monitor.clone()).build().unwrap();
        let (handler, events) = event_channel::<String, Infallible>();

        let request = session.stream_request(get("/status/401")).validate().on_stream_string(handler);
        let (values, completion) = events.collect().await;

        assert!(values.is_empty());
        assert_eq!(completion.error.unwrap().response_code(), Some(401));
        assert_eq!(request.error().and_then(|e| e.response_code()), Some(401));
        assert_eq!(monitor.events().iter().filter(|e| **e == "request_did_validate_response").count(), 2);
        assert!(!monitor.events().contains(&"data_task_did_receive_data"));
    }

    #[tokio::test]
    async fn monitor_sees_lifecycle_in_order() {
        let script = Script::Events(vec![
            TransportEvent::HeadersReceived(response_header(200, &[("content-type", "text/plain")])),
            TransportEvent::Data(Bytes::from_static(b"hello")),
            TransportEvent::WillCacheResponse,
            TransportEvent::Metrics(TaskMetrics::start(crate::transport::TaskId::next()).finish()),
            TransportEvent::Completed(None),
        ]);
        let monitor = RecordingMonitor::default();
        let session = Session::builder().transport(ScriptedTransport::new([script])).event_monitor(monitor.clone()).build().unwrap();
        let (handler, events) = event_channel::<String, Infallible>();

        let request = session.stream_request(get("/stream/1")).validate().on_stream_string(handler);
        let _ = events.collect().await;

        assert_eq!(
            monitor.events(),
            vec![
                "request_did_resume",
                "request_did_create_initial_request",
                "request_did_create_request",
                "request_did_create_task",
                "request_did_resume_task",
                "request_did_validate_response",
                "request_did_validate_response",
                "data_task_did_receive_data",
                "data_task_will_cache_response",
                "task_did_finish_collecting_metrics",
                "request_did_gather_metrics",
                "request_did_complete_task",
                "request_did_finish",
            ]
        );
        assert_eq!(request.metrics().len(), 1);
        assert_eq!(request.tasks().len(), 1);
    }

    struct RedirectOnRetry {
        adapted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Interceptor for RedirectOnRetry {
        async fn adapt(&self, request: HttpRequest, stream_request: &StreamRequest) -> Result<HttpRequest, BoxError> {
            self.adapted.lock().unwrap().push(request.uri().to_string());
            if stream_request.retry_count() == 0 {
                return Ok(request);
            }
            Ok(HttpRequest::get("http://localhost/good")?)
        }

        async fn retry(&self, request: &StreamRequest, _error: &StreamError) -> RetryDecision {
            if request.retry_count() == 0 { RetryDecision::Retry } else { RetryDecision::DoNotRetry }
        }
    }

    #[tokio::test]
    async fn retry_adapts_the_original_request_and_resets_decoding() {
        let failing = Script::Events(vec![
            TransportEvent::HeadersReceived(response_header(200, &[("content-type", "application/json")])),
            TransportEvent::Data(Bytes::from_static(b"{\"id\"")),
            TransportEvent::Completed(Some(TransportError::from(io::Error::from(io::ErrorKind::ConnectionReset)))),
        ]);
        let succeeding = ok_script("application/json", &["{\"id\": 2}\n"]);
        let transport = ScriptedTransport::new([failing, succeeding]);
        let interceptor = Arc::new(RedirectOnRetry { adapted: Mutex::new(vec![]) });
        let monitor = RecordingMonitor::default();
        let session = Session::builder()
            .transport(transport.clone())
            .interceptor(Arc::clone(&interceptor))
            .event_monitor(monitor.clone())
            .build()
            .unwrap();
        let (lines, events) = event_channel::<Line, StreamError>();

        let request = session.stream_request(get("/bad")).on_stream_decodable(lines);
        let (values, completion) = events.collect().await;

        assert_eq!(values.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![Line { id: 2 }]);
        assert!(completion.is_success());
        assert_eq!(request.retry_count(), 1);
        assert_eq!(*interceptor.adapted.lock().unwrap(), vec!["http://localhost/bad", "http://localhost/bad"]);

        let executed: Vec<String> = transport.executed().iter().map(|r| r.uri().to_string()).collect();
        assert_eq!(executed, vec!["http://localhost/bad", "http://localhost/good"]);
        assert_eq!(monitor.events().iter().filter(|e| **e == "request_did_create_initial_request").count(), 1);
        assert_eq!(monitor.events().iter().filter(|e| **e == "request_is_retrying").count(), 1);
    }

    #[tokio::test]
    async fn retry_policy_gives_up_after_its_limit() {
        let unavailable = || Script::Events(vec![TransportEvent::HeadersReceived(response_header(503, &[])), TransportEvent::Completed(None)]);
        let transport = ScriptedTransport::new([unavailable(), unavailable(), unavailable(), unavailable()]);
        let policy = RetryPolicy::new().with_retry_limit(2).with_exponential_backoff(2, 0.001);
        let session = Session::builder().transport(transport.clone()).interceptor(policy).build().unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/status/503")).validate_status(200..300).on_stream(handler);
        let (values, completion) = events.collect().await;

        assert!(values.is_empty());
        assert_eq!(completion.error.unwrap().response_code(), Some(503));
        assert_eq!(request.retry_count(), 2);
        assert_eq!(request.tasks().len(), 3);
        assert_eq!(transport.executed().len(), 3);
    }

    #[tokio::test]
    async fn retry_error_wraps_the_attempt_error() {
        let script = Script::Events(vec![TransportEvent::Completed(Some(TransportError::TimedOut))]);
        let session = Session::builder()
            .transport(ScriptedTransport::new([script]))
            .interceptor(retrier_fn(|_, _| async { RetryDecision::DoNotRetryWithError("retry budget exhausted".into()) }))
            .build()
            .unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let _request = session.stream_request(get("/slow")).on_stream(handler);
        let (_, completion) = events.collect().await;

        match completion.error.unwrap() {
            StreamError::RequestRetryFailed { retry_error, original_error } => {
                assert_eq!(retry_error.to_string(), "retry budget exhausted");
                assert!(original_error.transport_error().is_some_and(TransportError::is_timeout));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn adaptation_failure_never_reaches_the_transport() {
        let transport = ScriptedTransport::default();
        let monitor = RecordingMonitor::default();
        let session = Session::builder()
            .transport(transport.clone())
            .interceptor(adapter_fn(|_: HttpRequest| async { Err::<HttpRequest, BoxError>("no credentials".into()) }))
            .event_monitor(monitor.clone())
            .build()
            .unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let _request = session.stream_request(get("/private")).on_stream(handler);
        let (_, completion) = events.collect().await;

        assert!(completion.error.unwrap().is_request_adaptation_error());
        assert!(completion.request.is_none());
        assert!(transport.executed().is_empty());
        assert!(monitor.events().contains(&"request_did_fail_to_adapt_request"));
    }

    #[tokio::test]
    async fn transport_stream_ending_early_is_an_error() {
        let script = Script::Events(vec![TransportEvent::HeadersReceived(response_header(200, &[]))]);
        let session = session(ScriptedTransport::new([script]));
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let _request = session.stream_request(get("/bytes/1")).on_stream(handler);
        let (_, completion) = events.collect().await;

        let error = completion.error.unwrap();
        assert!(matches!(error.transport_error(), Some(TransportError::Terminated)));
    }

    #[tokio::test]
    async fn cancel_stops_delivery_and_completes_once() {
        let (sender, receiver) = oneshot::channel();
        let monitor = RecordingMonitor::default();
        let session = Session::builder()
            .transport(ScriptedTransport::new([Script::Manual(sender)]))
            .event_monitor(monitor.clone())
            .build()
            .unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/drip")).on_stream(handler);
        let mut handle = receiver.await.unwrap();
        handle.send(TransportEvent::HeadersReceived(response_header(200, &[]))).await;

        request.cancel();
        request.cancel();
        let _ = handle.send(TransportEvent::Data(Bytes::from_static(b"too late"))).await;

        let (values, completion) = events.collect().await;
        assert!(values.is_empty());
        assert!(completion.error.unwrap().is_explicitly_cancelled_error());
        assert!(handle.is_cancelled());
        assert!(request.is_cancelled());
        assert_eq!(monitor.events().iter().filter(|e| **e == "request_did_cancel").count(), 1);
        assert!(monitor.events().contains(&"request_did_cancel_task"));
    }

    #[tokio::test]
    async fn cancelling_an_idle_request_finishes_it() {
        let transport = ScriptedTransport::default();
        let session = Session::builder().transport(transport.clone()).start_requests_immediately(false).build().unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/never")).on_stream(handler);
        assert_eq!(request.state(), State::Initialized);
        request.cancel();

        let (_, completion) = events.collect().await;
        assert!(completion.error.unwrap().is_explicitly_cancelled_error());
        assert_eq!(request.state(), State::Finished);
        assert!(transport.executed().is_empty());

        let request = request.resume();
        assert_eq!(request.state(), State::Finished);
    }

    #[tokio::test]
    async fn late_consumer_receives_the_same_completion() {
        let session = session(ScriptedTransport::new([ok_script("text/plain", &["done"])]));
        let (first, first_events) = event_channel::<String, Infallible>();

        let request = session.stream_request(get("/text")).on_stream_string(first);
        let (_, first_completion) = first_events.collect().await;
        request.finished().await;

        let (late, late_events) = event_channel::<Bytes, Infallible>();
        let request = request.on_stream(late);
        let (values, late_completion) = late_events.collect().await;

        assert!(values.is_empty());
        assert!(first_completion.is_success() && late_completion.is_success());
        assert!(Arc::ptr_eq(first_completion.response.as_ref().unwrap(), late_completion.response.as_ref().unwrap()));
        assert_eq!(request.tasks().len(), 1);
    }

    #[tokio::test]
    async fn dropping_the_session_cancels_running_requests() {
        let (sender, receiver) = oneshot::channel();
        let session = session(ScriptedTransport::new([Script::Manual(sender)]));
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/drip")).on_stream(handler);
        let _handle = receiver.await.unwrap();
        drop(session);

        let (_, completion) = events.collect().await;
        assert!(matches!(completion.error, Some(StreamError::SessionDeinitialized)));
        request.finished().await;
        assert!(request.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reader_returns_the_body() {
        let session = session(ScriptedTransport::new([ok_script("text/plain", &["hello ", "wor", "ld"])]));
        let mut reader = session.stream_request(get("/text")).into_reader(1).unwrap();

        let body = tokio::task::spawn_blocking(move || {
            let mut body = String::new();
            reader.read_to_string(&mut body).map(|_| body)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(body, "hello world");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reader_surfaces_the_request_error() {
        let script = Script::Events(vec![
            TransportEvent::HeadersReceived(response_header(200, &[])),
            TransportEvent::Data(Bytes::from_static(b"partial")),
            TransportEvent::Completed(Some(TransportError::other("connection lost"))),
        ]);
        let session = session(ScriptedTransport::new([script]));
        let mut reader = session.stream_request(get("/bytes/100")).into_reader(4).unwrap();

        let (read, error) = tokio::task::spawn_blocking(move || {
            let mut body = Vec::new();
            let error = reader.read_to_end(&mut body).unwrap_err();
            (body, error)
        })
        .await
        .unwrap();

        assert_eq!(read, b"partial");
        assert_eq!(error.kind(), io::ErrorKind::Other);
        assert!(error.to_string().contains("connection lost"));
    }

    #[tokio::test]
    async fn handlers_run_on_their_queue() {
        let queue = crate::queue::DeliveryQueue::new("test.handlers").unwrap();
        let session = Session::builder()
            .transport(ScriptedTransport::new([ok_script("text/plain", &["a", "b"])]))
            .delivery_queue(queue.clone())
            .build()
            .unwrap();
        let on_queue = Arc::new(Mutex::new(Vec::new()));
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let seen = Arc::clone(&on_queue);
        let checking_queue = queue.clone();
        let mut handler = handler;
        let _request = session.stream_request(get("/bytes/2")).on_stream(move |event| {
            seen.lock().unwrap().push(checking_queue.is_current());
            handler(event);
        });
        let _ = events.collect().await;

        assert!(!on_queue.lock().unwrap().is_empty());
        assert!(on_queue.lock().unwrap().iter().all(|current| *current));
    }

    #[tokio::test]
    async fn retry_delay_is_cut_short_by_cancel() {
        let script = Script::Events(vec![TransportEvent::Completed(Some(TransportError::TimedOut))]);
        let session = Session::builder()
            .transport(ScriptedTransport::new([script]))
            .interceptor(retrier_fn(|_, _| async { RetryDecision::RetryWithDelay(Duration::from_secs(3600)) }))
            .build()
            .unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/slow")).on_stream(handler);
        while request.state() != State::Retrying {
            tokio::task::yield_now().await;
        }
        request.cancel();

        let (_, completion) = events.collect().await;
        assert!(completion.error.unwrap().is_explicitly_cancelled_error());
        assert_eq!(request.retry_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_racing_a_failed_task_always_completes_as_cancelled() {
        for _ in 0..200 {
            let (sender, receiver) = oneshot::channel();
            let session = session(ScriptedTransport::new([Script::Manual(sender)]));
            let (handler, events) = event_channel::<Bytes, Infallible>();

            let request = session.stream_request(get("/slow")).on_stream(handler);
            let mut handle = receiver.await.unwrap();
            let canceller = {
                let request = request.clone();
                std::thread::spawn(move || request.cancel())
            };
            let _ = handle.send(TransportEvent::Completed(Some(TransportError::TimedOut))).await;

            let (_, completion) = events.collect().await;
            canceller.join().unwrap();

            let error = completion.error.unwrap();
            if request.is_cancelled() {
                assert!(error.is_explicitly_cancelled_error(), "cancelled request completed with {error}");
                assert!(request.error().is_some_and(|e| e.is_explicitly_cancelled_error()));
            } else {
                assert!(error.is_session_task_error());
            }
        }
    }

    #[tokio::test]
    async fn completion_carries_only_the_final_task_metrics() {
        let (sender, receiver) = oneshot::channel();
        let unauthorized = Script::Events(vec![TransportEvent::HeadersReceived(response_header(401, &[])), TransportEvent::Completed(None)]);
        let session = Session::builder()
            .transport(ScriptedTransport::new([Script::Manual(sender), unauthorized]))
            .interceptor(retrier_fn(|request: StreamRequest, _| async move {
                if request.retry_count() == 0 { RetryDecision::Retry } else { RetryDecision::DoNotRetry }
            }))
            .build()
            .unwrap();
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let request = session.stream_request(get("/flaky")).validate_status(200..300).on_stream(handler);
        let mut first = receiver.await.unwrap();
        let first_task = first.id();
        first.send(TransportEvent::Metrics(TaskMetrics::start(first_task).finish())).await;
        first.send(TransportEvent::Completed(Some(TransportError::TimedOut))).await;

        let (_, completion) = events.collect().await;

        assert_eq!(completion.error.unwrap().response_code(), Some(401));
        assert!(completion.metrics.is_none());
        assert_eq!(request.tasks().len(), 2);
        assert_eq!(request.metrics().iter().map(|metrics| metrics.task).collect::<Vec<_>>(), vec![first_task]);
    }

    #[tokio::test]
    async fn completion_carries_the_metrics_of_a_successful_task() {
        let (sender, receiver) = oneshot::channel();
        let session = session(ScriptedTransport::new([Script::Manual(sender)]));
        let (handler, events) = event_channel::<Bytes, Infallible>();

        let _request = session.stream_request(get("/bytes/1")).on_stream(handler);
        let mut handle = receiver.await.unwrap();
        let task = handle.id();
        handle.send(TransportEvent::HeadersReceived(response_header(200, &[]))).await;
        handle.send(TransportEvent::Data(Bytes::from_static(b"x"))).await;
        handle.send(TransportEvent::Metrics(TaskMetrics::start(task).finish())).await;
        handle.send(TransportEvent::Completed(None)).await;

        let (_, completion) = events.collect().await;
        assert_eq!(completion.metrics.map(|metrics| metrics.task), Some(task));
    }
}
