//! Stream requests.
//!
//! A [`StreamRequest`] is a handle to one logical HTTP exchange. It may take
//! several transport tasks (one per attempt) but finishes exactly once. Handlers
//! registered with the `on_stream*` methods each decode the body independently
//! and each receive exactly one [`StreamEvent::Complete`], always last.
//!
//! ```no_run
//! use micro_stream::{HttpRequest, Session, StreamEvent};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let session = Session::builder().build()?;
//! let request = session
//!     .stream_request(HttpRequest::get("http://127.0.0.1:8080/stream/3")?)
//!     .validate()
//!     .on_stream_string(|event| match event {
//!         StreamEvent::Stream(Ok(text)) => print!("{text}"),
//!         StreamEvent::Stream(Err(never)) => match never {},
//!         StreamEvent::Complete(completion) => println!("\nfinished: {:?}", completion.error),
//!     });
//!
//! request.finished().await;
//! # Ok(())
//! # }
//! ```

mod consumer;
mod driver;
mod reader;
mod validation;

pub use reader::StreamReader;

use crate::error::{BoxError, StreamError};
use crate::event::{Completion, StreamEvent};
use crate::interceptor::Interceptor;
use crate::monitor::{CompositeEventMonitor, EventMonitor};
use crate::queue::DeliveryQueue;
use crate::serializer::{DecodableStreamSerializer, PassthroughStreamSerializer, StreamSerializer, StringStreamSerializer};
use crate::session::SessionContext;
use crate::transport::{TaskId, TaskMetrics};
use bytes::Bytes;
use consumer::{Consumer, SerializingConsumer};
use http::{HeaderMap, StatusCode};
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use serde::de::DeserializeOwned;
use std::fmt;
use std::io;
use std::ops::RangeBounds;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validation::Validator;

/// Identifies a request for its whole life, across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The random v4 UUID behind this id.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a request is in its life.
///
/// `Initialized` moves to `Resumed` when the request starts. Each attempt runs
/// in `Resumed`, or in `Validating` once a response arrives and validators are
/// attached. A failed attempt that is retried passes through `Retrying`.
/// `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Created, not started yet.
    #[default]
    Initialized,
    /// An attempt is running.
    Resumed,
    /// The response is being validated, or streamed after passing validation.
    Validating,
    /// Between a failed attempt and the next one.
    Retrying,
    /// Completed, failed or cancelled. Handlers have been completed.
    Finished,
}

/// A cheap, cloneable handle to a stream request.
#[derive(Clone)]
pub struct StreamRequest {
    inner: Arc<Inner>,
}

struct Inner {
    id: RequestId,
    initial_request: HttpRequest,
    interceptor: Option<Arc<dyn Interceptor>>,
    context: Arc<SessionContext>,
    cancel_token: CancellationToken,
    finished: watch::Sender<bool>,
    state: Mutex<MutableState>,
}

#[derive(Default)]
struct MutableState {
    state: State,
    consumers: Vec<Box<dyn Consumer>>,
    validators: Vec<Validator>,
    requests: Vec<Arc<HttpRequest>>,
    tasks: Vec<TaskId>,
    metrics: Vec<TaskMetrics>,
    response: Option<Arc<ResponseHeader>>,
    error: Option<StreamError>,
    retry_count: usize,
    cancelled: bool,
    completion: Option<Completion>,
}

impl StreamRequest {
    pub(crate) fn new(initial_request: HttpRequest, interceptor: Option<Arc<dyn Interceptor>>, context: Arc<SessionContext>) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: RequestId::new(),
                initial_request,
                interceptor,
                context,
                cancel_token: CancellationToken::new(),
                finished,
                state: Mutex::new(MutableState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MutableState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitor(&self) -> &CompositeEventMonitor {
        &self.inner.context.monitor
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// The request as handed to the session, before any adaptation.
    pub fn initial_request(&self) -> &HttpRequest {
        &self.inner.initial_request
    }

    /// The current state. It may change as soon as this returns.
    pub fn state(&self) -> State {
        self.lock().state
    }

    /// How many retries have started so far.
    pub fn retry_count(&self) -> usize {
        self.lock().retry_count
    }

    /// The head of the latest response, if one arrived.
    pub fn response(&self) -> Option<Arc<ResponseHeader>> {
        self.lock().response.clone()
    }

    /// The error of the latest failed attempt, or the terminal error once finished.
    pub fn error(&self) -> Option<StreamError> {
        self.lock().error.clone()
    }

    /// Metrics of every finished transport task, oldest first.
    pub fn metrics(&self) -> Vec<TaskMetrics> {
        self.lock().metrics.clone()
    }

    /// Every transport task created for this request, oldest first.
    pub fn tasks(&self) -> Vec<TaskId> {
        self.lock().tasks.clone()
    }

    /// Every request handed to the transport, oldest first.
    pub fn requests(&self) -> Vec<Arc<HttpRequest>> {
        self.lock().requests.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.lock().state == State::Finished
    }

    /// The queue handlers are called on unless registered with
    /// [`on_stream_using`](Self::on_stream_using).
    pub fn delivery_queue(&self) -> &DeliveryQueue {
        &self.inner.context.delivery_queue
    }

    /// Starts the request. Does nothing unless it is still `Initialized`.
    #[must_use = "the handle is needed to observe or cancel the request"]
    pub fn resume(self) -> Self {
        self.start();
        self
    }

    fn start(&self) {
        {
            let mut state = self.lock();
            if state.state != State::Initialized || state.cancelled {
                return;
            }
            state.state = State::Resumed;
        }

        self.monitor().request_did_resume(self);
        self.inner.context.runtime.spawn(self.clone().run());
    }

    /// Cancels the request.
    ///
    /// No `Stream` event is delivered once this returns; every handler still
    /// receives one `Complete` carrying [`StreamError::ExplicitlyCancelled`].
    /// Cancelling a finished request does nothing.
    pub fn cancel(&self) {
        self.cancel_with(StreamError::ExplicitlyCancelled);
    }

    pub(crate) fn cancel_with(&self, error: StreamError) {
        let was_started = {
            let mut state = self.lock();
            if state.state == State::Finished || state.cancelled {
                return;
            }
            state.cancelled = true;
            state.error = Some(error);
            state.state != State::Initialized
        };

        self.inner.cancel_token.cancel();
        self.monitor().request_did_cancel(self);

        if !was_started {
            self.finish(None);
        }
    }

    /// Resolves once the request has finished.
    pub async fn finished(&self) {
        let mut finished = self.inner.finished.subscribe();
        // the sender lives as long as `self`, so this only returns once finished
        let _ = finished.wait_for(|finished| *finished).await;
    }

    /// Streams the raw body chunks.
    pub fn on_stream<F>(self, handler: F) -> Self
    where
        F: FnMut(StreamEvent<Bytes>) + Send + 'static,
    {
        self.on_stream_with(PassthroughStreamSerializer, handler)
    }

    /// Streams the body as text.
    pub fn on_stream_string<F>(self, handler: F) -> Self
    where
        F: FnMut(StreamEvent<String>) + Send + 'static,
    {
        self.on_stream_with(StringStreamSerializer::new(), handler)
    }

    /// Streams one decoded value per newline-delimited JSON frame.
    pub fn on_stream_decodable<T, F>(self, handler: F) -> Self
    where
        T: DeserializeOwned + Send + 'static,
        F: FnMut(StreamEvent<T, StreamError>) + Send + 'static,
    {
        self.on_stream_with(DecodableStreamSerializer::<T>::new(), handler)
    }

    /// Registers a handler fed through `serializer`, called on the request's
    /// [`delivery_queue`](Self::delivery_queue).
    ///
    /// The serializer is owned by this handler alone and is reset whenever the
    /// request retries.
    pub fn on_stream_with<S, F>(self, serializer: S, handler: F) -> Self
    where
        S: StreamSerializer,
        F: FnMut(StreamEvent<S::Item, S::Error>) + Send + 'static,
    {
        let queue = self.delivery_queue().clone();
        self.on_stream_using(queue, serializer, handler)
    }

    /// Registers a handler that is called on `queue`.
    pub fn on_stream_using<S, F>(self, queue: DeliveryQueue, serializer: S, handler: F) -> Self
    where
        S: StreamSerializer,
        F: FnMut(StreamEvent<S::Item, S::Error>) + Send + 'static,
    {
        let cancelled = self.inner.cancel_token.clone();
        self.register(Box::new(SerializingConsumer::new(serializer, queue, handler, cancelled)));
        self
    }

    /// Reads the raw body through a blocking [`std::io::Read`].
    ///
    /// At most `capacity` chunks are buffered between the request and the reader.
    pub fn into_reader(self, capacity: usize) -> io::Result<StreamReader> {
        let queue = DeliveryQueue::new(format!("micro-stream.reader.{}", self.id()))?;
        let (sink, receiver) = reader::channel(capacity);
        let request = self.on_stream_using(queue, PassthroughStreamSerializer, sink);
        Ok(StreamReader::new(request, receiver))
    }

    fn register(&self, mut consumer: Box<dyn Consumer>) {
        {
            let mut state = self.lock();
            if let Some(completion) = state.completion.clone() {
                drop(state);
                consumer.complete(completion);
                return;
            }
            if let Some(response) = &state.response {
                consumer.prepare(response);
            }
            state.consumers.push(consumer);
        }

        if self.inner.context.start_requests_immediately {
            self.start();
        }
    }

    /// Accepts `2xx` responses whose content type matches the request's `Accept` header.
    pub fn validate(self) -> Self {
        self.add_validator(validation::status(200..300)).add_validator(validation::accepted_content_type())
    }

    /// Accepts responses whose status code lies in `acceptable`, e.g. `200..300`.
    pub fn validate_status<R>(self, acceptable: R) -> Self
    where
        R: RangeBounds<u16> + Send + Sync + 'static,
    {
        self.add_validator(validation::status(acceptable))
    }

    /// Accepts responses whose `Content-Type` matches one of `acceptable`.
    ///
    /// Entries may use wildcards such as `text/*` or `*/*`. A response without a
    /// `Content-Type` fails unless `*/*` is acceptable.
    pub fn validate_content_type<I, T>(self, acceptable: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.add_validator(validation::content_type(acceptable.into_iter().map(Into::into).collect()))
    }

    /// Validates the response head with `predicate`.
    pub fn validate_with<F>(self, predicate: F) -> Self
    where
        F: Fn(StatusCode, &HeaderMap) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_validator(validation::custom(predicate))
    }

    fn add_validator(self, validator: Validator) -> Self {
        self.lock().validators.push(validator);
        self
    }
}

impl PartialEq for StreamRequest {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StreamRequest {}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("id", &self.inner.id)
            .field("uri", self.inner.initial_request.uri())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
