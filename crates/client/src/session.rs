//! Sessions create and own stream requests.
//!
//! A [`Session`] holds what every request it creates shares: the transport, the
//! interceptor, the event monitors, the default delivery queue and the runtime
//! the request drivers are spawned on. Dropping a session cancels every request
//! that has not finished yet with [`StreamError::SessionDeinitialized`].

use crate::error::StreamError;
use crate::interceptor::{Interceptor, Interceptors};
use crate::monitor::{CompositeEventMonitor, EventMonitor};
use crate::queue::DeliveryQueue;
use crate::request::{RequestId, StreamRequest};
use crate::transport::{HttpTransport, Transport};
use http::header::{ACCEPT_ENCODING, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};
use micro_stream_http::protocol::HttpRequest;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = concat!("micro-stream/", env!("CARGO_PKG_VERSION"));

/// State shared by a session and every request it created.
pub(crate) struct SessionContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) monitor: CompositeEventMonitor,
    pub(crate) delivery_queue: DeliveryQueue,
    pub(crate) runtime: Handle,
    pub(crate) start_requests_immediately: bool,
    interceptor: Option<Arc<dyn Interceptor>>,
    default_headers: HeaderMap,
    requests: Mutex<HashMap<RequestId, StreamRequest>>,
}

impl SessionContext {
    fn requests(&self) -> MutexGuard<'_, HashMap<RequestId, StreamRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops a finished request from the registry.
    pub(crate) fn forget(&self, id: RequestId) {
        self.requests().remove(&id);
    }
}

/// Creates stream requests that share one transport, interceptor, set of
/// monitors and delivery queue.
///
/// Build one with [`Session::builder`].
pub struct Session {
    context: Arc<SessionContext>,
}

impl Session {
    /// A builder with the default transport, queue and headers.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates a request for `request`.
    ///
    /// The request does not start before it is resumed, either explicitly or by
    /// registering a handler while `start_requests_immediately` is on.
    pub fn stream_request(&self, request: HttpRequest) -> StreamRequest {
        self.create(request, self.context.interceptor.clone())
    }

    /// Like [`stream_request`](Self::stream_request), with `interceptor` running
    /// before the session's own interceptor.
    pub fn stream_request_with<I>(&self, request: HttpRequest, interceptor: I) -> StreamRequest
    where
        I: Interceptor + 'static,
    {
        let mut builder = Interceptors::builder().add_last(interceptor);
        if let Some(session_interceptor) = &self.context.interceptor {
            builder = builder.add_shared(Arc::clone(session_interceptor));
        }
        self.create(request, Some(Arc::new(builder.build())))
    }

    fn create(&self, mut request: HttpRequest, interceptor: Option<Arc<dyn Interceptor>>) -> StreamRequest {
        for (name, value) in &self.context.default_headers {
            if !request.headers().contains_key(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }

        let stream_request = StreamRequest::new(request, interceptor, Arc::clone(&self.context));
        self.context.requests().insert(stream_request.id(), stream_request.clone());
        debug!(request_id = %stream_request.id(), "created stream request");
        stream_request
    }

    /// Requests created by this session that have not finished yet.
    pub fn active_requests(&self) -> Vec<StreamRequest> {
        self.context.requests().values().cloned().collect()
    }

    /// Cancels every active request with [`StreamError::ExplicitlyCancelled`].
    pub fn cancel_all_requests(&self) {
        for request in self.active_requests() {
            request.cancel();
        }
    }

    pub fn delivery_queue(&self) -> &DeliveryQueue {
        &self.context.delivery_queue
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let requests = self.active_requests();
        if !requests.is_empty() {
            debug!(count = requests.len(), "session dropped, cancelling unfinished requests");
        }
        for request in requests {
            request.cancel_with(StreamError::SessionDeinitialized);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("delivery_queue", &self.context.delivery_queue)
            .field("monitor", &self.context.monitor)
            .field("start_requests_immediately", &self.context.start_requests_immediately)
            .finish_non_exhaustive()
    }
}

/// Configures a [`Session`].
///
/// Requests get `User-Agent: micro-stream/<version>` and
/// `Accept-Encoding: identity` unless they set those headers themselves.
pub struct SessionBuilder {
    transport: Option<Arc<dyn Transport>>,
    interceptor: Option<Arc<dyn Interceptor>>,
    monitor: CompositeEventMonitor,
    delivery_queue: Option<DeliveryQueue>,
    runtime: Option<Handle>,
    default_headers: HeaderMap,
    start_requests_immediately: bool,
}

impl SessionBuilder {
    fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        Self {
            transport: None,
            interceptor: None,
            monitor: CompositeEventMonitor::default(),
            delivery_queue: None,
            runtime: None,
            default_headers,
            start_requests_immediately: true,
        }
    }

    /// Defaults to [`HttpTransport`].
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// The interceptor every request of the session goes through.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Adds a monitor after the ones already added.
    pub fn event_monitor(mut self, monitor: impl EventMonitor + 'static) -> Self {
        self.monitor.push(Arc::new(monitor));
        self
    }

    pub fn event_monitors(mut self, monitors: impl IntoIterator<Item = Arc<dyn EventMonitor>>) -> Self {
        for monitor in monitors {
            self.monitor.push(monitor);
        }
        self
    }

    /// The queue handlers run on by default. Defaults to [`DeliveryQueue::main`].
    pub fn delivery_queue(mut self, queue: DeliveryQueue) -> Self {
        self.delivery_queue = Some(queue);
        self
    }

    /// The runtime request drivers are spawned on. Defaults to the runtime
    /// `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Adds a header to every request that does not set it itself.
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Whether registering a handler starts the request. Defaults to `true`;
    /// otherwise requests wait for [`StreamRequest::resume`].
    pub fn start_requests_immediately(mut self, start_requests_immediately: bool) -> Self {
        self.start_requests_immediately = start_requests_immediately;
        self
    }

    pub fn build(self) -> Result<Session, SessionBuildError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().ok().ok_or(SessionBuildError::MissingRuntime)?,
        };

        let context = SessionContext {
            transport: self.transport.unwrap_or_else(|| Arc::new(HttpTransport::default())),
            monitor: self.monitor,
            delivery_queue: self.delivery_queue.unwrap_or_else(DeliveryQueue::main),
            runtime,
            start_requests_immediately: self.start_requests_immediately,
            interceptor: self.interceptor,
            default_headers: self.default_headers,
            requests: Mutex::new(HashMap::new()),
        };

        Ok(Session { context: Arc::new(context) })
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("monitor", &self.monitor)
            .field("delivery_queue", &self.delivery_queue)
            .field("default_headers", &self.default_headers)
            .field("start_requests_immediately", &self.start_requests_immediately)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum SessionBuildError {
    #[error("no runtime was set and build was not called from within a tokio runtime")]
    MissingRuntime,
}
