//! The seam between a request and the network.
//!
//! A [`Transport`] turns one [`HttpRequest`] into a [`TransportTask`]: a stream of
//! [`TransportEvent`]s that always ends with [`TransportEvent::Completed`]. The
//! request driver consumes the task; the transport produces events through the
//! paired [`TransportTaskHandle`].
//!
//! [`HttpTransport`] is the bundled plain-TCP HTTP/1.1 implementation.

mod http1;

pub use http1::HttpTransport;
pub use http1::HttpTransportBuilder;

use crate::error::TransportError;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use http::header::WWW_AUTHENTICATE;
use http::{HeaderMap, StatusCode};
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Executes requests. Called from within the tokio runtime the session runs on.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync + 'static {
    /// Starts `request` and returns the task streaming its events.
    fn execute(&self, request: HttpRequest) -> TransportTask;
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport task, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw, process-wide counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug)]
pub enum TransportEvent {
    /// The final response head. Interim `1xx` heads are not reported.
    HeadersReceived(ResponseHeader),
    /// The next piece of the body, as it came off the wire.
    Data(Bytes),
    /// The server asked for authentication.
    Challenge(AuthChallenge),
    /// The response is about to be stored by a caching transport.
    WillCacheResponse,
    /// Sent once, just before `Completed`.
    Metrics(TaskMetrics),
    /// Always the last event of a task. `None` means success.
    Completed(Option<TransportError>),
}

/// An authentication challenge carried by a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The auth scheme, e.g. `Basic`.
    pub scheme: String,
    /// Everything after the scheme, e.g. `realm="api"`.
    pub parameters: String,
}

impl AuthChallenge {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }

        let (scheme, parameters) = value.split_once(' ').unwrap_or((value, ""));
        Some(Self { scheme: scheme.to_owned(), parameters: parameters.trim().to_owned() })
    }
}

/// Timing and volume of one transport task.
#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub task: TaskId,
    /// When the transport started working on the request, connect included.
    pub started_at: Instant,
    /// When the last response byte was read or the task failed.
    pub finished_at: Instant,
    pub request_body_bytes: u64,
    /// Body bytes after transfer decoding, head excluded.
    pub response_body_bytes: u64,
    /// `None` if no response head arrived.
    pub status: Option<StatusCode>,
}

impl TaskMetrics {
    /// Metrics for `task`, started now.
    pub fn start(task: TaskId) -> Self {
        let now = Instant::now();
        Self { task, started_at: now, finished_at: now, request_body_bytes: 0, response_body_bytes: 0, status: None }
    }

    #[must_use]
    pub fn finish(mut self) -> Self {
        self.finished_at = Instant::now();
        self
    }

    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

/// The consuming half of a transport task.
///
/// Dropping it cancels the task.
pub struct TransportTask {
    id: TaskId,
    events: mpsc::Receiver<TransportEvent>,
    cancel_token: CancellationToken,
}

/// The producing half of a transport task, owned by the transport.
pub struct TransportTaskHandle {
    id: TaskId,
    sender: mpsc::Sender<TransportEvent>,
    cancel_token: CancellationToken,
}

impl TransportTask {
    /// Creates a task whose event buffer holds `capacity` events before the
    /// producer has to wait.
    pub fn channel(capacity: usize) -> (TransportTaskHandle, TransportTask) {
        let id = TaskId::next();
        let (sender, events) = mpsc::channel(capacity);
        let cancel_token = CancellationToken::new();
        (TransportTaskHandle { id, sender, cancel_token: cancel_token.clone() }, TransportTask { id, events, cancel_token })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Asks the producer to stop. Events already buffered can still be read.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Stream for TransportTask {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl Drop for TransportTask {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl fmt::Debug for TransportTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportTask").field("id", &self.id).field("cancelled", &self.is_cancelled()).finish()
    }
}

impl TransportTaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Hands `event` to the task, waiting while its buffer is full.
    ///
    /// Returns `false` once the task has been dropped.
    pub async fn send(&mut self, event: TransportEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// A token that fires when the consumer cancels or drops the task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl fmt::Debug for TransportTaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportTaskHandle").field("id", &self.id).field("cancelled", &self.is_cancelled()).finish()
    }
}
