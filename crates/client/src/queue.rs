//! Serial delivery of consumer events.
//!
//! A [`DeliveryQueue`] owns one OS thread and runs the jobs handed to it one at a
//! time, in submission order. Every stream consumer is bound to a queue, so its
//! handler never runs concurrently with itself and never blocks the request
//! driver.

use once_cell::sync::Lazy;
use std::cell::Cell;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_QUEUE_ID: AtomicUsize = AtomicUsize::new(1);

static MAIN_QUEUE: Lazy<DeliveryQueue> =
    Lazy::new(|| DeliveryQueue::new("micro-stream.main").unwrap_or_else(|e| panic!("failed to start the main delivery queue: {e}")));

thread_local! {
    static CURRENT_QUEUE: Cell<usize> = const { Cell::new(0) };
}

/// A handle to a serial executor. Cloning the handle shares the executor.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    id: usize,
    label: String,
    sender: mpsc::UnboundedSender<Job>,
}

impl DeliveryQueue {
    /// Starts a new queue whose worker thread is named `label`.
    ///
    /// The worker stops once every handle to the queue has been dropped and the
    /// pending jobs have run.
    pub fn new(label: impl Into<String>) -> io::Result<Self> {
        let label = label.into();
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        thread::Builder::new().name(label.clone()).spawn(move || {
            CURRENT_QUEUE.with(|current| current.set(id));
            while let Some(job) = receiver.blocking_recv() {
                if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!(cause = panic_message(cause.as_ref()), "stream handler panicked");
                }
            }
            trace!(queue_id = id, "delivery queue stopped");
        })?;

        Ok(Self { inner: Arc::new(QueueInner { id, label, sender }) })
    }

    /// The process-wide default queue, playing the role of an application's main thread.
    pub fn main() -> DeliveryQueue {
        MAIN_QUEUE.clone()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the calling thread is this queue's worker.
    pub fn is_current(&self) -> bool {
        CURRENT_QUEUE.with(Cell::get) == self.inner.id
    }

    /// Schedules `job` after everything already submitted to this queue.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.sender.send(Box::new(job)).is_err() {
            error!(queue = %self.inner.label, "delivery queue worker is gone, dropping job");
        }
    }
}

impl PartialEq for DeliveryQueue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for DeliveryQueue {}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue").field("id", &self.inner.id).field("label", &self.inner.label).finish()
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
