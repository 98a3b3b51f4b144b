use crate::event::{Completion, StreamEvent};
use crate::queue::DeliveryQueue;
use crate::serializer::{SerializerPipeline, StreamSerializer};
use bytes::Bytes;
use micro_stream_http::protocol::ResponseHeader;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// One registered stream handler as seen by the request driver.
///
/// Every method is called with the request's lock held, so implementations only
/// decode and hand work to their queue.
pub(crate) trait Consumer: Send {
    fn prepare(&mut self, response: &ResponseHeader);

    fn consume(&mut self, chunk: &Bytes);

    fn reset(&mut self);

    fn complete(self: Box<Self>, completion: Completion);
}

pub(crate) struct SerializingConsumer<S, F> {
    pipeline: SerializerPipeline<S>,
    queue: DeliveryQueue,
    handler: Arc<Mutex<F>>,
    cancelled: CancellationToken,
}

impl<S, F> SerializingConsumer<S, F>
where
    S: StreamSerializer,
    F: FnMut(StreamEvent<S::Item, S::Error>) + Send + 'static,
{
    pub(crate) fn new(serializer: S, queue: DeliveryQueue, handler: F, cancelled: CancellationToken) -> Self {
        Self { pipeline: SerializerPipeline::new(serializer), queue, handler: Arc::new(Mutex::new(handler)), cancelled }
    }

    fn deliver(&self, event: StreamEvent<S::Item, S::Error>) {
        let handler = Arc::clone(&self.handler);
        let cancelled = self.cancelled.clone();
        self.queue.dispatch(move || {
            // values queued before a cancel must not reach the handler after it
            if !event.is_complete() && cancelled.is_cancelled() {
                return;
            }
            let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
            (&mut *handler)(event);
        });
    }
}

impl<S, F> Consumer for SerializingConsumer<S, F>
where
    S: StreamSerializer,
    F: FnMut(StreamEvent<S::Item, S::Error>) + Send + 'static,
{
    fn prepare(&mut self, response: &ResponseHeader) {
        self.pipeline.prepare(response);
    }

    fn consume(&mut self, chunk: &Bytes) {
        for value in self.pipeline.consume(chunk) {
            self.deliver(StreamEvent::Stream(value));
        }
    }

    fn reset(&mut self) {
        self.pipeline.reset();
    }

    fn complete(mut self: Box<Self>, completion: Completion) {
        if completion.is_success() {
            if let Some(value) = self.pipeline.finish() {
                self.deliver(StreamEvent::Stream(value));
            }
        }
        self.deliver(StreamEvent::Complete(completion));
    }
}
