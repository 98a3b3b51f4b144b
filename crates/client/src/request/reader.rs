use super::StreamRequest;
use crate::error::StreamError;
use crate::event::StreamEvent;
use bytes::{Buf, Bytes};
use std::fmt;
use std::io::{self, Read};
use tokio::sync::mpsc;

pub(super) enum ReaderItem {
    Data(Bytes),
    End(Option<StreamError>),
}

/// The handler side of a reader: pushes every event into the bounded channel,
/// blocking its delivery queue while the reader lags behind.
pub(super) fn channel(capacity: usize) -> (impl FnMut(StreamEvent<Bytes>) + Send + 'static, mpsc::Receiver<ReaderItem>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let sink = move |event: StreamEvent<Bytes>| {
        let item = match event {
            StreamEvent::Stream(Ok(data)) => ReaderItem::Data(data),
            StreamEvent::Stream(Err(never)) => match never {},
            StreamEvent::Complete(completion) => ReaderItem::End(completion.error),
        };
        // the reader is gone, nobody is left to tell
        let _ = sender.blocking_send(item);
    };
    (sink, receiver)
}

/// A blocking [`Read`] over the body of a [`StreamRequest`].
///
/// Reads block the calling thread, so a reader must not be used from within an
/// async task. A request that failed surfaces its error from `read` once the
/// data received before the failure has been consumed. Dropping the reader
/// cancels the request.
pub struct StreamReader {
    request: StreamRequest,
    receiver: mpsc::Receiver<ReaderItem>,
    current: Bytes,
    done: bool,
}

impl StreamReader {
    pub(super) fn new(request: StreamRequest, receiver: mpsc::Receiver<ReaderItem>) -> Self {
        Self { request, receiver, current: Bytes::new(), done: false }
    }

    pub fn request(&self) -> &StreamRequest {
        &self.request
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.current.is_empty() {
                let len = buf.len().min(self.current.len());
                buf[..len].copy_from_slice(&self.current[..len]);
                self.current.advance(len);
                return Ok(len);
            }

            if self.done {
                return Ok(0);
            }

            match self.receiver.blocking_recv() {
                Some(ReaderItem::Data(data)) => self.current = data,
                Some(ReaderItem::End(None)) | None => self.done = true,
                Some(ReaderItem::End(Some(error))) => {
                    self.done = true;
                    return Err(io::Error::other(error));
                }
            }
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        if !self.done {
            self.request.cancel();
        }
    }
}

impl fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReader").field("request", &self.request.id()).field("done", &self.done).finish_non_exhaustive()
    }
}
