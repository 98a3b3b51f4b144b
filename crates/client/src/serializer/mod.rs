//! Turning body bytes into typed stream values.
//!
//! A [`StreamSerializer`] works like a `tokio_util` decoder: it is handed a
//! growing buffer and splits values off its front. Each consumer owns its own
//! [`SerializerPipeline`], so a malformed unit only produces an error value for
//! that unit and the stream keeps going.

mod decodable;
mod passthrough;
mod string;

pub use decodable::DecodableStreamSerializer;
pub use passthrough::PassthroughStreamSerializer;
pub use string::StringStreamSerializer;

use bytes::BytesMut;
use micro_stream_http::protocol::ResponseHeader;
use std::fmt;

pub trait StreamSerializer: Send + 'static {
    type Item: Send + 'static;
    type Error: Send + 'static;

    /// Called with the response head before any body byte.
    fn prepare(&mut self, _response: &ResponseHeader) {}

    /// Splits the next complete value off `src`, or returns `None` until more
    /// bytes arrive. A returned value must consume at least one byte.
    fn decode(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>>;

    /// Called once the body has ended with whatever `decode` left behind.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>> {
        self.decode(src)
    }

    /// Drops any state carried over from an abandoned attempt.
    fn reset(&mut self) {}
}

/// A serializer together with the bytes it has not consumed yet.
pub struct SerializerPipeline<S> {
    serializer: S,
    buffer: BytesMut,
}

impl<S: StreamSerializer> SerializerPipeline<S> {
    pub fn new(serializer: S) -> Self {
        Self { serializer, buffer: BytesMut::new() }
    }

    pub fn prepare(&mut self, response: &ResponseHeader) {
        self.serializer.prepare(response);
    }

    /// Appends `chunk` and returns every value that became complete, in order.
    pub fn consume(&mut self, chunk: &[u8]) -> Vec<Result<S::Item, S::Error>> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while !self.buffer.is_empty() {
            match self.serializer.decode(&mut self.buffer) {
                Some(value) => values.push(value),
                None => break,
            }
        }
        values
    }

    /// Flushes the trailing value at the end of a successful body.
    pub fn finish(&mut self) -> Option<Result<S::Item, S::Error>> {
        if self.buffer.is_empty() {
            return None;
        }
        let value = self.serializer.decode_eof(&mut self.buffer);
        self.buffer.clear();
        value
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.serializer.reset();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl<S> fmt::Debug for SerializerPipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerPipeline").field("buffered", &self.buffer.len()).finish_non_exhaustive()
    }
}
