use crate::serializer::StreamSerializer;
use bytes::{Bytes, BytesMut};
use std::convert::Infallible;

/// Hands every received chunk on unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStreamSerializer;

impl StreamSerializer for PassthroughStreamSerializer {
    type Item = Bytes;
    type Error = Infallible;

    fn decode(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>> {
        if src.is_empty() {
            return None;
        }
        Some(Ok(src.split().freeze()))
    }
}
