use crate::error::StreamError;
use crate::serializer::StreamSerializer;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// Decodes one JSON value per delimited frame, newline by default.
///
/// Blank frames are skipped. A frame that fails to decode becomes an error value
/// for that frame alone; the frames after it still decode.
pub struct DecodableStreamSerializer<T> {
    delimiter: u8,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DecodableStreamSerializer<T> {
    pub fn new() -> Self {
        Self::with_delimiter(b'\n')
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter, _marker: PhantomData }
    }
}

impl<T> Default for DecodableStreamSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DecodableStreamSerializer<T> {
    fn clone(&self) -> Self {
        Self::with_delimiter(self.delimiter)
    }
}

impl<T> fmt::Debug for DecodableStreamSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodableStreamSerializer").field("delimiter", &char::from(self.delimiter)).finish()
    }
}

fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T, StreamError> {
    serde_json::from_slice(frame).map_err(StreamError::decoding_failed)
}

impl<T> StreamSerializer for DecodableStreamSerializer<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = T;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>> {
        loop {
            let position = src.iter().position(|b| *b == self.delimiter)?;
            let frame = src.split_to(position + 1);
            let frame = &frame[..position];
            if frame.trim_ascii().is_empty() {
                continue;
            }
            return Some(decode_frame(frame));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>> {
        if let Some(value) = self.decode(src) {
            return Some(value);
        }

        let frame = src.split();
        if frame.trim_ascii().is_empty() {
            return None;
        }
        Some(decode_frame(&frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::SerializerPipeline;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Event {
        id: u32,
    }

    #[test]
    fn frames_span_chunks() {
        let mut pipeline = SerializerPipeline::new(DecodableStreamSerializer::<Event>::new());

        assert!(pipeline.consume(b"{\"id\":").is_empty());
        let values = pipeline.consume(b"1}\n{\"id\":2}\n\n{\"id\"");
        assert_eq!(values.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![Event { id: 1 }, Event { id: 2 }]);

        let values = pipeline.consume(b":3}\r\n");
        assert_eq!(values.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![Event { id: 3 }]);
    }

    #[test]
    fn bad_frame_does_not_stop_the_stream() {
        let mut pipeline = SerializerPipeline::new(DecodableStreamSerializer::<Event>::new());

        let values = pipeline.consume(b"{\"id\":1}\nnot json\n{\"id\":2}\n");

        assert_eq!(values.len(), 3);
        assert!(matches!(&values[0], Ok(Event { id: 1 })));
        assert!(matches!(&values[1], Err(error) if error.is_response_serialization_error()));
        assert!(matches!(&values[2], Ok(Event { id: 2 })));
    }

    #[test]
    fn unterminated_last_frame_is_decoded_at_eof() {
        let mut pipeline = SerializerPipeline::new(DecodableStreamSerializer::<Event>::new());

        assert!(pipeline.consume(b"{\"id\":7}").is_empty());
        assert_eq!(pipeline.finish().map(Result::unwrap), Some(Event { id: 7 }));
    }

    #[test]
    fn custom_delimiter() {
        let mut pipeline = SerializerPipeline::new(DecodableStreamSerializer::<Event>::with_delimiter(0x1e));

        let values = pipeline.consume(b"{\"id\":1}\x1e{\"id\":2}\x1e");
        assert_eq!(values.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![Event { id: 1 }, Event { id: 2 }]);
    }
}
