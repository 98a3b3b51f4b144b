//! HTTP response decoder
//!
//! Decodes one response at a time: first the head through [`HeaderDecoder`], then
//! the body through a [`PayloadDecoder`] chosen from the head. Interim `1xx`
//! responses are skipped.
//!
//! # Example
//!
//! ```no_run
//! use micro_stream_http::codec::ResponseDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut buffer = BytesMut::from("HTTP/1.1 204 No Content\r\n\r\n");
//! let head = decoder.decode(&mut buffer);
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

/// Decoder for HTTP responses, yielding the head and then body items.
///
/// `payload_decoder` is `None` while a head is expected and `Some` while the body
/// of the current response is being read.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Prepares the decoder for the response to a request with `method`.
    pub fn expect_response_to(&mut self, method: &http::Method) {
        self.header_decoder.expect_body(method != http::Method::HEAD);
    }

    fn on_payload_item(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHeader, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload_item(item));
        }

        loop {
            match self.header_decoder.decode(src)? {
                Some((header, _)) if header.is_informational() => {
                    trace!(status = %header.status(), "skip interim response");
                }
                Some((header, payload_size)) => {
                    self.payload_decoder = Some(payload_size.into());
                    return Ok(Some(Message::Header((header, payload_size))));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.on_payload_item(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::IncompleteResponse),
        }
    }
}
