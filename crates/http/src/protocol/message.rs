use bytes::Bytes;

/// A piece of an HTTP response as it is read from the connection.
///
/// The response head always comes first, followed by zero or more
/// [`PayloadItem::Chunk`]s and a single [`PayloadItem::Eof`].
#[derive(Debug)]
pub enum Message<T> {
    /// The decoded response head, typically `(ResponseHeader, PayloadSize)`
    Header(T),
    /// A chunk of body data or the end-of-body marker
    Payload(PayloadItem),
}

/// An item of the response body stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// Body bytes, in arrival order
    Chunk(Bytes),
    /// The body is complete
    Eof,
}

/// How the length of a response body is delimited on the wire.
///
/// Responses may be framed by `Content-Length`, by chunked transfer coding, or,
/// when neither header is present, by the server closing the connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Exactly this many bytes follow the head
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// The body runs until the connection is closed
    UntilClose,
    /// No body at all (`HEAD`, `1xx`, `204`, `304`)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty) || matches!(self, PayloadSize::Length(0))
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }

    /// The exact body length, when it is known up front.
    pub fn exact(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => None,
        }
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Returns the payload item, or `None` for a header message.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
