use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error};

use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::protocol::{HttpError, HttpRequest, Message, ParseError, PayloadSize, ResponseHeader};

/// A response item read back from an [`HttpConnection`].
pub type ResponseMessage = Message<(ResponseHeader, PayloadSize)>;

/// The client side of an HTTP/1.1 connection.
///
/// A request is written with [`send_request`](Self::send_request); its response is
/// then read with [`next_message`](Self::next_message): the head first, followed by
/// body chunks and a final EOF item.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, ResponseDecoder>,
    framed_write: FramedWrite<W, RequestEncoder>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, ResponseDecoder::new(), 8 * 1024),
            framed_write: FramedWrite::new(writer, RequestEncoder::new()),
        }
    }

    /// Writes `request` and flushes it to the peer.
    pub async fn send_request(&mut self, request: &HttpRequest) -> Result<(), HttpError> {
        self.framed_read.decoder_mut().expect_response_to(request.method());
        self.framed_write.send(request).await?;
        debug!(method = %request.method(), uri = %request.uri(), "request sent");
        Ok(())
    }

    /// Reads the next piece of the response.
    ///
    /// Returns `None` once the peer closed the connection and everything buffered
    /// has been decoded.
    pub async fn next_message(&mut self) -> Option<Result<ResponseMessage, HttpError>> {
        match self.framed_read.next().await? {
            Ok(message) => Some(Ok(message)),
            Err(e) => {
                error!(cause = %e, "failed to read response");
                Some(Err(e.into()))
            }
        }
    }

    /// Reads the next piece of the response, treating an early close as an error.
    pub async fn read_message(&mut self) -> Result<ResponseMessage, HttpError> {
        self.next_message().await.unwrap_or(Err(ParseError::IncompleteResponse.into()))
    }
}
