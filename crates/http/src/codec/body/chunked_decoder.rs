//! Decoder for `Transfer-Encoding: chunked` response bodies.
//!
//! See [RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//! Size lines and trailers are only parsed once a whole line is buffered; chunk
//! data is handed out as soon as it arrives, so a large chunk never has to be
//! buffered completely.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

/// Longest size line (size, extensions and CRLF) accepted before giving up.
const MAX_LINE_LEN: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// waiting for a `size[;ext]\r\n` line
    Size,
    /// inside chunk data, this many bytes left
    Data(u64),
    /// the CRLF that closes a chunk's data
    DataEnd,
    /// trailer fields after the last chunk, up to an empty line
    Trailer,
    /// the final chunk and trailers have been read
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::Done => return Ok(Some(PayloadItem::Eof)),

                ChunkedState::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { ChunkedState::Trailer } else { ChunkedState::Data(size) };
                }

                ChunkedState::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = remaining.min(src.len() as u64);
                    let bytes = src.split_to(len as usize).freeze();
                    let remaining = remaining - len;
                    self.state = if remaining == 0 { ChunkedState::DataEnd } else { ChunkedState::Data(remaining) };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(ParseError::invalid_body("chunk data is not followed by CRLF"));
                    }
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    // trailer fields are read and dropped, an empty line ends the body
                    if line.is_empty() {
                        trace!("finished reading chunked body");
                        self.state = ChunkedState::Done;
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::IncompleteResponse),
        }
    }
}

/// Splits one CRLF terminated line off `src`, without the line ending.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.iter().position(|b| *b == b'\n') {
        Some(lf) => {
            let mut line = src.split_to(lf + 1);
            line.truncate(lf);
            if line.last() != Some(&b'\r') {
                return Err(ParseError::invalid_body("chunk line must end with CRLF"));
            }
            line.truncate(lf - 1);
            Ok(Some(line))
        }
        None if src.len() > MAX_LINE_LEN => Err(ParseError::invalid_body("chunk size line too long")),
        None => Ok(None),
    }
}

/// Parses the hex size of a `size[ ][;extension]` line, ignoring extensions.
fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let digits = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    if digits.is_empty() {
        return Err(ParseError::invalid_body("missing chunk size"));
    }

    digits.iter().try_fold(0u64, |size, b| {
        let digit = (*b as char).to_digit(16).ok_or_else(|| ParseError::invalid_body("invalid chunk size"))?;
        size.checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}
