use crate::serializer::StreamSerializer;
use bytes::BytesMut;
use micro_stream_http::protocol::ResponseHeader;
use std::convert::Infallible;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Charset::Latin1,
            // us-ascii is a subset of utf-8
            _ => Charset::Utf8,
        }
    }
}

/// Decodes body bytes to text using the response's declared charset.
///
/// Values follow the chunk boundaries, except that a multi-byte UTF-8 sequence
/// split across chunks is held back until it is complete. Invalid sequences are
/// replaced with U+FFFD, so decoding never fails.
#[derive(Debug, Clone, Default)]
pub struct StringStreamSerializer {
    charset: Charset,
}

impl StringStreamSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&self, bytes: &[u8]) -> String {
        match self.charset {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

impl StreamSerializer for StringStreamSerializer {
    type Item = String;
    type Error = Infallible;

    fn prepare(&mut self, response: &ResponseHeader) {
        self.charset = response
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET).map(|charset| Charset::from_label(charset.as_str())))
            .unwrap_or_default();
        trace!(charset = ?self.charset, "string serializer prepared");
    }

    fn decode(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>> {
        let complete = match self.charset {
            Charset::Utf8 => src.len() - incomplete_utf8_tail(src),
            Charset::Latin1 => src.len(),
        };
        if complete == 0 {
            return None;
        }

        let bytes = src.split_to(complete);
        Some(Ok(self.take(&bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Option<Result<Self::Item, Self::Error>> {
        if src.is_empty() {
            return None;
        }
        let bytes = src.split();
        Some(Ok(self.take(&bytes)))
    }

    fn reset(&mut self) {
        self.charset = Charset::default();
    }
}

/// Length of a UTF-8 sequence cut off at the end of `bytes`.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let window = bytes.len().min(3);
    for back in 1..=window {
        let byte = bytes[bytes.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }

        let width = match byte {
            b if b & 0b1110_0000 == 0b1100_0000 => 2,
            b if b & 0b1111_0000 == 0b1110_0000 => 3,
            b if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return 0,
        };
        return if back < width { back } else { 0 };
    }
    0
}
