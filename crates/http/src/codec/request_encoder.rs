use crate::codec::header::HeaderEncoder;
use crate::protocol::{HttpRequest, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::trace;

/// Encodes a whole [`HttpRequest`]: head, then the body bytes as they are.
#[derive(Debug, Default)]
pub struct RequestEncoder {
    header_encoder: HeaderEncoder,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Encoder<&HttpRequest> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, request: &HttpRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.header_encoder.encode(request, dst)?;

        let body = request.body_bytes();
        if !body.is_empty() {
            trace!(len = body.len(), "encode request body");
            dst.extend_from_slice(body);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_follows_head() {
        let request = HttpRequest::post("http://localhost:80/anything").unwrap().body(r#"{"a":1}"#);

        let mut dst = BytesMut::new();
        RequestEncoder::new().encode(&request, &mut dst).unwrap();

        let raw = std::str::from_utf8(&dst).unwrap();
        assert!(raw.starts_with("POST /anything HTTP/1.1\r\nhost: localhost:80\r\ncontent-length: 7\r\n"));
        assert!(raw.ends_with("\r\n\r\n{\"a\":1}"));
    }
}
