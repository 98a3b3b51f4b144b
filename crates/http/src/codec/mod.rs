//! HTTP/1.1 client codec
//!
//! - [`RequestEncoder`]: writes a request head and its body
//! - [`ResponseDecoder`]: reads a response head, then streams its body as
//!   [`PayloadItem`](crate::protocol::PayloadItem)s
//!
//! Both plug into `tokio_util::codec::{FramedWrite, FramedRead}`; body framing
//! (content-length, chunked, read-until-close) is handled by the `body` module.

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
