//! Response body decoding.
//!
//! - [`PayloadDecoder`]: selects a strategy from the response framing
//! - `LengthDecoder`: `Content-Length` bodies
//! - `ChunkedDecoder`: chunked transfer coding (RFC 9112)
//!
//! Request bodies are always sent whole with a `Content-Length`, so there are no
//! body encoders here.

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;

pub use payload_decoder::PayloadDecoder;
