//! HTTP head processing for the client side
//!
//! - [`HeaderDecoder`]: decodes response heads and picks the body framing
//! - [`HeaderEncoder`]: encodes request heads

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
