//! HTTP/1.1 client wire protocol
//!
//! This crate holds the byte-level half of the micro-stream client: encoding
//! requests and incrementally decoding responses on top of tokio, so that body
//! bytes can be handed on as soon as they arrive.
//!
//! # Features
//!
//! - Response heads parsed with `httparse`
//! - Content-Length, chunked and read-until-close response bodies
//! - Interim `1xx` responses skipped
//! - `HEAD`, `204` and `304` responses without body
//!
//! # Example
//!
//! ```no_run
//! use micro_stream_http::connection::HttpConnection;
//! use micro_stream_http::protocol::{HttpRequest, Message, PayloadItem};
//! use tokio::net::TcpStream;
//! use tracing::info;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let stream = TcpStream::connect("127.0.0.1:8080").await?;
//!     let (reader, writer) = stream.into_split();
//!     let mut connection = HttpConnection::new(reader, writer);
//!
//!     let request = HttpRequest::get("http://127.0.0.1:8080/stream/3")?;
//!     connection.send_request(&request).await?;
//!
//!     while let Some(message) = connection.next_message().await {
//!         match message? {
//!             Message::Header((header, _)) => info!(status = %header.status(), "received head"),
//!             Message::Payload(PayloadItem::Chunk(bytes)) => info!(len = bytes.len(), "received chunk"),
//!             Message::Payload(PayloadItem::Eof) => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: request/response exchange over an async reader and writer
//! - [`protocol`]: request, response and error types
//! - [`codec`]: the `tokio_util` encoder and decoder
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No TLS
//! - Maximum response head size: 8KB
//! - Maximum number of response headers: 64

pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
