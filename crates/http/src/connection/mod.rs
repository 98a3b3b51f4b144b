//! Client connection handling
//!
//! [`HttpConnection`] writes requests and reads responses back over any
//! `AsyncRead`/`AsyncWrite` pair, most commonly the two halves of a `TcpStream`.

mod http_connection;

pub use http_connection::HttpConnection;
pub use http_connection::ResponseMessage;
