//! Core HTTP/1.1 client protocol types.
//!
//! - [`HttpRequest`]: owned, cloneable request description
//! - [`ResponseHeader`]: decoded status line and headers
//! - [`Message`]/[`PayloadItem`]/[`PayloadSize`]: the response as it comes off the wire
//! - [`HttpError`]/[`ParseError`]/[`SendError`]: error taxonomy of the wire layer

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::HttpRequest;

mod response;
pub use response::ResponseHeader;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
