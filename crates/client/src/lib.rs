//! A streaming HTTP request engine.
//!
//! micro-stream delivers response bodies to handlers as they arrive, instead of
//! buffering them. A [`Session`] creates [`StreamRequest`]s; each request can
//! carry any number of handlers, and each handler decodes the body on its own
//! through a [`StreamSerializer`](serializer::StreamSerializer): raw bytes, text
//! or newline-delimited JSON.
//!
//! # Features
//!
//! - Handlers run serially on a [`DeliveryQueue`], never on the network task
//! - Every handler receives exactly one [`StreamEvent::Complete`], always last
//! - Interceptors adapt requests and decide on retries, see [`interceptor`]
//! - Status and content type validation before any data is delivered
//! - Lifecycle notifications through [`EventMonitor`](monitor::EventMonitor)s
//! - A blocking [`std::io::Read`] view of a body, see [`StreamRequest::into_reader`]
//!
//! # Example
//!
//! ```no_run
//! use micro_stream::interceptor::RetryPolicy;
//! use micro_stream::monitor::LoggingEventMonitor;
//! use micro_stream::{HttpRequest, Session, StreamEvent};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Line {
//!     id: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let session = Session::builder()
//!         .interceptor(RetryPolicy::default())
//!         .event_monitor(LoggingEventMonitor)
//!         .build()?;
//!
//!     let request = session
//!         .stream_request(HttpRequest::get("http://127.0.0.1:8080/stream/10")?)
//!         .validate_status(200..300)
//!         .on_stream_decodable(|event: StreamEvent<Line, _>| match event {
//!             StreamEvent::Stream(Ok(line)) => println!("line {}", line.id),
//!             StreamEvent::Stream(Err(e)) => eprintln!("undecodable line: {e}"),
//!             StreamEvent::Complete(completion) => println!("done: {:?}", completion.error),
//!         });
//!
//!     request.finished().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod event;
pub mod interceptor;
pub mod monitor;
pub mod queue;
pub mod request;
pub mod serializer;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use error::StreamError;
pub use event::{Completion, StreamEvent};
pub use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
pub use queue::DeliveryQueue;
pub use request::{RequestId, State, StreamReader, StreamRequest};
pub use session::{Session, SessionBuilder};
