use crate::error::StreamError;
use crate::transport::TaskMetrics;
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::convert::Infallible;
use std::sync::Arc;

/// What a stream handler receives: any number of `Stream` values, then exactly
/// one `Complete`.
#[derive(Debug)]
pub enum StreamEvent<T, E = Infallible> {
    Stream(Result<T, E>),
    Complete(Completion),
}

impl<T, E> StreamEvent<T, E> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Stream(Ok(value)) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Stream(Err(error)) => Some(error),
            _ => None,
        }
    }

    pub fn completion(&self) -> Option<&Completion> {
        match self {
            Self::Complete(completion) => Some(completion),
            Self::Stream(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// The terminal snapshot of a request, identical for every consumer.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The last request handed to the transport.
    pub request: Option<Arc<HttpRequest>>,
    /// The head of the final attempt's response.
    pub response: Option<Arc<ResponseHeader>>,
    /// Metrics of the last transport task, `None` if that task reported none.
    pub metrics: Option<TaskMetrics>,
    /// `None` on success.
    pub error: Option<StreamError>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
