use micro_stream_http::protocol::HttpError;
use std::error::Error;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors handed in by user code: interceptors, validators, custom transports.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A user error shared between every consumer of a request.
pub type SharedError = Arc<dyn Error + Send + Sync>;

/// The error reported by a [`StreamRequest`](crate::StreamRequest).
///
/// Cloneable so that every consumer's `Complete` event carries the same error.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("request adaptation failed: {source}")]
    RequestAdaptationFailed { source: SharedError },

    #[error("session task failed: {source}")]
    SessionTaskFailed { source: Arc<TransportError> },

    #[error("response validation failed: {reason}")]
    ResponseValidationFailed { reason: ValidationFailureReason },

    #[error("response serialization failed: {reason}")]
    ResponseSerializationFailed { reason: SerializationFailureReason },

    #[error("request retry failed with retry error: {retry_error}, original error: {original_error}")]
    RequestRetryFailed { retry_error: SharedError, original_error: Box<StreamError> },

    #[error("request explicitly cancelled")]
    ExplicitlyCancelled,

    #[error("session was dropped before the request finished")]
    SessionDeinitialized,
}

impl StreamError {
    pub fn adaptation_failed(error: BoxError) -> Self {
        Self::RequestAdaptationFailed { source: Arc::from(error) }
    }

    pub fn session_task_failed(error: TransportError) -> Self {
        Self::SessionTaskFailed { source: Arc::new(error) }
    }

    pub fn validation_failed(reason: ValidationFailureReason) -> Self {
        Self::ResponseValidationFailed { reason }
    }

    pub fn decoding_failed(error: serde_json::Error) -> Self {
        Self::ResponseSerializationFailed { reason: SerializationFailureReason::DecodingFailed { source: Arc::new(error) } }
    }

    pub fn retry_failed(retry_error: BoxError, original_error: StreamError) -> Self {
        Self::RequestRetryFailed { retry_error: Arc::from(retry_error), original_error: Box::new(original_error) }
    }

    pub fn is_request_adaptation_error(&self) -> bool {
        matches!(self, Self::RequestAdaptationFailed { .. })
    }

    pub fn is_session_task_error(&self) -> bool {
        matches!(self, Self::SessionTaskFailed { .. })
    }

    pub fn is_response_validation_error(&self) -> bool {
        matches!(self, Self::ResponseValidationFailed { .. })
    }

    pub fn is_response_serialization_error(&self) -> bool {
        matches!(self, Self::ResponseSerializationFailed { .. })
    }

    pub fn is_request_retry_error(&self) -> bool {
        matches!(self, Self::RequestRetryFailed { .. })
    }

    pub fn is_explicitly_cancelled_error(&self) -> bool {
        matches!(self, Self::ExplicitlyCancelled)
    }

    /// The status code rejected by status validation, if that is what failed.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            Self::ResponseValidationFailed { reason: ValidationFailureReason::UnacceptableStatusCode { code } } => Some(*code),
            _ => None,
        }
    }

    /// The transport failure behind a session task error.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::SessionTaskFailed { source } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ValidationFailureReason {
    #[error("response status code was unacceptable: {code}")]
    UnacceptableStatusCode { code: u16 },

    #[error("response content type \"{response}\" was unacceptable, acceptable: {acceptable:?}")]
    UnacceptableContentType { acceptable: Vec<String>, response: String },

    #[error("response content type was missing, acceptable: {acceptable:?}")]
    MissingContentType { acceptable: Vec<String> },

    #[error("custom validation failed: {source}")]
    CustomValidationFailed { source: SharedError },
}

#[derive(Debug, Clone, Error)]
pub enum SerializationFailureReason {
    #[error("decoding failed: {source}")]
    DecodingFailed { source: Arc<serde_json::Error> },
}

/// Failures of a single transport task.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {source}")]
    Http {
        #[from]
        source: HttpError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("unsupported url scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("invalid url: {reason}")]
    InvalidUri { reason: String },

    #[error("connection timed out")]
    TimedOut,

    #[error("transport task cancelled")]
    Cancelled,

    #[error("transport task ended before it completed")]
    Terminated,

    #[error("{source}")]
    Other { source: BoxError },
}

impl TransportError {
    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn other<E: Into<BoxError>>(error: E) -> Self {
        Self::Other { source: error.into() }
    }

    /// The socket error behind this failure, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source } => Some(source),
            Self::Http { source } => source.io_error(),
            _ => None,
        }
    }

    /// Whether the task failed because it ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut) || self.io_error().is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
    }
}
