use crate::error::{BoxError, StreamError, ValidationFailureReason};
use http::header::ACCEPT;
use http::{HeaderMap, StatusCode};
use micro_stream_http::protocol::{HttpRequest, ResponseHeader};
use std::ops::RangeBounds;
use std::sync::Arc;

/// Checks a response head against the request that produced it.
pub(crate) type Validator = Arc<dyn Fn(&HttpRequest, &ResponseHeader) -> Result<(), StreamError> + Send + Sync>;

pub(crate) fn status<R>(acceptable: R) -> Validator
where
    R: RangeBounds<u16> + Send + Sync + 'static,
{
    Arc::new(move |_: &HttpRequest, response: &ResponseHeader| {
        let code = response.status().as_u16();
        if acceptable.contains(&code) {
            Ok(())
        } else {
            Err(StreamError::validation_failed(ValidationFailureReason::UnacceptableStatusCode { code }))
        }
    })
}

pub(crate) fn content_type(acceptable: Vec<String>) -> Validator {
    Arc::new(move |_: &HttpRequest, response: &ResponseHeader| check_content_type(&acceptable, response))
}

/// Validates the content type against the request's `Accept` header.
pub(crate) fn accepted_content_type() -> Validator {
    Arc::new(|request: &HttpRequest, response: &ResponseHeader| check_content_type(&acceptable_content_types(request), response))
}

pub(crate) fn custom<F>(predicate: F) -> Validator
where
    F: Fn(StatusCode, &HeaderMap) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(move |_: &HttpRequest, response: &ResponseHeader| {
        predicate(response.status(), response.headers())
            .map_err(|e| StreamError::validation_failed(ValidationFailureReason::CustomValidationFailed { source: Arc::from(e) }))
    })
}

fn acceptable_content_types(request: &HttpRequest) -> Vec<String> {
    let types: Vec<String> = request
        .headers()
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|media_range| media_range.split(';').next().unwrap_or_default().trim().to_owned())
        .filter(|media_range| !media_range.is_empty())
        .collect();

    if types.is_empty() { vec!["*/*".to_owned()] } else { types }
}

fn check_content_type(acceptable: &[String], response: &ResponseHeader) -> Result<(), StreamError> {
    if acceptable.iter().any(|t| t == "*/*") {
        return Ok(());
    }

    let Some(response_type) = response.content_type() else {
        return Err(StreamError::validation_failed(ValidationFailureReason::MissingContentType { acceptable: acceptable.to_vec() }));
    };

    if acceptable.iter().any(|t| media_range_matches(t, &response_type)) {
        return Ok(());
    }

    Err(StreamError::validation_failed(ValidationFailureReason::UnacceptableContentType {
        acceptable: acceptable.to_vec(),
        response: response_type.essence_str().to_owned(),
    }))
}

fn media_range_matches(range: &str, actual: &mime::Mime) -> bool {
    let Ok(range) = range.parse::<mime::Mime>() else {
        return false;
    };
    (range.type_() == mime::STAR || range.type_() == actual.type_()) && (range.subtype() == mime::STAR || range.subtype() == actual.subtype())
}
