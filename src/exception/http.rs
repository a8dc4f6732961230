use crate::context::{ExecutionContext, Response};
use crate::exception::ExceptionFilter;
use crate::pipe::PipeError;
use crate::PipelineError;
use axum::http::StatusCode;
use serde_json::{Value, json};

/// An error that carries its own HTTP status.
///
/// ```
/// use trellis::HttpException;
///
/// let err = HttpException::not_found("Cat 7 not found");
/// assert_eq!(err.status().as_u16(), 404);
/// assert_eq!(err.to_string(), "Cat 7 not found");
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HttpException {
    status: StatusCode,
    message: String,
}

impl HttpException {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 499: the request was cancelled before a response was produced.
    pub fn client_closed() -> Self {
        Self::new(client_closed_status(), "Client closed request")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `{statusCode, message, error, timestamp}`
    pub fn body(&self) -> Value {
        json!({
            "statusCode": self.status.as_u16(),
            "message": self.message,
            "error": reason(self.status),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn into_response(self) -> Response {
        Response::json(self.status, self.body())
    }
}

impl From<PipeError> for HttpException {
    fn from(error: PipeError) -> Self {
        match error {
            PipeError::Validation(message) | PipeError::Transformation(message) => {
                Self::bad_request(message)
            }
            internal @ PipeError::Internal(_) => Self::internal(internal.to_string()),
        }
    }
}

fn client_closed_status() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
}

fn reason(status: StatusCode) -> &'static str {
    match status.canonical_reason() {
        Some(reason) => reason,
        None if status.as_u16() == 499 => "Client Closed Request",
        None => "Error",
    }
}

/// The filter of last resort
///
/// Renders [`HttpException`]s with their own status, pipe failures as 400,
/// and anything else as 500. Internal error messages are withheld unless
/// `expose_details` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseExceptionFilter {
    expose_details: bool,
}

impl BaseExceptionFilter {
    pub fn new(expose_details: bool) -> Self {
        Self { expose_details }
    }
}

impl ExceptionFilter for BaseExceptionFilter {
    fn catch(&self, error: &PipelineError, ctx: &ExecutionContext) -> Response {
        if let Some(http) = error.downcast_ref::<HttpException>() {
            return http.clone().into_response();
        }
        if let Some(pipe) = error.downcast_ref::<PipeError>() {
            let http = match pipe {
                PipeError::Validation(m) => HttpException::bad_request(m.clone()),
                PipeError::Transformation(m) => HttpException::bad_request(m.clone()),
                PipeError::Internal(_) => HttpException::internal(pipe.to_string()),
            };
            return http.into_response();
        }

        tracing::error!(
            request_id = %ctx.request_id(),
            method = %ctx.request().method,
            path = %ctx.request().path,
            "Unhandled error: {}",
            error
        );
        let message = if self.expose_details {
            error.to_string()
        } else {
            "Internal server error".to_string()
        };
        HttpException::internal(message).into_response()
    }
}
