use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// A transport-neutral response. A `None` body is sent empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(status)
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[derive(Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

/// Response facts a handler may set while it runs.
///
/// Shared between the execution context and the handler arguments; the
/// pipeline applies them when it renders the result.
#[derive(Clone, Default)]
pub struct ResponseHandle {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseHandle {
    /// Override the success status.
    pub fn status(&self, status: StatusCode) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status = Some(status);
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .headers
            .insert(name, value);
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).status
    }

    pub fn headers(&self) -> HeaderMap {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .headers
            .clone()
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("status", &self.status_code())
            .finish()
    }
}
