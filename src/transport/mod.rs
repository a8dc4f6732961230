//! axum adapter
//!
//! Every request lands in one fallback handler that converts it into a
//! [`Request`], runs the dispatcher, and converts the [`Response`] back.

use crate::context::{Request, Response};
use crate::exception::HttpException;
use crate::pipeline::Dispatcher;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, Uri, header};
use axum::response::IntoResponse;
use serde_json::Value;
use std::sync::Arc;

pub(crate) fn router(dispatcher: Arc<Dispatcher>, body_limit: usize) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(dispatcher)
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut request = Request::new(method, target);

    match parse_body(&headers, &body) {
        Ok(body) => request.body = body,
        Err(err) => request.rejected_body = Some(err.message().to_string()),
    }
    request.headers = headers;

    dispatcher.dispatch(request).await
}

/// JSON bodies are parsed; other non-empty bodies are passed on as a string.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Option<Value>, HttpException> {
    if body.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice(body) {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_json(headers) => Err(HttpException::bad_request(format!("Invalid JSON body: {e}"))),
        Err(_) => Ok(Some(Value::String(String::from_utf8_lossy(body).into_owned()))),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|content_type| content_type.contains("json"))
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let mut response = match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        };
        response.headers_mut().extend(self.headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use serde_json::json;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_body_parsing() {
        assert_eq!(parse_body(&json_headers(), &Bytes::new()).unwrap(), None);
        assert_eq!(
            parse_body(&json_headers(), &Bytes::from_static(br#"{"a":1}"#)).unwrap(),
            Some(json!({ "a": 1 }))
        );
        let err = parse_body(&json_headers(), &Bytes::from_static(b"{oops")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            parse_body(&HeaderMap::new(), &Bytes::from_static(b"plain text")).unwrap(),
            Some(json!("plain text"))
        );
    }

    #[test]
    fn test_response_conversion() {
        let response = Response::json(StatusCode::CREATED, json!({ "id": 1 }))
            .header(header::LOCATION, HeaderValue::from_static("/cats/1"))
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/cats/1");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let empty = Response::new(StatusCode::NO_CONTENT).into_response();
        assert_eq!(empty.status(), StatusCode::NO_CONTENT);
        assert!(empty.headers().get(header::CONTENT_TYPE).is_none());
    }
}
