//! Per-request execution context.
//!
//! Every stage of the pipeline sees the same [`ExecutionContext`]: the
//! request, the matched class and handler, extracted path parameters, the
//! route's custom metadata and a cancellation flag.

mod request;
mod response;

pub use request::Request;
pub use response::{Response, ResponseHandle};

use crate::metadata::ClassId;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

struct ContextInner {
    request_id: Uuid,
    request: Request,
    response: ResponseHandle,
    class: Option<ClassId>,
    handler: Option<Cow<'static, str>>,
    params: HashMap<String, String>,
    metadata: Arc<HashMap<String, Value>>,
    cancelled: AtomicBool,
}

/// Cheaply cloneable view of the request being processed.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// A context with no matched route, params or metadata.
    ///
    /// Lets a guard, interceptor or exception filter be exercised on its own,
    /// outside [`Dispatcher::dispatch`](crate::pipeline::Dispatcher::dispatch).
    pub fn new(request: Request) -> Self {
        Self::build(request, None, None, HashMap::new(), Arc::default())
    }

    pub(crate) fn routed(
        request: Request,
        class: ClassId,
        handler: Cow<'static, str>,
        params: HashMap<String, String>,
        metadata: Arc<HashMap<String, Value>>,
    ) -> Self {
        Self::build(request, Some(class), Some(handler), params, metadata)
    }

    fn build(
        request: Request,
        class: Option<ClassId>,
        handler: Option<Cow<'static, str>>,
        params: HashMap<String, String>,
        metadata: Arc<HashMap<String, Value>>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request_id: Uuid::new_v4(),
                request,
                response: ResponseHandle::default(),
                class,
                handler,
                params,
                metadata,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn response(&self) -> &ResponseHandle {
        &self.inner.response
    }

    /// The controller class handling this request.
    pub fn class(&self) -> Option<ClassId> {
        self.inner.class
    }

    /// The handler method name.
    pub fn handler(&self) -> Option<&str> {
        self.inner.handler.as_deref()
    }

    /// A path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.params
    }

    /// Custom metadata declared on the handler, falling back to its class.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.inner.metadata.get(key)
    }

    /// Ask the pipeline to stop before its next stage.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.inner.request_id)
            .field("method", &self.inner.request.method)
            .field("path", &self.inner.request.path)
            .field("class", &self.inner.class)
            .field("handler", &self.inner.handler)
            .finish()
    }
}
