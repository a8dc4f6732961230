use crate::context::ExecutionContext;
use crate::{BoxFuture, PipelineError};
use async_trait::async_trait;
use serde_json::Value;

pub mod logging;

/// Standard return type for Interceptors: the handler's JSON result or an error.
pub type InterceptorResult = Result<Value, PipelineError>;

/// Represents the rest of the chain: inner interceptors and then the handler
pub struct Next {
    run: Box<dyn FnOnce() -> BoxFuture<'static, InterceptorResult> + Send>,
}

impl Next {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, InterceptorResult> + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    /// Execute the rest of the chain
    ///
    /// An interceptor that never calls `run` short-circuits the handler.
    pub async fn run(self) -> InterceptorResult {
        (self.run)().await
    }
}

/// The Interceptor trait
///
/// Interceptors wrap the handler. Global interceptors are outermost, then
/// controller interceptors, then handler interceptors. Each may act before
/// and after the inner chain, replace its result, or map its error.
///
/// # Example
/// ```
/// use trellis::prelude::*;
///
/// struct EnvelopeInterceptor;
///
/// #[async_trait]
/// impl Interceptor for EnvelopeInterceptor {
///     async fn intercept(&self, _ctx: &ExecutionContext, next: Next) -> InterceptorResult {
///         let data = next.run().await?;
///         Ok(json!({ "data": data }))
///     }
/// }
/// ```
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next) -> InterceptorResult;
}
