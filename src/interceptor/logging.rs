use crate::context::ExecutionContext;
use crate::interceptor::{Interceptor, InterceptorResult, Next};
use async_trait::async_trait;
use std::time::Instant;

/// An interceptor that logs handler timing and outcome
#[derive(Clone, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(&self, ctx: &ExecutionContext, next: Next) -> InterceptorResult {
        let request = ctx.request();
        let handler = ctx.handler().unwrap_or("-");
        let start = Instant::now();

        tracing::info!(method = %request.method, path = %request.path, handler, "--> request");

        let result = next.run().await;
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => {
                tracing::info!(method = %request.method, path = %request.path, ?elapsed, "<-- handled");
            }
            Err(e) => {
                tracing::warn!(method = %request.method, path = %request.path, ?elapsed, error = %e, "<-- failed");
            }
        }
        result
    }
}
