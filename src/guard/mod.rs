use crate::PipelineError;
use crate::context::ExecutionContext;
use async_trait::async_trait;

/// Standard Result type for Guard
///
/// `Ok(true)` lets the request through, `Ok(false)` rejects it with
/// 403 Forbidden, and an error is handed to the exception filters as-is.
pub type GuardResult = Result<bool, PipelineError>;

/// The Guard trait
///
/// Guards decide whether a matched handler runs. Global guards run first,
/// then controller guards, then handler guards; the first rejection stops
/// the chain.
///
/// # Example
/// ```
/// use trellis::prelude::*;
///
/// struct ApiKeyGuard;
///
/// #[async_trait]
/// impl Guard for ApiKeyGuard {
///     async fn can_activate(&self, ctx: &ExecutionContext) -> GuardResult {
///         match ctx.request().header_value("x-api-key") {
///             Some("secret") => Ok(true),
///             Some(_) => Ok(false),
///             None => Err(HttpException::unauthorized("Missing API key").into()),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    async fn can_activate(&self, ctx: &ExecutionContext) -> GuardResult;
}
