use crate::controller::ParamSource;
use async_trait::async_trait;
use serde_json::Value;

pub mod builtins;

pub type PipeResult<T = Value> = Result<T, PipeError>;

/// Errors raised by pipes.
///
/// Validation and transformation failures become 400 Bad Request; internal
/// failures become 500.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Transformation(String),

    #[error("Internal pipe error: {0}")]
    Internal(String),
}

/// Describes the handler argument a pipe is transforming.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentMetadata {
    pub source: ParamSource,
    /// The parameter name for path, query and header arguments.
    pub key: Option<String>,
    /// Position of the argument in the handler signature.
    pub index: usize,
}

/// The Pipe trait for transformation and validation
///
/// Pipes run on every extracted argument, global pipes first, then
/// controller, handler and finally the argument's own pipes. Each pipe
/// receives the previous pipe's output.
#[async_trait]
pub trait Pipe: Send + Sync + 'static {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> PipeResult;
}
