use crate::PipelineError;
use crate::context::{ExecutionContext, Response};
use crate::di::{Container, Injectable, short_type_name};
use crate::enhancer::Binding;
use crate::error::Result;
use crate::module::ModuleId;
use std::error::Error;
use std::sync::Arc;

pub mod http;

pub use http::{BaseExceptionFilter, HttpException};

/// The ExceptionFilter trait
///
/// Filters turn an error raised anywhere in the pipeline into a response.
/// Handler filters are consulted before controller filters, which are
/// consulted before global filters; the first filter whose catch list
/// matches the error renders it.
pub trait ExceptionFilter: Send + Sync + 'static {
    fn catch(&self, error: &PipelineError, ctx: &ExecutionContext) -> Response;
}

type Matcher = fn(&(dyn Error + Send + Sync + 'static)) -> bool;

#[derive(Clone, Copy)]
struct Catch {
    name: &'static str,
    matches: Matcher,
}

fn is<E: Error + 'static>(error: &(dyn Error + Send + Sync + 'static)) -> bool {
    error.is::<E>()
}

/// An exception filter together with the error types it catches.
///
/// A binding with no `catching` types catches everything.
///
/// ```
/// use trellis::prelude::*;
/// use trellis::exception::BaseExceptionFilter;
///
/// let binding = FilterBinding::new(BaseExceptionFilter::new(true)).catching::<HttpException>();
/// assert!(!binding.is_catch_all());
/// ```
#[derive(Clone)]
pub struct FilterBinding {
    filter: Binding<dyn ExceptionFilter>,
    catches: Vec<Catch>,
}

impl FilterBinding {
    pub fn new<F: ExceptionFilter>(filter: F) -> Self {
        Self {
            filter: Binding::instance(
                short_type_name(std::any::type_name::<F>()),
                Arc::new(filter),
            ),
            catches: Vec::new(),
        }
    }

    /// A filter class built by the container.
    pub fn injected<F: ExceptionFilter + Injectable>() -> Self {
        Self {
            filter: Binding::injected::<F>(|f: Arc<F>| -> Arc<dyn ExceptionFilter> { f }),
            catches: Vec::new(),
        }
    }

    /// Restrict the filter to errors of type `E`. May be called repeatedly.
    pub fn catching<E: Error + 'static>(mut self) -> Self {
        self.catches.push(Catch {
            name: std::any::type_name::<E>(),
            matches: is::<E>,
        });
        self
    }

    pub fn is_catch_all(&self) -> bool {
        self.catches.is_empty()
    }

    pub fn handles(&self, error: &PipelineError) -> bool {
        self.is_catch_all() || self.catches.iter().any(|c| (c.matches)(&**error))
    }

    pub fn name(&self) -> String {
        if self.is_catch_all() {
            return self.filter.name();
        }
        let caught: Vec<String> = self.catches.iter().map(|c| short_type_name(c.name)).collect();
        format!("{}({})", self.filter.name(), caught.join(", "))
    }

    pub(crate) fn materialize(&self, container: &Container, module: &ModuleId) -> Result<ResolvedFilter> {
        Ok(ResolvedFilter {
            filter: self.filter.materialize(container, module)?,
            binding: self.clone(),
        })
    }
}

/// A filter instance ready to be consulted.
#[derive(Clone)]
pub(crate) struct ResolvedFilter {
    filter: Arc<dyn ExceptionFilter>,
    binding: FilterBinding,
}

impl ResolvedFilter {
    pub(crate) fn is_catch_all(&self) -> bool {
        self.binding.is_catch_all()
    }

    pub(crate) fn handles(&self, error: &PipelineError) -> bool {
        self.binding.handles(error)
    }

    pub(crate) fn catch(&self, error: &PipelineError, ctx: &ExecutionContext) -> Response {
        self.filter.catch(error, ctx)
    }

    pub(crate) fn name(&self) -> String {
        self.binding.name()
    }
}

/// Order filters within one level: typed filters first, then catch-alls,
/// each in declaration order.
pub(crate) fn order_level(filters: Vec<ResolvedFilter>) -> Vec<ResolvedFilter> {
    let (typed, catch_all): (Vec<_>, Vec<_>) =
        filters.into_iter().partition(|f| !f.is_catch_all());
    typed.into_iter().chain(catch_all).collect()
}
