//! Controllers and their route declarations.
//!
//! A controller is an injectable class that also implements [`Controller`].
//! Its `declare` function records the base path, the enhancers bound to the
//! class, and one entry per handler method. These facts land in the
//! metadata registry while the module graph is resolved.

use crate::context::{ExecutionContext, Request, ResponseHandle};
use crate::di::{Injectable, Instance, Provider, downcast, short_type_name};
use crate::enhancer::Binding;
use crate::error::{Result, TrellisError};
use crate::exception::{FilterBinding, HttpException};
use crate::guard::Guard;
use crate::interceptor::Interceptor;
use crate::metadata::{ClassId, Metadata, MetadataRegistry, Target};
use crate::pipe::Pipe;
use crate::{BoxFuture, PipelineError};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display};

/// Trait for routable classes
///
/// # Example
/// ```
/// use trellis::prelude::*;
///
/// #[derive(Injectable)]
/// pub struct CatsController;
///
/// impl Controller for CatsController {
///     fn declare(routes: &mut ControllerDeclaration<Self>) {
///         routes.path("/cats");
///
///         routes.get("/").handle("find_all", |_this, _args| async move {
///             Ok::<_, HttpException>(json!(["Tom", "Felix"]))
///         });
///
///         routes
///             .get("/:id")
///             .param(ParamSpec::path("id").pipe(ParseIntPipe))
///             .handle("find_one", |_this, args| async move {
///                 let id: i64 = args.get(0)?;
///                 Ok::<_, HttpException>(json!({ "id": id }))
///             });
///     }
/// }
/// ```
pub trait Controller: Injectable {
    fn declare(routes: &mut ControllerDeclaration<Self>);
}

/// Where a handler argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ParamSource {
    Path,
    Query,
    Header,
    Body,
    /// The whole request as JSON; pipes are not applied.
    Request,
    /// Placeholder for the response handle; pipes are not applied.
    Response,
}

impl ParamSource {
    pub fn skips_pipes(self) -> bool {
        matches!(self, ParamSource::Request | ParamSource::Response)
    }
}

/// One handler argument: its source, the key to pluck, and its own pipes.
#[derive(Clone)]
pub struct ParamSpec {
    pub source: ParamSource,
    pub key: Option<String>,
    pub(crate) pipes: Vec<Binding<dyn Pipe>>,
}

impl ParamSpec {
    fn new(source: ParamSource, key: Option<String>) -> Self {
        Self {
            source,
            key,
            pipes: Vec::new(),
        }
    }

    /// A single path parameter, e.g. `id` in `/cats/:id`.
    pub fn path(key: impl Into<String>) -> Self {
        Self::new(ParamSource::Path, Some(key.into()))
    }

    /// All path parameters as an object.
    pub fn path_all() -> Self {
        Self::new(ParamSource::Path, None)
    }

    pub fn query(key: impl Into<String>) -> Self {
        Self::new(ParamSource::Query, Some(key.into()))
    }

    /// The whole query string as an object.
    pub fn query_all() -> Self {
        Self::new(ParamSource::Query, None)
    }

    /// A header by (case-insensitive) name.
    pub fn header(key: impl Into<String>) -> Self {
        Self::new(ParamSource::Header, Some(key.into().to_ascii_lowercase()))
    }

    pub fn headers() -> Self {
        Self::new(ParamSource::Header, None)
    }

    /// The JSON body.
    pub fn body() -> Self {
        Self::new(ParamSource::Body, None)
    }

    /// One top-level field of the JSON body.
    pub fn body_field(key: impl Into<String>) -> Self {
        Self::new(ParamSource::Body, Some(key.into()))
    }

    pub fn request() -> Self {
        Self::new(ParamSource::Request, None)
    }

    pub fn response() -> Self {
        Self::new(ParamSource::Response, None)
    }

    /// Add a pipe that runs after the global, controller and handler pipes.
    pub fn pipe<P: Pipe>(mut self, pipe: P) -> Self {
        self.pipes.push(pipe_binding(pipe));
        self
    }

    pub fn pipe_injected<P: Pipe + Injectable>(mut self) -> Self {
        self.pipes
            .push(Binding::injected::<P>(|p: Arc<P>| -> Arc<dyn Pipe> { p }));
        self
    }
}

impl std::fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pipes: Vec<String> = self.pipes.iter().map(Binding::name).collect();
        f.debug_struct("ParamSpec")
            .field("source", &self.source)
            .field("key", &self.key)
            .field("pipes", &pipes)
            .finish()
    }
}

/// The arguments handed to a handler, after pipes have run.
pub struct HandlerArgs {
    values: Vec<Value>,
    ctx: ExecutionContext,
}

impl HandlerArgs {
    pub(crate) fn new(values: Vec<Value>, ctx: ExecutionContext) -> Self {
        Self { values, ctx }
    }

    /// Deserialize argument `index`.
    ///
    /// # Errors
    /// A value that does not fit `T` is a 400 Bad Request; an index with no
    /// declared parameter is a 500.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> std::result::Result<T, HttpException> {
        let value = self.values.get(index).ok_or_else(|| {
            HttpException::internal(format!(
                "Handler '{}' has no argument at index {}",
                self.ctx.handler().unwrap_or("-"),
                index
            ))
        })?;
        T::deserialize(value).map_err(|e| HttpException::bad_request(format!("Invalid argument {index}: {e}")))
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn request(&self) -> &Request {
        self.ctx.request()
    }

    /// Set the status or headers of the eventual response.
    pub fn response(&self) -> &ResponseHandle {
        self.ctx.response()
    }
}

pub(crate) type ErasedHandler =
    Arc<dyn Fn(Instance, HandlerArgs) -> BoxFuture<'static, std::result::Result<Value, PipelineError>> + Send + Sync>;

/// A named handler method of a controller.
#[derive(Clone)]
pub struct HandlerDefinition {
    pub name: Cow<'static, str>,
    pub(crate) handler: ErasedHandler,
}

/// Collects the facts a controller declares.
pub struct ControllerDeclaration<C> {
    class: ClassId,
    path: String,
    facts: Vec<(Target, Metadata)>,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Controller> ControllerDeclaration<C> {
    fn new() -> Self {
        Self {
            class: ClassId::of::<C>(),
            path: String::new(),
            facts: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn class_fact(&mut self, metadata: Metadata) -> &mut Self {
        self.facts.push((Target::Class(self.class), metadata));
        self
    }

    /// Base path prepended to every route of this controller.
    pub fn path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    pub fn use_guard<G: Guard>(&mut self, guard: G) -> &mut Self {
        self.class_fact(Metadata::Guard(guard_binding(guard)))
    }

    pub fn use_guard_injected<G: Guard + Injectable>(&mut self) -> &mut Self {
        self.class_fact(Metadata::Guard(Binding::injected::<G>(
            |g: Arc<G>| -> Arc<dyn Guard> { g },
        )))
    }

    pub fn use_pipe<P: Pipe>(&mut self, pipe: P) -> &mut Self {
        self.class_fact(Metadata::Pipe(pipe_binding(pipe)))
    }

    pub fn use_pipe_injected<P: Pipe + Injectable>(&mut self) -> &mut Self {
        self.class_fact(Metadata::Pipe(Binding::injected::<P>(
            |p: Arc<P>| -> Arc<dyn Pipe> { p },
        )))
    }

    pub fn use_interceptor<I: Interceptor>(&mut self, interceptor: I) -> &mut Self {
        self.class_fact(Metadata::Interceptor(interceptor_binding(interceptor)))
    }

    pub fn use_interceptor_injected<I: Interceptor + Injectable>(&mut self) -> &mut Self {
        self.class_fact(Metadata::Interceptor(Binding::injected::<I>(
            |i: Arc<I>| -> Arc<dyn Interceptor> { i },
        )))
    }

    pub fn use_filter(&mut self, filter: FilterBinding) -> &mut Self {
        self.class_fact(Metadata::Filter(filter))
    }

    /// Custom metadata readable through [`ExecutionContext::get_metadata`].
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.class_fact(Metadata::Custom {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn get(&mut self, path: impl Into<String>) -> RouteBuilder<'_, C> {
        self.route(Method::GET, path)
    }

    pub fn post(&mut self, path: impl Into<String>) -> RouteBuilder<'_, C> {
        self.route(Method::POST, path)
    }

    pub fn put(&mut self, path: impl Into<String>) -> RouteBuilder<'_, C> {
        self.route(Method::PUT, path)
    }

    pub fn patch(&mut self, path: impl Into<String>) -> RouteBuilder<'_, C> {
        self.route(Method::PATCH, path)
    }

    pub fn delete(&mut self, path: impl Into<String>) -> RouteBuilder<'_, C> {
        self.route(Method::DELETE, path)
    }

    /// Start a route. Nothing is recorded until [`RouteBuilder::handle`] is called.
    pub fn route(&mut self, method: Method, path: impl Into<String>) -> RouteBuilder<'_, C> {
        RouteBuilder {
            declaration: self,
            method,
            path: path.into(),
            facts: Vec::new(),
        }
    }
}

/// Builder for one handler method.
#[must_use = "a route is only registered once `handle` is called"]
pub struct RouteBuilder<'a, C> {
    declaration: &'a mut ControllerDeclaration<C>,
    method: Method,
    path: String,
    facts: Vec<Metadata>,
}

impl<C: Controller> RouteBuilder<'_, C> {
    /// Append the next handler argument.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.facts.push(Metadata::Param(spec));
        self
    }

    pub fn use_guard<G: Guard>(mut self, guard: G) -> Self {
        self.facts.push(Metadata::Guard(guard_binding(guard)));
        self
    }

    pub fn use_guard_injected<G: Guard + Injectable>(mut self) -> Self {
        self.facts.push(Metadata::Guard(Binding::injected::<G>(
            |g: Arc<G>| -> Arc<dyn Guard> { g },
        )));
        self
    }

    pub fn use_pipe<P: Pipe>(mut self, pipe: P) -> Self {
        self.facts.push(Metadata::Pipe(pipe_binding(pipe)));
        self
    }

    pub fn use_pipe_injected<P: Pipe + Injectable>(mut self) -> Self {
        self.facts.push(Metadata::Pipe(Binding::injected::<P>(
            |p: Arc<P>| -> Arc<dyn Pipe> { p },
        )));
        self
    }

    pub fn use_interceptor<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.facts
            .push(Metadata::Interceptor(interceptor_binding(interceptor)));
        self
    }

    pub fn use_interceptor_injected<I: Interceptor + Injectable>(mut self) -> Self {
        self.facts.push(Metadata::Interceptor(Binding::injected::<I>(
            |i: Arc<I>| -> Arc<dyn Interceptor> { i },
        )));
        self
    }

    pub fn use_filter(mut self, filter: FilterBinding) -> Self {
        self.facts.push(Metadata::Filter(filter));
        self
    }

    /// Success status used when the handler does not set one.
    pub fn http_code(mut self, status: StatusCode) -> Self {
        self.facts.push(Metadata::HttpCode(status));
        self
    }

    /// A static header added to successful responses.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.facts.push(Metadata::Header(name, value));
        self
    }

    pub fn set_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.facts.push(Metadata::Custom {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Register the handler under `name`.
    ///
    /// The handler receives the controller singleton and the piped arguments.
    /// Its result is serialized to JSON; its error goes to the exception filters.
    pub fn handle<F, Fut, R, E>(self, name: impl Into<Cow<'static, str>>, handler: F)
    where
        F: Fn(Arc<C>, HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<PipelineError>,
    {
        let name = name.into();
        let erased: ErasedHandler = Arc::new(
            move |instance: Instance, args: HandlerArgs| -> BoxFuture<'static, std::result::Result<Value, PipelineError>> {
                let Some(controller) = downcast::<C>(&instance) else {
                    let message = format!(
                        "controller instance is not a {}",
                        short_type_name(std::any::type_name::<C>())
                    );
                    return Box::pin(async move { Err(HttpException::internal(message).into()) });
                };
                let future = handler(controller, args);
                Box::pin(async move {
                    match future.await {
                        Ok(result) => serde_json::to_value(result).map_err(|e| Box::new(e) as PipelineError),
                        Err(e) => Err(e.into()),
                    }
                })
            },
        );

        let RouteBuilder {
            declaration,
            method,
            path,
            facts,
        } = self;
        let class = declaration.class;
        let target = Target::Method(class, name.clone());

        declaration.facts.push((
            Target::Class(class),
            Metadata::HandlerMethod(HandlerDefinition {
                name,
                handler: erased,
            }),
        ));
        declaration
            .facts
            .push((target.clone(), Metadata::Route { method, path }));
        declaration
            .facts
            .extend(facts.into_iter().map(|fact| (target.clone(), fact)));
    }
}

fn guard_binding<G: Guard>(guard: G) -> Binding<dyn Guard> {
    Binding::instance(short_type_name(std::any::type_name::<G>()), Arc::new(guard))
}

fn pipe_binding<P: Pipe>(pipe: P) -> Binding<dyn Pipe> {
    Binding::instance(short_type_name(std::any::type_name::<P>()), Arc::new(pipe))
}

fn interceptor_binding<I: Interceptor>(interceptor: I) -> Binding<dyn Interceptor> {
    Binding::instance(
        short_type_name(std::any::type_name::<I>()),
        Arc::new(interceptor),
    )
}

/// A controller as registered by a module.
pub(crate) struct ControllerRegistration {
    pub(crate) provider: Provider,
    declare: fn(&mut MetadataRegistry) -> Result<()>,
}

impl ControllerRegistration {
    pub(crate) fn of<C: Controller>() -> Self {
        Self {
            provider: Provider::class::<C>().into(),
            declare: declare_controller::<C>,
        }
    }

    pub(crate) fn declare_into(&self, registry: &mut MetadataRegistry) -> Result<()> {
        (self.declare)(registry)
    }
}

fn declare_controller<C: Controller>(registry: &mut MetadataRegistry) -> Result<()> {
    let mut declaration = ControllerDeclaration::<C>::new();
    C::declare(&mut declaration);

    let mut handlers = HashSet::new();
    for (_, fact) in &declaration.facts {
        if let Metadata::HandlerMethod(definition) = fact {
            if !handlers.insert(definition.name.clone()) {
                return Err(TrellisError::DuplicateHandler {
                    controller: declaration.class.name(),
                    handler: definition.name.to_string(),
                });
            }
        }
    }

    registry.declare(
        Target::Class(declaration.class),
        Metadata::Controller {
            path: declaration.path,
        },
    )?;
    for (target, fact) in declaration.facts {
        registry.declare(target, fact)?;
    }
    Ok(())
}
