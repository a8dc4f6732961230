//! # Trellis
//!
//! A composition runtime that turns declared modules, providers and
//! controllers into a request-handling application.
//!
//! Trellis resolves a module graph with explicit visibility rules, builds
//! every singleton eagerly through a dependency-injection container, maps
//! controller routes into a dispatch table and runs each request through a
//! fixed pipeline: guards, pipes, handler, interceptors and exception filters.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trellis::prelude::*;
//!
//! #[derive(Injectable)]
//! pub struct Greeter;
//!
//! #[derive(Injectable)]
//! pub struct HelloController {
//!     greeter: Arc<Greeter>,
//! }
//!
//! impl Controller for HelloController {
//!     fn declare(routes: &mut ControllerDeclaration<Self>) {
//!         routes.path("/hello");
//!         routes
//!             .get("/:name")
//!             .param(ParamSpec::path("name"))
//!             .handle("greet", |_this, args: HandlerArgs| async move {
//!                 let name: String = args.get(0)?;
//!                 Ok::<_, HttpException>(serde_json::json!({ "hello": name }))
//!             });
//!     }
//! }
//!
//! pub struct AppModule;
//!
//! impl Module for AppModule {
//!     fn declare(module: &mut ModuleDeclaration) {
//!         module.provider(Provider::class::<Greeter>());
//!         module.controller::<HelloController>();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> trellis::Result<()> {
//!     let app = TrellisFactory::create::<AppModule>()?;
//!     app.listen(3000).await
//! }
//! ```

extern crate self as trellis;

pub mod config;
pub mod context;
pub mod controller;
pub mod di;
pub mod enhancer;
pub mod error;
pub mod exception;
pub mod guard;
pub mod interceptor;
pub mod lifecycle;
pub mod metadata;
pub mod module;
pub mod pipe;
pub mod pipeline;
pub mod router;
pub mod transport;

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future, used wherever a stage is type-erased.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The error type carried through the request pipeline.
///
/// Any stage may fail with any error; exception filters downcast to the
/// concrete types they know how to render.
pub type PipelineError = Box<dyn std::error::Error + Send + Sync>;

// Re-export core types
pub use config::{ApplicationOptions, ConfigModule, ConfigService};
pub use context::{ExecutionContext, Request, Response};
pub use controller::{Controller, ControllerDeclaration, HandlerArgs, ParamSource, ParamSpec};
pub use di::{Container, Dependencies, Injectable, Lifetime, Provider, Token};
pub use error::{Result, TrellisError};
pub use exception::{BaseExceptionFilter, ExceptionFilter, FilterBinding, HttpException};
pub use interceptor::logging::LoggingInterceptor;
pub use lifecycle::{Application, TrellisFactory};
pub use module::{Module, ModuleDeclaration, ModuleRef};
pub use pipeline::Dispatcher;
pub use router::{RouteDescriptor, RouteMatch, RouteTable};

// Re-export macros
pub use trellis_macro::Injectable;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ApplicationOptions, ConfigModule, ConfigService};
    pub use crate::context::{ExecutionContext, Request, Response};
    pub use crate::controller::{
        Controller, ControllerDeclaration, HandlerArgs, ParamSource, ParamSpec,
    };
    pub use crate::di::{Container, Dependencies, Injectable, Lifetime, Provider, Token};
    pub use crate::error::TrellisError;
    pub use crate::exception::{ExceptionFilter, FilterBinding, HttpException};
    pub use crate::guard::{Guard, GuardResult};
    pub use crate::interceptor::logging::LoggingInterceptor;
    pub use crate::interceptor::{Interceptor, InterceptorResult, Next};
    pub use crate::lifecycle::{
        Application, LifecycleError, OnApplicationBootstrap, OnApplicationShutdown,
        OnModuleDestroy, OnModuleInit, TrellisFactory, shutdown_signal,
    };
    pub use crate::module::{Module, ModuleDeclaration, ModuleRef};
    pub use crate::pipe::builtins::*;
    pub use crate::pipe::{ArgumentMetadata, Pipe, PipeError, PipeResult};
    pub use crate::{BoxFuture, PipelineError};
    pub use async_trait::async_trait;
    pub use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
    pub use trellis_macro::Injectable;
}
