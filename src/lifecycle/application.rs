//! Application Bootstrap
//!
//! [`TrellisFactory`] turns a root module into an [`Application`]: the module
//! graph is resolved, every singleton is built, and the route table is mapped.
//! Any failure aborts bootstrap and no application is returned.

use super::{LifecycleManager, shutdown_signal};
use crate::config::ApplicationOptions;
use crate::context::{Request, Response};
use crate::di::{Container, Injectable};
use crate::error::{Result, TrellisError};
use crate::exception::FilterBinding;
use crate::guard::Guard;
use crate::interceptor::Interceptor;
use crate::metadata::MetadataRegistry;
use crate::module::{Module, ModuleGraph, ModuleId, ModuleRef};
use crate::pipe::Pipe;
use crate::pipeline::Dispatcher;
use crate::router::RouteTable;
use crate::transport;
use std::sync::Arc;

/// Entry point for building applications
///
/// # Example
///
/// ```rust,no_run
/// use trellis::prelude::*;
///
/// pub struct AppModule;
///
/// impl Module for AppModule {
///     fn declare(_module: &mut ModuleDeclaration) {}
/// }
///
/// # async fn run() -> trellis::Result<()> {
/// let app = TrellisFactory::with_options(ApplicationOptions::default().global_prefix("api"))
///     .bootstrap(&ModuleRef::of::<AppModule>())?;
/// app.listen(3000).await
/// # }
/// ```
pub struct TrellisFactory {
    options: ApplicationOptions,
}

impl TrellisFactory {
    /// Bootstrap `M` with default options.
    pub fn create<M: Module>() -> Result<Application> {
        Self::with_options(ApplicationOptions::default()).bootstrap(&ModuleRef::of::<M>())
    }

    pub fn with_options(options: ApplicationOptions) -> Self {
        Self { options }
    }

    /// Bootstrap from a module reference, which may be a dynamic module.
    ///
    /// # Errors
    /// Any graph, injection or routing error, e.g. [`TrellisError::ModuleCycle`],
    /// [`TrellisError::CircularDependency`] or [`TrellisError::DuplicateRoute`].
    pub fn bootstrap(self, root: &ModuleRef) -> Result<Application> {
        tracing::info!("Starting Trellis application...");

        let mut registry = MetadataRegistry::new();
        let graph = ModuleGraph::resolve(root, &mut registry)?;
        registry.freeze();
        let root_id = graph
            .root()
            .cloned()
            .ok_or_else(|| TrellisError::Internal("module graph has no root".to_string()))?;

        let container = Arc::new(Container::new(graph));
        container.instantiate_all()?;

        let table = RouteTable::build(&container, &registry, &self.options.global_prefix)?;
        let lifecycle =
            LifecycleManager::new(container.hook_targets()).with_init_timeout(self.options.init_timeout());

        tracing::info!(
            modules = container.graph().modules().len(),
            providers = container.len(),
            routes = table.len(),
            "Trellis application successfully started"
        );

        Ok(Application {
            dispatcher: Dispatcher::new(table, self.options.expose_error_details),
            container,
            lifecycle: Arc::new(lifecycle),
            options: self.options,
            root: root_id,
        })
    }
}

/// A bootstrapped application
///
/// Global enhancers are added before serving. [`Application::dispatch`] runs
/// one request without a transport; [`Application::listen`] serves HTTP.
pub struct Application {
    container: Arc<Container>,
    dispatcher: Dispatcher,
    lifecycle: Arc<LifecycleManager>,
    options: ApplicationOptions,
    root: ModuleId,
}

impl Application {
    /// Get a reference to the container
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// A singleton by type.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.container.get::<T>()
    }

    pub fn routes(&self) -> &RouteTable {
        self.dispatcher.routes()
    }

    pub fn options(&self) -> &ApplicationOptions {
        &self.options
    }

    /// Hooks handle that outlives [`Application::into_router`].
    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        Arc::clone(&self.lifecycle)
    }

    /// A guard that runs before every controller and handler guard.
    pub fn use_global_guard<G: Guard>(&mut self, guard: G) -> &mut Self {
        self.dispatcher.add_guard(Arc::new(guard));
        self
    }

    /// A guard class built in the root module's scope.
    pub fn use_global_guard_injected<G: Guard + Injectable>(&mut self) -> Result<&mut Self> {
        let guard = self.container.instantiate_enhancer::<G>(&self.root)?;
        self.dispatcher.add_guard(guard);
        Ok(self)
    }

    pub fn use_global_pipe<P: Pipe>(&mut self, pipe: P) -> &mut Self {
        self.dispatcher.add_pipe(Arc::new(pipe));
        self
    }

    pub fn use_global_interceptor<I: Interceptor>(&mut self, interceptor: I) -> &mut Self {
        self.dispatcher.add_interceptor(Arc::new(interceptor));
        self
    }

    /// A filter consulted after every handler and controller filter.
    pub fn use_global_filter(&mut self, filter: FilterBinding) -> Result<&mut Self> {
        let resolved = filter.materialize(&self.container, &self.root)?;
        self.dispatcher.add_filter(resolved);
        Ok(self)
    }

    /// Run one request through the pipeline.
    pub async fn dispatch(&self, request: Request) -> Response {
        self.dispatcher.dispatch(request).await
    }

    /// Run `OnModuleInit` then `OnApplicationBootstrap` hooks; later calls do nothing.
    pub async fn init(&self) -> Result<()> {
        self.lifecycle.startup().await?;
        Ok(())
    }

    /// Run `OnApplicationShutdown` then `OnModuleDestroy` hooks; later calls do nothing.
    pub async fn close(&self) {
        tracing::info!("Shutting down application...");
        self.lifecycle.shutdown().await;
        tracing::info!("Application shutdown complete");
    }

    /// The axum router serving this application.
    ///
    /// Lifecycle hooks are not run; call [`Application::init`] first if needed.
    pub fn into_router(self) -> axum::Router {
        transport::router(Arc::new(self.dispatcher), self.options.body_limit)
    }

    /// Initialize, serve on `host:port` until a shutdown signal, then close.
    pub async fn listen(self, port: u16) -> Result<()> {
        self.init().await?;

        let address = format!("{}:{}", self.options.host, port);
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        let lifecycle = Arc::clone(&self.lifecycle);
        let router = self.into_router();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        tracing::info!("Shutting down application...");
        lifecycle.shutdown().await;
        tracing::info!("Application shutdown complete");
        served.map_err(TrellisError::from)
    }
}
