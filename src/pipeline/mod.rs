//! Request pipeline
//!
//! ```text
//! match route -> guards -> pipes -> interceptors(handler) -> respond
//!                    \________\__________\______________-> exception filters
//! ```
//!
//! Guards and pipes run global, then controller, then handler bindings.
//! Interceptors wrap the handler with the global ones outermost. Exception
//! filters are consulted from the handler outwards and the first one whose
//! catch list matches renders the error.

use crate::context::{ExecutionContext, Request, Response};
use crate::controller::{HandlerArgs, ParamSource};
use crate::exception::{BaseExceptionFilter, ExceptionFilter, HttpException, ResolvedFilter, order_level};
use crate::guard::Guard;
use crate::interceptor::{Interceptor, InterceptorResult, Next};
use crate::pipe::{ArgumentMetadata, Pipe};
use crate::router::{RouteDescriptor, RouteMatch, RouteParam, RouteTable};
use crate::{BoxFuture, PipelineError};
use axum::http::{Method, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::Instrument;

/// Enhancers bound to every route.
#[derive(Default, Clone)]
struct GlobalEnhancers {
    guards: Vec<Arc<dyn Guard>>,
    pipes: Vec<Arc<dyn Pipe>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    filters: Vec<ResolvedFilter>,
}

/// Runs requests through the route table.
pub struct Dispatcher {
    table: RouteTable,
    globals: GlobalEnhancers,
    base_filter: BaseExceptionFilter,
}

impl Dispatcher {
    pub(crate) fn new(table: RouteTable, expose_details: bool) -> Self {
        Self {
            table,
            globals: GlobalEnhancers::default(),
            base_filter: BaseExceptionFilter::new(expose_details),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    pub(crate) fn add_guard(&mut self, guard: Arc<dyn Guard>) {
        self.globals.guards.push(guard);
    }

    pub(crate) fn add_pipe(&mut self, pipe: Arc<dyn Pipe>) {
        self.globals.pipes.push(pipe);
    }

    pub(crate) fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.globals.interceptors.push(interceptor);
    }

    pub(crate) fn add_filter(&mut self, filter: ResolvedFilter) {
        let mut filters = std::mem::take(&mut self.globals.filters);
        filters.push(filter);
        self.globals.filters = order_level(filters);
    }

    /// Produce exactly one response for `request`.
    pub async fn dispatch(&self, request: Request) -> Response {
        let Some(RouteMatch { route, params }) = self.table.lookup(&request.method, &request.path) else {
            tracing::debug!(method = %request.method, path = %request.path, "No route matched");
            return HttpException::not_found(format!("Cannot {} {}", request.method, request.path))
                .into_response();
        };

        let ctx = ExecutionContext::routed(
            request,
            route.class(),
            route.handler_name.clone(),
            params,
            Arc::clone(&route.metadata),
        );
        let span = tracing::info_span!(
            "request",
            method = %ctx.request().method,
            path = %ctx.request().path,
            request_id = %ctx.request_id()
        );

        async {
            match self.run(&route, &ctx).await {
                Ok(value) => respond(&route, &ctx, value),
                Err(error) => self.render_error(&route, &ctx, error),
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, route: &Arc<RouteDescriptor>, ctx: &ExecutionContext) -> Result<Value, PipelineError> {
        check_cancelled(ctx)?;
        if let Some(reason) = &ctx.request().rejected_body {
            return Err(HttpException::bad_request(reason.clone()).into());
        }

        for guard in self.globals.guards.iter().chain(&route.guards) {
            if !guard.can_activate(ctx).await? {
                return Err(HttpException::forbidden("Forbidden resource").into());
            }
            check_cancelled(ctx)?;
        }

        let args = self.resolve_args(route, ctx).await?;
        check_cancelled(ctx)?;

        let interceptors: Arc<[Arc<dyn Interceptor>]> = self
            .globals
            .interceptors
            .iter()
            .chain(&route.interceptors)
            .cloned()
            .collect();
        run_chain(interceptors, 0, ctx.clone(), Arc::clone(route), args).await
    }

    async fn resolve_args(&self, route: &RouteDescriptor, ctx: &ExecutionContext) -> Result<HandlerArgs, PipelineError> {
        let mut values = Vec::with_capacity(route.params.len());
        for (index, param) in route.params.iter().enumerate() {
            let mut value = extract(param, ctx);
            if !param.source.skips_pipes() {
                let metadata = ArgumentMetadata {
                    source: param.source,
                    key: param.key.clone(),
                    index,
                };
                let pipes = self.globals.pipes.iter().chain(&route.pipes).chain(&param.pipes);
                for pipe in pipes {
                    value = pipe
                        .transform(value, &metadata)
                        .await
                        .map_err(HttpException::from)?;
                }
            }
            values.push(value);
        }
        Ok(HandlerArgs::new(values, ctx.clone()))
    }

    fn render_error(&self, route: &RouteDescriptor, ctx: &ExecutionContext, error: PipelineError) -> Response {
        let filter = route
            .filters
            .iter()
            .chain(&self.globals.filters)
            .find(|filter| filter.handles(&error));
        match filter {
            Some(filter) => {
                tracing::debug!(filter = %filter.name(), error = %error, "Exception filter selected");
                filter.catch(&error, ctx)
            }
            None => self.base_filter.catch(&error, ctx),
        }
    }
}

fn check_cancelled(ctx: &ExecutionContext) -> Result<(), PipelineError> {
    if ctx.is_cancelled() {
        return Err(HttpException::client_closed().into());
    }
    Ok(())
}

fn run_chain(
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    ctx: ExecutionContext,
    route: Arc<RouteDescriptor>,
    args: HandlerArgs,
) -> BoxFuture<'static, InterceptorResult> {
    Box::pin(async move {
        let Some(interceptor) = interceptors.get(index).cloned() else {
            check_cancelled(&ctx)?;
            return (route.handler)(Arc::clone(&route.controller), args).await;
        };
        let rest = Arc::clone(&interceptors);
        let inner = ctx.clone();
        let next = Next::new(move || run_chain(rest, index + 1, inner, route, args));
        interceptor.intercept(&ctx, next).await
    })
}

fn extract(param: &RouteParam, ctx: &ExecutionContext) -> Value {
    let request = ctx.request();
    let key = param.key.as_deref();
    match (param.source, key) {
        (ParamSource::Path, Some(key)) => string_or_null(ctx.param(key)),
        (ParamSource::Path, None) => object(ctx.params().iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        (ParamSource::Query, Some(key)) => string_or_null(request.query_value(key)),
        (ParamSource::Query, None) => object(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        (ParamSource::Header, Some(key)) => string_or_null(request.header_value(key)),
        (ParamSource::Header, None) => object(
            request
                .headers
                .iter()
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        ),
        (ParamSource::Body, None) => request.body.clone().unwrap_or(Value::Null),
        (ParamSource::Body, Some(key)) => request
            .body
            .as_ref()
            .and_then(|body| body.get(key))
            .cloned()
            .unwrap_or(Value::Null),
        (ParamSource::Request, _) => request.to_json(),
        (ParamSource::Response, _) => Value::Null,
    }
}

fn string_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

// First value wins for repeated keys.
fn object<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.entry(key.to_string())
            .or_insert_with(|| Value::String(value.to_string()));
    }
    Value::Object(map)
}

fn respond(route: &RouteDescriptor, ctx: &ExecutionContext, value: Value) -> Response {
    let handle = ctx.response();
    let default = if route.method == Method::POST {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let status = handle.status_code().or(route.http_code).unwrap_or(default);

    let mut response = Response::new(status);
    for (name, value) in &route.headers {
        response.headers.insert(name.clone(), value.clone());
    }
    response.headers.extend(handle.headers());
    if !value.is_null() {
        response.body = Some(value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, ControllerDeclaration, ParamSpec};
    use crate::di::{Container, Dependencies, Injectable};
    use crate::error::Result;
    use crate::exception::FilterBinding;
    use crate::guard::GuardResult;
    use crate::metadata::MetadataRegistry;
    use crate::module::{Module, ModuleDeclaration, ModuleGraph, ModuleId, ModuleRef};
    use crate::pipe::builtins::ParseIntPipe;
    use async_trait::async_trait;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        allow: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Guard for Recorder {
        async fn can_activate(&self, _ctx: &ExecutionContext) -> GuardResult {
            self.log.lock().unwrap().push(self.name);
            Ok(self.allow)
        }
    }

    struct Cancel;

    #[async_trait]
    impl Guard for Cancel {
        async fn can_activate(&self, ctx: &ExecutionContext) -> GuardResult {
            ctx.cancel();
            Ok(true)
        }
    }

    struct Wrap(&'static str);

    #[async_trait]
    impl Interceptor for Wrap {
        async fn intercept(&self, _ctx: &ExecutionContext, next: Next) -> InterceptorResult {
            let value = next.run().await?;
            let mut wrapped = Map::new();
            wrapped.insert(self.0.to_string(), value);
            Ok(Value::Object(wrapped))
        }
    }

    struct Teapot;

    impl ExceptionFilter for Teapot {
        fn catch(&self, _error: &PipelineError, _ctx: &ExecutionContext) -> Response {
            Response::new(StatusCode::IM_A_TEAPOT)
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("out of stock")]
    struct OutOfStock;

    struct ItemsController;

    impl Injectable for ItemsController {
        fn inject(_deps: &mut Dependencies) -> Result<Self> {
            Ok(ItemsController)
        }
    }

    impl Controller for ItemsController {
        fn declare(routes: &mut ControllerDeclaration<Self>) {
            routes.path("/items").use_interceptor(Wrap("outer"));
            routes
                .get("/:id")
                .param(ParamSpec::path("id").pipe(ParseIntPipe))
                .param(ParamSpec::query("verbose"))
                .use_interceptor(Wrap("inner"))
                .handle("find_one", |_this, args| async move {
                    let id: i64 = args.get(0)?;
                    Ok::<_, HttpException>(json!({ "id": id, "verbose": args.value(1) }))
                });
            routes
                .post("/")
                .param(ParamSpec::body_field("name"))
                .header(HeaderName::from_static("x-created"), HeaderValue::from_static("yes"))
                .handle("create", |_this, args| async move {
                    args.response().set_header(
                        HeaderName::from_static("x-handler"),
                        HeaderValue::from_static("create"),
                    );
                    let name: String = args.get(0)?;
                    Ok::<_, HttpException>(json!({ "name": name }))
                });
            routes
                .delete("/:id")
                .use_filter(FilterBinding::new(Teapot).catching::<OutOfStock>())
                .handle("remove", |_this, _args| async move {
                    Err::<Value, _>(OutOfStock)
                });
            routes
                .put("/:id")
                .handle("replace", |_this, _args| async move { Ok::<_, HttpException>(Value::Null) });
        }
    }

    struct ItemsModule;

    impl Module for ItemsModule {
        fn declare(module: &mut ModuleDeclaration) {
            module.controller::<ItemsController>();
        }
    }

    fn build() -> (Dispatcher, Container) {
        let mut registry = MetadataRegistry::new();
        let graph = ModuleGraph::resolve(&ModuleRef::of::<ItemsModule>(), &mut registry).unwrap();
        registry.freeze();
        let container = Container::new(graph);
        container.instantiate_all().unwrap();
        let table = RouteTable::build(&container, &registry, "").unwrap();
        (Dispatcher::new(table, false), container)
    }

    fn dispatcher() -> Dispatcher {
        build().0
    }

    #[tokio::test]
    async fn test_pipes_and_interceptors_wrap_the_handler() {
        let response = dispatcher().dispatch(Request::get("/items/42?verbose=1")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.body,
            Some(json!({ "outer": { "inner": { "id": 42, "verbose": "1" } } }))
        );
    }

    #[tokio::test]
    async fn test_pipe_failure_is_a_bad_request() {
        let response = dispatcher().dispatch(Request::get("/items/abc")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body.unwrap()["message"],
            "Validation failed (numeric string is expected)"
        );
    }

    #[tokio::test]
    async fn test_post_defaults_to_created_with_headers() {
        let request = Request::post("/items").body(json!({ "name": "lamp" }));
        let response = dispatcher().dispatch(request).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers["x-created"], "yes");
        assert_eq!(response.headers["x-handler"], "create");
        assert_eq!(response.body, Some(json!({ "name": "lamp" })));
    }

    #[tokio::test]
    async fn test_null_result_has_no_body() {
        let request = Request::new(Method::PUT, "/items/1");
        let response = dispatcher().dispatch(request).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_unmatched_route_is_not_found() {
        let response = dispatcher().dispatch(Request::get("/nowhere")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body.unwrap()["message"], "Cannot GET /nowhere");
    }

    #[tokio::test]
    async fn test_handler_filter_catches_its_error_type() {
        let request = Request::new(Method::DELETE, "/items/1");
        let response = dispatcher().dispatch(request).await;
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_global_guards_run_first_and_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = dispatcher();
        for (name, allow) in [("first", true), ("deny", false), ("never", true)] {
            dispatcher.add_guard(Arc::new(Recorder {
                name,
                allow,
                log: Arc::clone(&log),
            }));
        }

        let response = dispatcher.dispatch(Request::get("/items/1")).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(response.body.unwrap()["message"], "Forbidden resource");
        assert_eq!(*log.lock().unwrap(), ["first", "deny"]);
    }

    #[tokio::test]
    async fn test_rejected_body_reaches_global_filters() {
        let (mut dispatcher, container) = build();
        let root = ModuleId::of::<ItemsModule>();
        dispatcher.add_filter(FilterBinding::new(Teapot).materialize(&container, &root).unwrap());

        let mut request = Request::post("/items");
        request.rejected_body = Some("Invalid JSON body".to_string());
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_cancelled_request_stops_before_the_handler() {
        let mut dispatcher = dispatcher();
        dispatcher.add_guard(Arc::new(Cancel));
        let response = dispatcher.dispatch(Request::get("/items/1")).await;
        assert_eq!(response.status.as_u16(), 499);
    }
}
