//! Route table
//!
//! Built once at bootstrap from the frozen metadata registry: every handler
//! method of every controller becomes a [`RouteDescriptor`] holding the
//! controller singleton, the type-erased handler and its enhancers, already
//! materialized in the scope of the module that declares the controller.

mod tree;

use crate::controller::{ErasedHandler, HandlerDefinition, ParamSource};
use crate::di::{Container, Instance};
use crate::error::{Result, TrellisError};
use crate::exception::{ResolvedFilter, order_level};
use crate::guard::Guard;
use crate::interceptor::Interceptor;
use crate::metadata::{ClassId, Metadata, MetadataKind, MetadataRegistry, Target};
use crate::module::ModuleId;
use crate::pipe::Pipe;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tree::{Segment, SegmentTree};

/// A handler argument with its own pipes materialized.
#[derive(Clone)]
pub struct RouteParam {
    pub source: ParamSource,
    pub key: Option<String>,
    pub(crate) pipes: Vec<Arc<dyn Pipe>>,
}

/// Everything needed to run one handler method.
pub struct RouteDescriptor {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) class: ClassId,
    pub(crate) handler_name: Cow<'static, str>,
    pub(crate) controller: Instance,
    pub(crate) handler: ErasedHandler,
    pub(crate) params: Vec<RouteParam>,
    /// Class guards, then method guards.
    pub(crate) guards: Vec<Arc<dyn Guard>>,
    /// Class pipes, then method pipes.
    pub(crate) pipes: Vec<Arc<dyn Pipe>>,
    /// Class interceptors, then method interceptors.
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    /// Method filters, then class filters.
    pub(crate) filters: Vec<ResolvedFilter>,
    pub(crate) http_code: Option<StatusCode>,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) metadata: Arc<HashMap<String, Value>>,
    param_names: Vec<String>,
}

impl RouteDescriptor {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full path including the global prefix, e.g. `/api/cats/:id`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn params(&self) -> &[RouteParam] {
        &self.params
    }

    pub fn http_code(&self) -> Option<StatusCode> {
        self.http_code
    }

    /// `Class.handler`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.handler_name)
    }
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("handler", &self.qualified_name())
            .field("guards", &self.guards.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// A successful lookup: the route and its bound path parameters.
#[derive(Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteDescriptor>,
    pub params: HashMap<String, String>,
}

/// Maps `(method, path)` to route descriptors.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteDescriptor>>,
    tree: SegmentTree,
}

impl RouteTable {
    /// Build the table for every controller in the container's module graph.
    ///
    /// # Errors
    /// [`TrellisError::DuplicateRoute`] when two handlers share a method and
    /// path shape, [`TrellisError::InvalidRoute`] for malformed paths, and any
    /// failure to build a controller or an injected enhancer.
    pub fn build(container: &Container, registry: &MetadataRegistry, prefix: &str) -> Result<Self> {
        let mut table = RouteTable::default();
        for module in container.graph().modules() {
            for token in module.controllers() {
                let Some(class) = ClassId::from_token(token) else {
                    continue;
                };
                table.add_controller(container, registry, module.id(), class, prefix)?;
            }
        }
        Ok(table)
    }

    fn add_controller(
        &mut self,
        container: &Container,
        registry: &MetadataRegistry,
        module: &ModuleId,
        class: ClassId,
        prefix: &str,
    ) -> Result<()> {
        let class_target = Target::Class(class);
        let base = match registry.lookup_one(&class_target, MetadataKind::Controller) {
            Some(Metadata::Controller { path }) => path.clone(),
            _ => String::new(),
        };
        tracing::info!("{} {}:", class, tree::display(&tree::parse(&base)?));

        let controller = container.resolve_in(&class.token(), module, &class.name())?;
        let class_facts = Facts::collect(registry, &class_target, container, module)?;

        for fact in registry.lookup(&class_target, MetadataKind::HandlerMethod) {
            let Metadata::HandlerMethod(HandlerDefinition { name, handler }) = fact else {
                continue;
            };
            let target = Target::Method(class, name.clone());
            let Some(Metadata::Route { method, path }) = registry.lookup_one(&target, MetadataKind::Route) else {
                continue;
            };

            let full = format!("{prefix}/{base}/{path}");
            let segments = tree::parse(&full)?;
            let method_facts = Facts::collect(registry, &target, container, module)?;

            let mut metadata = class_facts.metadata.clone();
            metadata.extend(method_facts.metadata.clone());

            let mut filters = order_level(method_facts.filters);
            filters.extend(order_level(class_facts.filters.clone()));

            let route = RouteDescriptor {
                method: method.clone(),
                path: tree::display(&segments),
                class,
                handler_name: name.clone(),
                controller: Arc::clone(&controller),
                handler: Arc::clone(handler),
                params: method_facts.params,
                guards: concat(&class_facts.guards, method_facts.guards),
                pipes: concat(&class_facts.pipes, method_facts.pipes),
                interceptors: concat(&class_facts.interceptors, method_facts.interceptors),
                filters,
                http_code: method_facts.http_code,
                headers: method_facts.headers,
                metadata: Arc::new(metadata),
                param_names: param_names(&segments),
            };
            self.insert(route, &segments)?;
        }
        Ok(())
    }

    fn insert(&mut self, route: RouteDescriptor, segments: &[Segment]) -> Result<()> {
        let index = self.routes.len();
        if let Some(existing) = self.tree.insert(&route.method, segments, index) {
            let first = &self.routes[existing];
            return Err(TrellisError::DuplicateRoute {
                method: route.method.to_string(),
                path: route.path.clone(),
                first: first.qualified_name(),
                second: route.qualified_name(),
            });
        }
        tracing::info!("Mapped {{{} {}}} route", route.method, route.path);
        self.routes.push(Arc::new(route));
        Ok(())
    }

    /// Match a request path; parameter values are bound by name.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let (index, values) = self.tree.find(method, path)?;
        let route = Arc::clone(self.routes.get(index)?);
        let params = route.param_names.iter().cloned().zip(values).collect();
        Some(RouteMatch { route, params })
    }

    /// Every route, in registration order.
    pub fn routes(&self) -> &[Arc<RouteDescriptor>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn concat<T: ?Sized>(first: &[Arc<T>], second: Vec<Arc<T>>) -> Vec<Arc<T>> {
    first.iter().cloned().chain(second).collect()
}

fn param_names(segments: &[Segment]) -> Vec<String> {
    segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Param(name) | Segment::Wildcard(name) => Some(name.clone()),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Enhancers and route facts declared on one target, materialized.
#[derive(Default)]
struct Facts {
    params: Vec<RouteParam>,
    guards: Vec<Arc<dyn Guard>>,
    pipes: Vec<Arc<dyn Pipe>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    filters: Vec<ResolvedFilter>,
    http_code: Option<StatusCode>,
    headers: Vec<(HeaderName, HeaderValue)>,
    metadata: HashMap<String, Value>,
}

impl Facts {
    fn collect(
        registry: &MetadataRegistry,
        target: &Target,
        container: &Container,
        module: &ModuleId,
    ) -> Result<Self> {
        let mut facts = Facts::default();
        for fact in registry.lookup(target, MetadataKind::Param) {
            if let Metadata::Param(spec) = fact {
                let pipes = spec
                    .pipes
                    .iter()
                    .map(|pipe| pipe.materialize(container, module))
                    .collect::<Result<Vec<_>>>()?;
                facts.params.push(RouteParam {
                    source: spec.source,
                    key: spec.key.clone(),
                    pipes,
                });
            }
        }
        for fact in registry.lookup(target, MetadataKind::Guard) {
            if let Metadata::Guard(binding) = fact {
                facts.guards.push(binding.materialize(container, module)?);
            }
        }
        for fact in registry.lookup(target, MetadataKind::Pipe) {
            if let Metadata::Pipe(binding) = fact {
                facts.pipes.push(binding.materialize(container, module)?);
            }
        }
        for fact in registry.lookup(target, MetadataKind::Interceptor) {
            if let Metadata::Interceptor(binding) = fact {
                facts.interceptors.push(binding.materialize(container, module)?);
            }
        }
        for fact in registry.lookup(target, MetadataKind::Filter) {
            if let Metadata::Filter(binding) = fact {
                facts.filters.push(binding.materialize(container, module)?);
            }
        }
        if let Some(Metadata::HttpCode(status)) = registry.lookup_one(target, MetadataKind::HttpCode) {
            facts.http_code = Some(*status);
        }
        for fact in registry.lookup(target, MetadataKind::Header) {
            if let Metadata::Header(name, value) = fact {
                facts.headers.push((name.clone(), value.clone()));
            }
        }
        for fact in registry.lookup(target, MetadataKind::Custom) {
            if let Metadata::Custom { key, value } = fact {
                facts.metadata.insert(key.clone(), value.clone());
            }
        }
        Ok(facts)
    }
}
