use crate::di::injectable::{Dependencies, Injectable};
use crate::di::provider::{Lifetime, Provider, ProviderKind};
use crate::di::token::{Instance, Token, downcast, erase};
use crate::error::{Result, TrellisError};
use crate::lifecycle::HookTarget;
use crate::module::{ModuleGraph, ModuleId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

struct ProviderEntry {
    provider: Provider,
    owner: ModuleId,
}

/// Thread-safe dependency injection container.
///
/// Built from a resolved [`ModuleGraph`]. Every provider is produced in the
/// scope of the module that declares it, so a dependency must be visible
/// from that module.
pub struct Container {
    graph: Arc<ModuleGraph>,
    providers: HashMap<Token, ProviderEntry>,
    instances: DashMap<Token, Instance>,
    enhancers: DashMap<(Token, ModuleId), Instance>,
    order: Mutex<Vec<Token>>,
}

impl Container {
    pub fn new(mut graph: ModuleGraph) -> Self {
        let mut providers = HashMap::new();
        for definition in std::mem::take(&mut graph.definitions) {
            providers.insert(
                definition.provider.token().clone(),
                ProviderEntry {
                    provider: definition.provider,
                    owner: definition.owner,
                },
            );
        }
        Self {
            graph: Arc::new(graph),
            providers,
            instances: DashMap::new(),
            enhancers: DashMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    /// Instantiate every singleton provider and controller, module by module in dependency order.
    ///
    /// # Errors
    /// Returns the first resolution failure, e.g. a circular dependency or a failing factory.
    pub fn instantiate_all(&self) -> Result<()> {
        for module in self.graph.modules() {
            for token in module.providers().iter().chain(module.controllers()) {
                let Some(entry) = self.providers.get(token) else {
                    continue;
                };
                if entry.owner != *module.id() || entry.provider.lifetime() == Lifetime::Transient {
                    continue;
                }
                self.produce(token, &mut Vec::new())?;
            }
            tracing::info!("{} dependencies initialized", module.id());
        }
        Ok(())
    }

    /// Resolve a type token from its owner's scope, ignoring module boundaries.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_token(&Token::of::<T>())
    }

    /// Resolve any token from its owner's scope, ignoring module boundaries.
    pub fn get_token<T: ?Sized + Send + Sync + 'static>(&self, token: &Token) -> Result<Arc<T>> {
        let instance = self.produce(token, &mut Vec::new())?;
        typed(token, &instance)
    }

    /// Resolve `T` as seen from `module`, enforcing visibility.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self, module: &ModuleId) -> Result<Arc<T>> {
        let token = Token::of::<T>();
        let instance = self.resolve_in(&token, module, &module.to_string())?;
        typed(&token, &instance)
    }

    pub(crate) fn resolve_in(
        &self,
        token: &Token,
        module: &ModuleId,
        requested_by: &str,
    ) -> Result<Instance> {
        self.graph.check_visible(token, module, requested_by)?;
        self.produce(token, &mut Vec::new())
    }

    /// Build a guard, pipe, interceptor or filter class in the scope of `module`.
    ///
    /// A class that is also a visible provider resolves to that provider.
    /// Otherwise one instance is built per module and reused.
    pub(crate) fn instantiate_enhancer<E: Injectable>(&self, module: &ModuleId) -> Result<Arc<E>> {
        let token = Token::of::<E>();
        if self.graph.is_visible(&token, module) {
            let instance = self.resolve_in(&token, module, &module.to_string())?;
            return typed(&token, &instance);
        }

        let key = (token.clone(), module.clone());
        if let Some(instance) = self.enhancers.get(&key) {
            return typed(&token, instance.value());
        }

        let mut stack = vec![token.clone()];
        let values = self.resolve_dependencies(&E::dependencies(), module, &token, &mut stack)?;
        let built = erase(Arc::new(E::inject(&mut Dependencies::new(token.clone(), values))?));
        let instance = self.enhancers.entry(key).or_insert(built).clone();
        typed(&token, &instance)
    }

    /// Singletons with lifecycle hooks, in instantiation order.
    pub(crate) fn hook_targets(&self) -> Vec<HookTarget> {
        let order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order
            .iter()
            .filter_map(|token| {
                let entry = self.providers.get(token)?;
                if entry.provider.hooks.is_empty() {
                    return None;
                }
                let instance = self.instances.get(token)?.clone();
                Some(HookTarget {
                    name: token.to_string(),
                    instance,
                    hooks: entry.provider.hooks.clone(),
                })
            })
            .collect()
    }

    /// Tokens of the singletons built so far, in the order they were built.
    pub fn instantiation_order(&self) -> Vec<Token> {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn produce(&self, token: &Token, stack: &mut Vec<Token>) -> Result<Instance> {
        if let Some(instance) = self.instances.get(token) {
            return Ok(instance.clone());
        }
        let entry = self
            .providers
            .get(token)
            .ok_or_else(|| TrellisError::ProviderNotFound {
                token: token.to_string(),
                requested_by: stack
                    .last()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "the application".to_string()),
            })?;

        if let Some(start) = stack.iter().position(|t| t == token) {
            let chain = stack[start..]
                .iter()
                .chain(std::iter::once(token))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(TrellisError::CircularDependency { chain });
        }

        stack.push(token.clone());
        let built = self.construct(token, entry, stack);
        stack.pop();
        let instance = built?;

        if entry.provider.lifetime() == Lifetime::Transient {
            return Ok(instance);
        }

        let mut inserted = false;
        let cached = self
            .instances
            .entry(token.clone())
            .or_insert_with(|| {
                inserted = true;
                instance
            })
            .clone();
        if inserted {
            tracing::debug!(token = %token, module = %entry.owner, "Provider instantiated");
            self.order
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(token.clone());
        }
        Ok(cached)
    }

    fn construct(&self, token: &Token, entry: &ProviderEntry, stack: &mut Vec<Token>) -> Result<Instance> {
        match &entry.provider.kind {
            ProviderKind::Value(value) => Ok(value.clone()),
            ProviderKind::Class {
                dependencies,
                construct,
            } => {
                let values = self.resolve_dependencies(dependencies, &entry.owner, token, stack)?;
                construct(&mut Dependencies::new(token.clone(), values))
            }
            ProviderKind::Factory {
                dependencies,
                construct,
            } => {
                let values = self.resolve_dependencies(dependencies, &entry.owner, token, stack)?;
                construct(&mut Dependencies::new(token.clone(), values)).map_err(|e| match e {
                    e @ TrellisError::FactoryFailed { .. } => e,
                    other => TrellisError::FactoryFailed {
                        token: token.to_string(),
                        message: other.to_string(),
                    },
                })
            }
            ProviderKind::Alias { target, .. } => {
                self.graph
                    .check_visible(target, &entry.owner, &token.to_string())?;
                let instance = self.produce(target, stack)?;
                entry.provider.apply_cast(instance)
            }
        }
    }

    fn resolve_dependencies(
        &self,
        dependencies: &[Token],
        scope: &ModuleId,
        requester: &Token,
        stack: &mut Vec<Token>,
    ) -> Result<Vec<(Token, Instance)>> {
        let requested_by = requester.to_string();
        dependencies
            .iter()
            .map(|dependency| {
                self.graph.check_visible(dependency, scope, &requested_by)?;
                Ok((dependency.clone(), self.produce(dependency, stack)?))
            })
            .collect()
    }
}

fn typed<T: ?Sized + Send + Sync + 'static>(token: &Token, instance: &Instance) -> Result<Arc<T>> {
    downcast::<T>(instance).ok_or_else(|| TrellisError::DowncastFailed {
        token: token.to_string(),
        type_name: std::any::type_name::<T>().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataRegistry;
    use crate::module::{Module, ModuleDeclaration, ModuleRef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn container<M: Module>() -> Result<Container> {
        let graph = ModuleGraph::resolve(&ModuleRef::of::<M>(), &mut MetadataRegistry::new())?;
        let container = Container::new(graph);
        container.instantiate_all()?;
        Ok(container)
    }

    struct Config {
        url: String,
    }

    struct Repository {
        config: Arc<Config>,
    }

    impl Injectable for Repository {
        fn dependencies() -> Vec<Token> {
            vec![Token::of::<Config>()]
        }
        fn inject(deps: &mut Dependencies) -> Result<Self> {
            Ok(Self {
                config: deps.next()?,
            })
        }
    }

    struct Service {
        repository: Arc<Repository>,
    }

    impl Injectable for Service {
        fn dependencies() -> Vec<Token> {
            vec![Token::of::<Repository>()]
        }
        fn inject(deps: &mut Dependencies) -> Result<Self> {
            Ok(Self {
                repository: deps.next()?,
            })
        }
    }

    struct DataModule;
    impl Module for DataModule {
        fn declare(module: &mut ModuleDeclaration) {
            module
                .provider(Provider::class::<Service>())
                .provider(Provider::class::<Repository>())
                .provider(Provider::instance(Config {
                    url: "postgres://localhost".to_string(),
                }));
        }
    }

    #[test]
    fn test_singletons_are_shared_and_built_in_dependency_order() {
        let container = container::<DataModule>().unwrap();
        let first = container.get::<Service>().unwrap();
        let second = container.get::<Service>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.repository.config.url, "postgres://localhost");

        let repository = container.get::<Repository>().unwrap();
        assert!(Arc::ptr_eq(&first.repository, &repository));

        let order: Vec<String> = container
            .instantiation_order()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(order, ["Config", "Repository", "Service"]);
    }

    struct Chicken;
    struct Egg;
    impl Injectable for Chicken {
        fn dependencies() -> Vec<Token> {
            vec![Token::of::<Egg>()]
        }
        fn inject(_deps: &mut Dependencies) -> Result<Self> {
            Ok(Chicken)
        }
    }
    impl Injectable for Egg {
        fn dependencies() -> Vec<Token> {
            vec![Token::of::<Chicken>()]
        }
        fn inject(_deps: &mut Dependencies) -> Result<Self> {
            Ok(Egg)
        }
    }

    struct FarmModule;
    impl Module for FarmModule {
        fn declare(module: &mut ModuleDeclaration) {
            module
                .provider(Provider::class::<Chicken>())
                .provider(Provider::class::<Egg>());
        }
    }

    #[test]
    fn test_circular_dependency_reports_chain() {
        let err = container::<FarmModule>().err().unwrap();
        match err {
            TrellisError::CircularDependency { chain } => {
                assert_eq!(chain, "Chicken -> Egg -> Chicken")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct FixedClock;
    impl Clock for FixedClock {
        fn now(&self) -> u64 {
            42
        }
    }

    struct Counter(AtomicUsize);

    struct ToolsModule;
    impl Module for ToolsModule {
        fn declare(module: &mut ModuleDeclaration) {
            module
                .provider(Provider::instance(FixedClock))
                .provider(Provider::bind::<dyn Clock, FixedClock, _>(|c| c as Arc<dyn Clock>))
                .provider(Provider::alias(Token::named("clock"), Token::of::<dyn Clock>()))
                .provider(Provider::value(Token::named("PORT"), 8080_u16))
                .provider(Provider::factory(
                    Token::named("ADDR"),
                    vec![Token::named("PORT")],
                    |deps| Ok(format!("0.0.0.0:{}", deps.next::<u16>()?)),
                ))
                .provider(
                    Provider::factory(Token::of::<Counter>(), vec![], |_deps| {
                        Ok(Counter(AtomicUsize::new(0)))
                    })
                    .transient(),
                );
        }
    }

    #[test]
    fn test_value_factory_alias_and_trait_bindings() {
        let container = container::<ToolsModule>().unwrap();

        let clock = container.get::<dyn Clock>().unwrap();
        assert_eq!(clock.now(), 42);
        let aliased = container
            .get_token::<dyn Clock>(&Token::named("clock"))
            .unwrap();
        assert!(Arc::ptr_eq(&clock, &aliased));

        let addr = container.get_token::<String>(&Token::named("ADDR")).unwrap();
        assert_eq!(addr.as_str(), "0.0.0.0:8080");
    }

    #[test]
    fn test_transient_providers_are_rebuilt() {
        let container = container::<ToolsModule>().unwrap();
        let first = container.get::<Counter>().unwrap();
        let second = container.get::<Counter>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        first.0.fetch_add(1, Ordering::SeqCst);
        assert_eq!(second.0.load(Ordering::SeqCst), 0);
    }

    struct BrokenModule;
    impl Module for BrokenModule {
        fn declare(module: &mut ModuleDeclaration) {
            module.provider(Provider::factory(Token::named("DB"), vec![], |_deps| {
                Err::<u8, _>(TrellisError::Internal("connection refused".to_string()))
            }));
        }
    }

    #[test]
    fn test_failing_factory_is_attributed() {
        let err = container::<BrokenModule>().err().unwrap();
        assert!(matches!(
            err,
            TrellisError::FactoryFailed { ref token, ref message }
                if token == "DB" && message.contains("connection refused")
        ));
    }

    struct Audit {
        config: Arc<Config>,
    }
    impl Injectable for Audit {
        fn dependencies() -> Vec<Token> {
            vec![Token::of::<Config>()]
        }
        fn inject(deps: &mut Dependencies) -> Result<Self> {
            Ok(Self {
                config: deps.next()?,
            })
        }
    }

    #[test]
    fn test_enhancers_are_built_once_per_module() {
        let container = container::<DataModule>().unwrap();
        let module = ModuleId::of::<DataModule>();
        let first = container.instantiate_enhancer::<Audit>(&module).unwrap();
        let second = container.instantiate_enhancer::<Audit>(&module).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.config.url, "postgres://localhost");
    }
}
