//! Module graph resolution
//!
//! Walks the import tree from the root module, memoizing modules by identity,
//! rejecting import cycles, and computing which provider tokens each module
//! may see: its own providers and controllers plus the exports of the modules
//! it imports directly.

use super::{Export, ModuleDeclaration, ModuleId, ModuleRef};
use crate::di::{Provider, ProviderKind, Token};
use crate::error::{Result, TrellisError};
use crate::metadata::{ClassId, ComponentDeclaration, Metadata, MetadataRegistry, Target};
use std::collections::{HashMap, HashSet};

/// A module after its declaration has been read.
#[derive(Debug)]
pub struct ResolvedModule {
    id: ModuleId,
    imports: Vec<ModuleId>,
    providers: Vec<Token>,
    controllers: Vec<Token>,
    exports: Vec<Export>,
}

impl ResolvedModule {
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    pub fn providers(&self) -> &[Token] {
        &self.providers
    }

    pub fn controllers(&self) -> &[Token] {
        &self.controllers
    }
}

/// A provider definition together with the module that owns it.
pub(crate) struct Definition {
    pub(crate) owner: ModuleId,
    pub(crate) provider: Provider,
}

/// The resolved module graph, in dependency order (imports before importers).
#[derive(Default)]
pub struct ModuleGraph {
    modules: Vec<ResolvedModule>,
    index: HashMap<ModuleId, usize>,
    owners: HashMap<Token, ModuleId>,
    exported: HashMap<ModuleId, HashSet<Token>>,
    visible: HashMap<ModuleId, HashSet<Token>>,
    pub(crate) definitions: Vec<Definition>,
}

impl ModuleGraph {
    /// Resolve the graph rooted at `root`, writing controller and component facts into `registry`.
    ///
    /// # Errors
    /// Fails on import cycles, invalid exports, and dependencies that are missing or
    /// not visible from the module that owns the requesting component.
    pub fn resolve(root: &ModuleRef, registry: &mut MetadataRegistry) -> Result<Self> {
        let mut graph = ModuleGraph::default();
        let mut path = Vec::new();
        graph.visit(root, registry, &mut path)?;
        graph.validate_exports()?;
        graph.compute_visibility();
        graph.validate_dependencies()?;
        Ok(graph)
    }

    fn visit(
        &mut self,
        module: &ModuleRef,
        registry: &mut MetadataRegistry,
        path: &mut Vec<ModuleId>,
    ) -> Result<()> {
        if let Some(start) = path.iter().position(|id| id == module.id()) {
            return Err(TrellisError::ModuleCycle {
                description: describe_cycle(&path[start..], module.id()),
            });
        }
        if self.index.contains_key(module.id()) {
            return Ok(());
        }

        let declaration = module.declare();
        path.push(module.id().clone());
        for import in &declaration.imports {
            self.visit(import, registry, path)?;
        }
        path.pop();

        self.register(declaration, registry)
    }

    fn register(
        &mut self,
        declaration: ModuleDeclaration,
        registry: &mut MetadataRegistry,
    ) -> Result<()> {
        let ModuleDeclaration {
            id,
            imports,
            providers,
            controllers,
            exports,
        } = declaration;

        let mut provider_tokens = Vec::with_capacity(providers.len());
        for provider in providers {
            let token = provider.token().clone();
            provider_tokens.push(token.clone());
            if let Some(owner) = self.owners.get(&token) {
                return Err(TrellisError::ConflictingProvider {
                    token: token.to_string(),
                    first: owner.to_string(),
                    second: id.to_string(),
                });
            }
            if let (ProviderKind::Class { dependencies, .. }, Some(class)) =
                (&provider.kind, ClassId::from_token(&token))
            {
                registry.declare(
                    Target::Class(class),
                    Metadata::Injectable(ComponentDeclaration {
                        lifetime: provider.lifetime(),
                        dependencies: dependencies.clone(),
                    }),
                )?;
            }
            self.owners.insert(token, id.clone());
            self.definitions.push(Definition {
                owner: id.clone(),
                provider,
            });
        }

        let mut controller_tokens = Vec::with_capacity(controllers.len());
        for controller in controllers {
            let token = controller.provider.token().clone();
            if let Some(owner) = self.owners.get(&token) {
                return Err(TrellisError::ConflictingProvider {
                    token: token.to_string(),
                    first: owner.to_string(),
                    second: id.to_string(),
                });
            }
            controller.declare_into(registry)?;
            controller_tokens.push(token.clone());
            self.owners.insert(token, id.clone());
            self.definitions.push(Definition {
                owner: id.clone(),
                provider: controller.provider,
            });
        }

        tracing::debug!(
            module = %id,
            providers = provider_tokens.len(),
            controllers = controller_tokens.len(),
            "Module resolved"
        );

        self.index.insert(id.clone(), self.modules.len());
        self.modules.push(ResolvedModule {
            id,
            imports: imports.iter().map(|m| m.id().clone()).collect(),
            providers: provider_tokens,
            controllers: controller_tokens,
            exports,
        });
        Ok(())
    }

    fn validate_exports(&self) -> Result<()> {
        for module in &self.modules {
            for export in &module.exports {
                match export {
                    Export::Token(token) if !module.providers.contains(token) => {
                        return Err(TrellisError::InvalidExport {
                            module: module.id.to_string(),
                            export: token.to_string(),
                            reason: "it is not a provider of this module".to_string(),
                        });
                    }
                    Export::Module(imported) if !module.imports.contains(imported) => {
                        return Err(TrellisError::InvalidExport {
                            module: module.id.to_string(),
                            export: imported.to_string(),
                            reason: "the module is not imported".to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn compute_visibility(&mut self) {
        // Dependency order guarantees re-exported modules are computed first.
        for module in &self.modules {
            let mut exported = HashSet::new();
            for export in &module.exports {
                match export {
                    Export::Token(token) => {
                        exported.insert(token.clone());
                    }
                    Export::Module(imported) => {
                        if let Some(tokens) = self.exported.get(imported) {
                            exported.extend(tokens.iter().cloned());
                        }
                    }
                }
            }
            self.exported.insert(module.id.clone(), exported);
        }

        for module in &self.modules {
            let mut visible: HashSet<Token> = module
                .providers
                .iter()
                .chain(module.controllers.iter())
                .cloned()
                .collect();
            for imported in &module.imports {
                if let Some(tokens) = self.exported.get(imported) {
                    visible.extend(tokens.iter().cloned());
                }
            }
            self.visible.insert(module.id.clone(), visible);
        }
    }

    fn validate_dependencies(&self) -> Result<()> {
        for definition in &self.definitions {
            let requester = definition.provider.token().to_string();
            for dependency in definition.provider.dependencies() {
                self.check_visible(&dependency, &definition.owner, &requester)?;
            }
        }
        Ok(())
    }

    /// Modules in dependency order; the root module is last.
    pub fn modules(&self) -> &[ResolvedModule] {
        &self.modules
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ResolvedModule> {
        self.index.get(id).map(|&i| &self.modules[i])
    }

    pub fn root(&self) -> Option<&ModuleId> {
        self.modules.last().map(|m| &m.id)
    }

    /// The module whose declaration defines `token`.
    pub fn owner_of(&self, token: &Token) -> Option<&ModuleId> {
        self.owners.get(token)
    }

    pub fn is_visible(&self, token: &Token, module: &ModuleId) -> bool {
        self.visible
            .get(module)
            .is_some_and(|tokens| tokens.contains(token))
    }

    /// Ensure `module` may inject `token`, naming `requested_by` in the error.
    pub fn check_visible(&self, token: &Token, module: &ModuleId, requested_by: &str) -> Result<()> {
        if self.is_visible(token, module) {
            return Ok(());
        }
        match self.owners.get(token) {
            None => Err(TrellisError::ProviderNotFound {
                token: token.to_string(),
                requested_by: requested_by.to_string(),
            }),
            Some(owner) => Err(TrellisError::VisibilityViolation {
                token: token.to_string(),
                requested_by: requested_by.to_string(),
                module: module.to_string(),
                owner: owner.to_string(),
            }),
        }
    }
}

/// `module A imports module B which imports module A`
fn describe_cycle(path: &[ModuleId], closing: &ModuleId) -> String {
    let mut chain = path.iter().chain(std::iter::once(closing));
    let mut description = String::new();
    if let (Some(first), Some(second)) = (chain.next(), chain.next()) {
        description = format!("module {first} imports module {second}");
    }
    for next in chain {
        description.push_str(&format!(" which imports module {next}"));
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Dependencies, Injectable};
    use crate::module::Module;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Logger;
    impl Injectable for Logger {
        fn inject(_deps: &mut Dependencies) -> Result<Self> {
            Ok(Logger)
        }
    }

    struct UserService;
    impl Injectable for UserService {
        fn dependencies() -> Vec<Token> {
            vec![Token::of::<Logger>()]
        }
        fn inject(deps: &mut Dependencies) -> Result<Self> {
            deps.next::<Logger>()?;
            Ok(UserService)
        }
    }

    fn resolve<M: Module>() -> Result<ModuleGraph> {
        ModuleGraph::resolve(&ModuleRef::of::<M>(), &mut MetadataRegistry::new())
    }

    struct CycleA;
    struct CycleB;
    impl Module for CycleA {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<CycleB>();
        }
    }
    impl Module for CycleB {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<CycleA>();
        }
    }

    #[test]
    fn test_import_cycle_is_named() {
        let err = resolve::<CycleA>().err().unwrap();
        match err {
            TrellisError::ModuleCycle { description } => assert_eq!(
                description,
                "module CycleA imports module CycleB which imports module CycleA"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    static SHARED_DECLARATIONS: AtomicUsize = AtomicUsize::new(0);

    struct SharedModule;
    struct LeftModule;
    struct RightModule;
    struct DiamondRoot;

    impl Module for SharedModule {
        fn declare(module: &mut ModuleDeclaration) {
            SHARED_DECLARATIONS.fetch_add(1, Ordering::SeqCst);
            module.provider(Provider::class::<Logger>()).export::<Logger>();
        }
    }
    impl Module for LeftModule {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<SharedModule>();
        }
    }
    impl Module for RightModule {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<SharedModule>();
        }
    }
    impl Module for DiamondRoot {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<LeftModule>().import::<RightModule>();
        }
    }

    #[test]
    fn test_diamond_imports_are_visited_once_in_dependency_order() {
        let graph = resolve::<DiamondRoot>().unwrap();
        assert_eq!(SHARED_DECLARATIONS.load(Ordering::SeqCst), 1);

        let order: Vec<String> = graph.modules().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(order, ["SharedModule", "LeftModule", "RightModule", "DiamondRoot"]);
        assert_eq!(graph.root().unwrap().name(), "DiamondRoot");
        assert_eq!(graph.definitions.len(), 1);

        let left = ModuleId::of::<LeftModule>();
        assert!(graph.is_visible(&Token::of::<Logger>(), &left));
        // Not re-exported by LeftModule or RightModule.
        assert!(!graph.is_visible(&Token::of::<Logger>(), &ModuleId::of::<DiamondRoot>()));
    }

    struct HiddenLogger;
    struct ConsumerOfHidden;
    impl Module for HiddenLogger {
        fn declare(module: &mut ModuleDeclaration) {
            module.provider(Provider::class::<Logger>());
        }
    }
    impl Module for ConsumerOfHidden {
        fn declare(module: &mut ModuleDeclaration) {
            module
                .import::<HiddenLogger>()
                .provider(Provider::class::<UserService>());
        }
    }

    #[test]
    fn test_unexported_provider_is_a_visibility_violation() {
        let err = resolve::<ConsumerOfHidden>().err().unwrap();
        match err {
            TrellisError::VisibilityViolation {
                token,
                requested_by,
                module,
                owner,
            } => {
                assert_eq!(token, "Logger");
                assert_eq!(requested_by, "UserService");
                assert_eq!(module, "ConsumerOfHidden");
                assert_eq!(owner, "HiddenLogger");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct Orphan;
    impl Module for Orphan {
        fn declare(module: &mut ModuleDeclaration) {
            module.provider(Provider::class::<UserService>());
        }
    }

    #[test]
    fn test_missing_provider_names_token_and_requester() {
        let err = resolve::<Orphan>().err().unwrap();
        assert!(matches!(
            err,
            TrellisError::ProviderNotFound { ref token, ref requested_by }
                if token == "Logger" && requested_by == "UserService"
        ));
    }

    struct Reexporter;
    struct ReexportConsumer;
    impl Module for Reexporter {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<SharedModule>().export_module::<SharedModule>();
        }
    }
    impl Module for ReexportConsumer {
        fn declare(module: &mut ModuleDeclaration) {
            module
                .import::<Reexporter>()
                .provider(Provider::class::<UserService>());
        }
    }

    #[test]
    fn test_reexported_module_is_visible_to_importers() {
        let graph = resolve::<ReexportConsumer>().unwrap();
        assert!(graph.is_visible(&Token::of::<Logger>(), &ModuleId::of::<ReexportConsumer>()));
        assert_eq!(
            graph.owner_of(&Token::of::<Logger>()),
            Some(&ModuleId::of::<SharedModule>())
        );
    }

    struct PrivateLogger;
    struct OtherLogger;
    struct TwoLoggers;
    impl Module for PrivateLogger {
        fn declare(module: &mut ModuleDeclaration) {
            module.provider(Provider::class::<Logger>());
        }
    }
    impl Module for OtherLogger {
        fn declare(module: &mut ModuleDeclaration) {
            module.provider(Provider::class::<Logger>());
        }
    }
    impl Module for TwoLoggers {
        fn declare(module: &mut ModuleDeclaration) {
            module.import::<PrivateLogger>().import::<OtherLogger>();
        }
    }

    #[test]
    fn test_token_declared_by_two_modules_is_rejected() {
        let err = resolve::<TwoLoggers>().err().unwrap();
        match err {
            TrellisError::ConflictingProvider { token, first, second } => {
                assert_eq!(token, "Logger");
                assert_eq!(first, "PrivateLogger");
                assert_eq!(second, "OtherLogger");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct BadExport;
    impl Module for BadExport {
        fn declare(module: &mut ModuleDeclaration) {
            module.export::<Logger>();
        }
    }

    #[test]
    fn test_exporting_foreign_token_is_rejected() {
        let err = resolve::<BadExport>().err().unwrap();
        assert!(matches!(err, TrellisError::InvalidExport { ref export, .. } if export == "Logger"));
    }
}
