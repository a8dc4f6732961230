use crate::controller::{Controller, ControllerRegistration};
use crate::di::{Provider, Token, short_type_name};
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

mod graph;

pub use graph::{ModuleGraph, ResolvedModule};

/// Trait for application modules
///
/// A module groups providers and controllers behind a visibility boundary.
/// Other modules only see what it exports.
///
/// # Example
/// ```
/// use trellis::prelude::*;
///
/// #[derive(Injectable)]
/// pub struct UserService;
///
/// pub struct UsersModule;
///
/// impl Module for UsersModule {
///     fn declare(module: &mut ModuleDeclaration) {
///         module
///             .provider(Provider::class::<UserService>())
///             .export::<UserService>();
///     }
/// }
///
/// pub struct AppModule;
///
/// impl Module for AppModule {
///     fn declare(module: &mut ModuleDeclaration) {
///         module.import::<UsersModule>();
///     }
/// }
/// ```
pub trait Module: 'static {
    fn declare(module: &mut ModuleDeclaration);
}

/// Identity of a module within the graph.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModuleId {
    type_id: TypeId,
    key: Option<Cow<'static, str>>,
    name: String,
}

impl ModuleId {
    pub fn of<M: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            key: None,
            name: short_type_name(std::any::type_name::<M>()),
        }
    }

    fn keyed<M: 'static>(key: Cow<'static, str>) -> Self {
        Self {
            key: Some(key),
            ..Self::of::<M>()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}({})", self.name, key),
            None => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({self})")
    }
}

type DeclareFn = Arc<dyn Fn(&mut ModuleDeclaration) + Send + Sync>;

/// A reference to a module that is declared lazily, when the graph reaches it.
#[derive(Clone)]
pub struct ModuleRef {
    id: ModuleId,
    declare: DeclareFn,
}

impl ModuleRef {
    pub fn of<M: Module>() -> Self {
        Self {
            id: ModuleId::of::<M>(),
            declare: Arc::new(M::declare),
        }
    }

    /// A module configured at runtime, such as `ConfigModule::for_root()`.
    ///
    /// The `key` distinguishes differently configured instances of the same module type.
    pub fn dynamic<M: 'static>(
        key: impl Into<Cow<'static, str>>,
        declare: impl Fn(&mut ModuleDeclaration) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: ModuleId::keyed::<M>(key.into()),
            declare: Arc::new(declare),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub(crate) fn declare(&self) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new(self.id.clone());
        (self.declare)(&mut declaration);
        declaration
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRef").field("id", &self.id).finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Export {
    Token(Token),
    Module(ModuleId),
}

/// What a module provides, imports and exports.
pub struct ModuleDeclaration {
    id: ModuleId,
    pub(crate) imports: Vec<ModuleRef>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) controllers: Vec<ControllerRegistration>,
    pub(crate) exports: Vec<Export>,
}

impl ModuleDeclaration {
    fn new(id: ModuleId) -> Self {
        Self {
            id,
            imports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
            exports: Vec::new(),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn import<M: Module>(&mut self) -> &mut Self {
        self.import_ref(ModuleRef::of::<M>())
    }

    pub fn import_ref(&mut self, module: ModuleRef) -> &mut Self {
        self.imports.push(module);
        self
    }

    pub fn provider(&mut self, provider: impl Into<Provider>) -> &mut Self {
        self.providers.push(provider.into());
        self
    }

    pub fn controller<C: Controller>(&mut self) -> &mut Self {
        self.controllers.push(ControllerRegistration::of::<C>());
        self
    }

    /// Export a local provider registered under `T`'s type token.
    pub fn export<T: ?Sized + 'static>(&mut self) -> &mut Self {
        self.export_token(Token::of::<T>())
    }

    pub fn export_token(&mut self, token: Token) -> &mut Self {
        self.exports.push(Export::Token(token));
        self
    }

    /// Re-export an imported module, making its exports visible to importers of this module.
    pub fn export_module<M: Module>(&mut self) -> &mut Self {
        self.exports.push(Export::Module(ModuleId::of::<M>()));
        self
    }

    pub fn export_module_ref(&mut self, module: &ModuleRef) -> &mut Self {
        self.exports.push(Export::Module(module.id().clone()));
        self
    }
}
