use crate::BoxFuture;
use crate::di::injectable::{Dependencies, Injectable};
use crate::di::token::{Instance, Token, downcast, erase};
use crate::error::{Result, TrellisError};
use crate::lifecycle::{
    HookFn, LifecycleError, OnApplicationBootstrap, OnApplicationShutdown, OnModuleDestroy,
    OnModuleInit, ProviderHooks, Result as LifecycleResult,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// One instance per application, created at bootstrap.
    #[default]
    Singleton,
    /// A fresh instance for every injection.
    Transient,
}

pub(crate) type ConstructFn = Arc<dyn Fn(&mut Dependencies) -> Result<Instance> + Send + Sync>;
pub(crate) type CastFn = Arc<dyn Fn(Instance) -> Option<Instance> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum ProviderKind {
    Class {
        dependencies: Vec<Token>,
        construct: ConstructFn,
    },
    Value(Instance),
    Factory {
        dependencies: Vec<Token>,
        construct: ConstructFn,
    },
    Alias {
        target: Token,
        cast: Option<CastFn>,
    },
}

/// A provider definition: a token paired with the recipe that produces it.
///
/// # Example
/// ```
/// use trellis::{Provider, Token};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {}
/// struct SystemClock;
/// impl Clock for SystemClock {}
///
/// let providers: Vec<Provider> = vec![
///     Provider::instance(SystemClock).into(),
///     Provider::bind::<dyn Clock, SystemClock, _>(|c| c as Arc<dyn Clock>),
///     Provider::value(Token::named("PORT"), 8080_u16).into(),
///     Provider::alias(Token::named("clock"), Token::of::<dyn Clock>()),
/// ];
/// assert_eq!(providers.len(), 4);
/// ```
#[derive(Clone)]
pub struct Provider {
    pub(crate) token: Token,
    pub(crate) kind: ProviderKind,
    pub(crate) lifetime: Lifetime,
    pub(crate) hooks: ProviderHooks,
}

impl Provider {
    /// A class provider: `T` is constructed from its declared dependencies.
    pub fn class<T: Injectable>() -> TypedProvider<T> {
        let construct: ConstructFn =
            Arc::new(|deps: &mut Dependencies| Ok(erase(Arc::new(T::inject(deps)?))));
        TypedProvider::new(Provider {
            token: Token::of::<T>(),
            kind: ProviderKind::Class {
                dependencies: T::dependencies(),
                construct,
            },
            lifetime: T::lifetime(),
            hooks: ProviderHooks::default(),
        })
    }

    /// A literal value registered under its own type.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> TypedProvider<T> {
        Self::value(Token::of::<T>(), value)
    }

    /// A literal value registered under an arbitrary token.
    pub fn value<T: Send + Sync + 'static>(token: Token, value: T) -> TypedProvider<T> {
        TypedProvider::new(Provider {
            token,
            kind: ProviderKind::Value(erase(Arc::new(value))),
            lifetime: Lifetime::Singleton,
            hooks: ProviderHooks::default(),
        })
    }

    /// A factory invoked with its own resolved dependencies.
    pub fn factory<T, F>(token: Token, dependencies: Vec<Token>, factory: F) -> TypedProvider<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Dependencies) -> Result<T> + Send + Sync + 'static,
    {
        let construct: ConstructFn =
            Arc::new(move |deps: &mut Dependencies| Ok(erase(Arc::new(factory(deps)?))));
        TypedProvider::new(Provider {
            token,
            kind: ProviderKind::Factory {
                dependencies,
                construct,
            },
            lifetime: Lifetime::Singleton,
            hooks: ProviderHooks::default(),
        })
    }

    /// Resolve `token` to whatever `target` resolves to.
    pub fn alias(token: Token, target: Token) -> Provider {
        Provider {
            token,
            kind: ProviderKind::Alias { target, cast: None },
            lifetime: Lifetime::Singleton,
            hooks: ProviderHooks::default(),
        }
    }

    /// Bind a trait object token to a concrete implementation.
    ///
    /// Resolving `Arc<dyn Trait>` yields the `Impl` singleton seen through `caster`.
    pub fn bind<Trait, Impl, F>(caster: F) -> Provider
    where
        Trait: ?Sized + Send + Sync + 'static,
        Impl: Send + Sync + 'static,
        F: Fn(Arc<Impl>) -> Arc<Trait> + Send + Sync + 'static,
    {
        let cast: CastFn = Arc::new(move |instance: Instance| {
            downcast::<Impl>(&instance).map(|concrete| erase(caster(concrete)))
        });
        Provider {
            token: Token::of::<Trait>(),
            kind: ProviderKind::Alias {
                target: Token::of::<Impl>(),
                cast: Some(cast),
            },
            lifetime: Lifetime::Singleton,
            hooks: ProviderHooks::default(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Tokens this provider needs before it can be produced.
    pub fn dependencies(&self) -> Vec<Token> {
        match &self.kind {
            ProviderKind::Class { dependencies, .. } | ProviderKind::Factory { dependencies, .. } => {
                dependencies.clone()
            }
            ProviderKind::Value(_) => Vec::new(),
            ProviderKind::Alias { target, .. } => vec![target.clone()],
        }
    }

    pub(crate) fn apply_cast(&self, instance: Instance) -> Result<Instance> {
        match &self.kind {
            ProviderKind::Alias {
                cast: Some(cast), target,
            } => cast(instance).ok_or_else(|| TrellisError::DowncastFailed {
                token: target.to_string(),
                type_name: self.token.to_string(),
            }),
            _ => Ok(instance),
        }
    }
}

/// A provider whose produced type is still known, so lifecycle hooks can be attached.
pub struct TypedProvider<T> {
    provider: Provider,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypedProvider<T> {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            _marker: PhantomData,
        }
    }

    /// Build a fresh instance for every injection.
    pub fn transient(mut self) -> Self {
        self.provider.lifetime = Lifetime::Transient;
        self
    }

    pub fn on_module_init(mut self) -> Self
    where
        T: OnModuleInit,
    {
        let hook: HookFn = Arc::new(|instance: Instance| -> BoxFuture<'static, LifecycleResult<()>> {
            Box::pin(async move { typed::<T>(&instance)?.on_module_init().await })
        });
        self.provider.hooks.init = Some(hook);
        self
    }

    pub fn on_application_bootstrap(mut self) -> Self
    where
        T: OnApplicationBootstrap,
    {
        let hook: HookFn = Arc::new(|instance: Instance| -> BoxFuture<'static, LifecycleResult<()>> {
            Box::pin(async move { typed::<T>(&instance)?.on_application_bootstrap().await })
        });
        self.provider.hooks.bootstrap = Some(hook);
        self
    }

    pub fn on_application_shutdown(mut self) -> Self
    where
        T: OnApplicationShutdown,
    {
        let hook: HookFn = Arc::new(|instance: Instance| -> BoxFuture<'static, LifecycleResult<()>> {
            Box::pin(async move { typed::<T>(&instance)?.on_application_shutdown().await })
        });
        self.provider.hooks.shutdown = Some(hook);
        self
    }

    pub fn on_module_destroy(mut self) -> Self
    where
        T: OnModuleDestroy,
    {
        let hook: HookFn = Arc::new(|instance: Instance| -> BoxFuture<'static, LifecycleResult<()>> {
            Box::pin(async move { typed::<T>(&instance)?.on_module_destroy().await })
        });
        self.provider.hooks.destroy = Some(hook);
        self
    }
}

impl<T> From<TypedProvider<T>> for Provider {
    fn from(typed: TypedProvider<T>) -> Self {
        typed.provider
    }
}

fn typed<T: Send + Sync + 'static>(instance: &Instance) -> LifecycleResult<Arc<T>> {
    downcast::<T>(instance).ok_or_else(|| {
        LifecycleError::hook_failed(
            std::any::type_name::<T>(),
            "instance has an unexpected type",
        )
    })
}
