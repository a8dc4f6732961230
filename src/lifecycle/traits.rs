//! Lifecycle hook traits
//!
//! A provider implements the traits it cares about and opts in when it is
//! registered, e.g. `Provider::class::<Cache>().on_module_init()`.
//! Singletons are shared behind `Arc`, so hooks take `&self`; use interior
//! mutability for state that a hook fills in.

use super::LifecycleError;
use async_trait::async_trait;

/// Called once every singleton in the application has been instantiated.
///
/// # Example
///
/// ```rust,ignore
/// use trellis::lifecycle::{OnModuleInit, LifecycleError};
/// use async_trait::async_trait;
///
/// #[async_trait]
/// impl OnModuleInit for DatabaseService {
///     async fn on_module_init(&self) -> Result<(), LifecycleError> {
///         let pool = create_pool(&self.config).await
///             .map_err(|e| LifecycleError::init_failed(e.to_string()))?;
///         self.pool.set(pool).ok();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait OnModuleInit: Send + Sync {
    async fn on_module_init(&self) -> Result<(), LifecycleError>;
}

/// Called after every `OnModuleInit` hook has completed, before the server accepts requests.
#[async_trait]
pub trait OnApplicationBootstrap: Send + Sync {
    async fn on_application_bootstrap(&self) -> Result<(), LifecycleError>;
}

/// Called when the application begins shutting down.
///
/// Failures are logged and do not stop the remaining hooks.
#[async_trait]
pub trait OnApplicationShutdown: Send + Sync {
    async fn on_application_shutdown(&self) -> Result<(), LifecycleError>;
}

/// Called last during shutdown.
///
/// Providers are destroyed in **reverse** instantiation order, so a provider
/// is destroyed before the providers it depends on.
#[async_trait]
pub trait OnModuleDestroy: Send + Sync {
    async fn on_module_destroy(&self) -> Result<(), LifecycleError>;
}
