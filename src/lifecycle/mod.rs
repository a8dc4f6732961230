//! Lifecycle Hooks Module
//!
//! Providers opt into lifecycle events when they are registered, and the
//! [`LifecycleManager`] runs the hooks in provider instantiation order.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Module graph resolution
//!    ↓
//! 2. Provider instantiation (dependency order)
//!    ↓
//! 3. Route table construction
//!    ↓
//! 4. OnModuleInit (each provider)      ← Lifecycle Hook
//!    ↓
//! 5. OnApplicationBootstrap            ← Lifecycle Hook
//!    ↓
//! 6. Server Start
//!    ↓
//! [Running...]
//!    ↓
//! 7. Shutdown Signal (SIGTERM/SIGINT)
//!    ↓
//! 8. OnApplicationShutdown             ← Lifecycle Hook
//!    ↓
//! 9. OnModuleDestroy (reverse order)   ← Lifecycle Hook
//! ```
//!
//! # Example
//!
//! ```
//! use trellis::prelude::*;
//!
//! #[derive(Injectable)]
//! pub struct DatabaseService;
//!
//! #[async_trait]
//! impl OnModuleInit for DatabaseService {
//!     async fn on_module_init(&self) -> Result<(), LifecycleError> {
//!         tracing::info!("Initializing database connection");
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl OnModuleDestroy for DatabaseService {
//!     async fn on_module_destroy(&self) -> Result<(), LifecycleError> {
//!         tracing::info!("Closing database connections");
//!         Ok(())
//!     }
//! }
//!
//! pub struct DatabaseModule;
//!
//! impl Module for DatabaseModule {
//!     fn declare(module: &mut ModuleDeclaration) {
//!         module.provider(
//!             Provider::class::<DatabaseService>()
//!                 .on_module_init()
//!                 .on_module_destroy(),
//!         );
//!     }
//! }
//! ```

mod application;
mod error;
mod manager;
mod shutdown;
mod traits;

pub use application::{Application, TrellisFactory};
pub use error::{LifecycleError, Result};
pub use manager::LifecycleManager;
pub(crate) use manager::{HookFn, HookTarget, ProviderHooks};
pub use shutdown::shutdown_signal;
pub use traits::{OnApplicationBootstrap, OnApplicationShutdown, OnModuleDestroy, OnModuleInit};
