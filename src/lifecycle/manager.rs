//! Lifecycle Manager
//!
//! Runs the hooks that providers opted into, in instantiation order.

use super::{LifecycleError, Result};
use crate::BoxFuture;
use crate::di::Instance;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A type-erased lifecycle hook bound to a provider's produced type.
pub(crate) type HookFn = Arc<dyn Fn(Instance) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Hooks a provider opted into when it was registered.
#[derive(Clone, Default)]
pub(crate) struct ProviderHooks {
    pub(crate) init: Option<HookFn>,
    pub(crate) bootstrap: Option<HookFn>,
    pub(crate) shutdown: Option<HookFn>,
    pub(crate) destroy: Option<HookFn>,
}

impl ProviderHooks {
    pub(crate) fn is_empty(&self) -> bool {
        self.init.is_none()
            && self.bootstrap.is_none()
            && self.shutdown.is_none()
            && self.destroy.is_none()
    }
}

/// A resolved singleton together with its hooks.
pub(crate) struct HookTarget {
    pub(crate) name: String,
    pub(crate) instance: Instance,
    pub(crate) hooks: ProviderHooks,
}

#[derive(Clone, Copy)]
enum Phase {
    ModuleInit,
    ApplicationBootstrap,
    ApplicationShutdown,
    ModuleDestroy,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::ModuleInit => "OnModuleInit",
            Phase::ApplicationBootstrap => "OnApplicationBootstrap",
            Phase::ApplicationShutdown => "OnApplicationShutdown",
            Phase::ModuleDestroy => "OnModuleDestroy",
        }
    }

    fn hook(self, hooks: &ProviderHooks) -> Option<&HookFn> {
        match self {
            Phase::ModuleInit => hooks.init.as_ref(),
            Phase::ApplicationBootstrap => hooks.bootstrap.as_ref(),
            Phase::ApplicationShutdown => hooks.shutdown.as_ref(),
            Phase::ModuleDestroy => hooks.destroy.as_ref(),
        }
    }
}

/// Manages lifecycle hooks for all instantiated providers
///
/// Startup hooks run in instantiation order and stop at the first failure.
/// Shutdown hooks log failures and keep going; `OnModuleDestroy` runs in
/// reverse order.
#[derive(Default)]
pub struct LifecycleManager {
    targets: Vec<HookTarget>,
    init_timeout: Option<Duration>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl LifecycleManager {
    pub(crate) fn new(targets: Vec<HookTarget>) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    /// Bound the startup phases; a hook still running after `timeout` fails bootstrap.
    pub(crate) fn with_init_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.init_timeout = timeout;
        self
    }

    async fn run_startup(&self, phase: Phase) -> Result<()> {
        tracing::debug!("Calling {} hooks...", phase.name());

        let mut executed = 0;
        for target in &self.targets {
            let Some(hook) = phase.hook(&target.hooks) else {
                continue;
            };
            tracing::debug!("{}: {}", phase.name(), target.name);
            hook(target.instance.clone()).await.map_err(|e| {
                tracing::error!("{} failed for {}: {}", phase.name(), target.name, e);
                LifecycleError::hook_failed(&target.name, e.to_string())
            })?;
            executed += 1;
        }

        tracing::debug!("{} complete ({} hooks executed)", phase.name(), executed);
        Ok(())
    }

    async fn run_with_timeout(&self, phase: Phase) -> Result<()> {
        match self.init_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.run_startup(phase))
                .await
                .map_err(|_| {
                    LifecycleError::timeout(phase.name(), format!("Timeout after {:?}", timeout))
                })?,
            None => self.run_startup(phase).await,
        }
    }

    async fn run_shutdown<'a>(&'a self, phase: Phase, targets: impl Iterator<Item = &'a HookTarget>) {
        tracing::debug!("Calling {} hooks...", phase.name());

        for target in targets {
            let Some(hook) = phase.hook(&target.hooks) else {
                continue;
            };
            if let Err(e) = hook(target.instance.clone()).await {
                tracing::error!("{} failed for {}: {}", phase.name(), target.name, e);
            }
        }
    }

    /// Execute all OnModuleInit hooks
    pub async fn call_module_init(&self) -> Result<()> {
        self.run_with_timeout(Phase::ModuleInit).await
    }

    /// Execute all OnApplicationBootstrap hooks
    pub async fn call_application_bootstrap(&self) -> Result<()> {
        self.run_with_timeout(Phase::ApplicationBootstrap).await
    }

    /// Execute all OnApplicationShutdown hooks
    pub async fn call_application_shutdown(&self) {
        self.run_shutdown(Phase::ApplicationShutdown, self.targets.iter())
            .await;
    }

    /// Execute all OnModuleDestroy hooks in **reverse** order
    pub async fn call_module_destroy(&self) {
        self.run_shutdown(Phase::ModuleDestroy, self.targets.iter().rev())
            .await;
    }

    /// Init then bootstrap hooks. Only the first call does anything.
    pub async fn startup(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.call_module_init().await?;
        self.call_application_bootstrap().await
    }

    /// Shutdown then destroy hooks. Only the first call does anything.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.call_application_shutdown().await;
        self.call_module_destroy().await;
    }

    /// Number of providers with at least one hook.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
