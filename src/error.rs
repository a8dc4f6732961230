use crate::lifecycle::LifecycleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrellisError>;

/// Errors raised while declaring, resolving or booting an application.
///
/// Every variant is fatal: bootstrap stops and no application handle is
/// returned.
#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("Cannot resolve '{token}' required by '{requested_by}': no module provides it")]
    ProviderNotFound { token: String, requested_by: String },

    #[error(
        "Provider '{token}' required by '{requested_by}' is not visible in module '{module}' (it is owned by '{owner}'; export it from '{owner}' and import that module)"
    )]
    VisibilityViolation {
        token: String,
        requested_by: String,
        module: String,
        owner: String,
    },

    #[error("Circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    #[error("Provider '{token}' is declared by both '{first}' and '{second}'; declare it once and export it")]
    ConflictingProvider {
        token: String,
        first: String,
        second: String,
    },

    #[error("Module cycle detected: {description}")]
    ModuleCycle { description: String },

    #[error("Module '{module}' cannot export '{export}': {reason}")]
    InvalidExport {
        module: String,
        export: String,
        reason: String,
    },

    #[error("Duplicate route: {method} {path} is declared by both '{first}' and '{second}'")]
    DuplicateRoute {
        method: String,
        path: String,
        first: String,
        second: String,
    },

    #[error("Controller '{controller}' declares handler '{handler}' more than once")]
    DuplicateHandler { controller: String, handler: String },

    #[error("Invalid route path '{path}': {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("Metadata registry is frozen; cannot declare {kind} on '{target}'")]
    RegistryFrozen { kind: String, target: String },

    #[error("Failed to downcast instance of '{token}' to '{type_name}'")]
    DowncastFailed { token: String, type_name: String },

    #[error("Factory for '{token}' failed: {message}")]
    FactoryFailed { token: String, message: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
