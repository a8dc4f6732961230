//! Lifecycle-specific error types

use thiserror::Error;

/// Errors raised by lifecycle hooks
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A provider could not finish initializing
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A provider could not release its resources
    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),

    /// A startup phase ran past its configured timeout
    #[error("Timeout during {phase}: {message}")]
    Timeout { phase: String, message: String },

    /// A hook returned an error, attributed to its provider
    #[error("Hook execution failed for {service}: {message}")]
    HookFailed { service: String, message: String },
}

impl LifecycleError {
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn shutdown_failed(msg: impl Into<String>) -> Self {
        Self::ShutdownFailed(msg.into())
    }

    pub fn timeout(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            phase: phase.into(),
            message: message.into(),
        }
    }

    pub fn hook_failed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookFailed {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
