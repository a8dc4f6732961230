use crate::di::token::{Instance, Token, downcast};
use crate::di::Lifetime;
use crate::error::{Result, TrellisError};
use std::collections::VecDeque;
use std::sync::Arc;

/// Trait for types that can be constructed by the DI container
///
/// This trait is typically implemented automatically via the `#[derive(Injectable)]` macro,
/// which lists every `Arc<T>` field as a dependency in declaration order.
///
/// # Example
/// ```
/// use trellis::{Dependencies, Injectable, Token};
/// use std::sync::Arc;
///
/// pub struct Logger;
/// impl Injectable for Logger {
///     fn inject(_deps: &mut Dependencies) -> trellis::Result<Self> {
///         Ok(Logger)
///     }
/// }
///
/// pub struct UserService {
///     logger: Arc<Logger>,
/// }
///
/// impl Injectable for UserService {
///     fn dependencies() -> Vec<Token> {
///         vec![Token::of::<Logger>()]
///     }
///
///     fn inject(deps: &mut Dependencies) -> trellis::Result<Self> {
///         Ok(Self { logger: deps.next()? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Constructor dependencies, in the order `inject` consumes them.
    fn dependencies() -> Vec<Token> {
        Vec::new()
    }

    /// Build an instance from the already-resolved dependencies.
    ///
    /// # Errors
    /// Returns an error if a dependency has an unexpected type.
    fn inject(deps: &mut Dependencies) -> Result<Self>;

    fn lifetime() -> Lifetime {
        Lifetime::Singleton
    }
}

/// The resolved constructor arguments of one component, consumed in order.
pub struct Dependencies {
    owner: Token,
    values: VecDeque<(Token, Instance)>,
}

impl Dependencies {
    pub(crate) fn new(owner: Token, values: Vec<(Token, Instance)>) -> Self {
        Self {
            owner,
            values: values.into(),
        }
    }

    /// Take the next dependency.
    pub fn next<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let (token, instance) = self.values.pop_front().ok_or_else(|| {
            TrellisError::Internal(format!(
                "'{}' consumed more dependencies than it declared",
                self.owner
            ))
        })?;
        downcast::<T>(&instance).ok_or_else(|| TrellisError::DowncastFailed {
            token: token.to_string(),
            type_name: std::any::type_name::<T>().to_string(),
        })
    }

    /// The component these dependencies are being resolved for.
    pub fn owner(&self) -> &Token {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
