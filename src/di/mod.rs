//! Dependency injection
//!
//! Providers are registered under [`Token`]s, resolved in the scope of the
//! module that declares them, and cached as type-erased [`Instance`]s.

mod container;
mod injectable;
mod provider;
mod token;

pub use container::Container;
pub use injectable::{Dependencies, Injectable};
pub use provider::{Lifetime, Provider, TypedProvider};
pub use token::{Instance, Token, downcast, erase};

pub(crate) use provider::ProviderKind;
pub(crate) use token::short_type_name;
