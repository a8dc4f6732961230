//! Bindings for guards, pipes, interceptors and exception filters.
//!
//! An enhancer is bound either as a ready instance or as an injectable class
//! that is built through the container, in the scope of the module that
//! declares the controller using it.

use crate::di::{Container, Injectable, Token};
use crate::error::Result;
use crate::module::ModuleId;
use std::sync::Arc;

type ResolveFn<T> = Arc<dyn Fn(&Container, &ModuleId) -> Result<Arc<T>> + Send + Sync>;

pub enum Binding<T: ?Sized> {
    Instance { name: String, instance: Arc<T> },
    Injected { class: Token, resolve: ResolveFn<T> },
}

impl<T: ?Sized> Clone for Binding<T> {
    fn clone(&self) -> Self {
        match self {
            Binding::Instance { name, instance } => Binding::Instance {
                name: name.clone(),
                instance: Arc::clone(instance),
            },
            Binding::Injected { class, resolve } => Binding::Injected {
                class: class.clone(),
                resolve: Arc::clone(resolve),
            },
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Binding<T> {
    pub fn instance(name: impl Into<String>, instance: Arc<T>) -> Self {
        Binding::Instance {
            name: name.into(),
            instance,
        }
    }

    /// Bind class `E`, seen as `T` through `cast`.
    pub fn injected<E: Injectable>(cast: fn(Arc<E>) -> Arc<T>) -> Self {
        Binding::Injected {
            class: Token::of::<E>(),
            resolve: Arc::new(move |container: &Container, module: &ModuleId| {
                container.instantiate_enhancer::<E>(module).map(cast)
            }),
        }
    }

    /// Produce the enhancer, building injected classes in `module`'s scope.
    pub fn materialize(&self, container: &Container, module: &ModuleId) -> Result<Arc<T>> {
        match self {
            Binding::Instance { instance, .. } => Ok(Arc::clone(instance)),
            Binding::Injected { resolve, .. } => resolve(container, module),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Binding::Instance { name, .. } => name.clone(),
            Binding::Injected { class, .. } => class.to_string(),
        }
    }
}
