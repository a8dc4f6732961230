//! Declared facts about classes and handler methods.
//!
//! Controllers, modules and enhancer bindings write their facts here while
//! the module graph is resolved. The registry is frozen before the route
//! table is built; any later declaration is an error.

use crate::controller::{HandlerDefinition, ParamSpec};
use crate::di::{Lifetime, Token, short_type_name};
use crate::enhancer::Binding;
use crate::error::{Result, TrellisError};
use crate::exception::FilterBinding;
use crate::guard::Guard;
use crate::interceptor::Interceptor;
use crate::pipe::Pipe;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use strum_macros::{AsRefStr, Display};

/// Category of a declared fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum MetadataKind {
    Injectable,
    Controller,
    HandlerMethod,
    Route,
    Param,
    Guard,
    Pipe,
    Interceptor,
    Filter,
    HttpCode,
    Header,
    Custom,
}

impl MetadataKind {
    /// Single-valued kinds are overwritten by a later declaration; the others accumulate.
    pub fn is_single_value(self) -> bool {
        matches!(
            self,
            MetadataKind::Injectable
                | MetadataKind::Controller
                | MetadataKind::Route
                | MetadataKind::HttpCode
        )
    }
}

/// Identity of a class: a provider, controller or enhancer type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    type_id: TypeId,
    name: &'static str,
}

impl ClassId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The class behind a type token; named tokens have none.
    pub fn from_token(token: &Token) -> Option<Self> {
        match token {
            Token::Type { id, name } => Some(Self {
                type_id: *id,
                name: *name,
            }),
            Token::Named(_) => None,
        }
    }

    pub fn token(&self) -> Token {
        Token::Type {
            id: self.type_id,
            name: self.name,
        }
    }

    pub fn name(&self) -> String {
        short_type_name(self.name)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.name())
    }
}

/// What a fact is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Class(ClassId),
    Method(ClassId, Cow<'static, str>),
}

impl Target {
    pub fn method(class: ClassId, name: impl Into<Cow<'static, str>>) -> Self {
        Target::Method(class, name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Class(class) => write!(f, "{class}"),
            Target::Method(class, method) => write!(f, "{class}.{method}"),
        }
    }
}

/// Constructor facts recorded for class providers.
#[derive(Debug, Clone)]
pub struct ComponentDeclaration {
    pub lifetime: Lifetime,
    pub dependencies: Vec<Token>,
}

/// A single declared fact.
#[derive(Clone)]
pub enum Metadata {
    Injectable(ComponentDeclaration),
    /// Route prefix of a controller class.
    Controller { path: String },
    HandlerMethod(HandlerDefinition),
    Route { method: Method, path: String },
    Param(ParamSpec),
    Guard(Binding<dyn Guard>),
    Pipe(Binding<dyn Pipe>),
    Interceptor(Binding<dyn Interceptor>),
    Filter(FilterBinding),
    HttpCode(StatusCode),
    Header(HeaderName, HeaderValue),
    Custom { key: String, value: Value },
}

impl Metadata {
    pub fn kind(&self) -> MetadataKind {
        match self {
            Metadata::Injectable(_) => MetadataKind::Injectable,
            Metadata::Controller { .. } => MetadataKind::Controller,
            Metadata::HandlerMethod(_) => MetadataKind::HandlerMethod,
            Metadata::Route { .. } => MetadataKind::Route,
            Metadata::Param(_) => MetadataKind::Param,
            Metadata::Guard(_) => MetadataKind::Guard,
            Metadata::Pipe(_) => MetadataKind::Pipe,
            Metadata::Interceptor(_) => MetadataKind::Interceptor,
            Metadata::Filter(_) => MetadataKind::Filter,
            Metadata::HttpCode(_) => MetadataKind::HttpCode,
            Metadata::Header(..) => MetadataKind::Header,
            Metadata::Custom { .. } => MetadataKind::Custom,
        }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metadata::Injectable(component) => f.debug_tuple("Injectable").field(component).finish(),
            Metadata::Controller { path } => f.debug_struct("Controller").field("path", path).finish(),
            Metadata::HandlerMethod(handler) => {
                f.debug_tuple("HandlerMethod").field(&handler.name).finish()
            }
            Metadata::Route { method, path } => f
                .debug_struct("Route")
                .field("method", method)
                .field("path", path)
                .finish(),
            Metadata::Param(spec) => f.debug_tuple("Param").field(spec).finish(),
            Metadata::Guard(binding) => f.debug_tuple("Guard").field(&binding.name()).finish(),
            Metadata::Pipe(binding) => f.debug_tuple("Pipe").field(&binding.name()).finish(),
            Metadata::Interceptor(binding) => {
                f.debug_tuple("Interceptor").field(&binding.name()).finish()
            }
            Metadata::Filter(binding) => f.debug_tuple("Filter").field(&binding.name()).finish(),
            Metadata::HttpCode(status) => f.debug_tuple("HttpCode").field(status).finish(),
            Metadata::Header(name, value) => {
                f.debug_tuple("Header").field(name).field(value).finish()
            }
            Metadata::Custom { key, value } => f
                .debug_struct("Custom")
                .field("key", key)
                .field("value", value)
                .finish(),
        }
    }
}

/// Facts keyed by target and kind.
///
/// Multi-valued kinds keep declaration order.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: HashMap<Target, HashMap<MetadataKind, Vec<Metadata>>>,
    frozen: bool,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fact.
    ///
    /// # Errors
    /// Returns [`TrellisError::RegistryFrozen`] once the registry has been frozen.
    pub fn declare(&mut self, target: Target, metadata: Metadata) -> Result<()> {
        let kind = metadata.kind();
        if self.frozen {
            return Err(TrellisError::RegistryFrozen {
                kind: kind.to_string(),
                target: target.to_string(),
            });
        }
        let values = self.entries.entry(target).or_default().entry(kind).or_default();
        if kind.is_single_value() {
            values.clear();
        }
        values.push(metadata);
        Ok(())
    }

    /// Every fact of `kind` on `target`, in declaration order.
    pub fn lookup(&self, target: &Target, kind: MetadataKind) -> &[Metadata] {
        self.entries
            .get(target)
            .and_then(|kinds| kinds.get(&kind))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The most recently declared fact of `kind` on `target`.
    pub fn lookup_one(&self, target: &Target, kind: MetadataKind) -> Option<&Metadata> {
        self.lookup(target, kind).last()
    }

    /// A custom value by key; the latest declaration wins.
    pub fn custom(&self, target: &Target, key: &str) -> Option<&Value> {
        self.lookup(target, MetadataKind::Custom)
            .iter()
            .rev()
            .find_map(|metadata| match metadata {
                Metadata::Custom { key: k, value } if k == key => Some(value),
                _ => None,
            })
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
