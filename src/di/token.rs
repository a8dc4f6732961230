use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A type-erased singleton.
///
/// The erased value is always an `Arc<T>` so that trait objects
/// (`Arc<dyn Trait>`) and concrete types share one storage shape.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wrap a shared value into an [`Instance`].
pub fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

/// Recover the typed `Arc<T>` stored in an [`Instance`].
pub fn downcast<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

/// The identity a provider is registered and resolved under.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A type reference, including trait objects such as `dyn Repository`.
    Type { id: TypeId, name: &'static str },
    /// A symbolic key, e.g. `"DATABASE_URL"`.
    Named(Cow<'static, str>),
}

impl Token {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn named(key: impl Into<Cow<'static, str>>) -> Self {
        Token::Named(key.into())
    }

    /// Human readable name with module paths stripped.
    pub fn name(&self) -> String {
        match self {
            Token::Type { name, .. } => short_type_name(name),
            Token::Named(key) => key.to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type { name, .. } => write!(f, "Token::Type({name})"),
            Token::Named(key) => write!(f, "Token::Named({key:?})"),
        }
    }
}

/// `alloc::sync::Arc<my_app::users::UserService>` becomes `Arc<UserService>`.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut path = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            path.push(ch);
        } else {
            out.push_str(path.rsplit("::").next().unwrap_or_default());
            path.clear();
            out.push(ch);
        }
    }
    out.push_str(path.rsplit("::").next().unwrap_or_default());
    out
}
