use proc_macro::TokenStream;

mod injectable;

/// Derive macro for making a struct injectable into the DI container
///
/// Every `Arc<T>` field becomes a constructor dependency on `T`, in field
/// order. Other fields must be marked `#[inject(default)]`.
///
/// # Attributes
/// - `#[inject(token = "KEY")]` on a field: depend on a named token instead of the field's type.
/// - `#[inject(default)]` on a field: fill it with `Default::default()`.
/// - `#[injectable(transient)]` on the struct: build a fresh instance for every injection.
///
/// # Example
/// ```ignore
/// use trellis::prelude::*;
///
/// #[derive(Injectable)]
/// pub struct UserService {
///     repository: Arc<dyn UserRepository>,
///     #[inject(token = "DATABASE_URL")]
///     url: Arc<String>,
///     #[inject(default)]
///     hits: std::sync::atomic::AtomicUsize,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject, injectable))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}
