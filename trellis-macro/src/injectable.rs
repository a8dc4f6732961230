use darling::{FromDeriveInput, FromField, ast};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{DeriveInput, GenericArgument, Generics, Ident, PathArguments, Type, parse_macro_input};

#[derive(FromDeriveInput)]
#[darling(attributes(injectable), supports(struct_named, struct_unit))]
struct InjectableInput {
    ident: Ident,
    generics: Generics,
    data: ast::Data<(), InjectField>,
    #[darling(default)]
    transient: bool,
}

#[derive(FromField)]
#[darling(attributes(inject))]
struct InjectField {
    ident: Option<Ident>,
    ty: Type,
    #[darling(default)]
    token: Option<String>,
    #[darling(default)]
    default: bool,
}

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match InjectableInput::from_derive_input(&input) {
        Ok(parsed) => generate_injectable_impl(&parsed).into(),
        Err(err) => err.write_errors().into(),
    }
}

fn generate_injectable_impl(input: &InjectableInput) -> TokenStream2 {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        ast::Data::Struct(fields) => fields,
        ast::Data::Enum(_) => unreachable!("darling rejects enums"),
    };

    let mut dependencies = Vec::new();
    let mut initializers = Vec::new();
    for field in fields.iter() {
        let Some(name) = &field.ident else {
            continue;
        };

        if field.default {
            initializers.push(quote! { #name: ::core::default::Default::default() });
            continue;
        }

        let Some(inner) = arc_inner(&field.ty) else {
            return quote_spanned! { field.ty.span() =>
                compile_error!("#[derive(Injectable)] fields must be `Arc<T>` or marked `#[inject(default)]`");
            };
        };

        dependencies.push(match &field.token {
            Some(key) => quote! { ::trellis::Token::named(#key) },
            None => quote! { ::trellis::Token::of::<#inner>() },
        });
        initializers.push(quote! { #name: deps.next::<#inner>()? });
    }

    let construct = if fields.is_unit() {
        quote! { Self }
    } else {
        quote! { Self { #(#initializers),* } }
    };

    let lifetime = input.transient.then(|| {
        quote! {
            fn lifetime() -> ::trellis::Lifetime {
                ::trellis::Lifetime::Transient
            }
        }
    });

    quote! {
        impl #impl_generics ::trellis::Injectable for #struct_name #ty_generics #where_clause {
            fn dependencies() -> ::std::vec::Vec<::trellis::Token> {
                ::std::vec![#(#dependencies),*]
            }

            #[allow(unused_variables)]
            fn inject(deps: &mut ::trellis::Dependencies) -> ::trellis::Result<Self> {
                ::core::result::Result::Ok(#construct)
            }

            #lifetime
        }
    }
}

/// The `T` of an `Arc<T>` field, including `Arc<dyn Trait>`.
fn arc_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Arc" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
