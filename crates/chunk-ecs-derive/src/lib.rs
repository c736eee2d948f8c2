//! Derive macros for Chunk ECS components.
//!
//! `#[derive(Component)]` implements `chunk_ecs::Component` and rejects field
//! types that cannot live in chunk memory.
//!
//! # Storage Category
//!
//! Selected with the `component` attribute; plain data is the default:
//!
//! ```ignore
//! #[derive(Component, Clone, Copy, Zeroable)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component, Clone, Copy, Zeroable)]
//! #[component(tag)]
//! struct Frozen;
//!
//! #[derive(Component, Clone, Copy, Zeroable, Pod)]
//! #[repr(C)]
//! #[component(buffer(capacity = 8))]
//! struct Waypoint(i32);
//!
//! #[derive(Component, Clone, Copy, Zeroable)]
//! #[component(chunk)]
//! struct Bounds { min: [f32; 3], max: [f32; 3] }
//! ```
//!
//! | Attribute                     | Category                 |
//! |-------------------------------|--------------------------|
//! | *(none)*                      | plain data               |
//! | `tag`                         | zero-sized tag           |
//! | `buffer`, `buffer(capacity=N)`| per-entity buffer        |
//! | `chunk`                       | one value per chunk      |
//! | `shared`                      | shared data (membership) |
//!
//! Flags combine with any category: `system_state` (survives destruction
//! until removed explicitly) and `no_clone` (dropped by `instantiate`).
//!
//! # Forbidden Types
//!
//! Chunks are moved and zeroed bytewise, so nothing that owns heap memory or
//! borrows may appear in a component:
//!
//! - `Vec<T>` / `VecDeque<T>` - Use a buffer component
//! - `String` / `Box<T>` / `Rc<T>` / `Arc<T>` - Use fixed arrays or entity references
//! - `HashMap` / `HashSet` / `BTreeMap` / `BTreeSet` - Use buffer components or tags
//! - `Mutex<T>` / `RwLock<T>` / `Cell<T>` / `RefCell<T>` - Access goes through the world
//! - References, raw pointers, trait objects

use proc_macro::TokenStream;
use quote::{quote, quote_spanned};
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, LitInt, Path, PathArguments, Type,
    spanned::Spanned,
};

/// Forbidden type patterns that cannot be stored in chunk memory.
/// Each entry is (type_name, error_message).
const FORBIDDEN_TYPES: &[(&str, &str)] = &[
    (
        "Vec",
        "Vec<T> is not allowed in components. Use a buffer component instead:\n\
         - #[derive(Component)] #[component(buffer)] struct Item(...);\n\
         - Access it with world.get_buffer::<Item>(entity)",
    ),
    (
        "VecDeque",
        "VecDeque<T> is not allowed in components. Use a buffer component instead:\n\
         - Buffers support insert, remove_at and remove_range",
    ),
    (
        "HashMap",
        "HashMap<K, V> is not allowed in components. Alternatives:\n\
         - Store (key, value) pairs in a buffer component\n\
         - Or keep the map outside the world, keyed by Entity",
    ),
    (
        "HashSet",
        "HashSet<T> is not allowed in components. Use tag components or a buffer component instead.",
    ),
    (
        "BTreeMap",
        "BTreeMap<K, V> is not allowed in components. Store sorted pairs in a buffer component instead.",
    ),
    (
        "BTreeSet",
        "BTreeSet<T> is not allowed in components. Store sorted values in a buffer component instead.",
    ),
    (
        "String",
        "String is not allowed in components. Alternatives:\n\
         - Use fixed-size arrays: [u8; 32] or a wrapper struct\n\
         - Use interned/hashed strings: StringId(u64)\n\
         - Use a buffer component of u8",
    ),
    (
        "Box",
        "Box<T> is not allowed in components. Use flat data instead.\n\
         - If T is large, consider splitting it into several components",
    ),
    (
        "Rc",
        "Rc<T> is not allowed in components. Chunks copy components bytewise.\n\
         - Store shared data on a separate entity and reference it by Entity",
    ),
    (
        "Arc",
        "Arc<T> is not allowed in components. Chunks copy components bytewise.\n\
         - Store shared data on a separate entity and reference it by Entity",
    ),
    (
        "Mutex",
        "Mutex<T> is not allowed in components. Access is synchronized by the world's leases.",
    ),
    (
        "RwLock",
        "RwLock<T> is not allowed in components. Access is synchronized by the world's leases.",
    ),
    (
        "RefCell",
        "RefCell<T> is not allowed in components. Use world.get_component and world.set_component.",
    ),
    (
        "Cell",
        "Cell<T> is not allowed in components. Use world.get_component and world.set_component.",
    ),
    (
        "LinkedList",
        "LinkedList<T> is not allowed in components. Use a buffer component instead.",
    ),
    (
        "BinaryHeap",
        "BinaryHeap<T> is not allowed in components. Use a buffer component instead.",
    ),
];

#[derive(Default)]
struct ComponentAttrs {
    category: Option<&'static str>,
    capacity: Option<usize>,
    system_state: bool,
    no_clone: bool,
}

impl ComponentAttrs {
    fn set_category(&mut self, category: &'static str, span: proc_macro2::Span) -> syn::Result<()> {
        if let Some(existing) = self.category {
            return Err(syn::Error::new(
                span,
                format!("component category already set to `{existing}`"),
            ));
        }
        self.category = Some(category);
        Ok(())
    }
}

/// Parse every `#[component(...)]` attribute.
fn parse_attrs(attrs: &[Attribute]) -> syn::Result<ComponentAttrs> {
    let mut parsed = ComponentAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let span = meta.path.span();
            if meta.path.is_ident("tag") {
                parsed.set_category("tag", span)
            } else if meta.path.is_ident("chunk") {
                parsed.set_category("chunk", span)
            } else if meta.path.is_ident("shared") {
                parsed.set_category("shared", span)
            } else if meta.path.is_ident("buffer") {
                parsed.set_category("buffer", span)?;
                if meta.input.is_empty() || meta.input.peek(syn::Token![,]) {
                    return Ok(());
                }
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("capacity") {
                        let lit: LitInt = inner.value()?.parse()?;
                        parsed.capacity = Some(lit.base10_parse()?);
                        Ok(())
                    } else {
                        Err(inner.error("expected `capacity = N`"))
                    }
                })
            } else if meta.path.is_ident("capacity") {
                Err(meta.error(
                    "`capacity` only applies to buffer components, write `buffer(capacity = N)`",
                ))
            } else if meta.path.is_ident("system_state") {
                parsed.system_state = true;
                Ok(())
            } else if meta.path.is_ident("no_clone") {
                parsed.no_clone = true;
                Ok(())
            } else {
                Err(meta.error(
                    "expected one of `tag`, `buffer`, `chunk`, `shared`, `system_state`, `no_clone`",
                ))
            }
        })?;
    }
    Ok(parsed)
}

/// Derive macro for chunk components.
///
/// Enforces that components contain only flat data and selects the storage
/// category from `#[component(...)]`.
///
/// # Examples
///
/// ```ignore
/// #[derive(Component, Clone, Copy, Zeroable)]
/// struct Position { x: f32, y: f32, z: f32 }
///
/// #[derive(Component, Clone, Copy, Zeroable)]
/// #[component(system_state)]
/// struct NetworkSlot(u32);
/// ```
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let attrs = match parse_attrs(&input.attrs) {
        Ok(attrs) => attrs,
        Err(err) => return err.to_compile_error().into(),
    };

    // Collect all field types and check them
    let mut errors = Vec::new();
    match &input.data {
        Data::Struct(data) => {
            check_fields(&data.fields, &mut errors);
        }
        Data::Enum(data) => {
            for variant in &data.variants {
                check_fields(&variant.fields, &mut errors);
            }
        }
        Data::Union(_) => {
            errors.push(quote_spanned! {
                input.span() =>
                compile_error!("Unions cannot derive Component. Use a struct or enum instead.");
            });
        }
    }

    // If there are errors, return them
    if !errors.is_empty() {
        let error_tokens = errors.into_iter().collect::<proc_macro2::TokenStream>();
        return TokenStream::from(error_tokens);
    }

    let category = match attrs.category {
        Some("tag") => quote!(::chunk_ecs::ComponentCategory::Tag),
        Some("chunk") => quote!(::chunk_ecs::ComponentCategory::ChunkData),
        Some("shared") => quote!(::chunk_ecs::ComponentCategory::SharedData),
        Some("buffer") => quote!(::chunk_ecs::ComponentCategory::Buffer),
        _ => quote!(::chunk_ecs::ComponentCategory::PlainData),
    };

    let mut flags = Vec::new();
    if attrs.system_state {
        flags.push(quote!(::chunk_ecs::TypeFlags::SYSTEM_STATE));
    }
    if attrs.no_clone {
        flags.push(quote!(::chunk_ecs::TypeFlags::NON_CLONEABLE));
    }
    let flags = if flags.is_empty() {
        quote!(::chunk_ecs::TypeFlags::empty())
    } else {
        quote!(::chunk_ecs::TypeFlags::from_bits_truncate(#(#flags.bits())|*))
    };

    let capacity = match attrs.capacity {
        Some(capacity) => quote!(::core::option::Option::Some(#capacity)),
        None => quote!(::core::option::Option::None),
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::chunk_ecs::Component for #name #ty_generics #where_clause {
            const CATEGORY: ::chunk_ecs::ComponentCategory = #category;
            const FLAGS: ::chunk_ecs::TypeFlags = #flags;
            const INLINE_CAPACITY: ::core::option::Option<usize> = #capacity;
        }
    };

    TokenStream::from(expanded)
}

fn check_fields(fields: &Fields, errors: &mut Vec<proc_macro2::TokenStream>) {
    match fields {
        Fields::Named(named) => {
            for field in &named.named {
                check_type(&field.ty, errors);
            }
        }
        Fields::Unnamed(unnamed) => {
            for field in &unnamed.unnamed {
                check_type(&field.ty, errors);
            }
        }
        Fields::Unit => {}
    }
}

fn check_type(ty: &Type, errors: &mut Vec<proc_macro2::TokenStream>) {
    match ty {
        Type::Path(type_path) => {
            check_type_path(&type_path.path, ty.span(), errors);
        }
        Type::Array(array) => {
            check_type(&array.elem, errors);
        }
        Type::Tuple(tuple) => {
            for elem in &tuple.elems {
                check_type(elem, errors);
            }
        }
        Type::Paren(paren) => {
            check_type(&paren.elem, errors);
        }
        Type::Group(group) => {
            check_type(&group.elem, errors);
        }
        Type::Reference(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("References are not allowed in components. Components are stored by value.\n\
                               Use the actual type, or an Entity to refer to another entity's data.");
            });
        }
        Type::Ptr(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Raw pointers are not allowed in components.\n\
                               Use entity references (Entity type) instead.");
            });
        }
        Type::TraitObject(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Trait objects (dyn Trait) are not allowed in components.\n\
                               Use tag components for polymorphism.");
            });
        }
        Type::ImplTrait(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("impl Trait is not allowed in component fields. Use concrete types.");
            });
        }
        // Other types (Never, Infer, etc.) will fail elsewhere
        _ => {}
    }
}

fn check_type_path(
    path: &Path,
    span: proc_macro2::Span,
    errors: &mut Vec<proc_macro2::TokenStream>,
) {
    // Get the last segment (the actual type name)
    if let Some(segment) = path.segments.last() {
        let type_name = segment.ident.to_string();

        for (forbidden, message) in FORBIDDEN_TYPES {
            if type_name == *forbidden {
                errors.push(quote_spanned! {
                    span =>
                    compile_error!(#message);
                });
                return;
            }
        }

        // Check generic arguments recursively
        if let PathArguments::AngleBracketed(args) = &segment.arguments {
            for arg in &args.args {
                if let GenericArgument::Type(inner_ty) = arg {
                    check_type(inner_ty, errors);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    fn errors_for(ty: &Type) -> usize {
        let mut errors = Vec::new();
        check_type(ty, &mut errors);
        errors.len()
    }

    #[test]
    fn test_flat_types_pass() {
        assert_eq!(errors_for(&parse_quote!(u32)), 0);
        assert_eq!(errors_for(&parse_quote!([[f32; 3]; 3])), 0);
        assert_eq!(errors_for(&parse_quote!((i32, Entity))), 0);
    }

    #[test]
    fn test_forbidden_types_fail() {
        assert_eq!(errors_for(&parse_quote!(Vec<u8>)), 1);
        assert_eq!(errors_for(&parse_quote!(std::sync::Arc<u8>)), 1);
        assert_eq!(errors_for(&parse_quote!([String; 2])), 1);
        assert_eq!(errors_for(&parse_quote!((u8, Box<u8>))), 1);
        assert_eq!(errors_for(&parse_quote!(Wrapper<HashMap<u8, u8>>)), 1);
        assert_eq!(errors_for(&parse_quote!(&'static u8)), 1);
        assert_eq!(errors_for(&parse_quote!(*const u8)), 1);
    }

    #[test]
    fn test_parse_attrs() {
        let input: DeriveInput = parse_quote! {
            #[component(buffer(capacity = 8), no_clone)]
            struct Waypoint(i32);
        };
        let attrs = parse_attrs(&input.attrs).unwrap();
        assert_eq!(attrs.category, Some("buffer"));
        assert_eq!(attrs.capacity, Some(8));
        assert!(attrs.no_clone);
        assert!(!attrs.system_state);

        let input: DeriveInput = parse_quote! {
            #[component(buffer)]
            #[component(system_state)]
            struct Sample(u16);
        };
        let attrs = parse_attrs(&input.attrs).unwrap();
        assert_eq!(attrs.category, Some("buffer"));
        assert_eq!(attrs.capacity, None);
        assert!(attrs.system_state);
    }

    #[test]
    fn test_parse_attrs_rejects_conflicts() {
        let input: DeriveInput = parse_quote! {
            #[component(tag, chunk)]
            struct Confused;
        };
        assert!(parse_attrs(&input.attrs).is_err());

        let input: DeriveInput = parse_quote! {
            #[component(opaque)]
            struct Unknown;
        };
        assert!(parse_attrs(&input.attrs).is_err());

        let input: DeriveInput = parse_quote! {
            #[component(capacity = 4)]
            struct Loose(u8);
        };
        let err = parse_attrs(&input.attrs).err().unwrap();
        assert!(err.to_string().contains("buffer(capacity = N)"));
    }
}
