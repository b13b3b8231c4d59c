//! Procedural macros for relmap.
//!
//! `relmap-macros` is the **compile-time marker layer**. It turns
//! `#[relmap(...)]` attributes on Rust structs into the `MemberDef` lists the
//! type descriptor is built from.
//!
//! # Role In The Architecture
//!
//! - **Entities**: `#[derive(Entity)]` implements `Entity` with a table name
//!   and one `MemberDef` per mapped field.
//! - **Superclasses**: `#[derive(MappedSuperclass)]` marks a struct whose
//!   members are inherited by every entity embedding it.
//! - **Enums**: `#[derive(SqlEnum)]` lists variant names for ordinal or name
//!   storage.
//!
//! The generated code refers to `relmap_core`; the `relmap` facade
//! re-exports the derives.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;

mod infer;
mod parse;
mod validate;

use parse::{EntityDef, EnumModeAttr, FieldDef, parse_entity, parse_sql_enum};

/// Derive macro for the `Entity` trait.
///
/// # Attributes
///
/// - `#[relmap(table = "name")]` - Table name; wrap in double quotes to delimit it
///   (defaults to the struct name)
/// - `#[relmap(key)]` - Mark field as (part of) the key
/// - `#[relmap(generated)]` - Key assigned by the store on insert (implies `key`)
/// - `#[relmap(column = "name")]` - Override column name; double quotes delimit it
/// - `#[relmap(qualifier = "alias")]` - Qualify the column with this alias in SELECT text
/// - `#[relmap(insertable = false)]` / `#[relmap(updatable = false)]` - Leave out of
///   INSERT / UPDATE
/// - `#[relmap(transient)]` - Mapped but never read or written
/// - `#[relmap(skip)]` - Not mapped at all
/// - `#[relmap(enumerated = "ordinal" | "name")]` - Store a `SqlEnum` field
/// - `#[relmap(converter = "Type")]` - Use a `Converter` built with `Default`
/// - `#[relmap(converter_fn = "path")]` - Use a converter factory function
/// - `#[relmap(getter = "path", setter = "path")]` - Access through methods
/// - `#[relmap(self_ref)]` - Self-reference (inferred for `SelfRef<T>` fields)
/// - `#[relmap(superclass)]` - Inherit the members of an embedded `MappedSuperclass`
///
/// # Example
///
/// ```ignore
/// use relmap::prelude::*;
///
/// #[derive(Entity, Default)]
/// #[relmap(table = "heroes")]
/// struct Hero {
///     #[relmap(key, generated)]
///     id: Option<i64>,
///
///     #[relmap(column = "\"Name\"")]
///     name: String,
///
///     #[relmap(enumerated = "name")]
///     rank: Rank,
///
///     #[relmap(column = "mentor_id")]
///     mentor: SelfRef<Hero>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(relmap))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let def = match parse_entity(&input, "Entity", true) {
        Ok(d) => d,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_entity(&def) {
        return e.to_compile_error().into();
    }

    generate_entity_impl(&def).into()
}

/// Derive macro for the `MappedSuperclass` trait.
///
/// Takes the same field attributes as `Entity` but no struct attributes.
#[proc_macro_derive(MappedSuperclass, attributes(relmap))]
pub fn derive_mapped_superclass(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let def = match parse_entity(&input, "MappedSuperclass", false) {
        Ok(d) => d,
        Err(e) => return e.to_compile_error().into(),
    };

    if let Err(e) = validate::validate_entity(&def) {
        return e.to_compile_error().into();
    }

    generate_superclass_impl(&def).into()
}

/// Derive macro for the `SqlEnum` trait.
///
/// Each unit variant is stored under its own name unless renamed with
/// `#[relmap(rename = "NAME")]`. Ordinals follow declaration order.
#[proc_macro_derive(SqlEnum, attributes(relmap))]
pub fn derive_sql_enum(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let variants = match parse_sql_enum(&input) {
        Ok(v) => v,
        Err(e) => return e.to_compile_error().into(),
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let idents: Vec<_> = variants.iter().map(|v| &v.ident).collect();
    let names: Vec<_> = variants.iter().map(|v| v.name.as_str()).collect();

    quote! {
        impl #impl_generics ::relmap_core::SqlEnum for #name #ty_generics #where_clause {
            const VARIANTS: &'static [&'static str] = &[#(#names),*];

            fn variant_name(&self) -> &'static str {
                match self {
                    #(Self::#idents => #names,)*
                }
            }

            fn from_variant_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#names => ::core::option::Option::Some(Self::#idents),)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    }
    .into()
}

fn generate_entity_impl(def: &EntityDef) -> TokenStream2 {
    let name = &def.name;
    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = def.generics.split_for_impl();
    let table = match &def.table {
        Some(table) => quote! { ::core::option::Option::Some(#table) },
        None => quote! { ::core::option::Option::None },
    };
    let members = generate_members_body(def);

    quote! {
        impl #impl_generics ::relmap_core::Entity for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
            const TABLE: ::core::option::Option<&'static str> = #table;

            fn members() -> ::std::vec::Vec<::relmap_core::MemberDef<Self>> {
                #members
            }
        }
    }
}

fn generate_superclass_impl(def: &EntityDef) -> TokenStream2 {
    let name = &def.name;
    let (impl_generics, ty_generics, where_clause) = def.generics.split_for_impl();
    let members = generate_members_body(def);

    quote! {
        impl #impl_generics ::relmap_core::MappedSuperclass for #name #ty_generics #where_clause {
            fn members() -> ::std::vec::Vec<::relmap_core::MemberDef<Self>> {
                #members
            }
        }
    }
}

/// Superclass members first, then the struct's own fields in declared order.
fn generate_members_body(def: &EntityDef) -> TokenStream2 {
    let inherited = def.superclass_fields().map(|field| {
        let ident = &field.name;
        let ty = &field.ty;
        quote! {
            members.extend(
                <#ty as ::relmap_core::MappedSuperclass>::members()
                    .into_iter()
                    .map(|member| member.lift(|e: &Self| &e.#ident, |e: &mut Self| &mut e.#ident)),
            );
        }
    });
    let own = def.member_fields().map(generate_member);

    quote! {
        let mut members = ::std::vec::Vec::new();
        #(#inherited)*
        #(members.push(#own);)*
        members
    }
}

/// How a field's value crosses into and out of `Value`.
enum Shape<'a> {
    Plain,
    Enum { inner: &'a syn::Type, optional: bool },
}

impl Shape<'_> {
    /// Expression turning `source` (a `&T`) into a `Value`.
    fn to_value(&self, source: &TokenStream2) -> TokenStream2 {
        match self {
            Shape::Plain => quote! {
                ::relmap_core::Value::from(::core::clone::Clone::clone(#source))
            },
            Shape::Enum { optional: false, .. } => quote! {
                ::relmap_core::enum_to_value(#source)
            },
            Shape::Enum { optional: true, .. } => quote! {
                match #source {
                    ::core::option::Option::Some(variant) => ::relmap_core::enum_to_value(variant),
                    ::core::option::Option::None => ::relmap_core::Value::Null,
                }
            },
        }
    }

    /// Expression turning the setter's `v` into the field type, propagating errors.
    fn from_value(&self) -> TokenStream2 {
        match self {
            Shape::Plain => quote! { ::relmap_core::FromValue::from_value(&v)? },
            Shape::Enum {
                inner,
                optional: false,
            } => quote! { ::relmap_core::enum_from_value::<#inner>(&v)? },
            Shape::Enum {
                inner,
                optional: true,
            } => quote! {
                if v.is_null() {
                    ::core::option::Option::None
                } else {
                    ::core::option::Option::Some(::relmap_core::enum_from_value::<#inner>(&v)?)
                }
            },
        }
    }
}

fn generate_member(field: &FieldDef) -> TokenStream2 {
    let ident = &field.name;
    let member_name = ident.to_string();
    let ty = &field.ty;

    let (member_type, get, set) = if field.self_ref {
        (
            quote! { ::relmap_core::MemberType::SelfRef },
            quote! { |e: &Self| ::relmap_core::RefField::column_value(&e.#ident) },
            quote! {
                |e: &mut Self, v: ::relmap_core::Value| {
                    ::relmap_core::RefField::assign_key(&mut e.#ident, v);
                    ::core::result::Result::Ok(())
                }
            },
        )
    } else {
        let shape = match field.enumerated {
            Some(_) => Shape::Enum {
                inner: infer::unwrap_option_type(ty),
                optional: field.nullable,
            },
            None => Shape::Plain,
        };
        let to_value = shape.to_value(&quote! { &e.#ident });
        let from_value = shape.from_value();
        (
            infer::infer_member_type(ty),
            quote! { |e: &Self| #to_value },
            quote! {
                |e: &mut Self, v: ::relmap_core::Value| {
                    e.#ident = #from_value;
                    ::core::result::Result::Ok(())
                }
            },
        )
    };

    let mut chain = quote! {
        ::relmap_core::MemberDef::new(#member_name, #member_type, #get, #set)
    };

    if let Some(column) = &field.column {
        chain = quote! { #chain.column(#column) };
    }
    if let Some(qualifier) = &field.qualifier {
        chain = quote! { #chain.qualifier(#qualifier) };
    }
    if field.generated {
        chain = quote! { #chain.generated() };
    } else if field.key {
        chain = quote! { #chain.key() };
    }
    if let Some(insertable) = field.insertable {
        chain = quote! { #chain.insertable(#insertable) };
    }
    if let Some(updatable) = field.updatable {
        chain = quote! { #chain.updatable(#updatable) };
    }
    if field.transient {
        chain = quote! { #chain.transient() };
    }
    if let Some(mode) = field.enumerated {
        let inner = infer::unwrap_option_type(ty);
        let mode = match mode {
            EnumModeAttr::Ordinal => quote! { ::relmap_core::EnumMode::Ordinal },
            EnumModeAttr::Name => quote! { ::relmap_core::EnumMode::Name },
        };
        chain = quote! {
            #chain.enumerated(#mode, <#inner as ::relmap_core::SqlEnum>::VARIANTS)
        };
    }
    if let Some(converter) = &field.converter {
        chain = quote! { #chain.converter(::relmap_core::default_converter::<#converter>) };
    }
    if let Some(factory) = &field.converter_fn {
        chain = quote! { #chain.converter(#factory) };
    }
    if field.self_ref {
        chain = quote! {
            #chain.self_ref(::relmap_core::SelfRefDef::new::<#ty>(
                |e: &Self| ::relmap_core::RefField::ref_target(&e.#ident),
                |e: &mut Self| ::relmap_core::RefField::ref_target_mut(&mut e.#ident),
            ))
        };
    }
    if let (Some(getter), Some(setter)) = (&field.getter, &field.setter) {
        let shape = match field.enumerated {
            Some(_) => Shape::Enum {
                inner: infer::unwrap_option_type(ty),
                optional: field.nullable,
            },
            None => Shape::Plain,
        };
        let to_value = shape.to_value(&quote! { &#getter(e) });
        let from_value = shape.from_value();
        chain = quote! {
            #chain.property(
                |e: &Self| #to_value,
                |e: &mut Self, v: ::relmap_core::Value| {
                    #setter(e, #from_value);
                    ::core::result::Result::Ok(())
                },
            )
        };
    }

    chain
}
