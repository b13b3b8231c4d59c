//! Member type inference from Rust types.
//!
//! The inferred `MemberType` picks the built-in coercion rule a member gets
//! when it has no converter or enum marker.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{GenericArgument, PathArguments, Type};

/// Infer the `MemberType` of a field, returning a TokenStream that names the
/// variant.
///
/// `Option<T>` is unwrapped first. Unsigned integers map to the next wider
/// signed member type so decimal narrowing never rejects a value the field
/// can hold.
pub fn infer_member_type(ty: &Type) -> TokenStream {
    let inner_ty = unwrap_option_type(ty);
    if is_self_ref_type(inner_ty) {
        return quote! { ::relmap_core::MemberType::SelfRef };
    }

    match type_to_string(inner_ty).as_str() {
        "bool" => quote! { ::relmap_core::MemberType::Bool },

        "i8" => quote! { ::relmap_core::MemberType::Int8 },
        "i16" | "u8" => quote! { ::relmap_core::MemberType::Int16 },
        "i32" | "u16" => quote! { ::relmap_core::MemberType::Int32 },
        "i64" | "u32" => quote! { ::relmap_core::MemberType::Int64 },
        "i128" | "u64" => quote! { ::relmap_core::MemberType::BigInteger },

        "f32" => quote! { ::relmap_core::MemberType::Float32 },
        "f64" => quote! { ::relmap_core::MemberType::Float64 },

        "String" | "std::string::String" => quote! { ::relmap_core::MemberType::Text },

        "Vec<u8>" => quote! { ::relmap_core::MemberType::Bytes },

        _ => quote! { ::relmap_core::MemberType::Other },
    }
}

/// Unwrap `Option<T>` to get the inner type, or return the original type.
pub fn unwrap_option_type(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

/// Check if a type is `Option<T>`.
pub fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

/// Check if a type is `SelfRef<T>`, bare or path-qualified.
pub fn is_self_ref_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "SelfRef";
        }
    }
    false
}

/// Convert a Type to a simplified string representation for matching.
fn type_to_string(ty: &Type) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}
