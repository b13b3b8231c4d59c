//! Compile-time validation for the mapping derive macros.
//!
//! Marker combinations that can never produce a working mapping are
//! rejected here with spans pointing at the offending field. Checks that
//! depend on inherited superclass members happen when the type descriptor
//! is built.

use std::collections::HashMap;

use proc_macro2::Span;
use syn::{Error, GenericArgument, PathArguments, Type};

use crate::parse::{EntityDef, FieldDef};

/// Validate a parsed definition, combining every error found.
pub fn validate_entity(def: &EntityDef) -> Result<(), Error> {
    let mut errors = Vec::new();

    validate_has_members(def, &mut errors);
    if let Some(table) = &def.table {
        validate_identifier("table", table, def.name.span(), &mut errors);
    }
    validate_no_duplicate_columns(def, &mut errors);

    for field in &def.fields {
        validate_field(field, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let mut combined = errors.remove(0);
        for err in errors {
            combined.combine(err);
        }
        Err(combined)
    }
}

fn validate_has_members(def: &EntityDef, errors: &mut Vec<Error>) {
    if def.member_fields().next().is_none() && def.superclass_fields().next().is_none() {
        errors.push(Error::new(
            def.name.span(),
            "mapped struct must have at least one mapped field or superclass",
        ));
    }
}

/// Validate a declared table or column name.
///
/// Delimited names may contain anything except a lone double quote; plain
/// names must not contain characters that would break generated SQL.
fn validate_identifier(what: &str, name: &str, span: Span, errors: &mut Vec<Error>) {
    const DANGEROUS_CHARS: &[char] = &[';', '\'', '"', '`', '/', '*', '\\', '\0', '\n', '\r'];

    let trimmed = name.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        if inner.replace("\"\"", "").contains('"') {
            errors.push(Error::new(
                span,
                format!("delimited {what} name contains an unescaped double quote; write it as \"\""),
            ));
        }
        return;
    }

    if let Some(ch) = trimmed.chars().find(|c| DANGEROUS_CHARS.contains(c) || c.is_whitespace()) {
        errors.push(Error::new(
            span,
            format!(
                "{what} name contains invalid character {ch:?}; \
                 wrap the name in double quotes to delimit it"
            ),
        ));
    }
}

fn lookup_key(column: &str) -> String {
    let trimmed = column.trim();
    match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) if !inner.is_empty() => inner.replace("\"\"", "\""),
        _ => trimmed.to_lowercase(),
    }
}

/// Validate that no two mapped fields resolve to the same column.
fn validate_no_duplicate_columns(def: &EntityDef, errors: &mut Vec<Error>) {
    let mut seen: HashMap<String, String> = HashMap::new();

    for field in def.member_fields().filter(|f| !f.transient) {
        let declared = field
            .column
            .clone()
            .filter(|c| !lookup_key(c).is_empty())
            .unwrap_or_else(|| field.name.to_string());
        let key = lookup_key(&declared);
        if let Some(previous) = seen.insert(key, field.name.to_string()) {
            errors.push(Error::new(
                field.name.span(),
                format!(
                    "duplicate column name '{declared}'; field `{previous}` already maps to this column"
                ),
            ));
        }
    }
}

/// Validate a single field.
fn validate_field(field: &FieldDef, errors: &mut Vec<Error>) {
    let span = field.name.span();
    validate_type(&field.ty, span, errors);
    if let Some(column) = &field.column {
        validate_identifier("column", column, span, errors);
    }
    if let Some(qualifier) = &field.qualifier {
        validate_identifier("qualifier", qualifier, span, errors);
    }
    validate_skip_conflicts(field, errors);
    validate_marker_conflicts(field, errors);
}

fn validate_type(ty: &Type, span: Span, errors: &mut Vec<Error>) {
    if is_nested_option(ty) {
        errors.push(Error::new(
            span,
            "nested Option<Option<T>> is ambiguous and not supported; \
             use a single Option<T> or a custom type",
        ));
    }

    if matches!(ty, Type::Reference(_)) {
        errors.push(Error::new(
            span,
            "reference types (&T) are not supported; use owned types instead",
        ));
    }

    if matches!(ty, Type::Ptr(_)) {
        errors.push(Error::new(
            span,
            "raw pointer types (*const T, *mut T) are not supported; use owned types instead",
        ));
    }
}

fn has_mapping_markers(field: &FieldDef) -> bool {
    field.column.is_some()
        || field.qualifier.is_some()
        || field.key
        || field.insertable.is_some()
        || field.updatable.is_some()
        || field.transient
        || field.enumerated.is_some()
        || field.converter.is_some()
        || field.converter_fn.is_some()
        || field.getter.is_some()
        || field.setter.is_some()
}

fn validate_skip_conflicts(field: &FieldDef, errors: &mut Vec<Error>) {
    if field.skip && (has_mapping_markers(field) || field.superclass) {
        errors.push(Error::new(
            field.name.span(),
            "#[relmap(skip)] excludes the field from mapping; remove the other relmap markers",
        ));
    }
    if field.superclass && has_mapping_markers(field) {
        errors.push(Error::new(
            field.name.span(),
            "#[relmap(superclass)] inherits the superclass markers and takes no others",
        ));
    }
}

fn validate_marker_conflicts(field: &FieldDef, errors: &mut Vec<Error>) {
    let span = field.name.span();

    if field.getter.is_some() != field.setter.is_some() {
        errors.push(Error::new(
            span,
            "property access needs both #[relmap(getter = ...)] and #[relmap(setter = ...)]",
        ));
    }
    if field.converter.is_some() && field.converter_fn.is_some() {
        errors.push(Error::new(
            span,
            "use either converter or converter_fn, not both",
        ));
    }
    if field.enumerated.is_some() && (field.converter.is_some() || field.converter_fn.is_some()) {
        errors.push(Error::new(
            span,
            "a converter replaces enum storage; remove either enumerated or the converter",
        ));
    }
    if field.self_ref && !field.superclass {
        if field.key {
            errors.push(Error::new(span, "a self-reference cannot be a key"));
        }
        if field.getter.is_some() || field.enumerated.is_some() || field.converter.is_some() {
            errors.push(Error::new(
                span,
                "a self-reference is accessed through its field; remove getter, enumerated or converter",
            ));
        }
    }
    if field.transient && field.key {
        errors.push(Error::new(span, "a transient field cannot be a key"));
    }
}

/// Check if a type is Option<Option<T>> (nested Option).
fn is_nested_option(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(Type::Path(inner_path))) = args.args.first() {
                        if let Some(inner_seg) = inner_path.path.segments.last() {
                            return inner_seg.ident == "Option";
                        }
                    }
                }
            }
        }
    }
    false
}
