//! Parsing logic for the mapping derive macros.
//!
//! This module extracts struct-level and field-level `#[relmap(...)]`
//! attributes from the derive input to build `EntityDef` and `FieldDef`
//! structures used for code generation.

use proc_macro2::Span;
use syn::{
    Attribute, Data, DeriveInput, Error, Field, Fields, Generics, Ident, Lit, LitStr, Path, Result,
    Type,
};

use crate::infer::{is_option_type, is_self_ref_type};

/// Parsed definition of a struct deriving `Entity` or `MappedSuperclass`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `Hero`).
    pub name: Ident,
    /// Declared table name, verbatim (quotes included when delimited).
    pub table: Option<String>,
    /// Parsed field definitions, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Generic parameters from the struct.
    pub generics: Generics,
}

/// How an enum field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumModeAttr {
    Ordinal,
    Name,
}

/// Parsed definition of one struct field.
#[derive(Debug)]
pub struct FieldDef {
    /// The Rust field name.
    pub name: Ident,
    /// The Rust type of the field.
    pub ty: Type,
    /// Declared column name, verbatim.
    pub column: Option<String>,
    /// Table alias used in SELECT text.
    pub qualifier: Option<String>,
    pub key: bool,
    pub generated: bool,
    pub insertable: Option<bool>,
    pub updatable: Option<bool>,
    /// Mapped but excluded from every column list.
    pub transient: bool,
    /// Not mapped at all.
    pub skip: bool,
    pub self_ref: bool,
    /// Embedded mapped superclass whose members are inherited.
    pub superclass: bool,
    pub enumerated: Option<EnumModeAttr>,
    /// Converter type constructed with `Default`.
    pub converter: Option<Path>,
    /// Converter factory function.
    pub converter_fn: Option<Path>,
    pub getter: Option<Path>,
    pub setter: Option<Path>,
    /// Whether the field is `Option<T>`.
    pub nullable: bool,
}

impl EntityDef {
    /// Fields that become members, superclass embeddings excluded.
    pub fn member_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.skip && !f.superclass)
    }

    pub fn superclass_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.superclass)
    }
}

/// Parse a struct deriving `Entity` (`allow_table`) or `MappedSuperclass`.
pub fn parse_entity(input: &DeriveInput, derive: &str, allow_table: bool) -> Result<EntityDef> {
    let name = input.ident.clone();
    let generics = input.generics.clone();
    let table = parse_struct_attrs(&input.attrs, allow_table)?;

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields, derive)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                format!("{derive} can only be derived for structs, not enums"),
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                format!("{derive} can only be derived for structs, not unions"),
            ));
        }
    };

    Ok(EntityDef {
        name,
        table,
        fields,
        generics,
    })
}

fn parse_struct_attrs(attrs: &[Attribute], allow_table: bool) -> Result<Option<String>> {
    let mut table: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("relmap") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") && allow_table {
                if table.is_some() {
                    return Err(Error::new_spanned(meta.path, "duplicate relmap attribute: table"));
                }
                table = Some(string_value(&meta, "table")?.value());
                Ok(())
            } else if allow_table {
                Err(Error::new_spanned(
                    meta.path,
                    "unknown relmap struct attribute (supported: table)",
                ))
            } else {
                Err(Error::new_spanned(
                    meta.path,
                    "a mapped superclass takes no struct attributes",
                ))
            }
        })?;
    }

    Ok(table)
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<LitStr> {
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Str(lit_str) => Ok(lit_str),
        other => Err(Error::new_spanned(
            other,
            format!("expected string literal for {what}"),
        )),
    }
}

fn bool_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<bool> {
    if !meta.input.peek(syn::Token![=]) {
        return Ok(true);
    }
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Bool(lit) => Ok(lit.value),
        other => Err(Error::new_spanned(
            other,
            format!("expected `true` or `false` for {what}"),
        )),
    }
}

fn path_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<Path> {
    let lit = string_value(meta, what)?;
    lit.parse::<Path>()
        .map_err(|_| Error::new_spanned(&lit, format!("{what} must name a path")))
}

fn parse_fields(fields: &Fields, derive: &str) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            format!("{derive} requires a struct with named fields, not a tuple struct"),
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            format!("{derive} requires a struct with fields, not a unit struct"),
        )),
    }
}

/// Parse a single field and its attributes.
fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let ty = field.ty.clone();

    let mut def = FieldDef {
        nullable: is_option_type(&ty),
        self_ref: is_self_ref_type(&ty),
        name,
        ty,
        column: None,
        qualifier: None,
        key: false,
        generated: false,
        insertable: None,
        updatable: None,
        transient: false,
        skip: false,
        superclass: false,
        enumerated: None,
        converter: None,
        converter_fn: None,
        getter: None,
        setter: None,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("relmap") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;

            if path.is_ident("key") {
                def.key = true;
            } else if path.is_ident("generated") {
                def.key = true;
                def.generated = true;
            } else if path.is_ident("transient") {
                def.transient = true;
            } else if path.is_ident("skip") {
                def.skip = true;
            } else if path.is_ident("self_ref") {
                def.self_ref = true;
            } else if path.is_ident("superclass") {
                def.superclass = true;
            } else if path.is_ident("insertable") {
                def.insertable = Some(bool_value(&meta, "insertable")?);
            } else if path.is_ident("updatable") {
                def.updatable = Some(bool_value(&meta, "updatable")?);
            } else if path.is_ident("column") {
                def.column = Some(string_value(&meta, "column")?.value());
            } else if path.is_ident("qualifier") {
                def.qualifier = Some(string_value(&meta, "qualifier")?.value());
            } else if path.is_ident("enumerated") {
                let lit = string_value(&meta, "enumerated")?;
                def.enumerated = Some(match lit.value().as_str() {
                    "ordinal" => EnumModeAttr::Ordinal,
                    "name" => EnumModeAttr::Name,
                    _ => {
                        return Err(Error::new_spanned(
                            lit,
                            "enumerated must be one of: 'ordinal', 'name'",
                        ));
                    }
                });
            } else if path.is_ident("converter") {
                def.converter = Some(path_value(&meta, "converter")?);
            } else if path.is_ident("converter_fn") {
                def.converter_fn = Some(path_value(&meta, "converter_fn")?);
            } else if path.is_ident("getter") {
                def.getter = Some(path_value(&meta, "getter")?);
            } else if path.is_ident("setter") {
                def.setter = Some(path_value(&meta, "setter")?);
            } else {
                return Err(Error::new_spanned(
                    path,
                    "unknown relmap field attribute (supported: key, generated, column, qualifier, \
                     insertable, updatable, transient, skip, self_ref, superclass, enumerated, \
                     converter, converter_fn, getter, setter)",
                ));
            }
            Ok(())
        })?;
    }

    Ok(def)
}

/// Parsed unit variant of an enum deriving `SqlEnum`.
#[derive(Debug)]
pub struct VariantDef {
    pub ident: Ident,
    /// Stored symbolic name.
    pub name: String,
}

/// Parse an enum deriving `SqlEnum`.
pub fn parse_sql_enum(input: &DeriveInput) -> Result<Vec<VariantDef>> {
    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(
            input,
            "SqlEnum can only be derived for enums",
        ));
    };

    data.variants
        .iter()
        .map(|variant| {
            if !matches!(variant.fields, Fields::Unit) {
                return Err(Error::new_spanned(
                    variant,
                    "SqlEnum variants must not carry data",
                ));
            }
            let mut name = variant.ident.to_string();
            for attr in &variant.attrs {
                if !attr.path().is_ident("relmap") {
                    continue;
                }
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        name = string_value(&meta, "rename")?.value();
                        Ok(())
                    } else {
                        Err(Error::new_spanned(
                            meta.path,
                            "unknown relmap variant attribute (supported: rename)",
                        ))
                    }
                })?;
            }
            Ok(VariantDef {
                ident: variant.ident.clone(),
                name,
            })
        })
        .collect()
}
