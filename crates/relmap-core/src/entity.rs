//! The declarative mapping surface.
//!
//! `#[derive(Entity)]` turns a struct's `#[relmap(...)]` markers into a list
//! of [`MemberDef`]s. Nothing here interprets the markers: the descriptor
//! module validates them and resolves names, accessors and coercion rules
//! exactly once per type.
//!
//! # Example
//!
//! ```ignore
//! use relmap::prelude::*;
//!
//! #[derive(Entity, Debug, Default)]
//! #[relmap(table = "category")]
//! struct Category {
//!     #[relmap(key, generated)]
//!     id: Option<i64>,
//!     #[relmap(column = "\"Label\"")]
//!     label: String,
//!     #[relmap(self_ref, column = "parent_id")]
//!     parent: SelfRef<Category>,
//! }
//! ```

use crate::error::{Error, Result, TypeError};
use crate::value::Value;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A mapped host type.
///
/// Implemented by `#[derive(Entity)]`. Instances are created through
/// `Default` before columns are assigned.
pub trait Entity: Default + Send + Sync + 'static {
    /// Simple type name, the default table name and the name used in diagnostics.
    const TYPE_NAME: &'static str;

    /// Declared table name, plain or double-quoted.
    const TABLE: Option<&'static str> = None;

    /// Markers for every scanned member, mapped-superclass members first.
    fn members() -> Vec<MemberDef<Self>>;
}

/// A struct whose members are inherited by every entity embedding it with
/// `#[relmap(superclass)]`.
pub trait MappedSuperclass: Sized + 'static {
    /// Markers for the superclass members.
    fn members() -> Vec<MemberDef<Self>>;
}

/// Classification of a member's Rust type, used to pick a coercion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    /// `i128`
    BigInteger,
    Float32,
    Float64,
    Text,
    Bytes,
    /// A `SqlEnum` stored by ordinal or name
    Enum,
    /// A [`SelfRef`]
    SelfRef,
    /// Anything else; values pass through `FromValue`/`Into<Value>` unchanged
    Other,
}

/// How an enum member is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMode {
    /// Zero-based declaration position
    Ordinal,
    /// Case-sensitive symbolic name
    Name,
}

/// Reads a member as a `Value`.
pub type Getter<E> = Arc<dyn Fn(&E) -> Value + Send + Sync>;
/// Writes a `Value` into a member.
pub type Setter<E> = Arc<dyn Fn(&mut E, Value) -> Result<()> + Send + Sync>;

/// A get/set pair for one member.
pub struct AccessorPair<E> {
    pub(crate) get: Getter<E>,
    pub(crate) set: Setter<E>,
}

impl<E> AccessorPair<E> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&E) -> Value + Send + Sync + 'static,
        S: Fn(&mut E, Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    fn lift<O: 'static>(self, project: fn(&O) -> &E, project_mut: fn(&mut O) -> &mut E) -> AccessorPair<O>
    where
        E: 'static,
    {
        let get = self.get;
        let set = self.set;
        AccessorPair {
            get: Arc::new(move |outer: &O| get(project(outer))),
            set: Arc::new(move |outer: &mut O, value| set(project_mut(outer), value)),
        }
    }
}

impl<E> Clone for AccessorPair<E> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

/// A user-supplied bidirectional conversion between a member and its column.
///
/// A converter takes precedence over every built-in coercion rule. It sees
/// NULL member values on write; NULL columns never reach it on read.
pub trait Converter: Send + Sync {
    /// Member representation to column representation.
    #[allow(clippy::result_large_err)]
    fn to_column(&self, member: Value) -> Result<Value>;

    /// Column representation to member representation.
    #[allow(clippy::result_large_err)]
    fn to_member(&self, column: Value) -> Result<Value>;
}

/// Builds a converter instance; a failure is a configuration error.
pub type ConverterFactory = fn() -> Result<Arc<dyn Converter>>;

/// Factory for converters that are constructed with `Default`.
#[allow(clippy::result_large_err, clippy::unnecessary_wraps)]
pub fn default_converter<C: Converter + Default + 'static>() -> Result<Arc<dyn Converter>> {
    Ok(Arc::new(C::default()))
}

/// Enumerations storable by ordinal or by name.
///
/// Implemented by `#[derive(SqlEnum)]`.
pub trait SqlEnum: Sized + 'static {
    /// Symbolic names in declaration order; the index is the ordinal.
    const VARIANTS: &'static [&'static str];

    /// Symbolic name of this variant.
    fn variant_name(&self) -> &'static str;

    /// Variant with the given symbolic name (case-sensitive).
    fn from_variant_name(name: &str) -> Option<Self>;
}

/// Member-side value of an enum: its symbolic name.
pub fn enum_to_value<T: SqlEnum>(variant: &T) -> Value {
    Value::Text(variant.variant_name().to_string())
}

/// Parse a member-side enum value produced by the coercion matrix.
#[allow(clippy::result_large_err)]
pub fn enum_from_value<T: SqlEnum>(value: &Value) -> Result<T> {
    match value {
        Value::Text(name) => T::from_variant_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("unknown variant '{}'", name),
                column: None,
                rust_type: Some(std::any::type_name::<T>()),
            })
        }),
        other => Err(Error::Type(TypeError {
            expected: std::any::type_name::<T>(),
            actual: other.type_name().to_string(),
            column: None,
            rust_type: Some(std::any::type_name::<T>()),
        })),
    }
}

/// Where a self-reference points.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RefTarget {
    /// No parent
    #[default]
    Unset,
    /// Position of the referenced instance in the same list or batch
    Index(usize),
    /// Raw key of the referenced row
    Key(Value),
    /// A row of the same result: its position there and its raw key
    Loaded { index: usize, key: Value },
}

impl RefTarget {
    /// Position in the surrounding list or batch, if there is one.
    pub fn position(&self) -> Option<usize> {
        match self {
            RefTarget::Index(index) | RefTarget::Loaded { index, .. } => Some(*index),
            RefTarget::Unset | RefTarget::Key(_) => None,
        }
    }

    /// Raw key of the referenced row, if known.
    pub fn key(&self) -> Option<&Value> {
        match self {
            RefTarget::Key(key) | RefTarget::Loaded { key, .. } => Some(key),
            RefTarget::Unset | RefTarget::Index(_) => None,
        }
    }
}

/// A reference from an entity to another instance of the same entity.
///
/// Instances never own each other: a reference is a position in the
/// surrounding `Vec`, the referenced row's key, or both for rows read by
/// `to_list`.
pub struct SelfRef<T> {
    target: RefTarget,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SelfRef<T> {
    /// No parent.
    pub const fn unset() -> Self {
        Self {
            target: RefTarget::Unset,
            _marker: PhantomData,
        }
    }

    /// Reference the instance at `index` of the same list or batch.
    pub const fn at(index: usize) -> Self {
        Self {
            target: RefTarget::Index(index),
            _marker: PhantomData,
        }
    }

    /// Reference a row by its raw key.
    pub fn key(key: impl Into<Value>) -> Self {
        Self {
            target: RefTarget::Key(key.into()),
            _marker: PhantomData,
        }
    }

    /// The current target.
    pub fn target(&self) -> &RefTarget {
        &self.target
    }

    /// Position in the surrounding list, when resolved to one.
    pub fn index(&self) -> Option<usize> {
        self.target.position()
    }

    /// Resolve a position-based reference against the list it came from.
    pub fn resolve<'a>(&self, arena: &'a [T]) -> Option<&'a T> {
        self.index().and_then(|i| arena.get(i))
    }

    pub fn is_set(&self) -> bool {
        !matches!(self.target, RefTarget::Unset)
    }
}

impl<T> Default for SelfRef<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T> Clone for SelfRef<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for SelfRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<T> fmt::Debug for SelfRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SelfRef").field(&self.target).finish()
    }
}

/// A field that can hold a self-reference; implemented by [`SelfRef`].
pub trait RefField {
    /// Declared target type.
    type Target: 'static;

    fn ref_target(&self) -> &RefTarget;

    fn ref_target_mut(&mut self) -> &mut RefTarget;

    /// Column-side value: the raw key, or NULL when no key is known.
    fn column_value(&self) -> Value {
        self.ref_target().key().cloned().unwrap_or(Value::Null)
    }

    /// Store a raw key read from a column; NULL clears the reference.
    fn assign_key(&mut self, value: Value) {
        *self.ref_target_mut() = if value.is_null() {
            RefTarget::Unset
        } else {
            RefTarget::Key(value)
        };
    }
}

impl<T: 'static> RefField for SelfRef<T> {
    type Target = T;

    fn ref_target(&self) -> &RefTarget {
        &self.target
    }

    fn ref_target_mut(&mut self) -> &mut RefTarget {
        &mut self.target
    }
}

/// Borrowing access to the [`RefTarget`] of a self-reference member.
pub struct SelfRefAccess<E> {
    pub(crate) get: fn(&E) -> &RefTarget,
    pub(crate) get_mut: fn(&mut E) -> &mut RefTarget,
}

impl<E> Clone for SelfRefAccess<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for SelfRefAccess<E> {}

/// Self-reference marker: the declared target type plus target access.
pub struct SelfRefDef<E> {
    pub(crate) target: TypeId,
    pub(crate) target_name: &'static str,
    pub(crate) access: Option<SelfRefAccess<E>>,
}

impl<E> SelfRefDef<E> {
    /// Marker for a field of type `F` (normally `SelfRef<Target>`).
    pub fn new<F: RefField>(get: fn(&E) -> &RefTarget, get_mut: fn(&mut E) -> &mut RefTarget) -> Self {
        Self {
            target: TypeId::of::<F::Target>(),
            target_name: std::any::type_name::<F::Target>(),
            access: Some(SelfRefAccess { get, get_mut }),
        }
    }
}

/// Mapping markers for one member, as declared.
pub struct MemberDef<E> {
    pub(crate) name: &'static str,
    pub(crate) column: Option<&'static str>,
    pub(crate) qualifier: Option<&'static str>,
    pub(crate) key: bool,
    pub(crate) generated: bool,
    pub(crate) insertable: Option<bool>,
    pub(crate) updatable: Option<bool>,
    pub(crate) transient: bool,
    pub(crate) member_type: MemberType,
    pub(crate) enumerated: Option<(EnumMode, &'static [&'static str])>,
    pub(crate) converter: Option<ConverterFactory>,
    pub(crate) self_ref: Option<SelfRefDef<E>>,
    pub(crate) field: AccessorPair<E>,
    pub(crate) property: Option<AccessorPair<E>>,
}

impl<E: 'static> MemberDef<E> {
    /// A member with direct field access and default markers.
    pub fn new<G, S>(name: &'static str, member_type: MemberType, get: G, set: S) -> Self
    where
        G: Fn(&E) -> Value + Send + Sync + 'static,
        S: Fn(&mut E, Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name,
            column: None,
            qualifier: None,
            key: false,
            generated: false,
            insertable: None,
            updatable: None,
            transient: false,
            member_type,
            enumerated: None,
            converter: None,
            self_ref: None,
            field: AccessorPair::new(get, set),
            property: None,
        }
    }

    /// Explicit column name; wrap in double quotes to delimit it.
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    /// Table alias used to qualify the column in SELECT text.
    pub fn qualifier(mut self, qualifier: &'static str) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// A key assigned by the store on insert. Implies [`key`](Self::key).
    pub fn generated(mut self) -> Self {
        self.key = true;
        self.generated = true;
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = Some(insertable);
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = Some(updatable);
        self
    }

    /// Keep the member out of every column list.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Store an enum by ordinal or name; `variants` comes from [`SqlEnum::VARIANTS`].
    pub fn enumerated(mut self, mode: EnumMode, variants: &'static [&'static str]) -> Self {
        self.member_type = MemberType::Enum;
        self.enumerated = Some((mode, variants));
        self
    }

    pub fn converter(mut self, factory: ConverterFactory) -> Self {
        self.converter = Some(factory);
        self
    }

    pub fn self_ref(mut self, def: SelfRefDef<E>) -> Self {
        self.member_type = MemberType::SelfRef;
        self.self_ref = Some(def);
        self
    }

    /// Access the member through a getter/setter method pair instead of the field.
    pub fn property<G, S>(mut self, get: G, set: S) -> Self
    where
        G: Fn(&E) -> Value + Send + Sync + 'static,
        S: Fn(&mut E, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.property = Some(AccessorPair::new(get, set));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Re-home a superclass member onto the entity embedding the superclass.
    ///
    /// Self-reference markers keep their declared target but lose access,
    /// since the target can no longer be the owning type.
    pub fn lift<O: 'static>(self, project: fn(&O) -> &E, project_mut: fn(&mut O) -> &mut E) -> MemberDef<O> {
        MemberDef {
            name: self.name,
            column: self.column,
            qualifier: self.qualifier,
            key: self.key,
            generated: self.generated,
            insertable: self.insertable,
            updatable: self.updatable,
            transient: self.transient,
            member_type: self.member_type,
            enumerated: self.enumerated,
            converter: self.converter,
            self_ref: self.self_ref.map(|def| SelfRefDef {
                target: def.target,
                target_name: def.target_name,
                access: None,
            }),
            field: self.field.lift(project, project_mut),
            property: self.property.map(|pair| pair.lift(project, project_mut)),
        }
    }
}

impl<E> fmt::Debug for MemberDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDef")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("key", &self.key)
            .field("generated", &self.generated)
            .field("member_type", &self.member_type)
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}
