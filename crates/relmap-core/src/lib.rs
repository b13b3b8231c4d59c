//! Core types and traits for relmap.
//!
//! This crate provides the foundations the mapping engine is built on:
//!
//! - `Entity` trait and `MemberDef` markers for declarative struct mapping
//! - `TypeDescriptor` / `MetadataDescriptor`, the validated per-type metadata
//! - The value coercion matrix between member values and column values
//! - `Connection` trait consumed by the read and write pipelines
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Budget, Cx, Outcome};

pub mod coerce;
pub mod connection;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod row;
pub mod types;
pub mod value;

pub use coerce::{CoercionRule, IntWidth, to_column_value, to_member_value, truncate_decimal};
pub use connection::{BatchResult, Connection, PreparedStatement};
pub use descriptor::{MemberAccessor, MetadataDescriptor, SelfJoinDescriptor, TypeDescriptor};
pub use entity::{
    AccessorPair, Converter, ConverterFactory, Entity, EnumMode, MappedSuperclass, MemberDef,
    MemberType, RefField, RefTarget, SelfRef, SelfRefAccess, SelfRefDef, SqlEnum,
    default_converter, enum_from_value, enum_to_value,
};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, MappingError, QueryError,
    QueryErrorKind, Result, TypeError,
};
pub use identifiers::Identifier;
pub use row::{ColumnInfo, FromValue, Row};
pub use types::SqlType;
pub use value::Value;
