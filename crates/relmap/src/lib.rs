//! relmap - declarative object-to-relational mapping.
//!
//! Structs describe their table with `#[derive(Entity)]` markers; relmap
//! turns the markers into a cached [`TypeDescriptor`] per type, generates
//! and caches the SQL text, and moves values between members and columns
//! through a fixed set of coercion rules.
//!
//! - **Descriptors**: built once per type, on first use, even under
//!   concurrent first access
//! - **SQL text**: INSERT, UPDATE and SELECT memoized in bounded LRU caches
//! - **Reads**: rows to instances, with self-references resolved to list
//!   positions
//! - **Writes**: prepared and parameter-checked statements, generated keys
//!   written back in place
//!
//! # Quick Start
//!
//! ```ignore
//! use relmap::prelude::*;
//!
//! #[derive(Entity, Debug, Default)]
//! #[relmap(table = "heroes")]
//! struct Hero {
//!     #[relmap(key, generated)]
//!     id: Option<i64>,
//!     name: String,
//!     #[relmap(column = "is_active")]
//!     active: bool,
//! }
//!
//! async fn example(cx: &Cx, conn: &impl Connection) {
//!     let mapper = Mapper::default();
//!
//!     let mut hero = Hero { id: None, name: "Spider-Boy".into(), active: true };
//!     mapper.insert(cx, conn, &mut hero).await;
//!     assert!(hero.id.is_some());
//!
//!     let found: Outcome<Option<Hero>, Error> =
//!         mapper.find_by_key(cx, conn, &[Value::from(hero.id)]).await;
//! }
//! ```
//!
//! Generated code refers to `relmap_core`, so crates deriving `Entity` depend
//! on it next to `relmap`.
//!
//! Transactions are not modelled: every write runs in whatever state the
//! passed connection is in.

pub mod config;
pub mod mapper;
pub mod read;
pub mod registry;
pub mod write;

pub use config::MapperConfig;
pub use mapper::Mapper;
pub use registry::DescriptorRegistry;

pub use relmap_core::{
    // asupersync re-exports
    Budget,
    // Core types
    BatchResult,
    CoercionRule,
    ConfigError,
    Connection,
    Converter,
    Cx,
    EnumMode,
    Error,
    Entity,
    MappedSuperclass,
    MappingError,
    MemberType,
    MetadataDescriptor,
    Outcome,
    PreparedStatement,
    RefTarget,
    Result,
    Row,
    SelfRef,
    SqlEnum,
    SqlType,
    TypeDescriptor,
    Value,
};

pub use relmap_macros::{Entity, MappedSuperclass, SqlEnum};

pub use relmap_query::{CacheStats, PlaceholderStyle, SqlGenerator};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Connection, Converter, Cx, Entity, Error, Mapper, MapperConfig, MappedSuperclass, Outcome,
        PlaceholderStyle, RefTarget, Result, Row, SelfRef, SqlEnum, Value,
    };
}
