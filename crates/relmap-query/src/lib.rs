//! SQL text generation for relmap.
//!
//! `relmap-query` is the **statement layer**. It turns a `TypeDescriptor`'s
//! precomputed column lists into INSERT, UPDATE, DELETE and SELECT text and
//! memoizes the result.
//!
//! # Role In The Architecture
//!
//! - **Generation**: one pure `render_*` function per statement shape.
//! - **Caching**: `SqlGenerator` keeps bounded LRU caches keyed by type and clause.
//! - **Placeholders**: `?` or numbered `$n` markers.
//!
//! The generated text is prepared and executed through the `Connection` trait
//! from `relmap-core`. Most users reach it through the `relmap` facade crate.

pub mod cache;
pub mod sql;

pub use cache::{CachedStatement, LruCache};
pub use sql::{
    CacheStats, DEFAULT_CACHE_CAPACITY, PlaceholderStyle, SqlGenerator, render_delete_by_key,
    render_insert, render_select, render_select_by_key, render_self_ref_update, render_update,
};
