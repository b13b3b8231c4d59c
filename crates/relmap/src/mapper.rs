//! The mapper service.
//!
//! A [`Mapper`] owns a descriptor registry and a SQL generator. It is cheap
//! to share behind an `Arc` and holds no connection: every database
//! operation borrows the caller's.

use crate::config::MapperConfig;
use crate::registry::DescriptorRegistry;
use crate::{read, write};
use relmap_core::{Connection, Cx, Entity, Error, Outcome, Result, Row, TypeDescriptor, Value};
use relmap_query::{CacheStats, SqlGenerator};
use std::sync::Arc;

/// Maps entities to rows and back.
///
/// ```ignore
/// let mapper = Mapper::default();
/// let mut hero = Hero { id: None, name: "Deadpond".into() };
/// mapper.insert(&cx, &conn, &mut hero).await;
/// let heroes: Vec<Hero> = mapper.select(&cx, &conn, "name = ?", &["Deadpond".into()]).await.unwrap();
/// ```
#[derive(Debug)]
pub struct Mapper {
    config: MapperConfig,
    registry: DescriptorRegistry,
    generator: SqlGenerator,
}

impl Default for Mapper {
    fn default() -> Self {
        let config = MapperConfig::default();
        Self {
            generator: SqlGenerator::new(config.sql_cache_capacity, config.placeholder),
            registry: DescriptorRegistry::new(),
            config,
        }
    }
}

/// Unwrap a `Result` inside a function returning `Outcome`.
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return Outcome::Err(e),
        }
    };
}

impl Mapper {
    /// Create a mapper from a validated configuration.
    #[allow(clippy::result_large_err)]
    pub fn new(config: MapperConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            sql_cache_capacity = config.sql_cache_capacity,
            placeholder = ?config.placeholder,
            "Creating mapper"
        );
        Ok(Self {
            generator: SqlGenerator::new(config.sql_cache_capacity, config.placeholder),
            registry: DescriptorRegistry::new(),
            config,
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    /// The descriptor of `E`, built on first use.
    #[allow(clippy::result_large_err)]
    pub fn descriptor<E: Entity>(&self) -> Result<Arc<TypeDescriptor<E>>> {
        self.registry.descriptor::<E>()
    }

    #[allow(clippy::result_large_err)]
    pub fn insert_sql<E: Entity>(&self) -> Result<Arc<str>> {
        Ok(self.generator.insert_text(&*self.descriptor::<E>()?))
    }

    #[allow(clippy::result_large_err)]
    pub fn update_sql<E: Entity>(&self) -> Result<Arc<str>> {
        self.generator
            .update_text(&*self.descriptor::<E>()?)
            .ok_or_else(|| Error::Unsupported(format!("{} has no updatable columns", E::TYPE_NAME)))
    }

    /// SELECT text, optionally followed by a clause. A clause without WHERE
    /// or JOIN is attached after WHERE.
    #[allow(clippy::result_large_err)]
    pub fn select_sql<E: Entity>(&self, clause: Option<&str>) -> Result<Arc<str>> {
        Ok(self.generator.select_text(&*self.descriptor::<E>()?, clause))
    }

    #[allow(clippy::result_large_err)]
    pub fn delete_by_key_sql<E: Entity>(&self) -> Result<Arc<str>> {
        Ok(self.generator.delete_by_key_text(&*self.descriptor::<E>()?))
    }

    #[allow(clippy::result_large_err)]
    pub fn select_by_key_sql<E: Entity>(&self) -> Result<Arc<str>> {
        Ok(self.generator.select_by_key_text(&*self.descriptor::<E>()?))
    }

    /// Entry counts of the SQL text caches.
    pub fn cache_stats(&self) -> CacheStats {
        self.generator.stats()
    }

    #[allow(clippy::result_large_err)]
    pub fn map_row<E: Entity>(&self, row: &Row) -> Result<E> {
        read::map_row(&*self.descriptor::<E>()?, row)
    }

    /// Map the first row, or `None` for an empty result.
    #[allow(clippy::result_large_err)]
    pub fn to_object<E: Entity>(&self, rows: &[Row]) -> Result<Option<E>> {
        read::to_object(&*self.descriptor::<E>()?, rows)
    }

    /// Map every row, resolving self-references within the result.
    #[allow(clippy::result_large_err)]
    pub fn to_list<E: Entity>(&self, rows: &[Row]) -> Result<Vec<E>> {
        read::to_list(&*self.descriptor::<E>()?, rows)
    }

    pub async fn insert<C: Connection, E: Entity>(&self, cx: &Cx, conn: &C, entity: &mut E) -> Outcome<u64, Error> {
        let desc = try_result!(self.descriptor::<E>());
        write::insert(cx, conn, &self.generator, &desc, entity).await
    }

    pub async fn update<C: Connection, E: Entity>(&self, cx: &Cx, conn: &C, entity: &E) -> Outcome<u64, Error> {
        let desc = try_result!(self.descriptor::<E>());
        write::update(cx, conn, &self.generator, &desc, entity).await
    }

    pub async fn delete<C: Connection, E: Entity>(&self, cx: &Cx, conn: &C, entity: &E) -> Outcome<u64, Error> {
        let desc = try_result!(self.descriptor::<E>());
        write::delete(cx, conn, &self.generator, &desc, entity).await
    }

    /// Delete by key values; name the type with `delete_by_key::<Hero, _>`.
    pub async fn delete_by_key<E: Entity, C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        key_values: &[Value],
    ) -> Outcome<u64, Error> {
        let desc = try_result!(self.descriptor::<E>());
        write::delete_by_key(cx, conn, &self.generator, &desc, key_values).await
    }

    pub async fn insert_batch<C: Connection, E: Entity>(
        &self,
        cx: &Cx,
        conn: &C,
        entities: &mut [E],
    ) -> Outcome<Vec<u64>, Error> {
        let desc = try_result!(self.descriptor::<E>());
        write::insert_batch(cx, conn, &self.generator, &desc, entities).await
    }

    pub async fn insert_sequential<C: Connection, E: Entity>(
        &self,
        cx: &Cx,
        conn: &C,
        entities: &mut [E],
    ) -> Outcome<Vec<u64>, Error> {
        let desc = try_result!(self.descriptor::<E>());
        write::insert_sequential(cx, conn, &self.generator, &desc, entities).await
    }

    /// Run the SELECT for `E` with `clause` and map every row.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, params), fields(entity = E::TYPE_NAME))]
    pub async fn select<C: Connection, E: Entity>(
        &self,
        cx: &Cx,
        conn: &C,
        clause: &str,
        params: &[Value],
    ) -> Outcome<Vec<E>, Error> {
        let desc = try_result!(self.descriptor::<E>());
        let sql = self.generator.select_text(&*desc, Some(clause));
        let rows = match self.query(cx, conn, &sql, params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        Outcome::Ok(try_result!(read::to_list(&*desc, &rows)))
    }

    /// Fetch the instance with the given key values, in key column order.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, key_values), fields(entity = E::TYPE_NAME))]
    pub async fn find_by_key<C: Connection, E: Entity>(
        &self,
        cx: &Cx,
        conn: &C,
        key_values: &[Value],
    ) -> Outcome<Option<E>, Error> {
        let desc = try_result!(self.descriptor::<E>());
        let sql = self.generator.select_by_key_text(&*desc);
        let stmt = match conn.prepare(cx, &sql).await {
            Outcome::Ok(stmt) => stmt,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let params = try_result!(write::coerce_keys(&*desc, key_values, &stmt));
        let rows = match conn.query_prepared(cx, &stmt, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        Outcome::Ok(try_result!(read::to_object(&*desc, &rows)))
    }

    async fn query<C: Connection>(&self, cx: &Cx, conn: &C, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        let stmt = match conn.prepare(cx, sql).await {
            Outcome::Ok(stmt) => stmt,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        try_result!(stmt.check_params(params));
        conn.query_prepared(cx, &stmt, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_query::PlaceholderStyle;

    #[test]
    fn rejects_invalid_config() {
        let err = Mapper::new(MapperConfig::new().sql_cache_capacity(0)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn uses_configured_placeholders() {
        let mapper = Mapper::new(MapperConfig::new().placeholder(PlaceholderStyle::Dollar)).unwrap();
        assert_eq!(mapper.generator().placeholder_style(), PlaceholderStyle::Dollar);
        assert_eq!(mapper.config().sql_cache_capacity, 500);
        assert!(mapper.registry().is_empty());
    }
}
