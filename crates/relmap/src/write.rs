//! Instances to statements.
//!
//! Every statement is prepared first so the driver can report how many
//! parameters it expects and of which types. A short parameter list fails
//! before anything executes, and the reported types pick the column
//! representation of each bound member.

use relmap_core::{
    Connection, Cx, Entity, Error, MetadataDescriptor, Outcome, PreparedStatement, RefTarget,
    Result, TypeDescriptor, Value,
};
use relmap_query::SqlGenerator;

/// How a self-reference member is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelfRefBinding {
    /// Bind the raw key; a bare position within a batch is an error
    Strict,
    /// Always bind NULL; the reference is written by a later UPDATE
    Deferred,
}

#[allow(clippy::result_large_err)]
fn bind_members<'a, E: 'a>(
    desc: &TypeDescriptor<E>,
    members: impl IntoIterator<Item = &'a MetadataDescriptor<E>>,
    entity: &E,
    stmt: &PreparedStatement,
    binding: SelfRefBinding,
    params: &mut Vec<Value>,
) -> Result<()> {
    for member in members {
        let target = stmt.param_type(params.len());
        let value = if member.is_self_reference() {
            self_ref_value(desc, member, entity, binding)?
        } else {
            member.bind_value(entity, target)?
        };
        params.push(value);
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn self_ref_value<E>(
    desc: &TypeDescriptor<E>,
    member: &MetadataDescriptor<E>,
    entity: &E,
    binding: SelfRefBinding,
) -> Result<Value> {
    let Some(join) = desc.self_join() else {
        return Ok(Value::Null);
    };
    match (binding, join.target(entity)) {
        (SelfRefBinding::Deferred, _) | (_, RefTarget::Unset) => Ok(Value::Null),
        (SelfRefBinding::Strict, RefTarget::Key(key) | RefTarget::Loaded { key, .. }) => {
            Ok(key.clone())
        }
        (SelfRefBinding::Strict, RefTarget::Index(index)) => Err(Error::mapping(
            desc.entity_name(),
            member.member_name(),
            "INDEX",
            format!(
                "position {index} only has meaning within a list; \
                 write the list with insert_sequential"
            ),
        )),
    }
}

#[allow(clippy::result_large_err)]
fn bind_insert<E>(
    desc: &TypeDescriptor<E>,
    entity: &E,
    stmt: &PreparedStatement,
    binding: SelfRefBinding,
) -> Result<Vec<Value>> {
    let mut params = Vec::with_capacity(stmt.param_count());
    bind_members(desc, desc.insertable_columns(), entity, stmt, binding, &mut params)?;
    stmt.check_params(&params)?;
    Ok(params)
}

/// Does a key value look like it has not been assigned yet?
///
/// NULL, zero or negative numbers, and empty text all count as unset.
pub fn looks_unset(value: &Value) -> bool {
    match value {
        Value::Null | Value::Default => true,
        Value::Text(text) => text.is_empty(),
        other => other.as_f64().is_some_and(|n| n <= 0.0),
    }
}

/// Store a key generated by the store into the instance's generated key
/// member, unless the member already holds a key.
#[allow(clippy::result_large_err)]
fn apply_generated_key<E>(desc: &TypeDescriptor<E>, entity: &mut E, generated: Value) -> Result<()> {
    let Some(member) = desc.generated_key() else {
        return Ok(());
    };
    if generated.is_null() {
        return Ok(());
    }
    let current = member.accessor().get(entity);
    if !looks_unset(&current) {
        tracing::warn!(
            entity = desc.entity_name(),
            member = member.member_name(),
            current = ?current,
            generated = ?generated,
            "Instance already has a key; ignoring the generated one"
        );
        return Ok(());
    }
    member.assign(entity, generated)
}

async fn insert_one<C: Connection, E>(
    cx: &Cx,
    conn: &C,
    stmt: &PreparedStatement,
    desc: &TypeDescriptor<E>,
    entity: &mut E,
    binding: SelfRefBinding,
) -> Outcome<u64, Error> {
    let params = match bind_insert(desc, entity, stmt, binding) {
        Ok(params) => params,
        Err(e) => return Outcome::Err(e),
    };

    if !desc.has_generated_key() {
        return conn.execute_prepared(cx, stmt, &params).await;
    }

    let generated = match conn.insert_prepared(cx, stmt, &params).await {
        Outcome::Ok(generated) => generated,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    if let Some(key) = generated {
        if let Err(e) = apply_generated_key(desc, entity, key) {
            return Outcome::Err(e);
        }
    }
    Outcome::Ok(1)
}

/// Insert one instance.
///
/// A key generated by the store is written back into the instance when its
/// key member still looks unset. Returns the affected row count.
#[tracing::instrument(level = "debug", skip(cx, conn, generator, desc, entity), fields(entity = E::TYPE_NAME))]
pub async fn insert<C: Connection, E: Entity>(
    cx: &Cx,
    conn: &C,
    generator: &SqlGenerator,
    desc: &TypeDescriptor<E>,
    entity: &mut E,
) -> Outcome<u64, Error> {
    let sql = generator.insert_text(desc);
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    insert_one(cx, conn, &stmt, desc, entity, SelfRefBinding::Strict).await
}

/// Update one instance by its key.
///
/// Updatable columns are bound first, then key columns. An affected count
/// of zero means no row had that key. A type with no updatable columns has
/// nothing to write and reports zero without touching the connection.
#[tracing::instrument(level = "debug", skip(cx, conn, generator, desc, entity), fields(entity = E::TYPE_NAME))]
pub async fn update<C: Connection, E: Entity>(
    cx: &Cx,
    conn: &C,
    generator: &SqlGenerator,
    desc: &TypeDescriptor<E>,
    entity: &E,
) -> Outcome<u64, Error> {
    let Some(sql) = generator.update_text(desc) else {
        tracing::debug!(entity = desc.entity_name(), "No updatable columns, skipping update");
        return Outcome::Ok(0);
    };
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let mut params = Vec::with_capacity(stmt.param_count());
    let bound = bind_members(
        desc,
        desc.updatable_columns(),
        entity,
        &stmt,
        SelfRefBinding::Strict,
        &mut params,
    )
    .and_then(|()| {
        bind_members(
            desc,
            desc.key_columns(),
            entity,
            &stmt,
            SelfRefBinding::Strict,
            &mut params,
        )
    })
    .and_then(|()| stmt.check_params(&params));
    if let Err(e) = bound {
        return Outcome::Err(e);
    }

    conn.execute_prepared(cx, &stmt, &params).await
}

/// Delete the row with the given key values, in key column order.
///
/// Each value goes through its key member's coercion rule. Values beyond
/// the key columns are bound unchanged.
#[tracing::instrument(level = "debug", skip(cx, conn, generator, desc, key_values), fields(entity = E::TYPE_NAME))]
pub async fn delete_by_key<C: Connection, E: Entity>(
    cx: &Cx,
    conn: &C,
    generator: &SqlGenerator,
    desc: &TypeDescriptor<E>,
    key_values: &[Value],
) -> Outcome<u64, Error> {
    let sql = generator.delete_by_key_text(desc);
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let params = match coerce_keys(desc, key_values, &stmt) {
        Ok(params) => params,
        Err(e) => return Outcome::Err(e),
    };
    conn.execute_prepared(cx, &stmt, &params).await
}

#[allow(clippy::result_large_err)]
pub(crate) fn coerce_keys<E>(
    desc: &TypeDescriptor<E>,
    key_values: &[Value],
    stmt: &PreparedStatement,
) -> Result<Vec<Value>> {
    let mut keys = desc.key_columns();
    let params = key_values
        .iter()
        .enumerate()
        .map(|(position, value)| match keys.next() {
            Some(member) => relmap_core::to_column_value(
                member,
                value.clone(),
                stmt.param_type(position),
            ),
            None => Ok(value.clone()),
        })
        .collect::<Result<Vec<_>>>()?;
    stmt.check_params(&params)?;
    Ok(params)
}

/// Delete the row an instance was read from, by its own key values.
#[tracing::instrument(level = "debug", skip(cx, conn, generator, desc, entity), fields(entity = E::TYPE_NAME))]
pub async fn delete<C: Connection, E: Entity>(
    cx: &Cx,
    conn: &C,
    generator: &SqlGenerator,
    desc: &TypeDescriptor<E>,
    entity: &E,
) -> Outcome<u64, Error> {
    let sql = generator.delete_by_key_text(desc);
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let mut params = Vec::with_capacity(stmt.param_count());
    let bound = bind_members(
        desc,
        desc.key_columns(),
        entity,
        &stmt,
        SelfRefBinding::Strict,
        &mut params,
    )
    .and_then(|()| stmt.check_params(&params));
    if let Err(e) = bound {
        return Outcome::Err(e);
    }

    conn.execute_prepared(cx, &stmt, &params).await
}

/// Insert many instances as one driver batch.
///
/// Not available for self-referencing types: rows in one batch cannot see
/// each other's generated keys. Those fail before anything is prepared.
/// Returns the affected row count per instance.
#[tracing::instrument(level = "debug", skip(cx, conn, generator, desc, entities), fields(entity = E::TYPE_NAME, count = entities.len()))]
pub async fn insert_batch<C: Connection, E: Entity>(
    cx: &Cx,
    conn: &C,
    generator: &SqlGenerator,
    desc: &TypeDescriptor<E>,
    entities: &mut [E],
) -> Outcome<Vec<u64>, Error> {
    if let Some(member) = desc.self_join_member() {
        return Outcome::Err(Error::Unsupported(format!(
            "batched insert of {} is not supported: {}.{} references the same type and \
             batched rows cannot see each other's keys; use insert_sequential",
            desc.entity_name(),
            desc.entity_name(),
            member.member_name()
        )));
    }
    if entities.is_empty() {
        return Outcome::Ok(Vec::new());
    }

    let sql = generator.insert_text(desc);
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let rows = match entities
        .iter()
        .map(|entity| bind_insert(desc, entity, &stmt, SelfRefBinding::Strict))
        .collect::<Result<Vec<_>>>()
    {
        Ok(rows) => rows,
        Err(e) => return Outcome::Err(e),
    };

    let result = match conn.execute_batch(cx, &stmt, &rows).await {
        Outcome::Ok(result) => result,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    match result.generated_keys {
        Some(keys) if desc.has_generated_key() && keys.len() == entities.len() => {
            for (entity, key) in entities.iter_mut().zip(keys) {
                if let Err(e) = apply_generated_key(desc, entity, key) {
                    return Outcome::Err(e);
                }
            }
        }
        Some(keys) if desc.has_generated_key() => {
            tracing::warn!(
                entity = desc.entity_name(),
                rows = entities.len(),
                keys = keys.len(),
                "Driver reported a different number of generated keys than rows; keys not applied"
            );
        }
        _ => {}
    }

    tracing::debug!(entity = desc.entity_name(), rows = rows.len(), "Batch insert complete");
    Outcome::Ok(result.affected)
}

/// Insert instances one at a time.
///
/// Each generated key is known as soon as its row is written. For a
/// self-referencing type the reference columns are written NULL first, then
/// one UPDATE per set reference fills them in: a position resolves to the
/// key the referenced instance received, a raw key is written as is. A
/// reference read by `to_list` resolves by position while that position is
/// inside the slice, and by its raw key otherwise.
/// Returns the affected row count of each insert.
#[tracing::instrument(level = "debug", skip(cx, conn, generator, desc, entities), fields(entity = E::TYPE_NAME, count = entities.len()))]
pub async fn insert_sequential<C: Connection, E: Entity>(
    cx: &Cx,
    conn: &C,
    generator: &SqlGenerator,
    desc: &TypeDescriptor<E>,
    entities: &mut [E],
) -> Outcome<Vec<u64>, Error> {
    if let Err(e) = check_positions(desc, entities) {
        return Outcome::Err(e);
    }
    if entities.is_empty() {
        return Outcome::Ok(Vec::new());
    }

    let sql = generator.insert_text(desc);
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let mut affected = Vec::with_capacity(entities.len());
    for entity in entities.iter_mut() {
        match insert_one(cx, conn, &stmt, desc, entity, SelfRefBinding::Deferred).await {
            Outcome::Ok(count) => affected.push(count),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }

    let Some(sql) = generator.self_ref_update_text(desc) else {
        return Outcome::Ok(affected);
    };
    let stmt = match conn.prepare(cx, &sql).await {
        Outcome::Ok(stmt) => stmt,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let mut linked = 0usize;
    for position in 0..entities.len() {
        let params = match self_ref_params(desc, entities, position, &stmt) {
            Ok(Some(params)) => params,
            Ok(None) => continue,
            Err(e) => return Outcome::Err(e),
        };
        match conn.execute_prepared(cx, &stmt, &params).await {
            Outcome::Ok(_) => linked += 1,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }

    tracing::debug!(
        entity = desc.entity_name(),
        rows = affected.len(),
        linked = linked,
        "Sequential insert complete"
    );
    Outcome::Ok(affected)
}

/// Reject positions outside the list before anything is written.
#[allow(clippy::result_large_err)]
fn check_positions<E>(desc: &TypeDescriptor<E>, entities: &[E]) -> Result<()> {
    let (Some(join), Some(member)) = (desc.self_join(), desc.self_join_member()) else {
        return Ok(());
    };
    for (position, entity) in entities.iter().enumerate() {
        if let RefTarget::Index(index) = join.target(entity) {
            if *index >= entities.len() {
                return Err(Error::mapping(
                    desc.entity_name(),
                    member.member_name(),
                    "INDEX",
                    format!(
                        "instance {position} references position {index} of a list of {}",
                        entities.len()
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Parameters of the reference UPDATE for one instance; `None` when its
/// reference is unset.
#[allow(clippy::result_large_err)]
fn self_ref_params<E>(
    desc: &TypeDescriptor<E>,
    entities: &[E],
    position: usize,
    stmt: &PreparedStatement,
) -> Result<Option<Vec<Value>>> {
    let (Some(join), Some(member)) = (desc.self_join(), desc.self_join_member()) else {
        return Ok(None);
    };
    let key = &desc.members()[join.key_index()];
    let entity = &entities[position];

    let reference = match join.target(entity) {
        RefTarget::Unset => return Ok(None),
        RefTarget::Key(raw) => raw.clone(),
        RefTarget::Loaded { index, key: raw } if *index >= entities.len() => raw.clone(),
        RefTarget::Index(index) | RefTarget::Loaded { index, .. } => {
            let referenced = &entities[*index];
            if looks_unset(&key.accessor().get(referenced)) {
                return Err(Error::mapping(
                    desc.entity_name(),
                    member.member_name(),
                    "INDEX",
                    format!("instance {position} references instance {index}, which has no key"),
                ));
            }
            key.bind_value(referenced, stmt.param_type(0))?
        }
    };

    let params = vec![reference, key.bind_value(entity, stmt.param_type(1))?];
    stmt.check_params(&params)?;
    Ok(Some(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_keys() {
        assert!(looks_unset(&Value::Null));
        assert!(looks_unset(&Value::BigInt(0)));
        assert!(looks_unset(&Value::Int(-3)));
        assert!(looks_unset(&Value::Decimal("0.00".into())));
        assert!(looks_unset(&Value::Text(String::new())));
        assert!(!looks_unset(&Value::BigInt(7)));
        assert!(!looks_unset(&Value::Text("a-1".into())));
        assert!(!looks_unset(&Value::Bytes(vec![1])));
    }
}
