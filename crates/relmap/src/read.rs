//! Result rows to instances.
//!
//! Every row is hydrated into a fresh `Default` instance. Self-reference
//! columns are held back during hydration: a single row gets the raw value
//! as [`RefTarget::Key`], while [`to_list`] resolves them against the whole
//! result in a second pass.

use relmap_core::{Entity, RefTarget, Result, Row, TypeDescriptor, Value};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// One hydrated row.
struct Hydrated<E> {
    entity: E,
    /// Raw value of the self-reference column, when it was non-NULL
    self_ref: Option<Value>,
    /// Raw value of the key a self-reference resolves through
    key: Option<Value>,
}

fn hydrate<E: Entity>(desc: &TypeDescriptor<E>, row: &Row) -> Result<Hydrated<E>> {
    let mut entity = E::default();
    let mut self_ref = None;
    let mut key = None;
    let tracks_key = desc.self_join().is_some();

    for (label, value) in row.iter() {
        if value.is_null() {
            continue;
        }
        let Some(member) = desc.column_for_label(label) else {
            tracing::trace!(entity = desc.entity_name(), label = label, "Skipping unmapped column");
            continue;
        };
        if member.is_self_reference() {
            self_ref = Some(value.clone());
            continue;
        }
        if tracks_key && member.is_key() {
            key = Some(value.clone());
        }
        member.assign(&mut entity, value.clone())?;
    }

    Ok(Hydrated {
        entity,
        self_ref,
        key,
    })
}

fn finish_single<E: Entity>(desc: &TypeDescriptor<E>, hydrated: Hydrated<E>) -> E {
    let mut entity = hydrated.entity;
    if let (Some(join), Some(raw)) = (desc.self_join(), hydrated.self_ref) {
        *join.target_mut(&mut entity) = RefTarget::Key(raw);
    }
    entity
}

/// Map one row. A self-reference is kept as the raw key it holds.
#[allow(clippy::result_large_err)]
pub fn map_row<E: Entity>(desc: &TypeDescriptor<E>, row: &Row) -> Result<E> {
    hydrate(desc, row).map(|hydrated| finish_single(desc, hydrated))
}

/// Map the first row of a result; `None` when there are no rows.
#[allow(clippy::result_large_err)]
pub fn to_object<E: Entity>(desc: &TypeDescriptor<E>, rows: &[Row]) -> Result<Option<E>> {
    rows.first().map(|row| map_row(desc, row)).transpose()
}

/// Map every row of a result.
///
/// For a self-referencing type each reference is resolved to the position
/// of the referenced row in the returned `Vec`, keeping the raw key so the
/// instance can be written back. A reference to a row outside the result
/// stays unset.
#[allow(clippy::result_large_err)]
pub fn to_list<E: Entity>(desc: &TypeDescriptor<E>, rows: &[Row]) -> Result<Vec<E>> {
    let Some(join) = desc.self_join() else {
        return rows.iter().map(|row| map_row(desc, row)).collect();
    };

    // pass one: every instance, its position by key, and the pending references
    let mut entities = Vec::with_capacity(rows.len());
    let mut pending = Vec::new();
    let mut positions: HashMap<IndexKey, usize> = HashMap::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        let hydrated = hydrate(desc, row)?;
        if let Some(key) = hydrated.key.as_ref().and_then(IndexKey::of) {
            match positions.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(position);
                }
                Entry::Occupied(_) => {
                    tracing::trace!(
                        entity = desc.entity_name(),
                        position = position,
                        "Duplicate key in result; references resolve to the first row"
                    );
                }
            }
        }
        if let Some(raw) = hydrated.self_ref {
            pending.push((position, raw));
        }
        entities.push(hydrated.entity);
    }

    // pass two: only after the whole result has been consumed
    let mut unresolved = 0usize;
    for (position, raw) in pending {
        match IndexKey::of(&raw).and_then(|key| positions.get(&key)) {
            Some(&target) => {
                *join.target_mut(&mut entities[position]) = RefTarget::Loaded {
                    index: target,
                    key: raw,
                };
            }
            None => {
                unresolved += 1;
                tracing::warn!(
                    entity = desc.entity_name(),
                    position = position,
                    value = ?raw,
                    "Self-reference points outside the result; leaving it unset"
                );
            }
        }
    }

    tracing::debug!(
        entity = desc.entity_name(),
        rows = entities.len(),
        unresolved = unresolved,
        "Mapped result list"
    );
    Ok(entities)
}

/// A key value normalized for matching references against keys.
///
/// Integers of every width, integral decimals and integral floats compare
/// equal when they denote the same number. Text in canonical integer form
/// (`"10"`, `"-3"`) joins them, so a TEXT reference column finds an integer
/// key; `"010"` or `"10.0"` stay text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    Integer(i128),
    Text(String),
    Bytes(Vec<u8>),
    Other(String),
}

impl IndexKey {
    fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null | Value::Default => return None,
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                IndexKey::Integer(value.as_i128()?)
            }
            Value::Decimal(text) => match integral_decimal(text) {
                Some(whole) => IndexKey::Integer(whole),
                None => IndexKey::Other(text.trim().to_string()),
            },
            Value::Double(f) => {
                integral_float(*f).map_or_else(|| IndexKey::Other(f.to_string()), IndexKey::Integer)
            }
            Value::Float(f) => integral_float(f64::from(*f))
                .map_or_else(|| IndexKey::Other(f.to_string()), IndexKey::Integer),
            Value::Text(text) => canonical_integer(text)
                .map_or_else(|| IndexKey::Text(text.clone()), IndexKey::Integer),
            Value::Bytes(bytes) => IndexKey::Bytes(bytes.clone()),
            other => IndexKey::Other(format!("{other:?}")),
        })
    }
}

fn canonical_integer(text: &str) -> Option<i128> {
    text.parse::<i128>().ok().filter(|n| n.to_string() == text)
}

fn integral_decimal(text: &str) -> Option<i128> {
    let text = text.trim();
    if text.contains(['e', 'E']) {
        return text.parse::<f64>().ok().and_then(integral_float);
    }
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    if !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse().ok()
}

#[allow(clippy::cast_possible_truncation)]
fn integral_float(f: f64) -> Option<i128> {
    // 2^127 bounds the i128 range
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1.7e38 {
        Some(f as i128)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{FromValue, MemberDef, MemberType, RefField, SelfRef, SelfRefDef};

    #[derive(Debug, Default)]
    struct Node {
        id: i64,
        label: String,
        parent: SelfRef<Node>,
    }

    impl Entity for Node {
        const TYPE_NAME: &'static str = "Node";

        fn members() -> Vec<MemberDef<Self>> {
            vec![
                MemberDef::new(
                    "id",
                    MemberType::Int64,
                    |n: &Node| Value::BigInt(n.id),
                    |n: &mut Node, v: Value| {
                        n.id = FromValue::from_value(&v)?;
                        Ok(())
                    },
                )
                .key(),
                MemberDef::new(
                    "label",
                    MemberType::Text,
                    |n: &Node| Value::Text(n.label.clone()),
                    |n: &mut Node, v: Value| {
                        n.label = FromValue::from_value(&v)?;
                        Ok(())
                    },
                )
                .column("\"Label\""),
                MemberDef::new(
                    "parent",
                    MemberType::SelfRef,
                    |n: &Node| n.parent.column_value(),
                    |n: &mut Node, v: Value| {
                        n.parent.assign_key(v);
                        Ok(())
                    },
                )
                .column("parent_id")
                .self_ref(SelfRefDef::new::<SelfRef<Node>>(
                    |n: &Node| n.parent.ref_target(),
                    |n: &mut Node| n.parent.ref_target_mut(),
                )),
            ]
        }
    }

    fn row(id: Value, label: &str, parent: Value) -> Row {
        Row::new(
            vec!["n.ID".into(), "\"Label\"".into(), "parent_id".into(), "extra".into()],
            vec![id, Value::Text(label.into()), parent, Value::Int(9)],
        )
    }

    fn desc() -> TypeDescriptor<Node> {
        TypeDescriptor::build().unwrap()
    }

    #[test]
    fn to_object_of_empty_result_is_none() {
        assert!(to_object(&desc(), &[]).unwrap().is_none());
    }

    #[test]
    fn to_object_keeps_raw_key() {
        let rows = [row(Value::Int(2), "child", Value::Int(1))];
        let node = to_object(&desc(), &rows).unwrap().unwrap();
        assert_eq!(node.id, 2);
        assert_eq!(node.label, "child");
        assert_eq!(node.parent.target(), &RefTarget::Key(Value::Int(1)));
    }

    #[test]
    fn null_columns_leave_defaults() {
        let rows = [row(Value::Int(3), "root", Value::Null)];
        let node = map_row(&desc(), &rows[0]).unwrap();
        assert!(!node.parent.is_set());
    }

    #[test]
    fn delimited_label_needs_exact_case() {
        let r = Row::new(vec!["id".into(), "label".into()], vec![Value::Int(1), Value::Text("x".into())]);
        let node = map_row(&desc(), &r).unwrap();
        assert_eq!(node.label, "");
    }

    #[test]
    fn to_list_resolves_references_to_positions() {
        let rows = [
            row(Value::BigInt(10), "root", Value::Null),
            row(Value::BigInt(11), "child", Value::Decimal("10.000".into())),
            row(Value::BigInt(12), "grandchild", Value::Int(11)),
            row(Value::BigInt(13), "orphan", Value::Int(99)),
        ];
        let nodes = to_list(&desc(), &rows).unwrap();
        assert_eq!(nodes.len(), 4);
        assert!(!nodes[0].parent.is_set());
        assert_eq!(nodes[1].parent.index(), Some(0));
        assert_eq!(nodes[1].parent.target().key(), Some(&Value::Decimal("10.000".into())));
        assert_eq!(nodes[2].parent.index(), Some(1));
        assert_eq!(nodes[2].parent.resolve(&nodes).map(|n| n.label.as_str()), Some("child"));
        assert!(!nodes[3].parent.is_set());
    }

    #[test]
    fn forward_references_resolve() {
        let rows = [
            row(Value::Int(2), "child", Value::Int(1)),
            row(Value::Int(1), "root", Value::Null),
        ];
        let nodes = to_list(&desc(), &rows).unwrap();
        assert_eq!(nodes[0].parent.index(), Some(1));
    }

    #[test]
    fn text_references_find_integer_keys() {
        let rows = [
            row(Value::BigInt(10), "root", Value::Null),
            row(Value::BigInt(11), "child", Value::Text("10".into())),
            row(Value::BigInt(12), "padded", Value::Text("010".into())),
        ];
        let nodes = to_list(&desc(), &rows).unwrap();
        assert_eq!(nodes[1].parent.index(), Some(0));
        assert!(!nodes[2].parent.is_set());
    }

    #[test]
    fn empty_result_is_empty_list() {
        assert!(to_list(&desc(), &[]).unwrap().is_empty());
    }

    #[test]
    fn index_keys_normalize_numbers() {
        assert_eq!(IndexKey::of(&Value::Int(5)), IndexKey::of(&Value::BigInt(5)));
        assert_eq!(IndexKey::of(&Value::Decimal("5.000".into())), Some(IndexKey::Integer(5)));
        assert_eq!(IndexKey::of(&Value::Decimal("5E0".into())), Some(IndexKey::Integer(5)));
        assert_eq!(IndexKey::of(&Value::Double(5.0)), Some(IndexKey::Integer(5)));
        assert_ne!(IndexKey::of(&Value::Decimal("5.5".into())), Some(IndexKey::Integer(5)));
        assert_eq!(IndexKey::of(&Value::Null), None);
        assert_eq!(IndexKey::of(&Value::Text("a".into())), Some(IndexKey::Text("a".into())));
        assert_eq!(IndexKey::of(&Value::Text("10".into())), IndexKey::of(&Value::Int(10)));
        assert_eq!(IndexKey::of(&Value::Text("-3".into())), Some(IndexKey::Integer(-3)));
        assert_eq!(IndexKey::of(&Value::Text("010".into())), Some(IndexKey::Text("010".into())));
        assert_eq!(IndexKey::of(&Value::Text("+10".into())), Some(IndexKey::Text("+10".into())));
    }
}
