//! Metadata and type descriptors.
//!
//! A [`TypeDescriptor`] is everything the SQL generator and the pipelines
//! need to know about one mapped type. It is derived from the type's
//! [`MemberDef`]s once, validated, and never mutated afterwards: every column
//! list is precomputed here.

use crate::coerce::{self, CoercionRule};
use crate::entity::{AccessorPair, Entity, MemberDef, MemberType, RefTarget, SelfRefAccess};
use crate::error::{ConfigError, Error, Result};
use crate::identifiers::{Identifier, fold_case, unquote_label};
use crate::types::SqlType;
use crate::value::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

/// How the pipeline reaches a member.
pub enum MemberAccessor<E> {
    /// Direct field storage
    Field(AccessorPair<E>),
    /// Getter/setter method pair
    Property(AccessorPair<E>),
}

impl<E> MemberAccessor<E> {
    /// Read the member.
    pub fn get(&self, entity: &E) -> Value {
        match self {
            MemberAccessor::Field(pair) | MemberAccessor::Property(pair) => (pair.get)(entity),
        }
    }

    /// Write the member.
    #[allow(clippy::result_large_err)]
    pub fn set(&self, entity: &mut E, value: Value) -> Result<()> {
        match self {
            MemberAccessor::Field(pair) | MemberAccessor::Property(pair) => (pair.set)(entity, value),
        }
    }

    pub const fn is_property(&self) -> bool {
        matches!(self, MemberAccessor::Property(_))
    }
}

/// Cached mapping metadata for one member.
pub struct MetadataDescriptor<E> {
    entity: &'static str,
    member_name: &'static str,
    column: Identifier,
    table_qualifier: Option<Identifier>,
    is_key: bool,
    is_generated_key: bool,
    is_insertable: bool,
    is_updatable: bool,
    is_self_reference: bool,
    is_transient: bool,
    member_type: MemberType,
    coercion: CoercionRule,
    accessor: MemberAccessor<E>,
}

impl<E: 'static> MetadataDescriptor<E> {
    #[allow(clippy::result_large_err)]
    fn from_def(entity: &'static str, def: MemberDef<E>) -> Result<Self> {
        let coercion = CoercionRule::select(entity, &def)?;
        // a getter/setter pair, when declared, replaces direct field access
        let accessor = match def.property {
            Some(pair) => MemberAccessor::Property(pair),
            None => MemberAccessor::Field(def.field),
        };
        Ok(Self {
            entity,
            member_name: def.name,
            column: Identifier::resolve(def.column, def.name),
            table_qualifier: def.qualifier.map(|q| Identifier::resolve(Some(q), q)),
            is_key: def.key,
            is_generated_key: def.generated,
            is_insertable: def.insertable.unwrap_or(true),
            is_updatable: def.updatable.unwrap_or(true),
            is_self_reference: def.self_ref.is_some(),
            is_transient: def.transient,
            member_type: def.member_type,
            coercion,
            accessor,
        })
    }
}

impl<E> MetadataDescriptor<E> {
    /// Name of the owning entity type.
    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    pub fn member_name(&self) -> &'static str {
        self.member_name
    }

    /// Column lookup key: lower-cased unless delimited, never quoted.
    pub fn column_name(&self) -> &str {
        self.column.lookup_key()
    }

    /// Column as emitted into SQL: original case, quoted when delimited.
    pub fn case_sensitive_column_name(&self) -> &str {
        self.column.emitted()
    }

    pub fn column(&self) -> &Identifier {
        &self.column
    }

    pub fn is_delimited(&self) -> bool {
        self.column.is_delimited()
    }

    /// Qualifier used in SELECT text, when one was declared.
    pub fn table_qualifier(&self) -> Option<&str> {
        self.table_qualifier.as_ref().map(Identifier::emitted)
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_generated_key(&self) -> bool {
        self.is_generated_key
    }

    pub fn is_insertable(&self) -> bool {
        self.is_insertable
    }

    pub fn is_updatable(&self) -> bool {
        self.is_updatable
    }

    pub fn is_self_reference(&self) -> bool {
        self.is_self_reference
    }

    pub fn is_transient(&self) -> bool {
        self.is_transient
    }

    pub fn member_type(&self) -> MemberType {
        self.member_type
    }

    pub fn coercion(&self) -> &CoercionRule {
        &self.coercion
    }

    pub fn accessor(&self) -> &MemberAccessor<E> {
        &self.accessor
    }

    /// Read the member and coerce it for binding to a parameter of type `target`.
    #[allow(clippy::result_large_err)]
    pub fn bind_value(&self, entity: &E, target: Option<&SqlType>) -> Result<Value> {
        coerce::to_column_value(self, self.accessor.get(entity), target)
    }

    /// Coerce a column value and store it in the member.
    #[allow(clippy::result_large_err)]
    pub fn assign(&self, entity: &mut E, column_value: Value) -> Result<()> {
        let member_value = coerce::to_member_value(self, column_value)?;
        let shape = member_value.type_name();
        self.accessor.set(entity, member_value).map_err(|e| match e {
            Error::Mapping(_) => e,
            other => Error::mapping(self.entity, self.member_name, shape, other.to_string()),
        })
    }
}

impl<E> fmt::Debug for MetadataDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataDescriptor")
            .field("member_name", &self.member_name)
            .field("column", &self.column)
            .field("is_key", &self.is_key)
            .field("is_generated_key", &self.is_generated_key)
            .field("is_insertable", &self.is_insertable)
            .field("is_updatable", &self.is_updatable)
            .field("is_self_reference", &self.is_self_reference)
            .field("is_transient", &self.is_transient)
            .field("coercion", &self.coercion)
            .finish_non_exhaustive()
    }
}

/// The self-reference of a type: which member holds it and how to reach
/// its [`RefTarget`].
pub struct SelfJoinDescriptor<E> {
    member: usize,
    key: usize,
    access: SelfRefAccess<E>,
}

impl<E> SelfJoinDescriptor<E> {
    /// Position of the self-reference member in [`TypeDescriptor::members`].
    pub fn member_index(&self) -> usize {
        self.member
    }

    /// Position of the key member the reference resolves through.
    pub fn key_index(&self) -> usize {
        self.key
    }

    pub fn target<'e>(&self, entity: &'e E) -> &'e RefTarget {
        (self.access.get)(entity)
    }

    pub fn target_mut<'e>(&self, entity: &'e mut E) -> &'e mut RefTarget {
        (self.access.get_mut)(entity)
    }
}

/// Cached mapping metadata for one host type.
pub struct TypeDescriptor<E> {
    entity: &'static str,
    table: Identifier,
    members: Vec<MetadataDescriptor<E>>,
    all_columns: Vec<usize>,
    key_columns: Vec<usize>,
    columns_excluding_keys: Vec<usize>,
    insertable_columns: Vec<usize>,
    updatable_columns: Vec<usize>,
    generated_key: Option<usize>,
    self_join: Option<SelfJoinDescriptor<E>>,
    exact_lookup: HashMap<String, usize>,
    folded_lookup: HashMap<String, usize>,
}

impl<E: Entity> TypeDescriptor<E> {
    /// Scan `E`'s markers and build its descriptor.
    ///
    /// Fails with [`Error::Config`] when the markers are inconsistent:
    /// more than one generated key, a generated key next to other keys, a
    /// self-reference to another type, a self-referencing type without
    /// exactly one key, an uninstantiable converter, or two members sharing
    /// a column.
    #[allow(clippy::result_large_err)]
    pub fn build() -> Result<Self> {
        let entity = E::TYPE_NAME;
        let defs = E::members();

        let generated: Vec<&str> = defs.iter().filter(|d| d.generated).map(|d| d.name).collect();
        if generated.len() > 1 {
            return Err(config(format!(
                "{} declares {} generated keys ({}); at most one is allowed",
                entity,
                generated.len(),
                generated.join(", ")
            )));
        }
        let keys: Vec<&str> = defs
            .iter()
            .filter(|d| d.key && !d.transient)
            .map(|d| d.name)
            .collect();
        if !generated.is_empty() && keys.len() > 1 {
            return Err(config(format!(
                "{} combines generated key {} with {} key members ({}); a generated key must be the only key",
                entity,
                generated[0],
                keys.len(),
                keys.join(", ")
            )));
        }

        let mut self_ref: Option<(usize, SelfRefAccess<E>)> = None;
        for (index, def) in defs.iter().enumerate() {
            let Some(marker) = &def.self_ref else {
                continue;
            };
            let access = match marker.access {
                Some(access) if marker.target == TypeId::of::<E>() => access,
                _ => {
                    return Err(config(format!(
                        "{}.{} references {}; only references to {} itself are supported",
                        entity,
                        def.name,
                        marker.target_name,
                        entity
                    )));
                }
            };
            if let Some((first, _)) = self_ref {
                return Err(config(format!(
                    "{} declares two self-references ({} and {})",
                    entity, defs[first].name, def.name
                )));
            }
            self_ref = Some((index, access));
        }
        if self_ref.is_some() && keys.len() != 1 {
            return Err(config(format!(
                "{} has a self-reference but {} key members; exactly one key is required",
                entity,
                keys.len()
            )));
        }

        let members = defs
            .into_iter()
            .map(|def| MetadataDescriptor::from_def(entity, def))
            .collect::<Result<Vec<_>>>()?;

        let mut exact_lookup: HashMap<String, usize> = HashMap::new();
        let mut folded_lookup: HashMap<String, usize> = HashMap::new();
        let mut all_columns = Vec::new();
        let mut key_columns = Vec::new();
        let mut columns_excluding_keys = Vec::new();
        let mut insertable_columns = Vec::new();
        let mut updatable_columns = Vec::new();
        let mut generated_key = None;

        for (index, member) in members.iter().enumerate() {
            if member.is_transient {
                continue;
            }
            let lookup = if member.is_delimited() {
                &mut exact_lookup
            } else {
                &mut folded_lookup
            };
            match lookup.entry(member.column_name().to_string()) {
                Entry::Occupied(existing) => {
                    return Err(config(format!(
                        "{}.{} and {}.{} both map to column {}",
                        entity,
                        members[*existing.get()].member_name,
                        entity,
                        member.member_name,
                        member.case_sensitive_column_name()
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
            }

            all_columns.push(index);
            if member.is_key {
                key_columns.push(index);
            } else {
                columns_excluding_keys.push(index);
                if member.is_updatable {
                    updatable_columns.push(index);
                }
            }
            if member.is_generated_key {
                generated_key = Some(index);
            } else if member.is_insertable {
                insertable_columns.push(index);
            }
        }

        let self_join = self_ref.map(|(member, access)| SelfJoinDescriptor {
            member,
            key: key_columns[0],
            access,
        });

        let table = Identifier::resolve(E::TABLE, entity);
        tracing::debug!(
            entity = entity,
            table = %table,
            columns = all_columns.len(),
            keys = key_columns.len(),
            generated_key = generated_key.is_some(),
            self_join = self_join.is_some(),
            "Built type descriptor"
        );

        Ok(Self {
            entity,
            table,
            members,
            all_columns,
            key_columns,
            columns_excluding_keys,
            insertable_columns,
            updatable_columns,
            generated_key,
            self_join,
            exact_lookup,
            folded_lookup,
        })
    }
}

impl<E> TypeDescriptor<E> {
    pub fn entity_name(&self) -> &'static str {
        self.entity
    }

    /// Table lookup key.
    pub fn table_name(&self) -> &str {
        self.table.lookup_key()
    }

    /// Table as emitted into SQL.
    pub fn table(&self) -> &Identifier {
        &self.table
    }

    /// Every scanned member, transient ones included, in declared order.
    pub fn members(&self) -> &[MetadataDescriptor<E>] {
        &self.members
    }

    /// Member by its name in the host type.
    pub fn member(&self, name: &str) -> Option<&MetadataDescriptor<E>> {
        self.members.iter().find(|m| m.member_name == name)
    }

    pub fn all_columns(&self) -> impl ExactSizeIterator<Item = &MetadataDescriptor<E>> {
        self.pick(&self.all_columns)
    }

    pub fn key_columns(&self) -> impl ExactSizeIterator<Item = &MetadataDescriptor<E>> {
        self.pick(&self.key_columns)
    }

    pub fn columns_excluding_keys(&self) -> impl ExactSizeIterator<Item = &MetadataDescriptor<E>> {
        self.pick(&self.columns_excluding_keys)
    }

    pub fn insertable_columns(&self) -> impl ExactSizeIterator<Item = &MetadataDescriptor<E>> {
        self.pick(&self.insertable_columns)
    }

    pub fn updatable_columns(&self) -> impl ExactSizeIterator<Item = &MetadataDescriptor<E>> {
        self.pick(&self.updatable_columns)
    }

    fn pick<'a>(&'a self, indices: &'a [usize]) -> impl ExactSizeIterator<Item = &'a MetadataDescriptor<E>> {
        indices.iter().map(move |&i| &self.members[i])
    }

    pub fn has_generated_key(&self) -> bool {
        self.generated_key.is_some()
    }

    pub fn generated_key(&self) -> Option<&MetadataDescriptor<E>> {
        self.generated_key.map(|i| &self.members[i])
    }

    pub fn self_join(&self) -> Option<&SelfJoinDescriptor<E>> {
        self.self_join.as_ref()
    }

    /// Member holding the self-reference, if any.
    pub fn self_join_member(&self) -> Option<&MetadataDescriptor<E>> {
        self.self_join.as_ref().map(|sj| &self.members[sj.member])
    }

    /// Resolve a result column label to its member.
    ///
    /// A delimited column matches only its exact-case name; any other column
    /// matches case-insensitively. Table prefixes on the label are ignored.
    pub fn column_for_label(&self, label: &str) -> Option<&MetadataDescriptor<E>> {
        let bare = unquote_label(label);
        self.exact_lookup
            .get(bare)
            .or_else(|| self.folded_lookup.get(&fold_case(bare)))
            .map(|&i| &self.members[i])
    }
}

impl<E> fmt::Debug for TypeDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("entity", &self.entity)
            .field("table", &self.table)
            .field("members", &self.members)
            .field("generated_key", &self.generated_key)
            .finish_non_exhaustive()
    }
}

fn config(message: String) -> Error {
    Error::Config(ConfigError::new(message))
}
