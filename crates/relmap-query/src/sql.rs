//! SQL text generation from type descriptors.
//!
//! Every statement is derived only from a [`TypeDescriptor`]'s precomputed
//! column lists, so text for a type never changes once built. INSERT, UPDATE
//! and SELECT-by-clause text is memoized in bounded LRU caches.

use crate::cache::LruCache;
use regex::Regex;
use relmap_core::{MetadataDescriptor, TypeDescriptor};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt::Write;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};

/// Default number of entries held by each SQL text cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Positional parameter marker written into generated SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?` at every position
    #[default]
    Question,
    /// `$1`, `$2`, ... numbered across the whole statement
    Dollar,
}

impl PlaceholderStyle {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${index}"),
        }
    }
}

/// Does a caller-supplied clause already carry its own WHERE or JOIN?
fn clause_has_keyword(clause: &str) -> bool {
    static KEYWORD: OnceLock<Option<Regex>> = OnceLock::new();
    match KEYWORD.get_or_init(|| Regex::new(r"(?i)where|join").ok()) {
        Some(re) => re.is_match(clause),
        None => {
            let lower = clause.to_ascii_lowercase();
            lower.contains("where") || lower.contains("join")
        }
    }
}

/// Running parameter counter for one statement.
struct Params {
    style: PlaceholderStyle,
    next: usize,
}

impl Params {
    fn new(style: PlaceholderStyle) -> Self {
        Self { style, next: 1 }
    }

    fn next(&mut self) -> String {
        let marker = self.style.placeholder(self.next);
        self.next += 1;
        marker
    }
}

fn key_where<'a, E: 'a>(
    sql: &mut String,
    keys: impl Iterator<Item = &'a MetadataDescriptor<E>>,
    params: &mut Params,
) {
    let clause: Vec<String> = keys
        .map(|m| format!("{} = {}", m.case_sensitive_column_name(), params.next()))
        .collect();
    if !clause.is_empty() {
        let _ = write!(sql, " WHERE {}", clause.join(" AND "));
    }
}

/// `INSERT INTO t (a, b) VALUES (?, ?)` over the insertable columns.
///
/// A type with nothing to insert (only a generated key, say) gets
/// `INSERT INTO t DEFAULT VALUES`.
pub fn render_insert<E>(desc: &TypeDescriptor<E>, style: PlaceholderStyle) -> String {
    let mut params = Params::new(style);
    let (columns, markers): (Vec<&str>, Vec<String>) = desc
        .insertable_columns()
        .map(|m| (m.case_sensitive_column_name(), params.next()))
        .unzip();
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", desc.table());
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        desc.table(),
        columns.join(", "),
        markers.join(", ")
    )
}

/// `UPDATE t SET a = ?, b = ? WHERE k = ?` over the updatable columns.
///
/// `None` when the type has no updatable columns: there is no valid SET list.
pub fn render_update<E>(desc: &TypeDescriptor<E>, style: PlaceholderStyle) -> Option<String> {
    desc.updatable_columns().next()?;
    Some(update_statement(desc, style))
}

fn update_statement<E>(desc: &TypeDescriptor<E>, style: PlaceholderStyle) -> String {
    let mut params = Params::new(style);
    let assignments: Vec<String> = desc
        .updatable_columns()
        .map(|m| format!("{} = {}", m.case_sensitive_column_name(), params.next()))
        .collect();
    let mut sql = format!("UPDATE {} SET {}", desc.table(), assignments.join(", "));
    key_where(&mut sql, desc.key_columns(), &mut params);
    sql
}

/// `SELECT q.a, q.b FROM t`, followed by the clause when one is given.
///
/// A clause containing WHERE or JOIN (any case) is appended after a single
/// space; any other non-empty clause gets a synthesized ` WHERE `.
pub fn render_select<E>(desc: &TypeDescriptor<E>, clause: Option<&str>) -> String {
    let table = desc.table().emitted();
    let columns: Vec<String> = desc
        .all_columns()
        .map(|m| {
            format!(
                "{}.{}",
                m.table_qualifier().unwrap_or(table),
                m.case_sensitive_column_name()
            )
        })
        .collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
    match clause {
        Some(clause) if !clause.trim().is_empty() => {
            if clause_has_keyword(clause) {
                sql.push(' ');
            } else {
                sql.push_str(" WHERE ");
            }
            sql.push_str(clause);
        }
        _ => {}
    }
    sql
}

/// `DELETE FROM t WHERE k = ?` over the key columns.
pub fn render_delete_by_key<E>(desc: &TypeDescriptor<E>, style: PlaceholderStyle) -> String {
    let mut sql = format!("DELETE FROM {}", desc.table());
    key_where(&mut sql, desc.key_columns(), &mut Params::new(style));
    sql
}

/// SELECT text restricted to one row by its key columns.
pub fn render_select_by_key<E>(desc: &TypeDescriptor<E>, style: PlaceholderStyle) -> String {
    let mut sql = render_select(desc, None);
    key_where(&mut sql, desc.key_columns(), &mut Params::new(style));
    sql
}

/// `UPDATE t SET parent = ? WHERE k = ?` for a self-referencing type.
pub fn render_self_ref_update<E>(desc: &TypeDescriptor<E>, style: PlaceholderStyle) -> Option<String> {
    let member = desc.self_join_member()?;
    let mut params = Params::new(style);
    let mut sql = format!(
        "UPDATE {} SET {} = {}",
        desc.table(),
        member.case_sensitive_column_name(),
        params.next()
    );
    key_where(&mut sql, desc.key_columns(), &mut params);
    Some(sql)
}

/// Sizes of the three text caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub insert: usize,
    pub update: usize,
    pub select: usize,
}

type SelectKey = (TypeId, Option<String>);

/// SQL text generator with memoized INSERT, UPDATE and SELECT text.
///
/// Text is built outside the cache locks; when two callers miss on the same
/// key at once both build identical text and the last write wins.
#[derive(Debug)]
pub struct SqlGenerator {
    style: PlaceholderStyle,
    insert: Mutex<LruCache<TypeId>>,
    update: Mutex<LruCache<TypeId>>,
    select: Mutex<LruCache<SelectKey>>,
}

impl SqlGenerator {
    /// Create a generator whose caches hold `capacity` entries each.
    pub fn new(capacity: usize, style: PlaceholderStyle) -> Self {
        Self {
            style,
            insert: Mutex::new(LruCache::new(capacity)),
            update: Mutex::new(LruCache::new(capacity)),
            select: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.style
    }

    pub fn insert_text<E: 'static>(&self, desc: &TypeDescriptor<E>) -> Arc<str> {
        cached(&self.insert, "insert", TypeId::of::<E>(), || {
            render_insert(desc, self.style)
        })
    }

    /// UPDATE text for the type, or `None` when it has no updatable columns.
    pub fn update_text<E: 'static>(&self, desc: &TypeDescriptor<E>) -> Option<Arc<str>> {
        desc.updatable_columns().next()?;
        Some(cached(&self.update, "update", TypeId::of::<E>(), || {
            update_statement(desc, self.style)
        }))
    }

    pub fn select_text<E: 'static>(&self, desc: &TypeDescriptor<E>, clause: Option<&str>) -> Arc<str> {
        let clause = clause.filter(|c| !c.trim().is_empty());
        let key = (TypeId::of::<E>(), clause.map(str::to_string));
        cached(&self.select, "select", key, || render_select(desc, clause))
    }

    pub fn delete_by_key_text<E>(&self, desc: &TypeDescriptor<E>) -> Arc<str> {
        Arc::from(render_delete_by_key(desc, self.style))
    }

    pub fn select_by_key_text<E>(&self, desc: &TypeDescriptor<E>) -> Arc<str> {
        Arc::from(render_select_by_key(desc, self.style))
    }

    /// Text for the second pass of a sequential insert; `None` when the type
    /// has no self-reference.
    pub fn self_ref_update_text<E>(&self, desc: &TypeDescriptor<E>) -> Option<Arc<str>> {
        render_self_ref_update(desc, self.style).map(Arc::from)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            insert: lock(&self.insert).len(),
            update: lock(&self.update).len(),
            select: lock(&self.select).len(),
        }
    }

    /// Drop every cached statement.
    pub fn clear(&self) {
        lock(&self.insert).clear();
        lock(&self.update).clear();
        lock(&self.select).clear();
    }
}

impl Default for SqlGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, PlaceholderStyle::default())
    }
}

fn lock<K>(cache: &Mutex<LruCache<K>>) -> std::sync::MutexGuard<'_, LruCache<K>> {
    // the cache holds nothing a panicking thread could leave half-written
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

fn cached<K: Eq + Hash + Clone + std::fmt::Debug>(
    cache: &Mutex<LruCache<K>>,
    kind: &'static str,
    key: K,
    build: impl FnOnce() -> String,
) -> Arc<str> {
    if let Some(sql) = lock(cache).get(&key) {
        tracing::trace!(kind, ?key, "SQL text cache hit");
        return sql;
    }
    tracing::trace!(kind, ?key, "SQL text cache miss");
    let sql: Arc<str> = Arc::from(build());
    if let Some(evicted) = lock(cache).insert(key, Arc::clone(&sql)) {
        tracing::trace!(kind, ?evicted, "SQL text cache eviction");
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{Entity, FromValue, MemberDef, MemberType, RefField, SelfRef, SelfRefDef, Value};

    fn text<E: 'static>(name: &'static str, get: fn(&E) -> String, set: fn(&mut E, String)) -> MemberDef<E> {
        MemberDef::new(
            name,
            MemberType::Text,
            move |e: &E| Value::Text(get(e)),
            move |e: &mut E, v: Value| {
                set(e, FromValue::from_value(&v)?);
                Ok(())
            },
        )
    }

    fn int<E: 'static>(name: &'static str, get: fn(&E) -> i64, set: fn(&mut E, i64)) -> MemberDef<E> {
        MemberDef::new(
            name,
            MemberType::Int64,
            move |e: &E| Value::BigInt(get(e)),
            move |e: &mut E, v: Value| {
                set(e, FromValue::from_value(&v)?);
                Ok(())
            },
        )
    }

    #[derive(Default)]
    struct Account {
        id: i64,
        owner: String,
        created: String,
        note: String,
    }

    impl Entity for Account {
        const TYPE_NAME: &'static str = "Account";

        fn members() -> Vec<MemberDef<Self>> {
            vec![
                int("id", |a: &Account| a.id, |a, v| a.id = v).generated(),
                text("owner", |a: &Account| a.owner.clone(), |a, v| a.owner = v).column("\"Owner\""),
                text("created", |a: &Account| a.created.clone(), |a, v| a.created = v)
                    .updatable(false),
                text("note", |a: &Account| a.note.clone(), |a, v| a.note = v).transient(),
            ]
        }
    }

    #[derive(Default)]
    struct Pair {
        left: i64,
        right: i64,
        label: String,
    }

    impl Entity for Pair {
        const TYPE_NAME: &'static str = "Pair";
        const TABLE: Option<&'static str> = Some("pairs");

        fn members() -> Vec<MemberDef<Self>> {
            vec![
                int("left", |p: &Pair| p.left, |p, v| p.left = v).key(),
                int("right", |p: &Pair| p.right, |p, v| p.right = v).key(),
                text("label", |p: &Pair| p.label.clone(), |p, v| p.label = v).qualifier("p"),
            ]
        }
    }

    #[derive(Default)]
    struct Log {
        line: String,
    }

    impl Entity for Log {
        const TYPE_NAME: &'static str = "Log";

        fn members() -> Vec<MemberDef<Self>> {
            vec![text("line", |l: &Log| l.line.clone(), |l, v| l.line = v)]
        }
    }

    #[derive(Default)]
    struct Node {
        id: i64,
        parent: SelfRef<Node>,
    }

    impl Entity for Node {
        const TYPE_NAME: &'static str = "Node";

        fn members() -> Vec<MemberDef<Self>> {
            vec![
                int("id", |n: &Node| n.id, |n, v| n.id = v).key(),
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
                    |n| n.parent.ref_target(),
                    |n| n.parent.ref_target_mut(),
                )),
            ]
        }
    }

    #[derive(Default)]
    struct HeroTeam {
        hero: i64,
        team: i64,
    }

    impl Entity for HeroTeam {
        const TYPE_NAME: &'static str = "HeroTeam";
        const TABLE: Option<&'static str> = Some("hero_team");

        fn members() -> Vec<MemberDef<Self>> {
            vec![
                int("hero", |h: &HeroTeam| h.hero, |h, v| h.hero = v).key(),
                int("team", |h: &HeroTeam| h.team, |h, v| h.team = v).key(),
            ]
        }
    }

    #[derive(Default)]
    struct Ticket {
        id: i64,
    }

    impl Entity for Ticket {
        const TYPE_NAME: &'static str = "Ticket";

        fn members() -> Vec<MemberDef<Self>> {
            vec![int("id", |t: &Ticket| t.id, |t, v| t.id = v).generated()]
        }
    }

    fn account() -> TypeDescriptor<Account> {
        TypeDescriptor::build().unwrap()
    }

    fn pair() -> TypeDescriptor<Pair> {
        TypeDescriptor::build().unwrap()
    }

    #[test]
    fn insert_skips_generated_key_and_transient_members() {
        assert_eq!(
            render_insert(&account(), PlaceholderStyle::Question),
            "INSERT INTO Account (\"Owner\", created) VALUES (?, ?)"
        );
        assert_eq!(
            render_insert(&pair(), PlaceholderStyle::Dollar),
            "INSERT INTO pairs (left, right, label) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn update_sets_updatable_columns_then_keys() {
        assert_eq!(
            render_update(&account(), PlaceholderStyle::Question).as_deref(),
            Some("UPDATE Account SET \"Owner\" = ? WHERE id = ?")
        );
        assert_eq!(
            render_update(&pair(), PlaceholderStyle::Dollar).as_deref(),
            Some("UPDATE pairs SET label = $1 WHERE left = $2 AND right = $3")
        );
    }

    #[test]
    fn keyless_types_get_no_where_clause() {
        let log = TypeDescriptor::<Log>::build().unwrap();
        assert_eq!(
            render_update(&log, PlaceholderStyle::Question).as_deref(),
            Some("UPDATE Log SET line = ?")
        );
        assert_eq!(render_delete_by_key(&log, PlaceholderStyle::Question), "DELETE FROM Log");
    }

    #[test]
    fn key_only_types_have_no_update_text() {
        let link = TypeDescriptor::<HeroTeam>::build().unwrap();
        assert!(render_update(&link, PlaceholderStyle::Question).is_none());
        assert_eq!(
            render_insert(&link, PlaceholderStyle::Question),
            "INSERT INTO hero_team (hero, team) VALUES (?, ?)"
        );

        let generator = SqlGenerator::default();
        assert!(generator.update_text(&link).is_none());
        assert_eq!(generator.stats().update, 0);
    }

    #[test]
    fn generated_key_only_inserts_default_values() {
        let ticket = TypeDescriptor::<Ticket>::build().unwrap();
        assert_eq!(
            render_insert(&ticket, PlaceholderStyle::Dollar),
            "INSERT INTO Ticket DEFAULT VALUES"
        );
        assert!(render_update(&ticket, PlaceholderStyle::Dollar).is_none());
        assert_eq!(
            render_delete_by_key(&ticket, PlaceholderStyle::Dollar),
            "DELETE FROM Ticket WHERE id = $1"
        );
    }

    #[test]
    fn select_qualifies_columns() {
        assert_eq!(
            render_select(&pair(), None),
            "SELECT pairs.left, pairs.right, p.label FROM pairs"
        );
        assert_eq!(
            render_select(&account(), Some("")),
            "SELECT Account.id, Account.\"Owner\", Account.created FROM Account"
        );
    }

    #[test]
    fn select_clause_keyword_detection() {
        let desc = pair();
        assert!(render_select(&desc, Some("left = ?")).ends_with("FROM pairs WHERE left = ?"));
        assert!(render_select(&desc, Some("where left = ?")).ends_with("FROM pairs where left = ?"));
        assert!(
            render_select(&desc, Some("p JOIN q ON p.left = q.id"))
                .ends_with("FROM pairs p JOIN q ON p.left = q.id")
        );
        // substring match, not a word match
        assert!(render_select(&desc, Some("nowhere = 1")).ends_with("FROM pairs nowhere = 1"));
    }

    #[test]
    fn delete_and_select_by_key() {
        assert_eq!(
            render_delete_by_key(&pair(), PlaceholderStyle::Question),
            "DELETE FROM pairs WHERE left = ? AND right = ?"
        );
        assert_eq!(
            render_select_by_key(&account(), PlaceholderStyle::Dollar),
            "SELECT Account.id, Account.\"Owner\", Account.created FROM Account WHERE id = $1"
        );
    }

    #[test]
    fn self_ref_update_targets_the_reference_column() {
        let node = TypeDescriptor::<Node>::build().unwrap();
        assert_eq!(
            render_self_ref_update(&node, PlaceholderStyle::Question).as_deref(),
            Some("UPDATE Node SET parent_id = ? WHERE id = ?")
        );
        assert!(render_self_ref_update(&pair(), PlaceholderStyle::Question).is_none());
    }

    #[test]
    fn generator_returns_shared_text_on_hit() {
        let generator = SqlGenerator::default();
        let desc = account();
        let first = generator.insert_text(&desc);
        let second = generator.insert_text(&desc);
        assert!(Arc::ptr_eq(&first, &second));

        let a = generator.select_text(&desc, Some("id = ?"));
        let b = generator.select_text(&desc, Some("id = ?"));
        let c = generator.select_text(&desc, None);
        let d = generator.select_text(&desc, Some("  "));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(Arc::ptr_eq(&c, &d));
        assert_eq!(
            generator.stats(),
            CacheStats {
                insert: 1,
                update: 0,
                select: 2
            }
        );
    }

    #[test]
    fn generator_evicts_least_recent_clause() {
        let generator = SqlGenerator::new(2, PlaceholderStyle::Question);
        let desc = pair();
        let first = generator.select_text(&desc, Some("left = 1"));
        generator.select_text(&desc, Some("left = 2"));
        // touch the first clause so the second becomes least recent
        assert!(Arc::ptr_eq(&first, &generator.select_text(&desc, Some("left = 1"))));
        generator.select_text(&desc, Some("left = 3"));
        assert_eq!(generator.stats().select, 2);
        assert!(Arc::ptr_eq(&first, &generator.select_text(&desc, Some("left = 1"))));

        generator.clear();
        assert_eq!(generator.stats(), CacheStats::default());
    }
}
