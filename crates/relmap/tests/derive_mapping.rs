//! Derived markers flowing through descriptors, SQL text and both pipelines.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{MockConnection, row, unwrap_outcome};
use relmap::prelude::*;
use std::sync::Arc;

#[derive(SqlEnum, Debug, Default, Clone, Copy, PartialEq)]
enum Status {
    #[default]
    Draft,
    Placed,
    Shipped,
}

#[derive(SqlEnum, Debug, Clone, Copy, PartialEq)]
enum Priority {
    #[relmap(rename = "LOW")]
    Low,
    #[relmap(rename = "HIGH")]
    High,
}

/// Stores a price in whole cents.
#[derive(Default)]
struct Cents;

impl Converter for Cents {
    #[allow(clippy::cast_possible_truncation)]
    fn to_column(&self, member: Value) -> Result<Value> {
        match member {
            Value::Null => Ok(Value::Null),
            Value::Double(price) => Ok(Value::BigInt((price * 100.0).round() as i64)),
            other => Err(Error::Custom(format!("not a price: {other:?}"))),
        }
    }

    fn to_member(&self, column: Value) -> Result<Value> {
        if column.is_null() {
            return Ok(Value::Double(0.0));
        }
        column
            .as_i64()
            .map(|cents| Value::Double(cents as f64 / 100.0))
            .ok_or_else(|| Error::Custom(format!("not cents: {column:?}")))
    }
}

#[derive(MappedSuperclass, Debug, Default, Clone, PartialEq)]
struct Audit {
    #[relmap(column = "created_at")]
    created: i64,
    #[relmap(insertable = false, updatable = false)]
    version: i32,
}

#[derive(Entity, Debug, Default)]
#[relmap(table = "\"Orders\"")]
struct Order {
    #[relmap(key)]
    id: i64,
    #[relmap(superclass)]
    audit: Audit,
    #[relmap(column = "\"Total\"")]
    total: i64,
    #[relmap(enumerated = "ordinal")]
    status: Status,
    #[relmap(enumerated = "name")]
    priority: Option<Priority>,
    #[relmap(converter = "Cents")]
    price: f64,
    #[relmap(getter = "Order::note", setter = "Order::set_note")]
    note: String,
    #[relmap(transient)]
    display: String,
    #[relmap(skip)]
    scratch: Vec<String>,
}

impl Order {
    fn note(&self) -> String {
        self.note.trim().to_string()
    }

    fn set_note(&mut self, note: String) {
        self.note = format!("[{note}]");
    }
}

#[derive(Entity, Debug, Default)]
#[relmap(table = "line_item")]
struct LineItem {
    #[relmap(key)]
    order_id: i64,
    #[relmap(key)]
    line: i32,
    #[relmap(qualifier = "p")]
    product: String,
}

#[derive(Entity, Debug, Default)]
struct TwoGenerated {
    #[relmap(generated)]
    a: Option<i64>,
    #[relmap(generated)]
    b: Option<i64>,
}

#[derive(Entity, Debug, Default)]
struct Borrowed {
    #[relmap(key)]
    id: i64,
    owner: SelfRef<Order>,
}

#[test]
fn descriptor_lists_superclass_members_first() {
    let mapper = Mapper::default();
    let desc = mapper.descriptor::<Order>().unwrap();

    let names: Vec<_> = desc.members().iter().map(|m| m.member_name()).collect();
    assert_eq!(
        names,
        vec!["created", "version", "id", "total", "status", "priority", "price", "note", "display"]
    );
    assert_eq!(desc.table().emitted(), "\"Orders\"");
    assert_eq!(desc.table_name(), "Orders");
    assert!(desc.member("display").unwrap().is_transient());
    assert!(desc.member("note").unwrap().accessor().is_property());
    assert!(desc.member("scratch").is_none());
    assert_eq!(desc.all_columns().len(), 8);

    // the same descriptor is handed out on every request
    assert!(Arc::ptr_eq(&desc, &mapper.descriptor::<Order>().unwrap()));
}

#[test]
fn generated_text_honors_markers() {
    let mapper = Mapper::default();

    assert_eq!(
        &*mapper.insert_sql::<Order>().unwrap(),
        "INSERT INTO \"Orders\" (created_at, id, \"Total\", status, priority, price, note) \
         VALUES (?, ?, ?, ?, ?, ?, ?)"
    );
    assert_eq!(
        &*mapper.update_sql::<Order>().unwrap(),
        "UPDATE \"Orders\" SET created_at = ?, \"Total\" = ?, status = ?, priority = ?, \
         price = ?, note = ? WHERE id = ?"
    );
    assert_eq!(
        &*mapper.delete_by_key_sql::<LineItem>().unwrap(),
        "DELETE FROM line_item WHERE order_id = ? AND line = ?"
    );
    assert_eq!(
        &*mapper.select_sql::<LineItem>(None).unwrap(),
        "SELECT line_item.order_id, line_item.line, p.product FROM line_item"
    );
}

#[test]
fn dollar_placeholders_are_numbered() {
    let mapper = Mapper::new(MapperConfig::new().placeholder(PlaceholderStyle::Dollar)).unwrap();
    assert_eq!(
        &*mapper.update_sql::<LineItem>().unwrap(),
        "UPDATE line_item SET product = $1 WHERE order_id = $2 AND line = $3"
    );
}

#[test]
fn insert_coerces_through_every_rule() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = MockConnection::new();
    let mapper = Mapper::default();

    let mut order = Order {
        id: 1,
        audit: Audit {
            created: 1_700_000_000,
            version: 4,
        },
        total: 3,
        status: Status::Shipped,
        priority: Some(Priority::High),
        price: 19.99,
        note: "  gift  ".into(),
        display: "ignored".into(),
        scratch: vec!["ignored".into()],
    };
    rt.block_on(async { unwrap_outcome(mapper.insert(&cx, &conn, &mut order).await) });

    assert_eq!(
        conn.state().executed[0].1,
        vec![
            Value::BigInt(1_700_000_000),
            Value::BigInt(1),
            Value::BigInt(3),
            Value::Int(2),
            Value::Text("HIGH".into()),
            Value::BigInt(1999),
            Value::Text("gift".into()),
        ]
    );
}

#[test]
fn rows_hydrate_through_every_rule() {
    let mapper = Mapper::default();
    let r = row(
        &[
            "created_at", "version", "id", "Total", "status", "priority", "price", "note", "display",
        ],
        vec![
            Value::BigInt(5),
            Value::Int(2),
            Value::BigInt(8),
            Value::BigInt(12),
            Value::Int(1),
            Value::Text("LOW".into()),
            Value::BigInt(250),
            Value::Text("fragile".into()),
            Value::Text("not mapped".into()),
        ],
    );

    let order: Order = mapper.map_row(&r).unwrap();
    assert_eq!(order.audit, Audit { created: 5, version: 2 });
    assert_eq!(order.id, 8);
    assert_eq!(order.total, 12);
    assert_eq!(order.status, Status::Placed);
    assert_eq!(order.priority, Some(Priority::Low));
    assert!((order.price - 2.5).abs() < f64::EPSILON);
    assert_eq!(order.note, "[fragile]");
    assert_eq!(order.display, "");
}

#[test]
fn delimited_columns_need_exact_case() {
    let mapper = Mapper::default();
    let r = row(&["ID", "total", "STATUS"], vec![Value::BigInt(1), Value::BigInt(99), Value::Int(0)]);

    let order: Order = mapper.map_row(&r).unwrap();
    assert_eq!(order.id, 1);
    assert_eq!(order.total, 0);
    assert_eq!(order.status, Status::Draft);
}

#[test]
fn unknown_enum_values_are_mapping_errors() {
    let mapper = Mapper::default();

    let bad_ordinal = row(&["status"], vec![Value::Int(7)]);
    assert!(matches!(mapper.map_row::<Order>(&bad_ordinal), Err(Error::Mapping(_))));

    // names are case-sensitive
    let bad_name = row(&["priority"], vec![Value::Text("high".into())]);
    assert!(matches!(mapper.map_row::<Order>(&bad_name), Err(Error::Mapping(_))));
}

#[test]
fn null_columns_keep_member_defaults() {
    let mapper = Mapper::default();
    let r = row(&["id", "price"], vec![Value::BigInt(1), Value::Null]);

    let order: Order = mapper.map_row(&r).unwrap();
    assert!(order.price.abs() < f64::EPSILON);
}

#[test]
fn inconsistent_markers_fail_every_request_the_same_way() {
    let mapper = Mapper::default();

    let first = mapper.descriptor::<TwoGenerated>().unwrap_err();
    let second = mapper.descriptor::<TwoGenerated>().unwrap_err();
    assert!(first.is_config());
    assert_eq!(first.to_string(), second.to_string());
    assert!(first.to_string().contains("generated keys"), "{first}");

    let foreign = mapper.descriptor::<Borrowed>().unwrap_err();
    assert!(foreign.is_config());
    assert!(foreign.to_string().contains("only references to Borrowed"), "{foreign}");

    // a broken type does not poison others
    assert!(mapper.descriptor::<LineItem>().is_ok());
}
