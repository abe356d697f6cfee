use rowgraph::prelude::*;
use rowgraph::{ConfigErrorKind, RelationStats};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Entity, Default)]
struct Manager {
    id: i64,
    name: String,
    manager_items: Vec<Shared<ManagerItem>>,
}

#[derive(Entity, Default)]
struct ManagerItem {
    id: i64,
    manager_id: Option<i64>,
    #[rowgraph(column = "Label")]
    title: String,
    manager: ParentRef<Manager>,
    details: Option<Vec<Shared<ItemDetail>>>,
}

#[derive(Entity, Default)]
struct ItemDetail {
    id: i64,
    note: String,
    item: ParentRef<ManagerItem>,
}

fn manager_set(ids: &[i64]) -> ResultSet {
    let mut set = ResultSet::new(["Id", "Name"]);
    for id in ids {
        set.push_row([Value::BigInt(*id), Value::from(format!("manager {}", id))]);
    }
    set
}

/// Items get ids 100, 101, ... in row order.
fn item_set(first_id: i64, manager_ids: &[Option<i64>]) -> ResultSet {
    let mut set = ResultSet::new(["Id", "ManagerId", "Label"]);
    for (offset, manager_id) in manager_ids.iter().enumerate() {
        let id = first_id + offset as i64;
        set.push_row([
            Value::BigInt(id),
            Value::from(*manager_id),
            Value::from(format!("item {}", id)),
        ]);
    }
    set
}

fn item_ids(manager: &Shared<Manager>) -> Vec<i64> {
    manager
        .read()
        .manager_items
        .iter()
        .map(|item| item.read().id)
        .collect()
}

fn engine(sets: Vec<ResultSet>) -> EntityRelation<MemoryCursor> {
    let mut relation = EntityRelation::new(MemoryCursor::new(sets));
    relation
        .define_relationship::<Manager, ManagerItem>(RelationOptions::new())
        .unwrap();
    relation
}

#[test]
fn parents_before_children_link_in_scan_order() {
    let mut relation = engine(vec![
        manager_set(&[1, 2]),
        item_set(100, &[Some(1), Some(1), Some(2)]),
    ]);

    let managers = relation.populate::<Manager>().unwrap();
    let items = relation.populate::<ManagerItem>().unwrap();

    assert_eq!(managers.len(), 2);
    assert_eq!(items.len(), 3);
    assert_eq!(item_ids(&managers[0]), vec![100, 101]);
    assert_eq!(item_ids(&managers[1]), vec![102]);
    assert!(items[0].read().manager.points_to(&managers[0]));
    assert!(items[1].read().manager.points_to(&managers[0]));
    assert!(items[2].read().manager.points_to(&managers[1]));
    assert_eq!(items[0].read().title, "item 100");
}

#[test]
fn children_before_parents_link_identically() {
    let mut relation = engine(vec![
        item_set(100, &[Some(1), Some(2)]),
        manager_set(&[1, 2]),
    ]);

    let items = relation.populate::<ManagerItem>().unwrap();
    assert!(items.iter().all(|item| !item.read().manager.is_set()));
    assert_eq!(relation.stats()[0].stats.pending_children, 2);

    let managers = relation.populate::<Manager>().unwrap();
    assert_eq!(item_ids(&managers[0]), vec![100]);
    assert_eq!(item_ids(&managers[1]), vec![101]);
    assert!(items[0].read().manager.points_to(&managers[0]));
    assert!(items[1].read().manager.points_to(&managers[1]));
    assert_eq!(
        relation.stats()[0].stats,
        RelationStats {
            keys: 2,
            resolved: 2,
            pending_children: 0,
        }
    );
}

#[test]
fn missing_foreign_key_column_names_column_and_entity() {
    let items = ResultSet::new(["Id", "Label"]).row([Value::BigInt(1), Value::from("x")]);
    let mut relation = engine(vec![manager_set(&[1]), items]);
    relation.populate::<Manager>().unwrap();

    let Err(err) = relation.populate::<ManagerItem>() else {
        panic!("item population must fail");
    };
    assert!(err.is_schema());
    assert_eq!(err.entity(), Some("ManagerItem"));
    assert_eq!(err.column(), Some("ManagerId"));
    let msg = err.to_string();
    assert!(msg.contains("ManagerId"));
    assert!(msg.contains("ManagerItem"));
    assert!(msg.contains("Manager"));
}

#[test]
fn missing_primary_key_column_fails_before_any_parent_is_keyed() {
    let managers = ResultSet::new(["ManagerNo", "Name"])
        .row([Value::BigInt(1), Value::from("a")])
        .row([Value::BigInt(2), Value::from("b")]);
    let mut relation = engine(vec![managers, item_set(10, &[Some(0), Some(2)])]);

    let Err(err) = relation.populate::<Manager>() else {
        panic!("parents without a key column must not be keyed");
    };
    assert!(err.is_schema());
    assert_eq!(err.entity(), Some("Manager"));
    assert_eq!(err.column(), Some("Id"));
    assert_eq!(
        err.to_string(),
        "Schema error: Manager expected column Id to map with ManagerItem which was not provided"
    );
    assert_eq!(relation.stats()[0].stats, RelationStats::default());
}

#[derive(Entity, Default)]
struct Account {
    #[rowgraph(primary_key, column = "AccountNo")]
    number: i64,
    entries: Vec<Shared<Entry>>,
}

#[derive(Entity, Default)]
struct Entry {
    id: i64,
    account: ParentRef<Account>,
}

#[test]
fn aliased_primary_key_column_keys_parents() {
    let accounts = ResultSet::new(["AccountNo"])
        .row([Value::BigInt(7)])
        .row([Value::BigInt(8)]);
    let entries = ResultSet::new(["Id", "AccountId"])
        .row([Value::BigInt(1), Value::BigInt(8)])
        .row([Value::BigInt(2), Value::BigInt(7)]);
    let mut relation = EntityRelation::new(MemoryCursor::new([accounts, entries]));
    relation
        .define_relationship::<Account, Entry>(RelationOptions::new())
        .unwrap();

    let accounts = relation.populate::<Account>().unwrap();
    relation.populate::<Entry>().unwrap();

    let ids = |account: &Shared<Account>| -> Vec<i64> {
        account.read().entries.iter().map(|e| e.read().id).collect()
    };
    assert_eq!(ids(&accounts[0]), vec![2]);
    assert_eq!(ids(&accounts[1]), vec![1]);

    let missing = ResultSet::new(["Number2"]).row([Value::BigInt(7)]);
    let mut relation = EntityRelation::new(MemoryCursor::new([missing]));
    relation
        .define_relationship::<Account, Entry>(RelationOptions::new())
        .unwrap();
    let Err(err) = relation.populate::<Account>() else {
        panic!("account rows without AccountNo must fail");
    };
    assert_eq!(err.column(), Some("AccountNo"));
}

#[derive(Entity, Default)]
struct Region {
    id: i32,
    code: String,
    stores: Vec<Shared<Store>>,
}

#[derive(Entity, Default)]
struct Store {
    id: i32,
    region_id: i32,
    region: ParentRef<Region>,
}

#[test]
fn i32_keys_link_through_generic_index() {
    let regions = ResultSet::new(["Id", "Code"])
        .row([Value::Int(10), Value::from("north")])
        .row([Value::Int(20), Value::from("south")]);
    let stores = ResultSet::new(["Id", "RegionId"])
        .row([Value::Int(1), Value::Int(20)])
        .row([Value::Int(2), Value::Int(10)])
        .row([Value::Int(3), Value::Int(20)]);

    let mut relation = EntityRelation::new(MemoryCursor::new([stores, regions]));
    relation
        .define_keyed_relationship::<i32, Region, Store>(RelationOptions::new())
        .unwrap();

    let stores = relation.populate::<Store>().unwrap();
    let regions = relation.populate::<Region>().unwrap();

    let ids = |region: &Shared<Region>| -> Vec<i32> {
        region.read().stores.iter().map(|s| s.read().id).collect()
    };
    assert_eq!(ids(&regions[0]), vec![2]);
    assert_eq!(ids(&regions[1]), vec![1, 3]);
    assert!(stores[0].read().region.points_to(&regions[1]));
}

#[test]
fn null_foreign_key_is_returned_but_not_linked() {
    let mut relation = engine(vec![
        manager_set(&[1]),
        item_set(100, &[Some(1), None, Some(1)]),
    ]);

    let managers = relation.populate::<Manager>().unwrap();
    let items = relation.populate::<ManagerItem>().unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[1].read().manager_id, None);
    assert!(!items[1].read().manager.is_set());
    assert_eq!(item_ids(&managers[0]), vec![100, 102]);
}

#[test]
fn late_children_after_flush_still_link() {
    let mut relation = engine(vec![
        item_set(100, &[Some(1)]),
        manager_set(&[1]),
        item_set(200, &[Some(1), Some(1)]),
    ]);

    relation.populate::<ManagerItem>().unwrap();
    let managers = relation.populate::<Manager>().unwrap();
    let late = relation.populate::<ManagerItem>().unwrap();

    assert_eq!(item_ids(&managers[0]), vec![100, 200, 201]);
    assert!(late.iter().all(|i| i.read().manager.points_to(&managers[0])));
    assert_eq!(relation.stats()[0].stats.pending_children, 0);
}

#[test]
fn duplicate_parent_key_keeps_first_parent() {
    let mut relation = engine(vec![
        item_set(100, &[Some(1)]),
        manager_set(&[1, 1]),
        item_set(200, &[Some(1)]),
    ]);

    relation.populate::<ManagerItem>().unwrap();
    let managers = relation.populate::<Manager>().unwrap();
    relation.populate::<ManagerItem>().unwrap();

    assert_eq!(managers.len(), 2);
    assert_eq!(item_ids(&managers[0]), vec![100, 200]);
    assert!(item_ids(&managers[1]).is_empty());
}

#[test]
fn three_level_chain_resolves_both_relationships() {
    let details = ResultSet::new(["Id", "ManagerItemId", "Note"])
        .row([Value::BigInt(1000), Value::BigInt(101), Value::from("a")])
        .row([Value::BigInt(1001), Value::BigInt(100), Value::from("b")])
        .row([Value::BigInt(1002), Value::BigInt(101), Value::from("c")]);

    let mut relation = EntityRelation::new(MemoryCursor::new([
        manager_set(&[1]),
        item_set(100, &[Some(1), Some(1), Some(1)]),
        details,
    ]));
    relation
        .define_relationship::<Manager, ManagerItem>(RelationOptions::new())
        .unwrap();
    relation
        .define_relationship::<ManagerItem, ItemDetail>(RelationOptions::new())
        .unwrap();
    assert_eq!(relation.relation_count(), 2);

    let managers = relation.populate::<Manager>().unwrap();
    let items = relation.populate::<ManagerItem>().unwrap();
    let details = relation.populate::<ItemDetail>().unwrap();

    assert_eq!(item_ids(&managers[0]), vec![100, 101, 102]);
    let notes = |item: &Shared<ManagerItem>| -> Vec<String> {
        item.read()
            .details
            .as_ref()
            .map(|d| d.iter().map(|x| x.read().note.clone()).collect())
            .unwrap_or_default()
    };
    assert_eq!(notes(&items[0]), vec!["b"]);
    assert_eq!(notes(&items[1]), vec!["a", "c"]);
    assert!(items[2].read().details.is_none());
    assert!(details[0].read().item.points_to(&items[1]));
}

#[derive(Entity, Default)]
struct Employee {
    id: i64,
    boss_id: Option<i64>,
    reports: Vec<Shared<Employee>>,
    boss: ParentRef<Employee>,
}

#[test]
fn self_referential_relationship_links_within_one_result_set() {
    let employees = ResultSet::new(["Id", "BossId"])
        .row([Value::BigInt(3), Value::BigInt(1)])
        .row([Value::BigInt(1), Value::Null])
        .row([Value::BigInt(2), Value::BigInt(1)])
        .row([Value::BigInt(4), Value::BigInt(3)]);

    let mut relation = EntityRelation::new(MemoryCursor::new([employees]));
    relation
        .define_relationship::<Employee, Employee>(RelationOptions::new().foreign_key("BossId"))
        .unwrap();

    let employees = relation.populate::<Employee>().unwrap();
    let reports = |e: &Shared<Employee>| -> Vec<i64> {
        e.read().reports.iter().map(|r| r.read().id).collect()
    };

    let (three, one, two, four) = (&employees[0], &employees[1], &employees[2], &employees[3]);
    assert_eq!(reports(one), vec![3, 2]);
    assert_eq!(reports(three), vec![4]);
    assert!(reports(two).is_empty());
    assert!(!one.read().boss.is_set());
    assert!(three.read().boss.points_to(one));
    assert!(four.read().boss.points_to(three));
}

#[derive(Entity, Default)]
struct Country {
    code: String,
    name: String,
    cities: Vec<Shared<City>>,
}

#[derive(Entity, Default)]
struct City {
    name: String,
    country_code: String,
    country: ParentRef<Country>,
}

#[test]
fn string_keys_read_parent_key_from_column() {
    let countries = ResultSet::new(["Code", "Name"])
        .row(["NO", "Norway"])
        .row(["SE", "Sweden"]);
    let cities = ResultSet::new(["Name", "CountryCode"])
        .row(["Oslo", "NO"])
        .row(["Bergen", "NO"])
        .row(["Lund", "SE"]);

    let mut relation = EntityRelation::new(MemoryCursor::new([countries, cities]));
    relation
        .define_keyed_relationship::<String, Country, City>(
            RelationOptions::new()
                .parent_key("Code")
                .foreign_key("CountryCode"),
        )
        .unwrap();

    let countries = relation.populate::<Country>().unwrap();
    relation.populate::<City>().unwrap();

    let names = |c: &Shared<Country>| -> Vec<String> {
        c.read().cities.iter().map(|x| x.read().name.clone()).collect()
    };
    assert_eq!(names(&countries[0]), vec!["Oslo", "Bergen"]);
    assert_eq!(names(&countries[1]), vec!["Lund"]);
}

#[test]
fn unconvertible_key_aborts_population() {
    let items = ResultSet::new(["Id", "ManagerId"])
        .row([Value::BigInt(1), Value::BigInt(1)])
        .row([Value::BigInt(2), Value::from("one")]);
    let mut relation = engine(vec![manager_set(&[1]), items]);
    relation.populate::<Manager>().unwrap();

    let Err(err) = relation.populate::<ManagerItem>() else {
        panic!("item population must fail");
    };
    assert!(err.is_type());
    assert_eq!(err.entity(), Some("ManagerItem"));
    assert_eq!(err.column(), Some("ManagerId"));
    assert!(err.to_string().contains("TEXT"));
}

#[test]
fn explicit_link_function_replaces_synthesis() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut relation = EntityRelation::new(MemoryCursor::new([
        manager_set(&[1]),
        item_set(100, &[Some(1), Some(1)]),
    ]));
    relation
        .define_linked_relationship::<i64, Manager, ManagerItem, _>(
            RelationOptions::new(),
            move |manager, item| {
                counter.fetch_add(1, Ordering::SeqCst);
                manager.write().manager_items.insert(0, Arc::clone(item));
            },
        )
        .unwrap();

    let managers = relation.populate::<Manager>().unwrap();
    let items = relation.populate::<ManagerItem>().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(item_ids(&managers[0]), vec![101, 100]);
    // The custom link never sets the back-reference.
    assert!(!items[0].read().manager.is_set());
}

#[derive(Entity, Default)]
struct Desk {
    id: i64,
    open: Vec<Shared<ManagerItem>>,
    closed: Vec<Shared<ManagerItem>>,
}

#[test]
fn ambiguous_list_field_fails_at_registration() {
    let mut relation = EntityRelation::new(MemoryCursor::new([manager_set(&[1])]));
    let err = relation
        .define_relationship::<Desk, ManagerItem>(RelationOptions::new())
        .unwrap_err();
    assert!(err.is_config());
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::AmbiguousField));
    assert_eq!(relation.relation_count(), 0);
}

#[test]
fn registration_after_populate_is_rejected() {
    let mut relation = engine(vec![manager_set(&[1])]);
    relation.populate::<Manager>().unwrap();
    let err = relation
        .define_relationship::<ManagerItem, ItemDetail>(RelationOptions::new())
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::RegistrySealed));
}

#[test]
fn exact_column_matching_rejects_other_casing() {
    let items = ResultSet::new(["Id", "managerid"]).row([Value::BigInt(1), Value::BigInt(1)]);

    let mut loose = engine(vec![items.clone()]);
    assert_eq!(loose.populate::<ManagerItem>().unwrap().len(), 1);

    let mut strict = EntityRelation::with_config(
        MemoryCursor::new([items]),
        GraphConfig::new().column_matching(ColumnMatching::Exact),
    );
    strict
        .define_relationship::<Manager, ManagerItem>(RelationOptions::new())
        .unwrap();
    let Err(err) = strict.populate::<ManagerItem>() else {
        panic!("exact matching must not find managerid");
    };
    assert!(err.is_schema());
}

#[derive(Entity, Default)]
#[rowgraph(name = "Boss")]
struct Chief {
    id: i64,
    crew: Vec<Shared<Crew>>,
}

#[derive(Entity, Default)]
struct Crew {
    id: i64,
    chief: ParentRef<Chief>,
}

#[test]
fn entity_name_override_drives_default_foreign_key() {
    let chiefs = ResultSet::new(["Id"]).row([7_i64]);
    let crew = ResultSet::new(["Id", "BossId"]).row([1_i64, 7]).row([2_i64, 7]);

    let mut relation = EntityRelation::new(MemoryCursor::new([chiefs, crew]));
    relation
        .define_relationship::<Chief, Crew>(RelationOptions::new())
        .unwrap();
    assert_eq!(relation.stats()[0].foreign_key, "BossId");

    let chiefs = relation.populate::<Chief>().unwrap();
    relation.populate::<Crew>().unwrap();
    assert_eq!(chiefs[0].read().crew.len(), 2);
}

#[test]
fn populate_past_last_result_set_returns_empty() {
    let mut relation = engine(vec![manager_set(&[1])]);
    assert_eq!(relation.populate::<Manager>().unwrap().len(), 1);
    assert!(relation.populate::<Manager>().unwrap().is_empty());
    assert!(relation.cursor().is_exhausted());
}
