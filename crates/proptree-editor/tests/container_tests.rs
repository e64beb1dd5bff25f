//! Integration tests for container editing and element restrictions.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use proptree_editor::prelude::*;

// -- fixture ----------------------------------------------------------------

struct Shelf {
    store: InstanceStore,
    tree: PropertyTree,
    shelf: InstanceId,
}

fn shelf() -> Shelf {
    let mut builder = SchemaBuilder::new();
    let ty = builder
        .object("Shelf", None)
        .field("Items", FieldSpec::array(FieldSpec::Int))
        .field("Slots", FieldSpec::array(FieldSpec::Int))
        .add_flags(FieldFlags::EDIT_FIXED_SIZE)
        .field("Tags", FieldSpec::set(FieldSpec::Str))
        .field("Prices", FieldSpec::map(FieldSpec::Name, FieldSpec::Int))
        .finish()
        .unwrap();
    let (schema, metadata) = builder.build();
    let mut store = InstanceStore::new(Arc::new(schema));
    let shelf = store.spawn(ty, "Shelf").unwrap();
    let tree = PropertyTree::for_instances(&store, &[shelf], Arc::new(metadata), TreeConfig::default());
    Shelf { store, tree, shelf }
}

// -- helpers ----------------------------------------------------------------

fn container(s: &mut Shelf, name: &str) -> NodeId {
    let node = s.tree.find_by_path(name, &s.store).unwrap();
    s.tree.set_expanded(node, true, &s.store);
    node
}

fn element_ints(s: &Shelf, node: NodeId) -> Vec<i64> {
    s.tree
        .children(node)
        .iter()
        .map(|child| s.tree.get_int(*child, &s.store).unwrap())
        .collect()
}

fn fill_items(s: &mut Shelf, items: NodeId, values: &[i64]) {
    for value in values {
        s.tree.add_item(items, &mut s.store).unwrap();
        let last = *s.tree.children(items).last().unwrap();
        s.tree.set_int(last, *value, &mut s.store).unwrap();
    }
}

fn child_locations(s: &Shelf, node: NodeId) -> Vec<ValueLocation> {
    s.tree
        .children(node)
        .iter()
        .map(|child| s.tree.shared_location(*child, &s.store).unwrap())
        .collect()
}

// -- arrays -----------------------------------------------------------------

#[test]
fn insert_then_delete_restores_original_elements() {
    let mut s = shelf();
    let items = container(&mut s, "Items");
    fill_items(&mut s, items, &[10, 20, 30]);
    assert_eq!(s.tree.children(items).len(), 3);

    s.tree.insert_item(items, 1, &mut s.store).unwrap();
    assert_eq!(element_ints(&s, items), vec![10, 0, 20, 30]);

    s.tree.delete_item(items, 1, &mut s.store).unwrap();
    assert_eq!(s.tree.children(items).len(), 3);
    assert_eq!(element_ints(&s, items), vec![10, 20, 30]);
}

#[test]
fn add_and_delete_keep_child_locations_distinct() {
    let mut s = shelf();
    let items = container(&mut s, "Items");
    fill_items(&mut s, items, &[1, 2, 3, 4]);

    s.tree.add_item(items, &mut s.store).unwrap();
    let locations = child_locations(&s, items);
    assert_eq!(locations.len(), 5);
    assert_eq!(locations.iter().collect::<HashSet<_>>().len(), 5);

    s.tree.delete_item(items, 2, &mut s.store).unwrap();
    let locations = child_locations(&s, items);
    assert_eq!(locations.len(), 4);
    assert_eq!(locations.iter().collect::<HashSet<_>>().len(), 4);
    assert_eq!(element_ints(&s, items), vec![1, 2, 4, 0]);
}

#[test]
fn duplicate_swap_and_move() {
    let mut s = shelf();
    let items = container(&mut s, "Items");
    fill_items(&mut s, items, &[1, 2, 3]);

    s.tree.duplicate_item(items, 0, &mut s.store).unwrap();
    assert_eq!(element_ints(&s, items), vec![1, 1, 2, 3]);

    s.tree.swap_items(items, 0, 3, &mut s.store).unwrap();
    assert_eq!(element_ints(&s, items), vec![3, 1, 2, 1]);

    s.tree.move_item(items, 0, 2, &mut s.store).unwrap();
    assert_eq!(element_ints(&s, items), vec![1, 2, 3, 1]);

    s.tree.clear_items(items, &mut s.store).unwrap();
    assert!(s.tree.children(items).is_empty());

    let kinds: Vec<ChangeKind> = s
        .tree
        .journal()
        .changes_for_path("Items")
        .map(|c| c.kind)
        .filter(|k| k.is_structural() && *k != ChangeKind::ArrayAdd)
        .collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Duplicate, ChangeKind::Swap, ChangeKind::ArrayMove, ChangeKind::ArrayClear]
    );
}

#[test]
fn out_of_range_edits_change_nothing() {
    let mut s = shelf();
    let items = container(&mut s, "Items");
    fill_items(&mut s, items, &[5]);
    let before = s.tree.journal().len();

    assert_eq!(
        s.tree.delete_item(items, 3, &mut s.store),
        Err(AccessError::IndexOutOfRange { index: 3, len: 1 })
    );
    assert_eq!(element_ints(&s, items), vec![5]);
    assert_eq!(s.tree.journal().len(), before);
    assert_eq!(s.tree.notify_state(), NotifyState::Idle);
}

#[test]
fn fixed_size_containers_reject_resizing() {
    let mut s = shelf();
    let slots = container(&mut s, "Slots");
    assert_eq!(s.tree.add_item(slots, &mut s.store), Err(AccessError::FixedSize));
    assert_eq!(s.tree.clear_items(slots, &mut s.store), Err(AccessError::FixedSize));
}

#[test]
fn container_edit_is_reported_by_validation_once() {
    let mut s = shelf();
    let items = container(&mut s, "Items");
    assert_eq!(s.tree.instances(), vec![s.shelf]);
    assert_eq!(s.tree.ensure_data_is_valid(&s.store), ValidationResult::Valid);

    s.tree.add_item(items, &mut s.store).unwrap();
    assert_eq!(s.tree.ensure_data_is_valid(&s.store), ValidationResult::ChildrenRebuilt);
    assert_eq!(s.tree.ensure_data_is_valid(&s.store), ValidationResult::Valid);
}

// -- sets and maps ----------------------------------------------------------

#[test]
fn set_elements_stay_unique() {
    let mut s = shelf();
    let tags = container(&mut s, "Tags");

    s.tree.add_item(tags, &mut s.store).unwrap();
    assert!(matches!(
        s.tree.add_item(tags, &mut s.store),
        Err(AccessError::DuplicateElement { .. })
    ));

    let first = s.tree.children(tags)[0];
    s.tree.set_string(first, "red", &mut s.store).unwrap();
    s.tree.add_item(tags, &mut s.store).unwrap();
    let second = s.tree.children(tags)[1];
    assert!(matches!(
        s.tree.set_string(second, "red", &mut s.store),
        Err(AccessError::DuplicateElement { .. })
    ));
    assert_eq!(
        s.tree.insert_item(tags, 0, &mut s.store),
        Err(AccessError::UnsupportedOperation {
            operation: "insert",
            container: "set"
        })
    );
}

#[test]
fn deleted_set_slot_is_not_resolved_again() {
    let mut s = shelf();
    let tags = container(&mut s, "Tags");
    for tag in ["a", "b", "c"] {
        s.tree.add_item(tags, &mut s.store).unwrap();
        let last = *s.tree.children(tags).last().unwrap();
        s.tree.set_string(last, tag, &mut s.store).unwrap();
    }
    let doomed = s.tree.shared_location(s.tree.children(tags)[1], &s.store).unwrap();

    s.tree.delete_item(tags, 1, &mut s.store).unwrap();
    let remaining = child_locations(&s, tags);
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.contains(&doomed));

    let texts: Vec<String> = s
        .tree
        .children(tags)
        .iter()
        .map(|c| s.tree.get_string(*c, &s.store).unwrap())
        .collect();
    assert_eq!(texts, vec!["a", "c"]);
}

#[test]
fn map_pairs_expose_key_nodes() {
    let mut s = shelf();
    let prices = container(&mut s, "Prices");
    s.tree.add_item(prices, &mut s.store).unwrap();

    let value = s.tree.children(prices)[0];
    let key = s.tree.node(value).unwrap().key_node().unwrap();
    s.tree.set_string(key, "apple", &mut s.store).unwrap();
    s.tree.set_int(value, 3, &mut s.store).unwrap();
    assert_eq!(s.tree.property_path(key), "Prices[0]#key");

    s.tree.add_item(prices, &mut s.store).unwrap();
    let second = s.tree.children(prices)[1];
    let second_key = s.tree.node(second).unwrap().key_node().unwrap();
    assert!(matches!(
        s.tree.set_string(second_key, "apple", &mut s.store),
        Err(AccessError::DuplicateElement { .. })
    ));

    let first_value = s.tree.children(prices)[0];
    let first_key = s.tree.node(first_value).unwrap().key_node().unwrap();
    assert_eq!(s.tree.get_string(first_key, &s.store).unwrap(), "apple");
    assert_eq!(s.tree.get_int(first_value, &s.store).unwrap(), 3);
}

// -- restrictions -----------------------------------------------------------

#[test]
fn elements_inherit_container_restrictions() {
    let mut s = shelf();
    let items = container(&mut s, "Items");
    fill_items(&mut s, items, &[1, 2]);

    let mut budget = PropertyRestriction::new("Over budget");
    budget.add_disabled_value("2");
    let mut banned = PropertyRestriction::new("Banned");
    banned.add_hidden_value("2");
    banned.add_hidden_value("9");
    s.tree.add_restriction(items, Rc::new(budget));
    s.tree.add_restriction(items, Rc::new(banned));

    let element = s.tree.children(items)[0];
    assert!(s.tree.is_value_disabled(element, "2"));
    assert!(s.tree.is_value_hidden(element, "9"));
    assert!(!s.tree.is_value_restricted(element, "1"));
    assert_eq!(
        s.tree.restriction_tooltip(element, "2").unwrap(),
        "Banned(2 restrictions...)"
    );
    assert_eq!(s.tree.restriction_tooltip(element, "9").unwrap(), "Banned");
    assert_eq!(s.tree.restriction_tooltip(element, "1"), None);
}
