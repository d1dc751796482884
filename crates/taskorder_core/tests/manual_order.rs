use taskorder_core::db::open_db_in_memory;
use taskorder_core::{
    Item, ListBackend, ListId, ManualOrderService, MoveTarget, NewItem, OrderWriter,
    SqliteItemRepository, TreeBlobStore,
};

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

fn manual_list(repo: &SqliteItemRepository<'_>) -> ListId {
    repo.create_list("Someday", ListBackend::Manual)
        .unwrap()
        .list_uuid
}

fn items(repo: &SqliteItemRepository<'_>, list: ListId, titles: &[&str]) -> Vec<Item> {
    titles
        .iter()
        .map(|title| repo.create_item(&NewItem::new(list, *title)).unwrap())
        .collect()
}

fn stored(repo: &SqliteItemRepository<'_>, list: ListId) -> Option<String> {
    repo.load_serialized_tree(list).unwrap()
}

#[test]
fn load_reconciles_unordered_items_newest_first_and_persists() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = manual_list(&repo);
    let created = items(&repo, list, &["a", "b", "c"]);
    assert_eq!(stored(&repo, list), None);

    let service = ManualOrderService::load(&repo, list).unwrap();

    assert_eq!(
        service.ordered_ids(),
        vec![
            created[2].uuid.clone(),
            created[1].uuid.clone(),
            created[0].uuid.clone()
        ]
    );
    assert_eq!(stored(&repo, list), Some(service.serialize()));
}

#[test]
fn on_item_created_rejects_malformed_identifiers() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = manual_list(&repo);
    items(&repo, list, &["a"]);
    let mut service = ManualOrderService::load(&repo, list).unwrap();
    let before = stored(&repo, list);

    assert!(!service.on_item_created("").unwrap());
    assert!(!service.on_item_created("not an id").unwrap());
    assert!(!service.on_item_created("-1").unwrap());
    assert_eq!(stored(&repo, list), before);

    let fresh = repo.create_item(&NewItem::new(list, "fresh")).unwrap();
    assert!(service.on_item_created(&fresh.uuid).unwrap());
    assert!(!service.on_item_created(&fresh.uuid).unwrap());
    assert_eq!(service.ordered_ids()[0], fresh.uuid);
    assert_eq!(stored(&repo, list), Some(service.serialize()));
}

#[test]
fn deleting_a_parent_promotes_children_in_stored_text() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = manual_list(&repo);
    let created = items(&repo, list, &["older", "newer"]);
    let (older, newer) = (&created[0], &created[1]);
    let mut service = ManualOrderService::load(&repo, list).unwrap();

    assert!(service.indent(&older.uuid, 1).unwrap());
    assert_eq!(service.indent_of(&older.uuid), 1);
    assert_eq!(
        stored(&repo, list),
        Some(format!(r#"["-1",["{}","{}"]]"#, newer.uuid, older.uuid))
    );

    repo.soft_delete_item(newer.id).unwrap();
    assert!(service.on_item_deleted(&newer.uuid).unwrap());

    assert_eq!(service.indent_of(&older.uuid), 0);
    assert_eq!(
        stored(&repo, list),
        Some(format!(r#"["-1","{}"]"#, older.uuid))
    );
}

#[test]
fn reload_keeps_structure_and_drops_stale_nodes() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = manual_list(&repo);
    let created = items(&repo, list, &["a", "b", "c"]);
    let mut service = ManualOrderService::load(&repo, list).unwrap();
    assert!(service
        .move_under(&created[0].uuid, Some(created[2].uuid.as_str()), 0)
        .unwrap());
    assert!(service
        .move_to(&created[1].uuid, MoveTarget::Before(created[2].uuid.as_str()))
        .unwrap());
    drop(service);

    repo.soft_delete_item(created[2].id).unwrap();
    let reloaded = ManualOrderService::load(&repo, list).unwrap();

    assert_eq!(
        reloaded.ordered_ids(),
        vec![created[1].uuid.clone(), created[0].uuid.clone()]
    );
    assert_eq!(reloaded.indent_of(&created[0].uuid), 0);
    assert_eq!(stored(&repo, list), Some(reloaded.serialize()));
}

#[test]
fn malformed_stored_text_is_rebuilt_from_live_items() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = manual_list(&repo);
    let created = items(&repo, list, &["a"]);
    repo.write_serialized_tree(list, r#"["-1",["#).unwrap();

    let service = ManualOrderService::load(&repo, list).unwrap();

    assert_eq!(service.ordered_ids(), vec![created[0].uuid.clone()]);
    assert_eq!(
        stored(&repo, list),
        Some(format!(r#"["-1","{}"]"#, created[0].uuid))
    );
}

#[test]
fn descendants_follow_their_parent_on_move() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = manual_list(&repo);
    let created = items(&repo, list, &["child", "parent", "other"]);
    let (child, parent, other) = (&created[0], &created[1], &created[2]);
    let mut service = ManualOrderService::load(&repo, list).unwrap();
    // Order is now other, parent, child.
    assert!(service.indent(&child.uuid, 1).unwrap());
    assert!(service
        .move_to(&parent.uuid, MoveTarget::Before(other.uuid.as_str()))
        .unwrap());

    let mut below = Vec::new();
    service.apply_to_descendants(&parent.uuid, |node| below.push((node.id.to_string(), node.indent)));
    assert_eq!(below, vec![(child.uuid.clone(), 1)]);
    assert_eq!(
        service.ordered_ids(),
        vec![parent.uuid.clone(), child.uuid.clone(), other.uuid.clone()]
    );

    assert!(service.move_to_parent_of(&other.uuid, &child.uuid).unwrap());
    assert_eq!(service.indent_of(&other.uuid), 1);
    assert_eq!(
        service.serialize(),
        format!(r#"["-1",["{}","{}","{}"]]"#, parent.uuid, child.uuid, other.uuid)
    );
}
