use std::collections::BTreeSet;
use taskorder_core::db::open_db_in_memory;
use taskorder_core::{
    DragState, Item, ListBackend, ListId, NewItem, OrderError, OrderingConfig, PendingDrop,
    ReorderCoordinator, RepoError, SqliteItemRepository, TreeBlobStore,
};
use uuid::Uuid;

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

fn row_ids(coordinator: &ReorderCoordinator<'_, SqliteItemRepository<'_>>) -> Vec<i64> {
    coordinator.rows().iter().map(|row| row.item_id).collect()
}

fn indents(coordinator: &ReorderCoordinator<'_, SqliteItemRepository<'_>>) -> Vec<i32> {
    coordinator.rows().iter().map(|row| row.indent).collect()
}

fn keyed(repo: &SqliteItemRepository<'_>, list: ListId, keys: &[i64]) -> Vec<Item> {
    keys.iter()
        .enumerate()
        .map(|(index, key)| {
            repo.create_item(&NewItem::new(list, format!("item {index}")).with_order(*key))
                .unwrap()
        })
        .collect()
}

fn placed(
    repo: &SqliteItemRepository<'_>,
    coordinator: &mut ReorderCoordinator<'_, SqliteItemRepository<'_>>,
    titles: &[&str],
) -> Vec<Item> {
    titles
        .iter()
        .map(|title| {
            let item = repo
                .create_item(&NewItem::new(coordinator.list().list_uuid, *title))
                .unwrap();
            coordinator.refresh().unwrap();
            coordinator.place_new_item(item.id).unwrap();
            item
        })
        .collect()
}

fn drag(
    coordinator: &mut ReorderCoordinator<'_, SqliteItemRepository<'_>>,
    from: usize,
    to: usize,
    indent: i32,
) -> BTreeSet<i64> {
    coordinator.begin_drag();
    coordinator.update_drag(from, to, indent);
    coordinator.commit_drag().unwrap()
}

#[test]
fn calendar_drag_to_top_shifts_the_run_below() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    let items = keyed(&repo, list, &[0, 1, 2]);
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();

    let touched = drag(&mut coordinator, 2, 0, 3);

    assert_eq!(touched, BTreeSet::from([items[0].id, items[1].id, items[2].id]));
    assert_eq!(row_ids(&coordinator), vec![items[2].id, items[0].id, items[1].id]);
    let keys: Vec<i64> = coordinator.rows().iter().map(|row| row.sort_key).collect();
    assert_eq!(keys, vec![0, 1, 2]);
    assert_eq!(coordinator.state(), DragState::Idle);
}

#[test]
fn calendar_indent_nests_under_previous_row_without_key() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    let items = keyed(&repo, list, &[0, 1]);
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();

    let touched = drag(&mut coordinator, 1, 1, 1);

    assert_eq!(touched, BTreeSet::from([items[1].id]));
    assert_eq!(indents(&coordinator), vec![0, 1]);
    assert_eq!(coordinator.rows()[1].parent_id, Some(items[0].id));
    assert!(coordinator.rows()[0].has_children);
}

#[test]
fn task_list_indent_is_clamped_to_depth_limit() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Work", ListBackend::TaskList).unwrap().list_uuid;
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    let items = placed(&repo, &mut coordinator, &["a", "b", "c"]);
    assert_eq!(row_ids(&coordinator), vec![items[0].id, items[1].id, items[2].id]);

    assert_eq!(coordinator.indent_bounds(1, 1), (0, 1));
    let touched = drag(&mut coordinator, 1, 1, 5);
    assert_eq!(touched, BTreeSet::from([items[1].id, items[2].id]));
    assert_eq!(indents(&coordinator), vec![0, 1, 0]);

    // One level is the limit, so a second level collapses onto the first.
    coordinator.begin_drag();
    assert_eq!(coordinator.update_drag(2, 2, 2), 1);
    coordinator.commit_drag().unwrap();
    assert_eq!(indents(&coordinator), vec![0, 1, 1]);
    assert_eq!(coordinator.rows()[2].parent_id, Some(items[0].id));
    assert_eq!(coordinator.rows()[2].sort_key, 1);
}

#[test]
fn task_list_outdent_moves_child_after_former_parent() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Work", ListBackend::TaskList).unwrap().list_uuid;
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    let items = placed(&repo, &mut coordinator, &["a", "b", "c"]);
    drag(&mut coordinator, 1, 1, 1);
    drag(&mut coordinator, 2, 2, 1);
    assert_eq!(indents(&coordinator), vec![0, 1, 1]);

    let touched = drag(&mut coordinator, 2, 2, 0);

    assert_eq!(touched, BTreeSet::from([items[2].id]));
    assert_eq!(row_ids(&coordinator), vec![items[0].id, items[1].id, items[2].id]);
    assert_eq!(indents(&coordinator), vec![0, 1, 0]);
    let keys: Vec<i64> = coordinator.rows().iter().map(|row| row.sort_key).collect();
    assert_eq!(keys, vec![0, 0, 1]);
}

#[test]
fn drop_inside_own_subtree_changes_nothing() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Work", ListBackend::TaskList).unwrap().list_uuid;
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    placed(&repo, &mut coordinator, &["a", "b", "c", "d"]);
    drag(&mut coordinator, 1, 1, 1);
    drag(&mut coordinator, 2, 2, 1);
    let before = coordinator.rows().to_vec();
    assert_eq!(indents(&coordinator), vec![0, 1, 1, 0]);

    let touched = drag(&mut coordinator, 0, 1, 0);

    assert!(touched.is_empty());
    assert_eq!(coordinator.rows(), before.as_slice());
}

#[test]
fn hovering_over_own_child_keeps_the_current_indent() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    let parent = keyed(&repo, list, &[1]).remove(0);
    repo.create_item(&NewItem::new(list, "child").with_parent(parent.id).with_order(0))
        .unwrap();
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    let before = coordinator.rows().to_vec();
    assert_eq!(indents(&coordinator), vec![0, 1]);

    coordinator.begin_drag();
    assert_eq!(coordinator.update_drag(0, 1, 5), 0);
    assert!(coordinator.commit_drag().unwrap().is_empty());
    assert_eq!(coordinator.rows(), before.as_slice());
}

#[test]
fn hovering_deep_inside_own_subtree_pins_the_indent() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    let parent = keyed(&repo, list, &[1]).remove(0);
    for (index, title) in ["b", "c"].into_iter().enumerate() {
        repo.create_item(
            &NewItem::new(list, title)
                .with_parent(parent.id)
                .with_order(index as i64),
        )
        .unwrap();
    }
    let coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    assert_eq!(indents(&coordinator), vec![0, 1, 1]);

    assert_eq!(coordinator.indent_bounds(0, 1), (0, 0));
    assert_eq!(coordinator.indent_bounds(0, 2), (0, 0));
}

#[test]
fn hovering_over_own_last_child_nests_under_row_above() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    let items = keyed(&repo, list, &[0, 1]);
    let (above, parent) = (&items[0], &items[1]);
    let child = repo
        .create_item(&NewItem::new(list, "child").with_parent(parent.id).with_order(0))
        .unwrap();
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    assert_eq!(row_ids(&coordinator), vec![above.id, parent.id, child.id]);

    coordinator.begin_drag();
    assert_eq!(coordinator.update_drag(1, 2, 5), 1);
    let touched = coordinator.commit_drag().unwrap();

    assert_eq!(touched, BTreeSet::from([parent.id]));
    assert_eq!(indents(&coordinator), vec![0, 1, 2]);
    assert_eq!(coordinator.rows()[1].parent_id, Some(above.id));
}

#[test]
fn manual_drag_reorders_and_nests_in_stored_tree() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Someday", ListBackend::Manual).unwrap().list_uuid;
    let items: Vec<Item> = ["a", "b", "c"]
        .into_iter()
        .map(|title| repo.create_item(&NewItem::new(list, title)).unwrap())
        .collect();
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    let (a, b, c) = (&items[0], &items[1], &items[2]);
    assert_eq!(row_ids(&coordinator), vec![c.id, b.id, a.id]);

    assert_eq!(drag(&mut coordinator, 2, 0, 0), BTreeSet::from([a.id]));
    assert_eq!(row_ids(&coordinator), vec![a.id, c.id, b.id]);

    assert_eq!(drag(&mut coordinator, 1, 1, 1), BTreeSet::from([c.id]));
    assert_eq!(indents(&coordinator), vec![0, 1, 0]);
    assert_eq!(coordinator.rows()[1].parent_id, Some(a.id));
    assert_eq!(
        repo.load_serialized_tree(list).unwrap(),
        Some(format!(r#"["-1",["{}","{}"],"{}"]"#, a.uuid, c.uuid, b.uuid))
    );
    let service = coordinator.manual_order().unwrap();
    assert_eq!(service.indent_of(&c.uuid), 1);
}

#[test]
fn cancel_drag_discards_pending_drop() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    keyed(&repo, list, &[0, 1, 2]);
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    let before = coordinator.rows().to_vec();

    coordinator.begin_drag();
    coordinator.update_drag(2, 0, 0);
    assert_eq!(
        coordinator.state(),
        DragState::Dragging {
            pending: Some(PendingDrop {
                from_slot: 2,
                to_slot: 0,
                indent: 0
            })
        }
    );
    coordinator.cancel_drag();

    assert!(coordinator.commit_drag().unwrap().is_empty());
    coordinator.refresh().unwrap();
    assert_eq!(coordinator.rows(), before.as_slice());
}

#[test]
fn update_drag_outside_gesture_records_nothing() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    keyed(&repo, list, &[0, 1]);
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();

    assert_eq!(coordinator.update_drag(9, 9, 4), 1);
    assert_eq!(coordinator.state(), DragState::Idle);
    assert!(coordinator.commit_drag().unwrap().is_empty());
}

#[test]
fn new_items_land_on_top_when_configured() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Work", ListBackend::TaskList).unwrap().list_uuid;
    let config = OrderingConfig {
        new_items_on_top: true,
        ..OrderingConfig::default()
    };
    let mut coordinator = ReorderCoordinator::load(&repo, list, config).unwrap();

    let items = placed(&repo, &mut coordinator, &["first", "second", "third"]);

    assert_eq!(row_ids(&coordinator), vec![items[2].id, items[1].id, items[0].id]);
    let keys: Vec<i64> = coordinator.rows().iter().map(|row| row.sort_key).collect();
    assert_eq!(keys, vec![0, 1, 2]);
}

#[test]
fn calendar_item_placed_on_top_sorts_first() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    keyed(&repo, list, &[10, 20]);
    let config = OrderingConfig {
        new_items_on_top: true,
        ..OrderingConfig::default()
    };
    let mut coordinator = ReorderCoordinator::load(&repo, list, config).unwrap();
    let fresh = repo.create_item(&NewItem::new(list, "fresh")).unwrap();

    let touched = coordinator.place_new_item(fresh.id).unwrap();

    assert_eq!(touched, BTreeSet::from([fresh.id]));
    assert_eq!(coordinator.rows()[0].item_id, fresh.id);
    assert_eq!(coordinator.rows()[0].sort_key, 9);
}

#[test]
fn placing_an_already_keyed_calendar_item_touches_nothing() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let list = repo.create_list("Inbox", ListBackend::Calendar).unwrap().list_uuid;
    keyed(&repo, list, &[10, 20]);
    let mut coordinator = ReorderCoordinator::load(&repo, list, OrderingConfig::default()).unwrap();
    let keyed_item = repo
        .create_item(&NewItem::new(list, "keyed").with_order(15))
        .unwrap();

    let touched = coordinator.place_new_item(keyed_item.id).unwrap();

    assert!(touched.is_empty());
    assert_eq!(coordinator.rows()[1].item_id, keyed_item.id);
    assert_eq!(coordinator.rows()[1].sort_key, 15);
}

#[test]
fn loading_unknown_list_fails() {
    let conn = setup();
    let repo = SqliteItemRepository::try_new(&conn).unwrap();
    let missing = Uuid::new_v4();

    match ReorderCoordinator::load(&repo, missing, OrderingConfig::default()) {
        Err(OrderError::Repo(RepoError::ListNotFound(id))) => assert_eq!(id, missing),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected missing list error"),
    }
}
