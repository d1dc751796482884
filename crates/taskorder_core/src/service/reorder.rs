//! Drag-and-drop reorder coordinator.
//!
//! # Responsibility
//! - Project one list into visual rows regardless of backend.
//! - Track the drag gesture and clamp requested indents per backend.
//! - Resolve a drop into (parent, position) and apply it atomically.
//!
//! # Invariants
//! - Nothing is persisted before `commit_drag`; cancel is free.
//! - A drop that would put an item under itself is a logged no-op.
//! - Every commit runs inside one store transaction.

use crate::config::OrderingConfig;
use crate::model::item::{Item, ItemId, ListBackend, ListId, OrderDomain, TaskList};
use crate::ordering::dual_key::DualKeyPositioner;
use crate::ordering::nested_tree::MoveTarget;
use crate::ordering::order_key::OrderKeyStore;
use crate::ordering::{invariant_checks_compiled, OrderResult};
use crate::repo::item_repo::{ItemStore, RepoError};
use crate::service::manual_order::ManualOrderService;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualRow {
    pub item_id: ItemId,
    pub uuid: String,
    pub parent_id: Option<ItemId>,
    pub indent: i32,
    /// Effective order key as stored by the backend.
    pub sort_key: i64,
    pub has_children: bool,
}

/// Drop recorded by the latest `update_drag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDrop {
    pub from_slot: usize,
    pub to_slot: usize,
    pub indent: i32,
}

/// Gesture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { pending: Option<PendingDrop> },
}

enum BackendAdapter<'s, S: ?Sized> {
    Calendar(OrderKeyStore<'s, S>),
    TaskList(DualKeyPositioner<'s, S>),
    Manual(ManualOrderService<'s, S>),
}

impl<'s, S> BackendAdapter<'s, S>
where
    S: ItemStore + ?Sized,
{
    fn load(store: &'s S, list: &TaskList, config: &OrderingConfig) -> OrderResult<Self> {
        Ok(match list.backend {
            ListBackend::Calendar => Self::Calendar(OrderKeyStore::new(store)),
            ListBackend::TaskList => Self::TaskList(
                DualKeyPositioner::new(store)
                    .with_verification(config.verify_invariants || invariant_checks_compiled()),
            ),
            ListBackend::Manual => Self::Manual(ManualOrderService::load(store, list.list_uuid)?),
        })
    }
}

/// Where a resolved drop lands.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DropPlan {
    parent: Option<usize>,
    sibling_index: usize,
    previous: Option<usize>,
    next: Option<usize>,
}

/// Backend-agnostic drag/drop contract for one list.
pub struct ReorderCoordinator<'s, S: ?Sized> {
    store: &'s S,
    list: TaskList,
    config: OrderingConfig,
    adapter: BackendAdapter<'s, S>,
    rows: Vec<VisualRow>,
    state: DragState,
}

impl<'s, S> ReorderCoordinator<'s, S>
where
    S: ItemStore + ?Sized,
{
    /// Loads a list and projects its rows.
    ///
    /// # Errors
    /// - Returns `RepoError::ListNotFound` when the list does not exist.
    pub fn load(store: &'s S, list_uuid: ListId, config: OrderingConfig) -> OrderResult<Self> {
        let list = store
            .fetch_list(list_uuid)?
            .ok_or(RepoError::ListNotFound(list_uuid))?;
        let adapter = BackendAdapter::load(store, &list, &config)?;
        let mut coordinator = Self {
            store,
            list,
            config,
            adapter,
            rows: Vec::new(),
            state: DragState::Idle,
        };
        coordinator.refresh()?;
        info!(
            "event=reorder_load module=reorder status=ok list_uuid={} backend={} rows={}",
            coordinator.list.list_uuid,
            coordinator.list.backend.as_str(),
            coordinator.rows.len()
        );
        Ok(coordinator)
    }

    pub fn list(&self) -> &TaskList {
        &self.list
    }

    pub fn backend(&self) -> ListBackend {
        self.list.backend
    }

    pub fn rows(&self) -> &[VisualRow] {
        &self.rows
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    /// Manual-order service when the list uses manual ordering.
    pub fn manual_order(&self) -> Option<&ManualOrderService<'s, S>> {
        match &self.adapter {
            BackendAdapter::Manual(service) => Some(service),
            _ => None,
        }
    }

    /// Rebuilds rows from storage.
    pub fn refresh(&mut self) -> OrderResult<()> {
        self.rows = match &mut self.adapter {
            BackendAdapter::Manual(service) => {
                service.reconcile()?;
                project_manual_rows(self.store, service)?
            }
            _ => project_store_rows(self.store, self.list.list_uuid)?,
        };
        Ok(())
    }

    pub fn begin_drag(&mut self) {
        self.state = DragState::Dragging { pending: None };
        debug!("event=drag_begin module=reorder status=ok list_uuid={}", self.list.list_uuid);
    }

    /// Records the current hover position and returns the accepted indent.
    ///
    /// Slots are clamped to the row range. Outside a gesture the clamped
    /// indent is still returned but nothing is recorded.
    pub fn update_drag(&mut self, from_slot: usize, to_slot: usize, requested_indent: i32) -> i32 {
        let Some(last) = self.rows.len().checked_sub(1) else {
            return 0;
        };
        let from_slot = from_slot.min(last);
        let to_slot = to_slot.min(last);
        let (min, max) = self.indent_bounds(from_slot, to_slot);
        let indent = requested_indent.max(min).min(max);

        match &mut self.state {
            DragState::Dragging { pending } => {
                *pending = Some(PendingDrop {
                    from_slot,
                    to_slot,
                    indent,
                });
            }
            DragState::Idle => {
                debug!("event=drag_update module=reorder status=skip reason=not_dragging");
            }
        }
        indent
    }

    /// Abandons the gesture.
    pub fn cancel_drag(&mut self) {
        self.state = DragState::Idle;
        debug!("event=drag_cancel module=reorder status=ok list_uuid={}", self.list.list_uuid);
    }

    /// Applies the recorded drop and returns every touched item id.
    pub fn commit_drag(&mut self) -> OrderResult<BTreeSet<ItemId>> {
        let state = std::mem::take(&mut self.state);
        let DragState::Dragging {
            pending: Some(pending),
        } = state
        else {
            debug!("event=drag_commit module=reorder status=skip reason=no_drop");
            return Ok(BTreeSet::new());
        };

        let result = self.apply_drop(pending);
        match &result {
            Ok(touched) => info!(
                "event=drag_commit module=reorder status=ok list_uuid={} backend={} touched={}",
                self.list.list_uuid,
                self.list.backend.as_str(),
                touched.len()
            ),
            Err(err) => {
                warn!(
                    "event=drag_commit module=reorder status=error list_uuid={} error={}",
                    self.list.list_uuid, err
                );
                self.reload()?;
            }
        }
        result
    }

    /// Positions a freshly created item according to the configured
    /// placement.
    pub fn place_new_item(&mut self, item_id: ItemId) -> OrderResult<BTreeSet<ItemId>> {
        let Some(item) = self.store.fetch(item_id)? else {
            debug!("event=place_new_item module=reorder status=skip reason=item_missing item_id={item_id}");
            return Ok(BTreeSet::new());
        };
        if item.list_uuid != self.list.list_uuid {
            debug!("event=place_new_item module=reorder status=skip reason=other_list item_id={item_id}");
            return Ok(BTreeSet::new());
        }

        let top = self.config.new_items_on_top;
        let store = self.store;
        let adapter = &mut self.adapter;
        let touched = store.transaction(|| -> OrderResult<BTreeSet<ItemId>> {
            Ok(match adapter {
                BackendAdapter::Calendar(keys) => {
                    if keys.assign_on_insert(item.id, &item.domain(), top)?.is_some() {
                        BTreeSet::from([item.id])
                    } else {
                        BTreeSet::new()
                    }
                }
                BackendAdapter::TaskList(positions) => positions
                    .insert_and_shift(item.id, item.parent_id, top)?
                    .into_iter()
                    .collect(),
                BackendAdapter::Manual(service) => {
                    if service.on_item_created(&item.uuid)? {
                        BTreeSet::from([item.id])
                    } else {
                        BTreeSet::new()
                    }
                }
            })
        })?;
        self.refresh()?;
        Ok(touched)
    }

    /// Accepted indent range `(min, max)` for a row hovering at `to_slot`.
    ///
    /// Hovering over the last row of the dragged subtree lands where the
    /// row already is, so it gets the bounds of `from_slot`. Hovering
    /// deeper inside the subtree cannot move anything and pins the indent.
    pub fn indent_bounds(&self, from_slot: usize, to_slot: usize) -> (i32, i32) {
        let rows = &self.rows;
        let Some(last) = rows.len().checked_sub(1) else {
            return (0, 0);
        };
        let from = from_slot.min(last);
        let mut to = to_slot.min(last);
        let dragged = &rows[from];
        let block_end = subtree_end(rows, from);
        if from < to {
            if to + 1 < block_end {
                return (dragged.indent, dragged.indent);
            }
            if to + 1 == block_end {
                to = from;
            }
        }

        let max = if to == 0 {
            0
        } else {
            let previous = &rows[if from >= to { to - 1 } else { to }];
            match self.list.backend {
                ListBackend::TaskList => {
                    let height = subtree_height(rows, from, block_end);
                    (previous.indent + 1)
                        .min(self.config.max_task_list_depth - height)
                        .max(0)
                }
                ListBackend::Calendar | ListBackend::Manual => previous.indent + 1,
            }
        };

        let min = if to == 0 || to == last {
            0
        } else {
            let next_slot = if from <= to { to + 1 } else { to };
            let following = (next_slot..rows.len())
                .find(|slot| !(from..block_end).contains(slot))
                .map(|slot| &rows[slot]);
            match (following, self.list.backend) {
                (None, _) => 0,
                (Some(_), ListBackend::TaskList) if dragged.has_children => 0,
                (Some(next), _) => next.indent,
            }
        };

        (min.min(max), max)
    }

    fn apply_drop(&mut self, pending: PendingDrop) -> OrderResult<BTreeSet<ItemId>> {
        let rows = self.rows.clone();
        let Some(dragged) = rows.get(pending.from_slot) else {
            return Ok(BTreeSet::new());
        };
        if pending.from_slot == pending.to_slot && pending.indent == dragged.indent {
            return Ok(BTreeSet::new());
        }

        let from = pending.from_slot;
        let block_end = subtree_end(&rows, from);
        let insert_at = if from < pending.to_slot {
            pending.to_slot + 1
        } else {
            pending.to_slot
        };
        if from < insert_at && insert_at < block_end {
            debug!(
                "event=drag_commit module=reorder status=skip reason=inside_own_subtree item_id={}",
                dragged.item_id
            );
            return Ok(BTreeSet::new());
        }

        let rest: Vec<&VisualRow> = rows
            .iter()
            .enumerate()
            .filter(|(slot, _)| !(from..block_end).contains(slot))
            .map(|(_, row)| row)
            .collect();
        let slot_in_rest = if insert_at <= from {
            insert_at
        } else {
            insert_at - (block_end - from)
        };
        let plan = plan_drop(&rest, slot_in_rest, pending.indent);
        let new_parent = plan.parent.map(|slot| rest[slot]);

        if let Some(parent) = new_parent {
            if self.would_create_cycle(dragged, parent)? {
                warn!(
                    "event=drag_commit module=reorder status=skip reason=cycle item_id={} parent_id={}",
                    dragged.item_id, parent.item_id
                );
                return Ok(BTreeSet::new());
            }
        }

        let new_parent_id = new_parent.map(|row| row.item_id);
        let old_index = rest[..from.min(rest.len())]
            .iter()
            .filter(|row| row.parent_id == dragged.parent_id)
            .count();
        if new_parent_id == dragged.parent_id && old_index == plan.sibling_index {
            debug!(
                "event=drag_commit module=reorder status=skip reason=unchanged item_id={}",
                dragged.item_id
            );
            return Ok(BTreeSet::new());
        }

        let previous = plan.previous.map(|slot| rest[slot]);
        let next = plan.next.map(|slot| rest[slot]);
        let store = self.store;
        let adapter = &mut self.adapter;
        let touched = store.transaction(|| -> OrderResult<BTreeSet<ItemId>> {
            Ok(match adapter {
                BackendAdapter::Calendar(keys) => {
                    let key = match (next, previous) {
                        (Some(next), _) => Some(next.sort_key),
                        (None, Some(previous)) => Some(previous.sort_key.saturating_add(1)),
                        (None, None) => None,
                    };
                    keys.move_item(dragged.item_id, new_parent_id, key)?
                        .into_iter()
                        .collect()
                }
                BackendAdapter::TaskList(positions) => positions
                    .move_item(dragged.item_id, new_parent_id, plan.sibling_index as i64)?
                    .into_iter()
                    .collect(),
                BackendAdapter::Manual(service) => {
                    let moved = match (next, new_parent) {
                        (Some(next), _) => service
                            .move_to(&dragged.uuid, MoveTarget::Before(next.uuid.as_str()))?,
                        (None, Some(parent)) => {
                            service.move_under(&dragged.uuid, Some(parent.uuid.as_str()), usize::MAX)?
                        }
                        (None, None) => service.move_to(&dragged.uuid, MoveTarget::EndOfList)?,
                    };
                    if moved {
                        BTreeSet::from([dragged.item_id])
                    } else {
                        BTreeSet::new()
                    }
                }
            })
        })?;

        self.refresh()?;
        Ok(touched)
    }

    fn would_create_cycle(&self, dragged: &VisualRow, parent: &VisualRow) -> OrderResult<bool> {
        if let BackendAdapter::Manual(service) = &self.adapter {
            return Ok(service.tree().is_descendant_of(&parent.uuid, &dragged.uuid));
        }

        let mut visited = HashSet::new();
        let mut cursor = Some(parent.item_id);
        while let Some(current) = cursor {
            if current == dragged.item_id {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Ok(true);
            }
            cursor = match self.store.fetch(current)? {
                Some(item) => item.parent_id,
                None => None,
            };
        }
        Ok(false)
    }

    fn reload(&mut self) -> OrderResult<()> {
        self.adapter = BackendAdapter::load(self.store, &self.list, &self.config)?;
        self.refresh()
    }
}

/// Resolves parent and neighbours for a row dropped at `slot` of `rest`.
///
/// The parent is the nearest preceding row with a smaller indent.
fn plan_drop(rest: &[&VisualRow], slot: usize, indent: i32) -> DropPlan {
    let slot = slot.min(rest.len());
    let parent = if slot == 0 || indent <= 0 {
        None
    } else {
        (0..slot).rev().find(|index| rest[*index].indent < indent)
    };
    let parent_id = parent.map(|index| rest[index].item_id);
    let is_sibling = |index: &usize| rest[*index].parent_id == parent_id;

    let previous = (0..slot).rev().find(is_sibling);
    let next = (slot..rest.len()).find(is_sibling);
    let sibling_index = (0..slot).filter(is_sibling).count();
    DropPlan {
        parent,
        sibling_index,
        previous,
        next,
    }
}

/// First slot after `from` that is not part of its subtree.
fn subtree_end(rows: &[VisualRow], from: usize) -> usize {
    let base = rows[from].indent;
    (from + 1..rows.len())
        .find(|slot| rows[*slot].indent <= base)
        .unwrap_or(rows.len())
}

fn subtree_height(rows: &[VisualRow], from: usize, block_end: usize) -> i32 {
    let base = rows[from].indent;
    rows[from..block_end]
        .iter()
        .map(|row| row.indent - base)
        .max()
        .unwrap_or(0)
}

fn project_store_rows<S>(store: &S, list_uuid: ListId) -> OrderResult<Vec<VisualRow>>
where
    S: ItemStore + ?Sized,
{
    let mut rows = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(Item, i32)> = store
        .active_children_of(&OrderDomain::root(list_uuid))?
        .into_iter()
        .rev()
        .map(|item| (item, 0))
        .collect();

    while let Some((item, indent)) = stack.pop() {
        if !visited.insert(item.id) {
            continue;
        }
        let children = store.active_children_of(&OrderDomain::new(list_uuid, Some(item.id)))?;
        rows.push(VisualRow {
            item_id: item.id,
            sort_key: item.effective_key(),
            parent_id: item.parent_id,
            has_children: !children.is_empty(),
            uuid: item.uuid,
            indent,
        });
        stack.extend(children.into_iter().rev().map(|child| (child, indent + 1)));
    }
    Ok(rows)
}

fn project_manual_rows<S>(
    store: &S,
    service: &ManualOrderService<'_, S>,
) -> OrderResult<Vec<VisualRow>>
where
    S: ItemStore + ?Sized,
{
    let tree = service.tree();
    let mut rows = Vec::with_capacity(tree.len());
    let mut ids: HashMap<&str, ItemId> = HashMap::new();
    let mut skip_below: Option<i32> = None;

    for node in tree.nodes() {
        if let Some(limit) = skip_below {
            if node.indent > limit {
                continue;
            }
            skip_below = None;
        }
        match store.fetch_by_uuid(node.id)? {
            Some(item) if item.is_active() && item.list_uuid == service.list_uuid() => {
                ids.insert(node.id, item.id);
                rows.push(VisualRow {
                    item_id: item.id,
                    sort_key: item.effective_key(),
                    parent_id: node.parent.and_then(|parent| ids.get(parent).copied()),
                    indent: node.indent,
                    has_children: !tree.children_of(Some(node.id)).is_empty(),
                    uuid: item.uuid,
                });
            }
            _ => skip_below = Some(node.indent),
        }
    }
    Ok(rows)
}
