//! Manual ordering use-case service.
//!
//! # Responsibility
//! - Own the nested tree of one manually ordered list.
//! - Reconcile it against live items on load.
//! - Persist the serialized tree after every structural change.
//!
//! # Invariants
//! - The stored text always matches the in-memory tree after a mutating
//!   call returns `Ok(true)`.
//! - Identifiers that are neither positive integers nor UUIDs never enter
//!   the tree through `on_item_created`.

use crate::model::item::{is_valid_item_uuid, ListId};
use crate::ordering::nested_tree::{MoveTarget, NestedTreeModel, NodeView};
use crate::ordering::OrderResult;
use crate::repo::item_repo::{ItemQuery, OrderWriter, TreeBlobStore};
use log::debug;

/// Manual-order facade over one list's nested tree.
pub struct ManualOrderService<'s, S: ?Sized> {
    store: &'s S,
    list_uuid: ListId,
    tree: NestedTreeModel,
}

impl<'s, S> ManualOrderService<'s, S>
where
    S: ItemQuery + OrderWriter + TreeBlobStore + ?Sized,
{
    /// Loads, reconciles and (when reconciliation changed it) re-saves the
    /// list's tree.
    pub fn load(store: &'s S, list_uuid: ListId) -> OrderResult<Self> {
        let text = store.load_serialized_tree(list_uuid)?;
        let tree = NestedTreeModel::build_from_serialized(text.as_deref());
        let mut service = Self {
            store,
            list_uuid,
            tree,
        };
        service.reconcile()?;
        Ok(service)
    }

    pub fn list_uuid(&self) -> ListId {
        self.list_uuid
    }

    pub fn tree(&self) -> &NestedTreeModel {
        &self.tree
    }

    /// Re-reads active identifiers and brings the tree in line.
    pub fn reconcile(&mut self) -> OrderResult<bool> {
        let active = self.store.active_identifiers(self.list_uuid)?;
        let changed = self.tree.reconcile(&active);
        if changed {
            self.persist("reconcile")?;
        }
        Ok(changed)
    }

    /// Puts a newly created item at the top of the list.
    pub fn on_item_created(&mut self, uuid: &str) -> OrderResult<bool> {
        if !is_valid_item_uuid(uuid) {
            debug!("event=manual_item_created module=manual_order status=skip reason=invalid_identifier");
            return Ok(false);
        }
        self.edit("item_created", |tree| tree.insert_at_front(uuid))
    }

    /// Drops a deleted item; its children take its place.
    pub fn on_item_deleted(&mut self, uuid: &str) -> OrderResult<bool> {
        self.edit("item_deleted", |tree| tree.remove_node(uuid))
    }

    pub fn indent(&mut self, uuid: &str, delta: i32) -> OrderResult<bool> {
        self.edit("indent", |tree| tree.indent(uuid, delta))
    }

    pub fn move_to(&mut self, uuid: &str, target: MoveTarget<'_>) -> OrderResult<bool> {
        self.edit("move_to", |tree| tree.move_to(uuid, target))
    }

    pub fn move_under(
        &mut self,
        uuid: &str,
        parent: Option<&str>,
        index: usize,
    ) -> OrderResult<bool> {
        self.edit("move_under", |tree| tree.move_under(uuid, parent, index))
    }

    pub fn move_to_parent_of(&mut self, uuid: &str, sibling: &str) -> OrderResult<bool> {
        self.edit("move_to_parent_of", |tree| tree.move_to_parent_of(uuid, sibling))
    }

    pub fn indent_of(&self, uuid: &str) -> i32 {
        self.tree.indent_of(uuid)
    }

    pub fn ordered_ids(&self) -> Vec<String> {
        self.tree
            .ordered_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn apply_to_descendants<F>(&self, uuid: &str, visitor: F)
    where
        F: FnMut(NodeView<'_>),
    {
        self.tree.apply_to_descendants(uuid, visitor);
    }

    pub fn serialize(&self) -> String {
        self.tree.serialize()
    }

    fn edit<F>(&mut self, operation: &'static str, apply: F) -> OrderResult<bool>
    where
        F: FnOnce(&mut NestedTreeModel) -> bool,
    {
        if !apply(&mut self.tree) {
            debug!("event=manual_edit module=manual_order status=skip operation={operation}");
            return Ok(false);
        }
        self.persist(operation)?;
        Ok(true)
    }

    fn persist(&self, operation: &'static str) -> OrderResult<()> {
        self.store
            .write_serialized_tree(self.list_uuid, &self.tree.serialize())?;
        debug!(
            "event=manual_edit module=manual_order status=ok operation={} nodes={}",
            operation,
            self.tree.len()
        );
        Ok(())
    }
}
