//! Single-key ordering for calendar-style lists.
//!
//! # Responsibility
//! - Place newly created items at the top or bottom of their domain.
//! - Open a gap at a target key by shifting only the contiguous run of
//!   colliding siblings.
//! - Move one item to a new parent/key pair.
//!
//! # Invariants
//! - Domain members are walked in (effective key, id) order.
//! - `shift_down` rewrites the minimal prefix of the run starting at `from`;
//!   it never touches items after the first gap.
//! - Every rewritten row has its modification timestamp bumped.

use super::OrderResult;
use crate::model::item::{Item, ItemId, OrderDomain};
use crate::repo::item_repo::{ItemQuery, OrderWriter};
use log::debug;

/// Calendar-backend order key primitives over an item store.
pub struct OrderKeyStore<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S> OrderKeyStore<'s, S>
where
    S: ItemQuery + OrderWriter + ?Sized,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Gives a freshly inserted item a key that sorts it first or last.
    ///
    /// Leaves the key unset when the creation-derived key already sorts
    /// correctly, or when the domain has no other members. Items that
    /// already carry a key are left alone. Returns the key written by this
    /// call, `None` when nothing was written.
    pub fn assign_on_insert(
        &self,
        item_id: ItemId,
        domain: &OrderDomain,
        place_at_top: bool,
    ) -> OrderResult<Option<i64>> {
        let Some(item) = self.store.fetch(item_id)? else {
            debug!("event=assign_on_insert module=order_key status=skip reason=item_missing item_id={item_id}");
            return Ok(None);
        };
        if item.sort_order.is_some() {
            debug!("event=assign_on_insert module=order_key status=skip reason=already_keyed item_id={item_id}");
            return Ok(None);
        }

        let keys = self
            .store
            .active_children_of(domain)?
            .into_iter()
            .filter(|sibling| sibling.id != item_id)
            .map(|sibling| sibling.effective_key());
        let own_key = item.creation_key();

        let assigned = if place_at_top {
            keys.min()
                .filter(|first| own_key >= *first)
                .map(|first| first.saturating_sub(1))
        } else {
            keys.max()
                .filter(|last| own_key <= *last)
                .map(|last| last.saturating_add(1))
        };

        if assigned.is_some() {
            self.store.write_key(item_id, assigned)?;
            self.store.touch_modified(&[item_id])?;
        }
        debug!(
            "event=assign_on_insert module=order_key status=ok item_id={} top={} assigned={}",
            item_id,
            place_at_top,
            assigned.is_some()
        );
        Ok(assigned)
    }

    /// Pushes the run of keys starting at `from` down by one.
    ///
    /// Only members whose effective key lies in `[from, to)` are considered.
    /// Returns the ids of rewritten rows in walk order.
    pub fn shift_down(
        &self,
        domain: &OrderDomain,
        from: i64,
        to: Option<i64>,
    ) -> OrderResult<Vec<ItemId>> {
        self.shift_run(domain, from, to, None)
    }

    /// Moves one item under `new_parent` with explicit key `new_key`.
    ///
    /// `new_key = None` clears the explicit key so the item falls back to
    /// its creation-derived position. Returns every touched id, the moved
    /// item last.
    pub fn move_item(
        &self,
        item_id: ItemId,
        new_parent: Option<ItemId>,
        new_key: Option<i64>,
    ) -> OrderResult<Vec<ItemId>> {
        let Some(item) = self.store.fetch(item_id)? else {
            debug!("event=order_key_move module=order_key status=skip reason=item_missing item_id={item_id}");
            return Ok(Vec::new());
        };
        let Some(destination) = self.resolve_destination(&item, new_parent)? else {
            return Ok(Vec::new());
        };

        let mut touched = Vec::new();
        if let Some(target) = new_key {
            let previous = item.effective_key();
            let shifted = if destination == item.domain() && target < previous {
                self.shift_run(&destination, target, Some(previous), Some(item_id))?
            } else {
                self.shift_run(&destination, target, None, Some(item_id))?
            };
            touched.extend(shifted);
        }

        self.store.write_key(item_id, new_key)?;
        if item.parent_id != new_parent {
            self.store.write_parent(item_id, new_parent)?;
        }
        self.store.touch_modified(&[item_id])?;
        touched.push(item_id);

        debug!(
            "event=order_key_move module=order_key status=ok item_id={} reparented={} touched={}",
            item_id,
            item.parent_id != new_parent,
            touched.len()
        );
        Ok(touched)
    }

    fn resolve_destination(
        &self,
        item: &Item,
        new_parent: Option<ItemId>,
    ) -> OrderResult<Option<OrderDomain>> {
        let Some(parent_id) = new_parent else {
            return Ok(Some(OrderDomain::root(item.list_uuid)));
        };
        if parent_id == item.id {
            debug!("event=order_key_move module=order_key status=skip reason=self_parent item_id={}", item.id);
            return Ok(None);
        }
        match self.store.fetch(parent_id)? {
            Some(parent) if parent.is_active() && parent.list_uuid == item.list_uuid => {
                Ok(Some(OrderDomain::new(item.list_uuid, Some(parent_id))))
            }
            _ => {
                debug!(
                    "event=order_key_move module=order_key status=skip reason=parent_missing item_id={} parent_id={}",
                    item.id, parent_id
                );
                Ok(None)
            }
        }
    }

    fn shift_run(
        &self,
        domain: &OrderDomain,
        from: i64,
        to: Option<i64>,
        exclude: Option<ItemId>,
    ) -> OrderResult<Vec<ItemId>> {
        let candidates = self
            .store
            .active_children_of(domain)?
            .into_iter()
            .filter(|item| Some(item.id) != exclude)
            .map(|item| (item.effective_key(), item.id))
            .filter(|(key, _)| *key >= from && to.map_or(true, |end| *key < end));

        let mut expected = from;
        let mut rewritten = Vec::new();
        // `active_children_of` already yields (effective key, id) order.
        for (key, id) in candidates {
            if key > expected {
                break;
            }
            expected = expected.saturating_add(1);
            self.store.write_key(id, Some(expected))?;
            rewritten.push(id);
        }

        self.store.touch_modified(&rewritten)?;
        debug!(
            "event=shift_down module=order_key status=ok from={} bounded={} rewritten={}",
            from,
            to.is_some(),
            rewritten.len()
        );
        Ok(rewritten)
    }
}
