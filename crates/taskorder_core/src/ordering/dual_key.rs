//! Dense per-group positions for the task-list backend.
//!
//! # Responsibility
//! - Keep every (list, parent) sibling group numbered `0..n-1`.
//! - Insert, move and renumber items while carrying descendants along.
//!
//! # Invariants
//! - After any mutation each affected group is a dense permutation.
//! - Only rows whose stored position changes are written and touched.
//! - A nested item's top-level position is its parent's; it is never
//!   stored on the child.

use super::{invariant_checks_compiled, InvariantViolation, OrderError, OrderResult};
use crate::model::item::{Item, ItemId, ListId, OrderDomain};
use crate::repo::item_repo::{ItemQuery, OrderWriter};
use log::{debug, error};
use std::collections::HashSet;

/// Task-list backend position primitives over an item store.
pub struct DualKeyPositioner<'s, S: ?Sized> {
    store: &'s S,
    verify: bool,
}

impl<'s, S> DualKeyPositioner<'s, S>
where
    S: ItemQuery + OrderWriter + ?Sized,
{
    /// Creates a positioner that verifies groups in debug and
    /// `invariant-checks` builds.
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            verify: invariant_checks_compiled(),
        }
    }

    /// Forces the post-mutation pass on or off.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Places an item first or last in `(list, parent)`.
    ///
    /// Top placement pushes every sibling down by one. Returns touched ids.
    pub fn insert_and_shift(
        &self,
        item_id: ItemId,
        parent: Option<ItemId>,
        place_at_top: bool,
    ) -> OrderResult<Vec<ItemId>> {
        let Some(item) = self.store.fetch(item_id)? else {
            debug!("event=insert_and_shift module=dual_key status=skip reason=item_missing item_id={item_id}");
            return Ok(Vec::new());
        };
        let Some(domain) = self.resolve_domain(&item, parent)? else {
            return Ok(Vec::new());
        };

        let siblings = self.siblings_without(&domain, item_id)?;
        let mut touched = Vec::new();
        let offset = i64::from(place_at_top);
        for (index, sibling) in siblings.iter().enumerate() {
            self.write_if_changed(sibling, index as i64 + offset, &mut touched)?;
        }
        let position = if place_at_top { 0 } else { siblings.len() as i64 };

        self.place(&item, domain.parent_id, position)?;
        touched.push(item_id);
        self.store.touch_modified(&touched)?;
        self.verify_groups(&[domain])?;

        debug!(
            "event=insert_and_shift module=dual_key status=ok item_id={} top={} touched={}",
            item_id,
            place_at_top,
            touched.len()
        );
        Ok(touched)
    }

    /// Moves an item to `new_position` under `new_parent`.
    ///
    /// The position is clamped to `0..=n` where `n` is the size of the
    /// destination group without the item. Descendants keep their parent
    /// link and positions.
    pub fn move_item(
        &self,
        item_id: ItemId,
        new_parent: Option<ItemId>,
        new_position: i64,
    ) -> OrderResult<Vec<ItemId>> {
        let Some(item) = self.store.fetch(item_id)? else {
            debug!("event=dual_key_move module=dual_key status=skip reason=item_missing item_id={item_id}");
            return Ok(Vec::new());
        };
        let Some(destination) = self.resolve_domain(&item, new_parent)? else {
            return Ok(Vec::new());
        };
        let origin = item.domain();

        let mut touched = Vec::new();
        if origin != destination {
            let remaining = self.siblings_without(&origin, item_id)?;
            for (index, sibling) in remaining.iter().enumerate() {
                self.write_if_changed(sibling, index as i64, &mut touched)?;
            }
        }

        let mut group = self.siblings_without(&destination, item_id)?;
        let insert_at = clamp_position(new_position, group.len());
        group.insert(insert_at, item.clone());
        for (index, member) in group.iter().enumerate() {
            if member.id == item_id {
                continue;
            }
            self.write_if_changed(member, index as i64, &mut touched)?;
        }

        self.place(&item, destination.parent_id, insert_at as i64)?;
        touched.push(item_id);
        self.store.touch_modified(&touched)?;

        if origin == destination {
            self.verify_groups(&[destination])?;
        } else {
            self.verify_groups(&[origin, destination])?;
        }

        debug!(
            "event=dual_key_move module=dual_key status=ok item_id={} position={} reparented={} touched={}",
            item_id,
            insert_at,
            origin != destination,
            touched.len()
        );
        Ok(touched)
    }

    /// Identifier of the sibling directly before `position`.
    ///
    /// `position` indexes the group in display order and is clamped to its
    /// length, so stored keys do not need to be dense.
    pub fn get_previous(
        &self,
        list_uuid: ListId,
        parent: Option<ItemId>,
        position: i64,
    ) -> OrderResult<Option<String>> {
        if position <= 0 {
            return Ok(None);
        }
        let members = self
            .store
            .active_children_of(&OrderDomain::new(list_uuid, parent))?;
        let index = usize::try_from(position).map_or(members.len(), |at| at.min(members.len()));
        let previous = index
            .checked_sub(1)
            .and_then(|slot| members.into_iter().nth(slot))
            .map(|sibling| sibling.uuid);
        Ok(previous)
    }

    /// Renumbers every sibling group of a list in current display order.
    pub fn normalize(&self, list_uuid: ListId) -> OrderResult<Vec<ItemId>> {
        let mut touched = Vec::new();
        for domain in self.groups_of(list_uuid)? {
            let members = self.store.active_children_of(&domain)?;
            for (index, member) in members.iter().enumerate() {
                self.write_if_changed(member, index as i64, &mut touched)?;
            }
        }
        self.store.touch_modified(&touched)?;
        debug!(
            "event=normalize module=dual_key status=ok list_uuid={} touched={}",
            list_uuid,
            touched.len()
        );
        Ok(touched)
    }

    /// Checks every sibling group of a list.
    ///
    /// # Errors
    /// - Returns [`OrderError::InvariantViolation`] for the first group
    ///   found out of shape.
    pub fn validate_list(&self, list_uuid: ListId) -> OrderResult<()> {
        for domain in self.groups_of(list_uuid)? {
            self.validate_group(&domain)?;
        }
        Ok(())
    }

    /// Checks one sibling group.
    pub fn validate_group(&self, domain: &OrderDomain) -> OrderResult<()> {
        let members = self.store.active_children_of(domain)?;
        for (index, member) in members.iter().enumerate() {
            let expected = index as i64;
            if member.sort_order != Some(expected) {
                return Err(OrderError::InvariantViolation(InvariantViolation {
                    domain: *domain,
                    item_id: member.id,
                    expected,
                    found: member.sort_order,
                }));
            }
        }
        Ok(())
    }

    fn verify_groups(&self, domains: &[OrderDomain]) -> OrderResult<()> {
        if !self.verify {
            return Ok(());
        }
        for domain in domains {
            if let Err(err) = self.validate_group(domain) {
                error!("event=dual_key_verify module=dual_key status=error error={err}");
                return Err(err);
            }
        }
        Ok(())
    }

    fn resolve_domain(
        &self,
        item: &Item,
        parent: Option<ItemId>,
    ) -> OrderResult<Option<OrderDomain>> {
        let Some(parent_id) = parent else {
            return Ok(Some(OrderDomain::root(item.list_uuid)));
        };
        if parent_id == item.id {
            debug!("event=dual_key_resolve module=dual_key status=skip reason=self_parent item_id={}", item.id);
            return Ok(None);
        }
        match self.store.fetch(parent_id)? {
            Some(found) if found.is_active() && found.list_uuid == item.list_uuid => {
                Ok(Some(OrderDomain::new(item.list_uuid, Some(parent_id))))
            }
            _ => {
                debug!(
                    "event=dual_key_resolve module=dual_key status=skip reason=parent_missing item_id={} parent_id={}",
                    item.id, parent_id
                );
                Ok(None)
            }
        }
    }

    fn siblings_without(&self, domain: &OrderDomain, item_id: ItemId) -> OrderResult<Vec<Item>> {
        Ok(self
            .store
            .active_children_of(domain)?
            .into_iter()
            .filter(|sibling| sibling.id != item_id)
            .collect())
    }

    fn write_if_changed(
        &self,
        item: &Item,
        position: i64,
        touched: &mut Vec<ItemId>,
    ) -> OrderResult<()> {
        if item.sort_order != Some(position) {
            self.store.write_key(item.id, Some(position))?;
            touched.push(item.id);
        }
        Ok(())
    }

    fn place(&self, item: &Item, parent: Option<ItemId>, position: i64) -> OrderResult<()> {
        if item.sort_order != Some(position) {
            self.store.write_key(item.id, Some(position))?;
        }
        if item.parent_id != parent {
            self.store.write_parent(item.id, parent)?;
        }
        Ok(())
    }

    /// All sibling groups reachable from the top level, parents first.
    fn groups_of(&self, list_uuid: ListId) -> OrderResult<Vec<OrderDomain>> {
        let mut groups = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = vec![OrderDomain::root(list_uuid)];
        while let Some(domain) = pending.pop() {
            for child in self.store.active_children_of(&domain)? {
                if visited.insert(child.id) {
                    pending.push(OrderDomain::new(list_uuid, Some(child.id)));
                }
            }
            groups.push(domain);
        }
        Ok(groups)
    }
}

fn clamp_position(requested: i64, len: usize) -> usize {
    if requested <= 0 {
        0
    } else {
        usize::try_from(requested).map_or(len, |position| position.min(len))
    }
}
