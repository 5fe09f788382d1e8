//! The timeline composer: real items interleaved with synthetic rows.
//!
//! The composed row sequence always looks like this:
//!
//! ```text
//! header
//! [time separator] [name separator] item      ← repeated, in item order
//! [typing]                                     ← only while a peer is composing
//! footer
//! ```
//!
//! Rows are kept in an `imbl::Vector` sorted by [`RowKey`], so that both
//! `position → row` (an index) and `item → position` (a binary search on the item's key)
//! are logarithmic, and inserting or removing one item only touches its own separators,
//! the separators of the item right after it, and the corners of its direct neighbors.

use std::collections::HashMap;

use imbl::Vector;
use rangemap::RangeSet;
use tracing::{debug, warn};

use crate::corners::{compute_corners, CornerMask, RunMember};
use crate::descriptor::Descriptor;
use crate::item::ordering::OrderKey;
use crate::item::{IdGenerator, Item, ItemId, ItemKind};
use super::row::{BodySlot, Row, RowKey, RowKind};
use super::separators::{SeparatorPolicy, Separators};

/// The ordered, position-addressable list of rows shown by the timeline's list view.
pub struct TimelineComposer {
    /// All rows, sorted by their `key`.
    rows: Vector<Row>,
    /// The real items, by id.
    items: HashMap<ItemId, Item>,
    /// The key under which each item's row is currently filed.
    ///
    /// This can lag behind `Item::order_key()` only within `update_item()`.
    keys: HashMap<ItemId, OrderKey>,
    policy: Box<dyn SeparatorPolicy>,
    ids: IdGenerator,
    typing_id: ItemId,
    /// The displayable names of the peers currently composing a message.
    typing_users: Vec<String>,
    /// Whether consecutive items from the same sender are grouped.
    group_runs: bool,
    /// The range of row positions whose presentation the list view has bound
    /// since the last change to them.
    ///
    /// Every mutation removes the affected positions from this set, so it is a
    /// conservative tracker: a row missing from it may still be up to date,
    /// but a row in it is never stale.
    bound_rows: RangeSet<usize>,
}

impl TimelineComposer {
    pub fn new(policy: Box<dyn SeparatorPolicy>, group_runs: bool) -> Self {
        let mut ids = IdGenerator::new();
        let header = Row { id: ids.next_id(), key: RowKey::Header, kind: RowKind::Header };
        let footer = Row { id: ids.next_id(), key: RowKey::Footer, kind: RowKind::Footer };
        let typing_id = ids.next_id();
        let mut rows = Vector::new();
        rows.push_back(header);
        rows.push_back(footer);
        Self {
            rows,
            items: HashMap::new(),
            keys: HashMap::new(),
            policy,
            ids,
            typing_id,
            typing_users: Vec::new(),
            group_runs,
            bound_rows: RangeSet::new(),
        }
    }

    /// The total number of rows, including the synthetic ones.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The number of real items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn row(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    pub fn row_kind(&self, position: usize) -> Option<ItemKind> {
        self.rows.get(position).map(|r| r.kind.item_kind())
    }

    pub fn row_stable_id(&self, position: usize) -> Option<ItemId> {
        self.rows.get(position).map(|r| r.id)
    }

    /// Returns the real item displayed at `position`, if that row is an item row.
    pub fn position_to_item(&self, position: usize) -> Option<&Item> {
        self.rows.get(position)
            .and_then(Row::item_id)
            .and_then(|id| self.items.get(&id))
    }

    /// Returns the current position of the given item, or `None` if it isn't in the timeline.
    pub fn item_to_position(&self, item_id: ItemId) -> Option<usize> {
        let key = self.keys.get(&item_id)?;
        self.find_row(&RowKey::Body { key: key.clone(), slot: BodySlot::Item }).ok()
    }

    /// Returns the current position of the row with the given stable id.
    ///
    /// Item rows are found in logarithmic time; synthetic rows by a linear scan.
    pub fn row_to_position(&self, row_id: ItemId) -> Option<usize> {
        if self.items.contains_key(&row_id) {
            return self.item_to_position(row_id);
        }
        self.rows.iter().position(|r| r.id == row_id)
    }

    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    /// Iterates over the real items in timeline order.
    pub fn items_in_order(&self) -> impl Iterator<Item = &Item> + '_ {
        self.rows.iter()
            .filter_map(Row::item_id)
            .filter_map(|id| self.items.get(&id))
    }

    pub fn typing_users(&self) -> &[String] {
        &self.typing_users
    }

    pub fn group_runs(&self) -> bool {
        self.group_runs
    }

    /// Whether the list view needs to (re)bind the row at `position`.
    pub fn needs_rebind(&self, position: usize) -> bool {
        !self.bound_rows.contains(&position)
    }

    /// Records that the list view has bound the row at `position`.
    pub fn mark_bound(&mut self, position: usize) {
        if position < self.rows.len() {
            self.bound_rows.insert(position..position + 1);
        }
    }

    /// Forces the row of the given item to be rebound, e.g., because its progress ring moved.
    pub fn invalidate_item(&mut self, item_id: ItemId) {
        if let Some(position) = self.item_to_position(item_id) {
            self.invalidate(position..position + 1);
        }
    }

    /// Creates an item for the given descriptor and inserts it in order.
    pub fn add_descriptor(&mut self, descriptor: &Descriptor) -> ItemId {
        let item = Item::from_descriptor(&mut self.ids, descriptor);
        let item_id = item.id();
        self.insert_item(item);
        item_id
    }

    /// Inserts an item at its position in the timeline order and returns that position.
    ///
    /// Returns `None` if an item with the same order key is already present.
    pub fn insert_item(&mut self, item: Item) -> Option<usize> {
        let item_id = item.id();
        let key = item.order_key();
        let Err(mut position) = self.find_row(&RowKey::Body { key: key.clone(), slot: BodySlot::Item }) else {
            warn!("Ignoring item {item_id}: an item with the same order key is already in the timeline");
            return None;
        };
        let first_changed = position;
        let prev_id = self.prev_item_id(position);
        let separators = self.policy.separators_before(prev_id.and_then(|id| self.items.get(&id)), &item);
        let kind = item.kind();
        self.items.insert(item_id, item);
        self.keys.insert(item_id, key.clone());

        position = self.insert_separators(position, &key, separators);
        self.rows.insert(position, Row {
            id: item_id,
            key: RowKey::Body { key, slot: BodySlot::Item },
            kind: RowKind::Item(kind),
        });
        self.invalidate_from(first_changed);

        let next_id = self.next_item_id(position);
        if let Some(next_id) = next_id {
            self.refresh_separators(next_id);
        }
        for id in [prev_id, Some(item_id), next_id].into_iter().flatten() {
            self.recompute_corners(id);
        }
        self.item_to_position(item_id)
    }

    /// Removes the given item (and its separators) from the timeline.
    pub fn remove_item(&mut self, item_id: ItemId) -> Option<Item> {
        let position = self.item_to_position(item_id)?;
        let prev_id = self.prev_item_id(position);
        let next_id = self.next_item_id(position);

        let first_changed = self.remove_separators_before(position);
        self.rows.remove(first_changed);
        self.keys.remove(&item_id);
        let item = self.items.remove(&item_id);
        self.invalidate_from(first_changed);

        if let Some(next_id) = next_id {
            self.refresh_separators(next_id);
        }
        for id in [prev_id, next_id].into_iter().flatten() {
            self.recompute_corners(id);
        }
        item
    }

    /// Applies `f` to the given item, then repositions it if its order changed
    /// and recomputes the corners it affects.
    pub fn update_item<R>(&mut self, item_id: ItemId, f: impl FnOnce(&mut Item) -> R) -> Option<R> {
        let item = self.items.get_mut(&item_id)?;
        let had_badges = item.annotations().has_badges();
        let result = f(item);
        let new_key = item.order_key();
        let has_badges = item.annotations().has_badges();

        if self.keys.get(&item_id) != Some(&new_key) {
            debug!("Item {item_id} changed its position in the timeline order; re-inserting it");
            if let Some(item) = self.remove_item(item_id) {
                self.insert_item(item);
            }
            return Some(result);
        }

        let position = self.item_to_position(item_id)?;
        self.invalidate(position..position + 1);
        if had_badges != has_badges {
            // The badge row changes this item's trailing edge and therefore its successor's top edge.
            self.recompute_corners(item_id);
            if let Some(next) = self.adjacent_item_id(position + 1) {
                self.recompute_corners(next);
            }
        }
        Some(result)
    }

    /// Sets the list of peers currently composing a message,
    /// showing or hiding the typing row as needed.
    ///
    /// Returns `true` if the typing row was added or removed.
    pub fn set_typing_users(&mut self, users: Vec<String>) -> bool {
        let was_typing = !self.typing_users.is_empty();
        let is_typing = !users.is_empty();
        self.typing_users = users;
        match (was_typing, is_typing) {
            (false, true) => {
                if let Err(position) = self.find_row(&RowKey::Typing) {
                    self.rows.insert(position, Row { id: self.typing_id, key: RowKey::Typing, kind: RowKind::Typing });
                    self.invalidate_from(position);
                }
                true
            }
            (true, false) => {
                if let Ok(position) = self.find_row(&RowKey::Typing) {
                    self.rows.remove(position);
                    self.invalidate_from(position);
                }
                true
            }
            (true, true) => {
                // Only the typing text changed.
                if let Ok(position) = self.find_row(&RowKey::Typing) {
                    self.invalidate(position..position + 1);
                }
                false
            }
            (false, false) => false,
        }
    }

    /// Turns run grouping on or off, recomputing every item's corners.
    pub fn set_group_runs(&mut self, group_runs: bool) {
        if self.group_runs == group_runs {
            return;
        }
        self.group_runs = group_runs;
        let ids: Vec<ItemId> = self.rows.iter().filter_map(Row::item_id).collect();
        for id in ids {
            self.recompute_corners(id);
        }
    }

    /// Removes every item and separator, keeping the header, footer and typing rows.
    ///
    /// Returns the removed items in timeline order.
    pub fn clear_items(&mut self) -> Vec<Item> {
        let order: Vec<ItemId> = self.rows.iter().filter_map(Row::item_id).collect();
        self.rows.retain(|r| !r.is_item() && !r.is_separator());
        self.keys.clear();
        self.bound_rows = RangeSet::new();
        order.into_iter().filter_map(|id| self.items.remove(&id)).collect()
    }

    fn find_row(&self, key: &RowKey) -> Result<usize, usize> {
        self.rows.binary_search_by(|row| row.key.cmp(key))
    }

    /// Returns the nearest real item strictly before `position`, skipping separators.
    fn prev_item_id(&self, position: usize) -> Option<ItemId> {
        let mut i = position;
        while i > 0 {
            i -= 1;
            let row = self.rows.get(i)?;
            if row.is_item() {
                return Some(row.id);
            }
            if !row.is_separator() {
                return None;
            }
        }
        None
    }

    /// Returns the nearest real item strictly after `position`, skipping separators.
    fn next_item_id(&self, position: usize) -> Option<ItemId> {
        let mut i = position + 1;
        while let Some(row) = self.rows.get(i) {
            if row.is_item() {
                return Some(row.id);
            }
            if !row.is_separator() {
                return None;
            }
            i += 1;
        }
        None
    }

    /// Returns the item displayed at exactly `position`, if that row is an item row.
    fn adjacent_item_id(&self, position: usize) -> Option<ItemId> {
        self.rows.get(position).and_then(Row::item_id)
    }

    /// Inserts the given separators at `position`, returning the position right after them.
    fn insert_separators(&mut self, mut position: usize, key: &OrderKey, separators: Separators) -> usize {
        if let Some(day) = separators.time {
            let row = Row {
                id: self.ids.next_id(),
                key: RowKey::Body { key: key.clone(), slot: BodySlot::TimeSeparator },
                kind: RowKind::Time { day },
            };
            self.rows.insert(position, row);
            position += 1;
        }
        if let Some(peer) = separators.name {
            let row = Row {
                id: self.ids.next_id(),
                key: RowKey::Body { key: key.clone(), slot: BodySlot::NameSeparator },
                kind: RowKind::Name { peer },
            };
            self.rows.insert(position, row);
            position += 1;
        }
        position
    }

    /// Removes the separator rows directly before the item row at `position`,
    /// returning the item row's new position.
    fn remove_separators_before(&mut self, mut position: usize) -> usize {
        while position > 0 && self.rows.get(position - 1).is_some_and(Row::is_separator) {
            self.rows.remove(position - 1);
            position -= 1;
        }
        position
    }

    /// Re-asks the separator policy about the given item, e.g., because its predecessor changed.
    fn refresh_separators(&mut self, item_id: ItemId) {
        let Some(position) = self.item_to_position(item_id) else { return };
        let prev = self.prev_item_id(position).and_then(|id| self.items.get(&id));
        let Some(item) = self.items.get(&item_id) else { return };
        let wanted = self.policy.separators_before(prev, item);
        let current = self.separators_before(position);
        if current == wanted {
            return;
        }
        let Some(key) = self.keys.get(&item_id).cloned() else { return };
        let first = self.remove_separators_before(position);
        self.insert_separators(first, &key, wanted);
        self.invalidate_from(first);
    }

    /// Returns the separators currently shown before the item row at `position`.
    fn separators_before(&self, position: usize) -> Separators {
        let mut separators = Separators::none();
        let mut i = position;
        while i > 0 {
            i -= 1;
            match self.rows.get(i).map(|r| &r.kind) {
                Some(RowKind::Time { day }) => separators.time = Some(*day),
                Some(RowKind::Name { peer }) => separators.name = Some(peer.clone()),
                _ => break,
            }
        }
        separators
    }

    /// Returns the bubble displayed at exactly `position`, if that row is an item row
    /// that can be part of a run (i.e., not a system notice).
    fn adjacent_bubble(&self, position: usize) -> Option<&Item> {
        self.adjacent_item_id(position)
            .and_then(|id| self.items.get(&id))
            .filter(|item| !item.kind().is_synthetic())
    }

    /// Recomputes the corners of one item from its direct neighbors.
    fn recompute_corners(&mut self, item_id: ItemId) {
        let Some(position) = self.item_to_position(item_id) else { return };
        let Some(item) = self.items.get(&item_id) else { return };
        let corners = if item.kind().is_synthetic() {
            CornerMask::all()
        } else {
            compute_corners(
                position.checked_sub(1).and_then(|p| self.adjacent_bubble(p)).map(RunMember::of),
                RunMember::of(item),
                self.adjacent_bubble(position + 1).map(RunMember::of),
                self.group_runs,
            )
        };
        if corners != item.corners() {
            if let Some(item) = self.items.get_mut(&item_id) {
                item.corners = corners;
            }
            self.invalidate(position..position + 1);
        }
    }

    fn invalidate(&mut self, range: std::ops::Range<usize>) {
        if range.start < range.end {
            self.bound_rows.remove(range);
        }
    }

    /// Invalidates every row at or after `position`, since their positions shifted.
    fn invalidate_from(&mut self, position: usize) {
        self.invalidate(position..usize::MAX);
    }
}
