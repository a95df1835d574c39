//! Fully persistent doubly-linked list with undo/redo.
//!
//! This module provides [`PersistentList`], an immutable sequence where
//! every mutation spawns a new version readable alongside all of its
//! predecessors and siblings.
//!
//! # Overview
//!
//! The list uses *fat nodes*: each node stores up to
//! [`FAT_NODE_CAPACITY`] version-tagged entries per field (`next`, `prev`,
//! `value`), and a read at version `v` picks the entry with the greatest
//! tag not after `v` under the lineage's [`VersionOrder`]. When a node's
//! map fills up, a fresh copy takes over the newer links and the
//! neighbors are re-linked at the new version, cascading outward until a
//! node with room is found. This keeps every node's width bounded while
//! all versions stay readable.
//!
//! - O(i) access to index `i`
//! - O(1) amortized node writes; `set`/`insert`/`erase` cost the access
//!   plus a bounded re-link cascade
//! - every mutation is recorded in an undo/redo history
//!
//! # Examples
//!
//! ```rust
//! use palimpsest::persistent::PersistentList;
//!
//! let v1: PersistentList<i32> = vec![1, 2, 3, 4].into_iter().collect();
//! let v2 = v1.insert(1, 5)?; // [1, 5, 2, 3, 4]
//! let v3 = v1.insert(1, 6)?; // sibling branch: [1, 6, 2, 3, 4]
//!
//! assert_eq!(v2.find(1)?, 5);
//! assert_eq!(v3.find(1)?, 6);
//! assert_eq!(v1.find(1)?, 2); // the shared parent is untouched
//!
//! assert_eq!(v2.undo()?.find(1)?, 2);
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::contract::ContractResult;
use crate::history::{HistoryAction, HistoryManager, Restorable};
use crate::persistent::order::VersionOrder;
use crate::{contract_assert, contract_expect, safe_deref};

/// Upper bound on version-tagged entries per fat-node field.
pub const FAT_NODE_CAPACITY: usize = 10;

type ListNodePtr<T> = Rc<RefCell<ListNode<T>>>;
type ListNodeWeak<T> = Weak<RefCell<ListNode<T>>>;
type OrderRef = Rc<RefCell<VersionOrder>>;

/// Association list from version id to `V`, kept sorted under the
/// lineage's order. Capped at [`FAT_NODE_CAPACITY`] entries by its
/// callers, so the storage stays inline.
struct VersionMap<V> {
    entries: SmallVec<[(i64, V); FAT_NODE_CAPACITY]>,
}

impl<V> VersionMap<V> {
    fn new() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains_version(&self, version: i64) -> bool {
        self.entries.iter().any(|(key, _)| *key == version)
    }

    /// Inserts or replaces the entry for `version`, keeping the entries
    /// sorted by label. Relabeling preserves relative order, so sortedness
    /// survives it.
    fn insert(&mut self, order: &VersionOrder, version: i64, value: V) {
        if let Some(position) = self.entries.iter().position(|(key, _)| *key == version) {
            self.entries[position].1 = value;
            return;
        }
        let position = self
            .entries
            .partition_point(|(key, _)| order.less(*key, version));
        self.entries.insert(position, (version, value));
    }

    /// Entry with the greatest key not after `version`.
    fn floor(&self, order: &VersionOrder, version: i64) -> Option<&V> {
        let upper = self
            .entries
            .partition_point(|(key, _)| !order.less(version, *key));
        upper
            .checked_sub(1)
            .map(|position| &self.entries[position].1)
    }

    /// Copies every entry of `source` tagged at or after `version` into
    /// this map.
    fn copy_tail_from(&mut self, order: &VersionOrder, source: &Self, version: i64)
    where
        V: Clone,
    {
        let start = source
            .entries
            .partition_point(|(key, _)| order.less(*key, version));
        for (key, value) in &source.entries[start..] {
            self.insert(order, *key, value.clone());
        }
    }

    /// Removes and returns all values.
    fn drain(&mut self) -> SmallVec<[(i64, V); FAT_NODE_CAPACITY]> {
        std::mem::take(&mut self.entries)
    }
}

/// A fat node: three version-keyed maps. Sentinels (`head`/`tail`) carry
/// no values and accept links without bound; value nodes accept a write
/// only while the map has room or the exact version is already present.
struct ListNode<T> {
    next: VersionMap<Option<ListNodePtr<T>>>,
    prev: VersionMap<Option<ListNodeWeak<T>>>,
    values: VersionMap<T>,
}

impl<T: Clone> ListNode<T> {
    fn value_node(
        order: &VersionOrder,
        version: i64,
        value: T,
        prev: Option<&ListNodePtr<T>>,
        next: Option<ListNodePtr<T>>,
    ) -> ListNodePtr<T> {
        let mut node = Self {
            next: VersionMap::new(),
            prev: VersionMap::new(),
            values: VersionMap::new(),
        };
        node.next.insert(order, version, next);
        node.prev.insert(order, version, prev.map(Rc::downgrade));
        node.values.insert(order, version, value);
        Rc::new(RefCell::new(node))
    }

    fn sentinel(
        order: &VersionOrder,
        version: i64,
        prev: Option<&ListNodePtr<T>>,
        next: Option<ListNodePtr<T>>,
    ) -> ListNodePtr<T> {
        let mut node = Self {
            next: VersionMap::new(),
            prev: VersionMap::new(),
            values: VersionMap::new(),
        };
        node.next.insert(order, version, next);
        node.prev.insert(order, version, prev.map(Rc::downgrade));
        Rc::new(RefCell::new(node))
    }

    fn can_set_next(&self) -> bool {
        self.values.is_empty() || self.next.len() < FAT_NODE_CAPACITY
    }

    fn can_set_prev(&self) -> bool {
        self.values.is_empty() || self.prev.len() < FAT_NODE_CAPACITY
    }

    /// Adds a value entry if the node still has room.
    fn try_add_value(&mut self, order: &VersionOrder, version: i64, value: T) -> bool {
        if self.values.len() >= FAT_NODE_CAPACITY {
            return false;
        }
        self.values.insert(order, version, value);
        true
    }

    /// Adds a forward link; refuses when saturated, unless the exact
    /// version is being rewritten.
    fn set_next(&mut self, order: &VersionOrder, version: i64, next: Option<ListNodePtr<T>>) -> bool {
        if !self.can_set_next() && !self.next.contains_version(version) {
            return false;
        }
        self.next.insert(order, version, next);
        true
    }

    /// Adds a backward link; same capacity rule as [`Self::set_next`].
    fn set_prev(
        &mut self,
        order: &VersionOrder,
        version: i64,
        prev: Option<&ListNodePtr<T>>,
    ) -> bool {
        if !self.can_set_prev() && !self.prev.contains_version(version) {
            return false;
        }
        self.prev.insert(order, version, prev.map(Rc::downgrade));
        true
    }

}

impl<T> ListNode<T> {
    /// Removes and returns the strong forward links, emptying the map.
    fn take_next_links(&mut self) -> Vec<ListNodePtr<T>> {
        self.next
            .drain()
            .into_iter()
            .filter_map(|(_, link)| link)
            .collect()
    }
}

// Free helpers over shared nodes; each takes the borrow it needs and
// releases it before returning.

fn value_at<T: Clone>(
    order: &VersionOrder,
    node: &ListNodePtr<T>,
    version: i64,
) -> ContractResult<T> {
    let borrowed = node.borrow();
    let value = safe_deref!(borrowed.values.floor(order, version));
    Ok(value.clone())
}

fn next_link<T: Clone>(
    order: &VersionOrder,
    node: &ListNodePtr<T>,
    version: i64,
) -> ContractResult<Option<ListNodePtr<T>>> {
    let borrowed = node.borrow();
    let link = safe_deref!(borrowed.next.floor(order, version));
    Ok(link.clone())
}

fn next_node<T: Clone>(
    order: &VersionOrder,
    node: &ListNodePtr<T>,
    version: i64,
) -> ContractResult<ListNodePtr<T>> {
    let link = next_link(order, node, version)?;
    Ok(safe_deref!(link))
}

fn prev_link<T: Clone>(
    order: &VersionOrder,
    node: &ListNodePtr<T>,
    version: i64,
) -> ContractResult<Option<ListNodePtr<T>>> {
    let borrowed = node.borrow();
    let stored = safe_deref!(borrowed.prev.floor(order, version));
    match stored {
        Some(weak) => {
            let upgraded = weak.upgrade();
            // Forward chains own every node, so a live list cannot
            // observe a dead backward link.
            contract_assert!(upgraded.is_some());
            Ok(upgraded)
        }
        None => Ok(None),
    }
}

fn prev_node<T: Clone>(
    order: &VersionOrder,
    node: &ListNodePtr<T>,
    version: i64,
) -> ContractResult<ListNodePtr<T>> {
    let link = prev_link(order, node, version)?;
    Ok(safe_deref!(link))
}

/// Inserts a fresh node carrying `value` between `last` and `next` at
/// `version`. Saturated neighbors are copied outward: the copy takes over
/// the neighbor's links tagged at or after `version`, and the cascade
/// stops at the first node that still accepts a link.
fn make_new_node<T: Clone>(
    order: &VersionOrder,
    version: i64,
    value: T,
    last: &ListNodePtr<T>,
    next: &ListNodePtr<T>,
) -> ContractResult<()> {
    let new_node = ListNode::value_node(order, version, value, None, None);

    let mut cur_last = Rc::clone(last);
    let mut cur_next = Rc::clone(&new_node);
    while !cur_last.borrow().can_set_next() {
        let carried = value_at(order, &cur_last, version)?;
        let before = prev_node(order, &cur_last, version)?;
        let copy = ListNode::value_node(
            order,
            version,
            carried,
            Some(&before),
            Some(Rc::clone(&cur_next)),
        );
        copy.borrow_mut()
            .next
            .copy_tail_from(order, &cur_last.borrow().next, version);
        let _ = before
            .borrow_mut()
            .set_next(order, version, Some(Rc::clone(&copy)));
        let _ = cur_next.borrow_mut().set_prev(order, version, Some(&copy));
        cur_next = copy;
        cur_last = before;
    }
    let _ = cur_last
        .borrow_mut()
        .set_next(order, version, Some(Rc::clone(&cur_next)));
    let _ = cur_next
        .borrow_mut()
        .set_prev(order, version, Some(&cur_last));

    let mut cur_next = Rc::clone(next);
    let mut cur_last = new_node;
    while !cur_next.borrow().can_set_prev() {
        let carried = value_at(order, &cur_next, version)?;
        let after = next_node(order, &cur_next, version)?;
        let copy = ListNode::value_node(
            order,
            version,
            carried,
            Some(&cur_last),
            Some(Rc::clone(&after)),
        );
        copy.borrow_mut()
            .prev
            .copy_tail_from(order, &cur_next.borrow().prev, version);
        let _ = after.borrow_mut().set_prev(order, version, Some(&copy));
        let _ = cur_last
            .borrow_mut()
            .set_next(order, version, Some(Rc::clone(&copy)));
        cur_last = copy;
        cur_next = after;
    }
    let _ = cur_last
        .borrow_mut()
        .set_next(order, version, Some(Rc::clone(&cur_next)));
    let _ = cur_next
        .borrow_mut()
        .set_prev(order, version, Some(&cur_last));
    Ok(())
}

/// Unlinks `node` from the timeline starting at `version` by re-linking
/// its neighbors as read at `old_version`; the node stays readable from
/// predecessor versions. The same saturation cascade as
/// [`make_new_node`] applies to the rewritten neighbors.
fn drop_node<T: Clone>(
    order: &VersionOrder,
    version: i64,
    old_version: i64,
    node: &ListNodePtr<T>,
) -> ContractResult<()> {
    let mut cur_last = prev_node(order, node, old_version)?;
    let mut cur_next = next_node(order, node, old_version)?;
    while !cur_last.borrow().can_set_next() {
        let carried = value_at(order, &cur_last, old_version)?;
        let before = prev_node(order, &cur_last, old_version)?;
        let copy = ListNode::value_node(
            order,
            version,
            carried,
            Some(&before),
            Some(Rc::clone(&cur_next)),
        );
        copy.borrow_mut()
            .next
            .copy_tail_from(order, &cur_last.borrow().next, version);
        let _ = before
            .borrow_mut()
            .set_next(order, version, Some(Rc::clone(&copy)));
        let _ = cur_next.borrow_mut().set_prev(order, version, Some(&copy));
        cur_next = copy;
        cur_last = before;
    }
    let _ = cur_last
        .borrow_mut()
        .set_next(order, version, Some(Rc::clone(&cur_next)));
    let _ = cur_next
        .borrow_mut()
        .set_prev(order, version, Some(&cur_last));

    let mut cur_last = prev_node(order, node, old_version)?;
    let mut cur_next = next_node(order, node, old_version)?;
    while !cur_next.borrow().can_set_prev() {
        let carried = value_at(order, &cur_next, old_version)?;
        let after = next_node(order, &cur_next, old_version)?;
        let copy = ListNode::value_node(
            order,
            version,
            carried,
            Some(&cur_last),
            Some(Rc::clone(&after)),
        );
        copy.borrow_mut()
            .prev
            .copy_tail_from(order, &cur_next.borrow().prev, version);
        let _ = after.borrow_mut().set_prev(order, version, Some(&copy));
        let _ = cur_last
            .borrow_mut()
            .set_next(order, version, Some(Rc::clone(&copy)));
        cur_last = copy;
        cur_next = after;
    }
    let _ = cur_last
        .borrow_mut()
        .set_next(order, version, Some(Rc::clone(&cur_next)));
    let _ = cur_next
        .borrow_mut()
        .set_prev(order, version, Some(&cur_last));
    Ok(())
}

/// Shared state of one list version: version id, order handle, sentinels
/// and size. Doubles as the history snapshot — the full state minus
/// history.
pub struct ListCore<T> {
    version: i64,
    order: OrderRef,
    head: ListNodePtr<T>,
    tail: ListNodePtr<T>,
    size: usize,
}

impl<T> Clone for ListCore<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            order: Rc::clone(&self.order),
            head: Rc::clone(&self.head),
            tail: Rc::clone(&self.tail),
            size: self.size,
        }
    }
}

impl<T> Drop for ListCore<T> {
    fn drop(&mut self) {
        // Dismantle uniquely-owned node chains iteratively; a long list
        // would otherwise recurse through the nested `Rc` drops. Backward
        // links are weak, so draining the forward links is enough.
        let mut queue: Vec<ListNodePtr<T>> = Vec::new();
        if Rc::strong_count(&self.head) == 1 {
            queue.extend(self.head.borrow_mut().take_next_links());
        }
        if Rc::strong_count(&self.tail) == 1 {
            queue.extend(self.tail.borrow_mut().take_next_links());
        }
        while let Some(node) = queue.pop() {
            if Rc::strong_count(&node) == 1 {
                let links = node.borrow_mut().take_next_links();
                queue.extend(links);
            }
        }
    }
}

/// A fully persistent doubly-linked list with undo/redo history.
///
/// Mutating operations return new versions; all versions spawned from a
/// common origin share their fat nodes and one [`VersionOrder`].
///
/// # Time Complexity
///
/// | Operation    | Complexity             |
/// |--------------|------------------------|
/// | `find`       | O(i)                   |
/// | `set`        | O(i) + bounded cascade |
/// | `insert`     | O(i) + bounded cascade |
/// | `erase`      | O(i) + bounded cascade |
/// | `push_back`  | O(1) + bounded cascade |
/// | `len`        | O(1)                   |
/// | `undo`       | O(1)                   |
///
/// # Examples
///
/// ```rust
/// use palimpsest::persistent::PersistentList;
///
/// let list: PersistentList<i32> = vec![1, 2, 3].into_iter().collect();
/// let longer = list.push_back(4)?;
///
/// assert_eq!(list.len(), 3);
/// assert_eq!(longer.len(), 4);
/// assert_eq!(longer.find(3)?, 4);
/// # Ok::<(), palimpsest::contract::ContractViolation>(())
/// ```
pub struct PersistentList<T: Clone> {
    core: ListCore<T>,
    history: HistoryManager<Self>,
}

impl<T: Clone> Restorable for PersistentList<T> {
    type Snapshot = ListCore<T>;

    fn restore(snapshot: &ListCore<T>, history: HistoryManager<Self>) -> Self {
        Self {
            core: snapshot.clone(),
            history,
        }
    }
}

impl<T: Clone> PersistentList<T> {
    /// Creates an empty list at version 1.
    #[must_use]
    pub fn new() -> Self {
        let mut order = VersionOrder::new();
        let version = order.add(0).unwrap_or(1); // the first add cannot fail
        let head = ListNode::sentinel(&order, version, None, None);
        let tail = ListNode::sentinel(&order, version, Some(&head), None);
        let _ = head
            .borrow_mut()
            .set_next(&order, version, Some(Rc::clone(&tail)));
        Self {
            core: ListCore {
                version,
                order: Rc::new(RefCell::new(order)),
                head,
                tail,
                size: 0,
            },
            history: HistoryManager::new(),
        }
    }

    /// Number of elements in this version.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.core.size
    }

    /// Returns `true` if this version holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.core.size == 0
    }

    /// Returns `true` if there is an operation to undo.
    #[must_use]
    pub fn has_undo(&self) -> bool {
        self.history.has_undo()
    }

    /// Returns `true` if there is an undone operation to redo.
    #[must_use]
    pub fn has_redo(&self) -> bool {
        self.history.has_redo()
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// Precondition failure when `index >= len()`.
    pub fn find(&self, index: usize) -> ContractResult<T> {
        let node = self.find_node_by_index(self.core.version, index)?;
        let order = self.core.order.borrow();
        value_at(&order, &node, self.core.version)
    }

    /// Returns a new list with `value` stored at `index`, recording the
    /// change in history.
    ///
    /// # Errors
    ///
    /// Precondition failure when `index >= len()`.
    pub fn set(&self, index: usize, value: T) -> ContractResult<Self> {
        let version = self.core.version;
        let target = self.find_node_by_index(version, index)?;
        let new_version = self.core.order.borrow_mut().add(version)?;

        let order = self.core.order.borrow();
        let old_value = value_at(&order, &target, version)?;

        if !target
            .borrow_mut()
            .try_add_value(&order, new_version, value.clone())
        {
            let last = prev_node(&order, &target, version)?;
            let next = next_node(&order, &target, version)?;
            make_new_node(&order, new_version, value, &last, &next)?;
        }
        if !target
            .borrow_mut()
            .try_add_value(&order, -new_version, old_value.clone())
        {
            let last = prev_node(&order, &target, version)?;
            let next = next_node(&order, &target, version)?;
            make_new_node(&order, -new_version, old_value, &last, &next)?;
        }
        drop(order);

        Ok(self.with_version(new_version, self.core.size))
    }

    /// Returns a new list with `value` inserted before position `index`,
    /// recording the change in history. Appending is [`Self::push_back`]'s
    /// job.
    ///
    /// # Errors
    ///
    /// Precondition failure when `index >= len()`.
    pub fn insert(&self, index: usize, value: T) -> ContractResult<Self> {
        let version = self.core.version;
        let new_version = self.core.order.borrow_mut().add(version)?;
        let target = self.find_node_by_index(version, index)?;

        {
            let order = self.core.order.borrow();
            let last = prev_node(&order, &target, version)?;
            make_new_node(&order, new_version, value, &last, &target)?;
        }

        let inserted = self.find_node_by_index(new_version, index)?;
        {
            let order = self.core.order.borrow();
            drop_node(&order, -new_version, new_version, &inserted)?;
        }

        Ok(self.with_version(new_version, self.core.size + 1))
    }

    /// Returns a new list without the element at `index`, recording the
    /// change in history.
    ///
    /// # Errors
    ///
    /// Precondition failure when `index >= len()`.
    pub fn erase(&self, index: usize) -> ContractResult<Self> {
        let version = self.core.version;
        let target = self.find_node_by_index(version, index)?;
        let (last, next) = {
            let order = self.core.order.borrow();
            (
                prev_node(&order, &target, version)?,
                next_node(&order, &target, version)?,
            )
        };
        let new_version = self.core.order.borrow_mut().add(version)?;

        {
            let order = self.core.order.borrow();
            drop_node(&order, new_version, version, &target)?;
        }

        // At the companion label the erased value is still readable, so
        // undo-side timelines see the original sequence.
        let revived = self.find_node_by_index(version, index)?;
        {
            let order = self.core.order.borrow();
            let old_value = value_at(&order, &revived, version)?;
            make_new_node(&order, -new_version, old_value, &last, &next)?;
        }

        Ok(self.with_version(new_version, self.core.size - 1))
    }

    /// Returns a new list with `value` prepended, recording the change in
    /// history.
    ///
    /// # Errors
    ///
    /// Assertion failure on an internal link invariant breach.
    pub fn push_front(&self, value: T) -> ContractResult<Self> {
        if self.is_empty() {
            self.push_back(value)
        } else {
            self.insert(0, value)
        }
    }

    /// Returns a new list with `value` appended, recording the change in
    /// history.
    ///
    /// # Errors
    ///
    /// Assertion failure on an internal link invariant breach.
    pub fn push_back(&self, value: T) -> ContractResult<Self> {
        let version = self.core.version;
        let new_version = self.core.order.borrow_mut().add(version)?;

        {
            let order = self.core.order.borrow();
            let last = prev_node(&order, &self.core.tail, version)?;
            make_new_node(&order, new_version, value, &last, &self.core.tail)?;
            let appended = prev_node(&order, &self.core.tail, new_version)?;
            drop_node(&order, -new_version, new_version, &appended)?;
        }

        Ok(self.with_version(new_version, self.core.size + 1))
    }

    /// Returns a new list without its first element.
    ///
    /// # Errors
    ///
    /// Precondition failure on an empty list.
    pub fn pop_front(&self) -> ContractResult<Self> {
        contract_expect!(!self.is_empty());
        self.erase(0)
    }

    /// Returns a new list without its last element.
    ///
    /// # Errors
    ///
    /// Precondition failure on an empty list.
    pub fn pop_back(&self) -> ContractResult<Self> {
        contract_expect!(!self.is_empty());
        self.erase(self.core.size - 1)
    }

    /// Undoes the most recent recorded operation.
    ///
    /// # Errors
    ///
    /// Precondition failure when the history has nothing to undo.
    pub fn undo(&self) -> ContractResult<Self> {
        contract_expect!(self.history.has_undo());
        self.history.undo()
    }

    /// Redoes the most recently undone operation.
    ///
    /// # Errors
    ///
    /// Precondition failure when the history has nothing to redo.
    pub fn redo(&self) -> ContractResult<Self> {
        contract_expect!(self.history.has_redo());
        self.history.redo()
    }

    /// Returns a forward iterator over this version's elements.
    ///
    /// The iterator keeps its own handle on the version graph, so it
    /// stays valid if the list value is dropped mid-iteration.
    #[must_use]
    pub fn iter(&self) -> PersistentListIterator<T> {
        let first = {
            let order = self.core.order.borrow();
            self.core
                .head
                .borrow()
                .next
                .floor(&order, self.core.version)
                .cloned()
                .flatten()
        };
        PersistentListIterator {
            core: self.core.clone(),
            cursor: first,
        }
    }

    /// Returns a reverse iterator over this version's elements.
    #[must_use]
    pub fn iter_rev(&self) -> PersistentListReverseIterator<T> {
        let last = {
            let order = self.core.order.borrow();
            prev_link(&order, &self.core.tail, self.core.version).unwrap_or(None)
        };
        PersistentListReverseIterator {
            core: self.core.clone(),
            cursor: last,
        }
    }

    /// Walks `index + 1` forward links from the head sentinel at
    /// `version`.
    fn find_node_by_index(&self, version: i64, index: usize) -> ContractResult<ListNodePtr<T>> {
        contract_expect!(index < self.core.size);

        let order = self.core.order.borrow();
        let mut cursor = Rc::clone(&self.core.head);
        for _ in 0..=index {
            let link = next_link(&order, &cursor, version)?;
            cursor = safe_deref!(link);
        }
        Ok(cursor)
    }

    /// Builds the successor list and records the undo/redo pair.
    fn with_version(&self, version: i64, size: usize) -> Self {
        let redo = ListCore {
            version,
            order: Rc::clone(&self.core.order),
            head: Rc::clone(&self.core.head),
            tail: Rc::clone(&self.core.tail),
            size,
        };
        let history = self
            .history
            .push(HistoryAction::new(self.core.clone(), redo.clone()));
        Self {
            core: redo,
            history,
        }
    }
}

impl<T: Clone> Default for PersistentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for PersistentList<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            history: self.history.clone(),
        }
    }
}

impl<T: Clone> FromIterator<T> for PersistentList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut order = VersionOrder::new();
        let version = order.add(0).unwrap_or(1);
        let head = ListNode::sentinel(&order, version, None, None);

        let mut size = 0usize;
        let mut cursor = Rc::clone(&head);
        for value in iter {
            let node = ListNode::value_node(&order, version, value, Some(&cursor), None);
            let _ = cursor
                .borrow_mut()
                .set_next(&order, version, Some(Rc::clone(&node)));
            cursor = node;
            size += 1;
        }

        let tail = ListNode::sentinel(&order, version, Some(&cursor), None);
        let _ = cursor
            .borrow_mut()
            .set_next(&order, version, Some(Rc::clone(&tail)));

        Self {
            core: ListCore {
                version,
                order: Rc::new(RefCell::new(order)),
                head,
                tail,
                size,
            },
            history: HistoryManager::new(),
        }
    }
}

impl<T: Clone + PartialEq> PartialEq for PersistentList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.core.size == other.core.size && self.iter().eq(other.iter())
    }
}

impl<T: Clone + Eq> Eq for PersistentList<T> {}

impl<T: Clone + fmt::Debug> fmt::Debug for PersistentList<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Clone> IntoIterator for &PersistentList<T> {
    type Item = T;
    type IntoIter = PersistentListIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Forward iterator over one list version. Yields clones of the elements.
///
/// Holds a snapshot of the list state, keeping the version graph alive
/// for the whole traversal.
pub struct PersistentListIterator<T: Clone> {
    core: ListCore<T>,
    cursor: Option<ListNodePtr<T>>,
}

impl<T: Clone> Iterator for PersistentListIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor.take()?;
        if Rc::ptr_eq(&node, &self.core.tail) {
            return None;
        }
        let order = self.core.order.borrow();
        let value = node
            .borrow()
            .values
            .floor(&order, self.core.version)?
            .clone();
        self.cursor = node.borrow().next.floor(&order, self.core.version)?.clone();
        Some(value)
    }
}

/// Reverse iterator over one list version. Yields clones of the elements.
///
/// Holds a snapshot of the list state, keeping the version graph alive
/// for the whole traversal.
pub struct PersistentListReverseIterator<T: Clone> {
    core: ListCore<T>,
    cursor: Option<ListNodePtr<T>>,
}

impl<T: Clone> Iterator for PersistentListReverseIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor.take()?;
        if Rc::ptr_eq(&node, &self.core.head) {
            return None;
        }
        let order = self.core.order.borrow();
        let value = node
            .borrow()
            .values
            .floor(&order, self.core.version)?
            .clone();
        self.cursor = node
            .borrow()
            .prev
            .floor(&order, self.core.version)?
            .as_ref()
            .and_then(Weak::upgrade);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn order_with_versions(count: usize) -> VersionOrder {
        let mut order = VersionOrder::new();
        let mut parent = 0;
        for _ in 0..count {
            parent = order.add(parent.max(1)).unwrap();
        }
        order
    }

    #[rstest]
    fn test_fat_node_value_capacity() {
        let mut order = VersionOrder::new();
        let first = order.add(0).unwrap();
        let node = ListNode::value_node(&order, first, 10, None, None);

        for iteration in 1..FAT_NODE_CAPACITY {
            let version = order.add(i64::try_from(iteration).unwrap()).unwrap();
            assert!(node
                .borrow_mut()
                .try_add_value(&order, version, i64::try_from(iteration).unwrap()));
        }
        let overflow = order
            .add(i64::try_from(FAT_NODE_CAPACITY).unwrap())
            .unwrap();
        assert!(!node.borrow_mut().try_add_value(&order, overflow, 10));
    }

    #[rstest]
    fn test_fat_node_floor_reads() {
        // Versions 1..=6 where 4 branches from 2 and 5 branches from 1:
        // interleaved intervals exercise the label comparisons.
        let mut order = VersionOrder::new();
        order.add(0).unwrap(); // 1
        order.add(1).unwrap(); // 2
        order.add(1).unwrap(); // 3
        order.add(2).unwrap(); // 4
        order.add(1).unwrap(); // 5
        order.add(2).unwrap(); // 6
        order.add(4).unwrap(); // 7, not written to the node
        order.add(6).unwrap(); // 8, not written to the node

        let node = ListNode::value_node(&order, 1, 10, None, None);
        node.borrow_mut().try_add_value(&order, 2, 11);
        node.borrow_mut().try_add_value(&order, 3, 12);
        node.borrow_mut().try_add_value(&order, 4, 13);
        node.borrow_mut().try_add_value(&order, 5, 14);
        node.borrow_mut().try_add_value(&order, 6, 15);

        assert_eq!(value_at(&order, &node, 3).unwrap(), 12);
        assert_eq!(value_at(&order, &node, 4).unwrap(), 13);
        assert_eq!(value_at(&order, &node, 7).unwrap(), 13);
        assert_eq!(value_at(&order, &node, 8).unwrap(), 15);
    }

    #[rstest]
    fn test_floor_before_first_entry_is_absent() {
        let order = order_with_versions(4);
        let mut map: VersionMap<i32> = VersionMap::new();
        map.insert(&order, 3, 30);
        assert_eq!(map.floor(&order, 2), None);
        assert_eq!(map.floor(&order, 3), Some(&30));
        assert_eq!(map.floor(&order, 4), Some(&30));
    }

    #[rstest]
    fn test_sentinels_accept_links_without_bound() {
        let mut order = VersionOrder::new();
        let first = order.add(0).unwrap();
        let sentinel = ListNode::<i32>::sentinel(&order, first, None, None);

        let mut parent = first;
        for _ in 0..(3 * FAT_NODE_CAPACITY) {
            parent = order.add(parent).unwrap();
            assert!(sentinel.borrow_mut().set_next(&order, parent, None));
        }
    }

    #[rstest]
    fn test_long_list_drops_without_overflow() {
        let list: PersistentList<i32> = (0..100_000).collect();
        drop(list);
    }

    #[rstest]
    fn test_many_versions_drop_without_overflow() {
        let mut list: PersistentList<i32> = vec![0].into_iter().collect();
        for iteration in 0..2_000 {
            list = list.set(0, iteration).unwrap();
        }
        drop(list);
    }
}
