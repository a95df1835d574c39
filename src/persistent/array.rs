//! Fully persistent indexed sequence with undo/redo.
//!
//! This module provides [`PersistentArray`], an immutable array where
//! every version is backed by a single shared storage plus a tree of
//! modifications.
//!
//! # Overview
//!
//! Instead of storing all versions separately, one in-memory storage is
//! kept at the root of a *modification tree* and every other version is a
//! chain of change-sets hanging off it. Reading an index the current
//! version does not cover *re-roots* the tree so that the reading version
//! becomes the new root; under version-local access patterns this makes
//! reads amortized O(1).
//!
//! - amortized O(1) `value`, O(1) `set`
//! - amortized O(1) `push_back`, O(1) `pop_back`
//! - O(1) `len` and `is_empty`
//! - every mutation is recorded in an undo/redo history
//!
//! # Examples
//!
//! ```rust
//! use palimpsest::persistent::PersistentArray;
//!
//! let v0: PersistentArray<i32> = vec![1, 2, 3].into();
//! let v1 = v0.push_back(100).set(2, 200)?;
//!
//! assert_eq!(v1.value(2)?, 200);
//! assert_eq!(v0.value(2)?, 3); // original version unchanged
//!
//! let undone = v1.undo()?;
//! assert_eq!(undone.value(2)?, 3);
//! assert_eq!(undone.len(), 4);
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```
//!
//! # Sharing and threads
//!
//! Versions share the modification tree through `Rc`, and re-rooting
//! mutates shared cells behind `RefCell`; the type is deliberately neither
//! `Send` nor `Sync`. To read one structure from several threads, either
//! give each worker its own re-rooted copy or wrap the array in a mutex.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::contract::ContractResult;
use crate::history::{HistoryAction, HistoryManager, Restorable};
use crate::{contract_assert, contract_expect, safe_deref};

type NodePtr<T> = Rc<PersistentNode<T>>;

/// Payload of a modification-tree node.
enum NodeKind<T> {
    /// The single tree root, owning the backing storage.
    ///
    /// The storage may hold more elements than any particular array's
    /// size: sibling versions extend it independently.
    Root { storage: Vec<T> },
    /// One modified slot, valid for the versions hanging below it.
    ChangeSet { index: usize, value: T },
}

/// A modification-tree node. The kind is swapped during re-rooting, so it
/// lives behind a `RefCell` even though every public operation is `&self`.
struct PersistentNode<T> {
    kind: RefCell<NodeKind<T>>,
    parent: RefCell<Option<NodePtr<T>>>,
}

impl<T> PersistentNode<T> {
    fn make_root(storage: Vec<T>) -> NodePtr<T> {
        Rc::new(Self {
            kind: RefCell::new(NodeKind::Root { storage }),
            parent: RefCell::new(None),
        })
    }

    fn make_change_set(parent: NodePtr<T>, index: usize, value: T) -> NodePtr<T> {
        Rc::new(Self {
            kind: RefCell::new(NodeKind::ChangeSet { index, value }),
            parent: RefCell::new(Some(parent)),
        })
    }

    fn is_root(&self) -> bool {
        matches!(&*self.kind.borrow(), NodeKind::Root { .. })
    }

    fn contains(&self, index: usize) -> bool {
        match &*self.kind.borrow() {
            NodeKind::Root { storage } => index < storage.len(),
            NodeKind::ChangeSet {
                index: modified, ..
            } => *modified == index,
        }
    }

    fn parent(&self) -> Option<NodePtr<T>> {
        self.parent.borrow().clone()
    }

    /// Replaces the parent pointer, returning the previous one.
    fn reparent(&self, new_parent: Option<NodePtr<T>>) -> Option<NodePtr<T>> {
        mem::replace(&mut *self.parent.borrow_mut(), new_parent)
    }

    /// Appends to the root storage. No-op on a change-set, which the
    /// callers rule out.
    fn extend(&self, value: T) {
        if let NodeKind::Root { storage } = &mut *self.kind.borrow_mut() {
            storage.push(value);
        } else {
            debug_assert!(false, "extend called on a change-set node");
        }
    }

    /// Sifts this root's storage up into `other`: swaps the modified value
    /// with the storage slot it shadows, then swaps the node kinds, so
    /// `other` becomes the root and `self` the change-set.
    fn sift_up_root(&self, other: &Self) -> ContractResult<()> {
        let mut self_kind = self.kind.borrow_mut();
        let mut other_kind = other.kind.borrow_mut();

        match (&mut *self_kind, &mut *other_kind) {
            (NodeKind::Root { storage }, NodeKind::ChangeSet { index, value }) => {
                contract_assert!(*index < storage.len());
                mem::swap(&mut storage[*index], value);
            }
            _ => contract_assert!(false),
        }

        mem::swap(&mut *self_kind, &mut *other_kind);
        Ok(())
    }
}

impl<T: Clone> PersistentNode<T> {
    fn value_cloned(&self, index: usize) -> ContractResult<T> {
        match &*self.kind.borrow() {
            NodeKind::Root { storage } => {
                let slot = safe_deref!(storage.get(index));
                Ok(slot.clone())
            }
            NodeKind::ChangeSet {
                index: modified,
                value,
            } => {
                contract_assert!(*modified == index);
                Ok(value.clone())
            }
        }
    }
}

/// Shared state of one array version: logical size plus modification-tree
/// node. Doubles as the history snapshot — the full state minus history.
pub struct ArrayCore<T> {
    size: usize,
    // Lazily created on the first `push_back` of a default-constructed
    // array; `None` only while the array is empty.
    node: RefCell<Option<NodePtr<T>>>,
}

impl<T> ArrayCore<T> {
    const fn empty() -> Self {
        Self {
            size: 0,
            node: RefCell::new(None),
        }
    }

    fn with_node(size: usize, node: Option<NodePtr<T>>) -> Self {
        Self {
            size,
            node: RefCell::new(node),
        }
    }

    fn node(&self) -> Option<NodePtr<T>> {
        self.node.borrow().clone()
    }
}

impl<T> Clone for ArrayCore<T> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            node: RefCell::new(self.node.borrow().clone()),
        }
    }
}

impl<T> Drop for ArrayCore<T> {
    fn drop(&mut self) {
        // Unlink the uniquely-owned suffix of the modification chain
        // iteratively; long histories would otherwise recurse through the
        // nested `Rc` drops.
        let mut node = self.node.borrow_mut().take();
        while let Some(current) = node {
            if Rc::strong_count(&current) == 1 {
                node = current.parent.borrow_mut().take();
            } else {
                break;
            }
        }
    }
}

/// A fully persistent array with undo/redo history.
///
/// All versions spawned from a common origin share one backing storage
/// through a modification tree; mutating operations return new versions
/// and record a reversible action.
///
/// # Time Complexity
///
/// | Operation   | Complexity      |
/// |-------------|-----------------|
/// | `value`     | amortized O(1)  |
/// | `set`       | O(1)            |
/// | `push_back` | amortized O(1)  |
/// | `pop_back`  | O(1)            |
/// | `len`       | O(1)            |
/// | `undo`      | O(1)            |
///
/// # Examples
///
/// ```rust
/// use palimpsest::persistent::PersistentArray;
///
/// let array = PersistentArray::filled(3, 100);
/// let updated = array.set(1, 200)?;
///
/// assert_eq!(array.value(1)?, 100);
/// assert_eq!(updated.value(1)?, 200);
/// # Ok::<(), palimpsest::contract::ContractViolation>(())
/// ```
pub struct PersistentArray<T: Clone> {
    core: ArrayCore<T>,
    history: HistoryManager<Self>,
}

impl<T: Clone> Restorable for PersistentArray<T> {
    type Snapshot = ArrayCore<T>;

    fn restore(snapshot: &ArrayCore<T>, history: HistoryManager<Self>) -> Self {
        Self {
            core: snapshot.clone(),
            history,
        }
    }
}

impl<T: Clone> PersistentArray<T> {
    /// Creates an empty array. The backing storage is allocated lazily on
    /// the first `push_back`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            core: ArrayCore::empty(),
            history: HistoryManager::new(),
        }
    }

    /// Creates an array containing `count` copies of `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use palimpsest::persistent::PersistentArray;
    ///
    /// let array = PersistentArray::filled(3, 7);
    /// assert_eq!(array.len(), 3);
    /// assert_eq!(array.value(2)?, 7);
    /// # Ok::<(), palimpsest::contract::ContractViolation>(())
    /// ```
    #[must_use]
    pub fn filled(count: usize, value: T) -> Self {
        Self {
            core: ArrayCore::with_node(count, Some(PersistentNode::make_root(vec![value; count]))),
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

    /// Returns the first element.
    ///
    /// # Errors
    ///
    /// Precondition failure on an empty array.
    pub fn front(&self) -> ContractResult<T> {
        contract_expect!(!self.is_empty());
        self.value(0)
    }

    /// Returns the last element.
    ///
    /// # Errors
    ///
    /// Precondition failure on an empty array.
    pub fn back(&self) -> ContractResult<T> {
        contract_expect!(!self.is_empty());
        self.value(self.core.size - 1)
    }

    /// Returns the element at `index`.
    ///
    /// When the version's own node does not cover the index, the
    /// modification tree is re-rooted first so this version becomes the
    /// root; repeated access from one version is then O(1).
    ///
    /// # Errors
    ///
    /// Precondition failure when `index >= len()`.
    pub fn value(&self, index: usize) -> ContractResult<T> {
        contract_expect!(index < self.core.size);

        let node = safe_deref!(self.core.node());
        if !node.contains(index) {
            self.re_root()?;
        }
        node.value_cloned(index)
    }

    /// Returns a new array with `value` stored at `index`, recording the
    /// change in history.
    ///
    /// # Errors
    ///
    /// Precondition failure when `index >= len()`.
    pub fn set(&self, index: usize, value: T) -> ContractResult<Self> {
        contract_expect!(index < self.core.size);

        let parent = safe_deref!(self.core.node());
        let change_set = PersistentNode::make_change_set(parent, index, value);
        Ok(self.modify(Some(change_set), self.core.size))
    }

    /// Returns a new array with `value` appended, recording the change in
    /// history.
    ///
    /// When no sibling version has claimed the slot at `len()`, the value
    /// goes straight into the shared storage; otherwise a change-set node
    /// shadows the sibling's element.
    #[must_use]
    pub fn push_back(&self, value: T) -> Self {
        let (origin, root) = self.find_or_create_root();

        let node = if root.contains(self.core.size) {
            PersistentNode::make_change_set(origin, self.core.size, value)
        } else {
            root.extend(value);
            origin
        };

        self.modify(Some(node), self.core.size + 1)
    }

    /// Returns a new array without the last element, recording the change
    /// in history.
    ///
    /// Only the size shrinks; the element stays in the shared storage
    /// because sibling versions may still expose it.
    ///
    /// # Errors
    ///
    /// Precondition failure on an empty array.
    pub fn pop_back(&self) -> ContractResult<Self> {
        contract_expect!(!self.is_empty());
        Ok(self.modify(self.core.node(), self.core.size - 1))
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

    /// Returns a double-ended iterator over this version's elements.
    #[must_use]
    pub fn iter(&self) -> PersistentArrayIterator<'_, T> {
        PersistentArrayIterator {
            target: self,
            front: 0,
            back: self.core.size,
        }
    }

    /// Builds the modified array and records the undo/redo pair.
    fn modify(&self, node: Option<NodePtr<T>>, size: usize) -> Self {
        let redo = ArrayCore::with_node(size, node);
        let history = self
            .history
            .push(HistoryAction::new(self.core.clone(), redo.clone()));
        Self {
            core: redo,
            history,
        }
    }

    /// Returns `(current node, tree root)`, creating the root when the
    /// array is still lazily empty.
    fn find_or_create_root(&self) -> (NodePtr<T>, NodePtr<T>) {
        if let Some(node) = self.core.node() {
            let mut root = Rc::clone(&node);
            while let Some(parent) = root.parent() {
                root = parent;
            }
            return (node, root);
        }

        let root = PersistentNode::make_root(Vec::new());
        *self.core.node.borrow_mut() = Some(Rc::clone(&root));
        (Rc::clone(&root), root)
    }

    /// Re-roots the modification tree so this version's node becomes the
    /// root (Baker's trick): walks the parent path, then sifts the storage
    /// down the path swapping each change-set with the slot it shadows.
    fn re_root(&self) -> ContractResult<()> {
        let node = safe_deref!(self.core.node());

        let mut path: Vec<NodePtr<T>> = Vec::new();
        let mut root = node;
        while !root.is_root() {
            path.push(Rc::clone(&root));
            let parent = root.reparent(None);
            root = safe_deref!(parent);
        }

        while let Some(child) = path.pop() {
            root.sift_up_root(&child)?;
            root.reparent(Some(Rc::clone(&child)));
            root = child;
        }
        Ok(())
    }
}

impl<T: Clone> Default for PersistentArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for PersistentArray<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            history: self.history.clone(),
        }
    }
}

impl<T: Clone> From<Vec<T>> for PersistentArray<T> {
    fn from(values: Vec<T>) -> Self {
        Self {
            core: ArrayCore::with_node(values.len(), Some(PersistentNode::make_root(values))),
            history: HistoryManager::new(),
        }
    }
}

impl<T: Clone> FromIterator<T> for PersistentArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<T: Clone + PartialEq> PartialEq for PersistentArray<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        (0..self.len()).all(|index| match (self.value(index), other.value(index)) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        })
    }
}

impl<T: Clone + Eq> Eq for PersistentArray<T> {}

impl<T: Clone + fmt::Debug> fmt::Debug for PersistentArray<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over one array version.
///
/// Yields clones of the elements; double-ended and exact-size, the Rust
/// rendition of random access. Two iterators compare equal only when they
/// originate from the same array value and sit at the same position.
pub struct PersistentArrayIterator<'a, T: Clone> {
    target: &'a PersistentArray<T>,
    front: usize,
    back: usize,
}

impl<T: Clone> Iterator for PersistentArrayIterator<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let value = self.target.value(self.front).ok()?;
        self.front += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T: Clone> DoubleEndedIterator for PersistentArrayIterator<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        self.target.value(self.back).ok()
    }
}

impl<T: Clone> ExactSizeIterator for PersistentArrayIterator<'_, T> {}

impl<T: Clone + fmt::Debug> fmt::Debug for PersistentArrayIterator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentArrayIterator")
            .field("target", self.target)
            .field("front", &self.front)
            .field("back", &self.back)
            .finish()
    }
}

impl<T: Clone> PartialEq for PersistentArrayIterator<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.target, other.target)
            && self.front == other.front
            && self.back == other.back
    }
}

impl<'a, T: Clone> IntoIterator for &'a PersistentArray<T> {
    type Item = T;
    type IntoIter = PersistentArrayIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn elements(array: &PersistentArray<i32>) -> Vec<i32> {
        array.iter().collect()
    }

    #[rstest]
    fn test_change_set_chain_reads_through_parents() {
        let v0: PersistentArray<i32> = vec![1, 2, 3].into();
        let v1 = v0.set(0, 10).unwrap();
        let v2 = v1.set(1, 20).unwrap();

        assert_eq!(elements(&v2), vec![10, 20, 3]);
        assert_eq!(elements(&v1), vec![10, 2, 3]);
        assert_eq!(elements(&v0), vec![1, 2, 3]);
    }

    #[rstest]
    fn test_re_root_moves_root_to_reader() {
        let v0: PersistentArray<i32> = vec![1, 2, 3].into();
        let v1 = v0.set(0, 10).unwrap();

        // Reading v1 at an uncovered index re-roots the tree onto v1.
        assert_eq!(v1.value(2).unwrap(), 3);
        let node = v1.core.node().unwrap();
        assert!(node.is_root());

        // v0's node became a change-set but still answers correctly.
        assert_eq!(v0.value(0).unwrap(), 1);
    }

    #[rstest]
    fn test_sibling_push_back_uses_change_set() {
        let v0: PersistentArray<i32> = vec![1].into();
        let v1 = v0.push_back(2);
        let v2 = v0.push_back(3);

        assert_eq!(elements(&v1), vec![1, 2]);
        assert_eq!(elements(&v2), vec![1, 3]);
        assert_eq!(elements(&v0), vec![1]);
    }

    #[rstest]
    fn test_long_chain_drops_without_overflow() {
        let mut array: PersistentArray<i32> = vec![0].into();
        for iteration in 0..200_000 {
            array = array.set(0, iteration).unwrap();
        }
        drop(array);
    }

    #[rstest]
    fn test_lazy_root_created_on_first_push() {
        let empty: PersistentArray<i32> = PersistentArray::new();
        assert!(empty.core.node().is_none());

        let pushed = empty.push_back(1);
        assert!(empty.core.node().is_some());
        assert_eq!(elements(&pushed), vec![1]);
    }
}
