//! Persistent hash map with undo/redo, based on HAMT.
//!
//! This module provides [`PersistentHashMap`], an immutable hash map that
//! uses path copying over a Hash Array Mapped Trie for structural sharing.
//!
//! # Overview
//!
//! The trie branches 32 ways per level, consuming the hash five bits at a
//! time. Nodes come in three shapes: a single key-value leaf, a
//! bitmap-compressed child table, and a collision bucket for keys whose
//! hashes are exhausted without diverging.
//!
//! - O(log32 N) `get`, `insert`, `erase` (effectively constant)
//! - O(1) `len` and `is_empty`
//! - unordered iteration visiting every entry exactly once
//! - every mutation is recorded in an undo/redo history
//!
//! # Examples
//!
//! ```rust
//! use palimpsest::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new()
//!     .insert("one".to_string(), 1)?
//!     .insert("two".to_string(), 2)?;
//!
//! assert_eq!(map.get("one"), Some(&1));
//!
//! // Path copying: the original map is preserved.
//! let updated = map.insert("one".to_string(), 100)?;
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(updated.get("one"), Some(&100));
//!
//! // History: the update can be taken back.
//! assert_eq!(updated.undo()?.get("one"), Some(&1));
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::contract::ContractResult;
use crate::history::{HistoryAction, HistoryManager, Restorable};
use crate::util;
use crate::{contract_assert, safe_deref};

/// Bits of hash consumed per trie level.
const BIT_SIZE: u32 = 5;

/// Branching factor (2^5).
const CAPACITY: u32 = 32;

/// Mask extracting one level's chunk of the hash.
const LEVEL_MASK: u64 = (CAPACITY - 1) as u64;

/// Deepest level that still has hash bits to consume; one past it, keys
/// with equal hashes go into collision buckets.
const MAX_DEPTH: usize = (u64::BITS / BIT_SIZE - 1) as usize;

fn compute_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[inline]
const fn level_bit(hash: u64, level: usize) -> u32 {
    ((hash >> (BIT_SIZE as usize * level)) & LEVEL_MASK) as u32
}

/// Index of `bit`'s child in the compressed table: the number of set bits
/// below it.
#[inline]
const fn bit_position(bitmap: u32, bit: u32) -> usize {
    (bitmap & ((1u32 << bit) - 1)).count_ones() as usize
}

/// How a traversal changed the trie; drives size accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// An entry was added or removed.
    Resized,
    /// An existing entry's value was replaced.
    ModifiedExisting,
    /// Nothing changed.
    Unchanged,
}

/// A key-value entry together with its full hash.
struct Leaf<K, V> {
    hash: u64,
    key: K,
    value: V,
}

impl<K: Clone, V: Clone> Clone for Leaf<K, V> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

/// HAMT node. `Bitmap` children are ordered by ascending bit index and
/// `children.len()` always equals the bitmap's popcount; a `Collision`
/// holds at least two leaves with distinct keys and the same hash.
enum HamtNode<K, V> {
    Leaf(Leaf<K, V>),
    Bitmap {
        bitmap: u32,
        children: Vec<Rc<HamtNode<K, V>>>,
    },
    Collision {
        hash: u64,
        leaves: Vec<Leaf<K, V>>,
    },
}

impl<K: Clone + Hash + Eq, V: Clone> HamtNode<K, V> {
    /// Inserts `leaf`, path-copying the spine. Returns the replacement
    /// node and what happened.
    fn inserted(
        node: &Rc<Self>,
        leaf: Leaf<K, V>,
        replace: bool,
        level: usize,
    ) -> ContractResult<(Rc<Self>, Status)> {
        match node.as_ref() {
            Self::Leaf(existing) => {
                if existing.key == leaf.key {
                    if replace {
                        Ok((Rc::new(Self::Leaf(leaf)), Status::ModifiedExisting))
                    } else {
                        Ok((Rc::clone(node), Status::Unchanged))
                    }
                } else {
                    Self::split_leaf(node, existing, leaf, replace, level)
                }
            }
            Self::Bitmap { bitmap, children } => {
                Self::inserted_into_bitmap(node, *bitmap, children, leaf, replace, level)
            }
            Self::Collision { hash, leaves } => {
                Self::inserted_into_collision(node, *hash, leaves, leaf, replace)
            }
        }
    }

    /// Resolves two distinct keys landing on the same leaf: either a
    /// collision bucket (hash bits exhausted) or a bitmap node one level
    /// down.
    fn split_leaf(
        node: &Rc<Self>,
        existing: &Leaf<K, V>,
        leaf: Leaf<K, V>,
        replace: bool,
        level: usize,
    ) -> ContractResult<(Rc<Self>, Status)> {
        if level > MAX_DEPTH {
            return Ok((
                Rc::new(Self::Collision {
                    hash: leaf.hash,
                    leaves: vec![existing.clone(), leaf],
                }),
                Status::Resized,
            ));
        }

        let existing_bit = level_bit(existing.hash, level);
        let inserted_bit = level_bit(leaf.hash, level);

        if existing_bit == inserted_bit {
            // Still collided at this level: wrap the existing leaf in a
            // single-child table and let the bitmap path descend.
            let wrapped = Rc::new(Self::Bitmap {
                bitmap: 1u32 << existing_bit,
                children: vec![Rc::clone(node)],
            });
            return Self::inserted(&wrapped, leaf, replace, level);
        }

        let bitmap = (1u32 << existing_bit) | (1u32 << inserted_bit);
        let inserted_node = Rc::new(Self::Leaf(leaf));
        let children = if existing_bit < inserted_bit {
            vec![Rc::clone(node), inserted_node]
        } else {
            vec![inserted_node, Rc::clone(node)]
        };
        Ok((Rc::new(Self::Bitmap { bitmap, children }), Status::Resized))
    }

    fn inserted_into_bitmap(
        node: &Rc<Self>,
        bitmap: u32,
        children: &[Rc<Self>],
        leaf: Leaf<K, V>,
        replace: bool,
        level: usize,
    ) -> ContractResult<(Rc<Self>, Status)> {
        let bit = level_bit(leaf.hash, level);
        let mask = 1u32 << bit;
        let position = bit_position(bitmap, bit);

        if bitmap & mask == 0 {
            let children = util::inserted_at(children, position, Rc::new(Self::Leaf(leaf)))?;
            return Ok((
                Rc::new(Self::Bitmap {
                    bitmap: bitmap | mask,
                    children,
                }),
                Status::Resized,
            ));
        }

        let child = safe_deref!(children.get(position));
        let (new_child, status) = Self::inserted(child, leaf, replace, level + 1)?;
        if status == Status::Unchanged {
            return Ok((Rc::clone(node), Status::Unchanged));
        }
        Ok((
            Rc::new(Self::Bitmap {
                bitmap,
                children: util::replaced_at(children, position, new_child)?,
            }),
            status,
        ))
    }

    fn inserted_into_collision(
        node: &Rc<Self>,
        hash: u64,
        leaves: &[Leaf<K, V>],
        leaf: Leaf<K, V>,
        replace: bool,
    ) -> ContractResult<(Rc<Self>, Status)> {
        debug_assert_eq!(hash, leaf.hash);

        if let Some(position) = leaves.iter().position(|entry| entry.key == leaf.key) {
            if !replace {
                return Ok((Rc::clone(node), Status::Unchanged));
            }
            let mut replaced = util::erased_at(leaves, position)?;
            replaced.push(leaf);
            return Ok((
                Rc::new(Self::Collision {
                    hash,
                    leaves: replaced,
                }),
                Status::ModifiedExisting,
            ));
        }

        let leaves = util::inserted_at(leaves, leaves.len(), leaf)?;
        Ok((Rc::new(Self::Collision { hash, leaves }), Status::Resized))
    }

    /// Erases `key`, path-copying the spine. `None` means the subtree
    /// vanished entirely.
    fn erased<Q>(
        node: &Rc<Self>,
        key: &Q,
        hash: u64,
        level: usize,
    ) -> ContractResult<(Option<Rc<Self>>, Status)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node.as_ref() {
            Self::Leaf(existing) => {
                if existing.key.borrow() == key {
                    Ok((None, Status::Resized))
                } else {
                    Ok((Some(Rc::clone(node)), Status::Unchanged))
                }
            }
            Self::Bitmap { bitmap, children } => {
                Self::erased_from_bitmap(node, *bitmap, children, key, hash, level)
            }
            Self::Collision {
                hash: bucket_hash,
                leaves,
            } => Self::erased_from_collision(node, *bucket_hash, leaves, key),
        }
    }

    fn erased_from_bitmap<Q>(
        node: &Rc<Self>,
        bitmap: u32,
        children: &[Rc<Self>],
        key: &Q,
        hash: u64,
        level: usize,
    ) -> ContractResult<(Option<Rc<Self>>, Status)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let bit = level_bit(hash, level);
        let mask = 1u32 << bit;

        if bitmap & mask == 0 {
            return Ok((Some(Rc::clone(node)), Status::Unchanged));
        }

        let position = bit_position(bitmap, bit);
        let child = safe_deref!(children.get(position));
        let (new_child, status) = Self::erased(child, key, hash, level + 1)?;

        if status == Status::Unchanged {
            return Ok((Some(Rc::clone(node)), Status::Unchanged));
        }

        match new_child {
            Some(child) => Ok((
                Some(Rc::new(Self::Bitmap {
                    bitmap,
                    children: util::replaced_at(children, position, child)?,
                })),
                status,
            )),
            None => {
                let remaining = util::erased_at(children, position)?;
                // A lone surviving leaf or collision bucket replaces the
                // whole table; both are position-independent. A surviving
                // sub-table is not: its bits belong one level deeper.
                let collapsed = match remaining.len() {
                    0 => None,
                    1 if !matches!(remaining[0].as_ref(), Self::Bitmap { .. }) => {
                        Some(Rc::clone(&remaining[0]))
                    }
                    _ => Some(Rc::new(Self::Bitmap {
                        bitmap: bitmap & !mask,
                        children: remaining,
                    })),
                };
                Ok((collapsed, status))
            }
        }
    }

    fn erased_from_collision<Q>(
        node: &Rc<Self>,
        hash: u64,
        leaves: &[Leaf<K, V>],
        key: &Q,
    ) -> ContractResult<(Option<Rc<Self>>, Status)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(position) = leaves.iter().position(|entry| entry.key.borrow() == key) else {
            return Ok((Some(Rc::clone(node)), Status::Unchanged));
        };

        let remaining = util::erased_at(leaves, position)?;
        contract_assert!(!remaining.is_empty());

        if remaining.len() == 1 {
            let survivor = safe_deref!(remaining.into_iter().next());
            return Ok((Some(Rc::new(Self::Leaf(survivor))), Status::Resized));
        }
        Ok((
            Some(Rc::new(Self::Collision {
                hash,
                leaves: remaining,
            })),
            Status::Resized,
        ))
    }

    /// Finds the leaf holding `key`, if any.
    fn search<'a, Q>(node: &'a Self, key: &Q, hash: u64, level: usize) -> Option<&'a Leaf<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match node {
            Self::Leaf(leaf) => {
                if leaf.hash == hash && leaf.key.borrow() == key {
                    Some(leaf)
                } else {
                    None
                }
            }
            Self::Bitmap { bitmap, children } => {
                let bit = level_bit(hash, level);
                let mask = 1u32 << bit;
                if bitmap & mask == 0 {
                    return None;
                }
                let position = bit_position(*bitmap, bit);
                Self::search(children.get(position)?, key, hash, level + 1)
            }
            Self::Collision { leaves, .. } => {
                leaves.iter().find(|entry| entry.key.borrow() == key)
            }
        }
    }
}

/// Shared state of one map version: entry count plus trie root. Doubles
/// as the history snapshot — the full state minus history.
pub struct MapCore<K, V> {
    size: usize,
    root: Option<Rc<HamtNode<K, V>>>,
}

impl<K, V> MapCore<K, V> {
    const fn empty() -> Self {
        Self {
            size: 0,
            root: None,
        }
    }
}

impl<K, V> Clone for MapCore<K, V> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            root: self.root.clone(),
        }
    }
}

/// A persistent hash map with undo/redo history.
///
/// Mutating operations return new maps that share unchanged subtries with
/// their predecessors and record a reversible action in history.
///
/// # Time Complexity
///
/// | Operation      | Complexity |
/// |----------------|------------|
/// | `get`          | O(log32 N) |
/// | `insert`       | O(log32 N) |
/// | `erase`        | O(log32 N) |
/// | `contains_key` | O(log32 N) |
/// | `len`          | O(1)       |
/// | `undo`         | O(1)       |
///
/// # Examples
///
/// ```rust
/// use palimpsest::persistent::PersistentHashMap;
///
/// let map: PersistentHashMap<String, i32> =
///     vec![("x".to_string(), 1), ("y".to_string(), 2)].into_iter().collect();
/// assert_eq!(map.len(), 2);
/// assert_eq!(map.get("x"), Some(&1));
/// ```
pub struct PersistentHashMap<K: Clone + Hash + Eq, V: Clone> {
    core: MapCore<K, V>,
    history: HistoryManager<Self>,
}

impl<K: Clone + Hash + Eq, V: Clone> Restorable for PersistentHashMap<K, V> {
    type Snapshot = MapCore<K, V>;

    fn restore(snapshot: &MapCore<K, V>, history: HistoryManager<Self>) -> Self {
        Self {
            core: snapshot.clone(),
            history,
        }
    }
}

impl<K: Clone + Hash + Eq, V: Clone> PersistentHashMap<K, V> {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            core: MapCore::empty(),
            history: HistoryManager::new(),
        }
    }

    /// Number of entries in this version.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.core.size
    }

    /// Returns `true` if this version holds no entries.
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

    /// Returns a reference to the value stored for `key`.
    ///
    /// The key may be any borrowed form of the map's key type, with `Hash`
    /// and `Eq` agreeing between the forms.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let root = self.core.root.as_deref()?;
        HamtNode::search(root, key, compute_hash(key), 0).map(|leaf| &leaf.value)
    }

    /// Returns `true` if the map contains `key`.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns a new map with `key` bound to `value`, replacing any
    /// previous binding; the change is recorded in history.
    ///
    /// # Errors
    ///
    /// Precondition failure on an internal trie invariant breach.
    pub fn insert(&self, key: K, value: V) -> ContractResult<Self> {
        self.insert_impl(key, value, true)
    }

    /// Returns a new map with `key` bound to `value` only when the key is
    /// absent; an existing binding is kept. Recorded in history either
    /// way.
    ///
    /// # Errors
    ///
    /// Precondition failure on an internal trie invariant breach.
    pub fn insert_if_absent(&self, key: K, value: V) -> ContractResult<Self> {
        self.insert_impl(key, value, false)
    }

    /// Returns a new map without `key`. Erasing an absent key changes
    /// nothing but is still recorded in history.
    ///
    /// # Errors
    ///
    /// Precondition failure on an internal trie invariant breach, or
    /// assertion failure if a collision bucket is found holding fewer
    /// than two leaves.
    pub fn erase<Q>(&self, key: &Q) -> ContractResult<Self>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (root, status) = match &self.core.root {
            Some(root) => HamtNode::erased(root, key, compute_hash(key), 0)?,
            None => (None, Status::Unchanged),
        };
        let size = match status {
            Status::Resized => self.core.size - 1,
            _ => self.core.size,
        };
        Ok(self.record(MapCore { size, root }))
    }

    /// Undoes the most recent recorded operation.
    ///
    /// # Errors
    ///
    /// Precondition failure when the history has nothing to undo.
    pub fn undo(&self) -> ContractResult<Self> {
        crate::contract_expect!(self.history.has_undo());
        self.history.undo()
    }

    /// Redoes the most recently undone operation.
    ///
    /// # Errors
    ///
    /// Precondition failure when the history has nothing to redo.
    pub fn redo(&self) -> ContractResult<Self> {
        crate::contract_expect!(self.history.has_redo());
        self.history.redo()
    }

    /// Returns an iterator over the entries, in no particular order.
    #[must_use]
    pub fn iter(&self) -> PersistentHashMapIterator<'_, K, V> {
        PersistentHashMapIterator {
            stack: self
                .core
                .root
                .as_deref()
                .map(Frame::Node)
                .into_iter()
                .collect(),
        }
    }

    /// Returns an iterator over the keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    fn insert_impl(&self, key: K, value: V, replace: bool) -> ContractResult<Self> {
        let leaf = Leaf {
            hash: compute_hash(&key),
            key,
            value,
        };
        let (root, status) = match &self.core.root {
            Some(root) => {
                let (node, status) = HamtNode::inserted(root, leaf, replace, 0)?;
                (Some(node), status)
            }
            None => (Some(Rc::new(HamtNode::Leaf(leaf))), Status::Resized),
        };
        let size = match status {
            Status::Resized => self.core.size + 1,
            _ => self.core.size,
        };
        Ok(self.record(MapCore { size, root }))
    }

    /// Builds the modified map and records the undo/redo pair. Unchanged
    /// operations record an action whose both sides restore the same
    /// state.
    fn record(&self, core: MapCore<K, V>) -> Self {
        let history = self
            .history
            .push(HistoryAction::new(self.core.clone(), core.clone()));
        Self { core, history }
    }
}

impl<K: Clone + Hash + Eq, V: Clone> Default for PersistentHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> Clone for PersistentHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            history: self.history.clone(),
        }
    }
}

impl<K: Clone + Hash + Eq, V: Clone> FromIterator<(K, V)> for PersistentHashMap<K, V> {
    /// Builds a map from entries with a **first-wins** policy for
    /// duplicate keys, the way a literal initializer reads; the
    /// constructed map reports no undo.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            if let Ok(inserted) = map.insert_impl(key, value, false) {
                map = inserted;
            }
        }
        Self {
            core: map.core.clone(),
            history: HistoryManager::new(),
        }
    }
}

impl<K, V> PartialEq for PersistentHashMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        if self.core.size != other.core.size {
            return false;
        }
        self.iter()
            .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K, V> Eq for PersistentHashMap<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone + Eq,
{
}

impl<K, V> fmt::Debug for PersistentHashMap<K, V>
where
    K: Clone + Hash + Eq + fmt::Debug,
    V: Clone + fmt::Debug,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

/// Pending work of the depth-first traversal.
enum Frame<'a, K, V> {
    Node(&'a HamtNode<K, V>),
    Entry(&'a Leaf<K, V>),
}

/// Unordered iterator over the entries of a [`PersistentHashMap`].
///
/// A forward iterator holding a stack of pending subtries; the exhausted
/// state is the empty stack. The borrow of the map keeps the trie alive
/// for the whole traversal.
pub struct PersistentHashMapIterator<'a, K, V> {
    stack: Vec<Frame<'a, K, V>>,
}

impl<'a, K, V> Iterator for PersistentHashMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Entry(leaf) | Frame::Node(HamtNode::Leaf(leaf)) => {
                    return Some((&leaf.key, &leaf.value));
                }
                Frame::Node(HamtNode::Bitmap { children, .. }) => {
                    self.stack
                        .extend(children.iter().map(|child| Frame::Node(child.as_ref())));
                }
                Frame::Node(HamtNode::Collision { leaves, .. }) => {
                    self.stack.extend(leaves.iter().map(Frame::Entry));
                }
            }
        }
        None
    }
}

impl<'a, K: Clone + Hash + Eq, V: Clone> IntoIterator for &'a PersistentHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentHashMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Key whose hash collapses to its parity, forcing collisions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct CollidingKey(u32);

    impl Hash for CollidingKey {
        fn hash<H: Hasher>(&self, state: &mut H) {
            state.write_u64(u64::from(self.0 % 2));
        }
    }

    #[rstest]
    fn test_level_bit_walks_hash_chunks() {
        let hash = 0b00011_00010_00001u64;
        assert_eq!(level_bit(hash, 0), 1);
        assert_eq!(level_bit(hash, 1), 2);
        assert_eq!(level_bit(hash, 2), 3);
    }

    #[rstest]
    fn test_bit_position_counts_lower_bits() {
        let bitmap = 0b1010_1010u32;
        assert_eq!(bit_position(bitmap, 1), 0);
        assert_eq!(bit_position(bitmap, 3), 1);
        assert_eq!(bit_position(bitmap, 7), 3);
    }

    #[rstest]
    fn test_colliding_keys_share_a_bucket() {
        let map = PersistentHashMap::new()
            .insert(CollidingKey(0), "zero")
            .unwrap()
            .insert(CollidingKey(2), "two")
            .unwrap()
            .insert(CollidingKey(4), "four")
            .unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&CollidingKey(0)), Some(&"zero"));
        assert_eq!(map.get(&CollidingKey(2)), Some(&"two"));
        assert_eq!(map.get(&CollidingKey(4)), Some(&"four"));
        assert_eq!(map.get(&CollidingKey(6)), None);
    }

    #[rstest]
    fn test_collision_bucket_erase_collapses_to_leaf() {
        let map = PersistentHashMap::new()
            .insert(CollidingKey(0), 10)
            .unwrap()
            .insert(CollidingKey(2), 20)
            .unwrap();

        let collapsed = map.erase(&CollidingKey(0)).unwrap();
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed.get(&CollidingKey(2)), Some(&20));

        let emptied = collapsed.erase(&CollidingKey(2)).unwrap();
        assert!(emptied.is_empty());
    }

    #[rstest]
    fn test_collision_replace_keeps_size() {
        let map = PersistentHashMap::new()
            .insert(CollidingKey(0), 10)
            .unwrap()
            .insert(CollidingKey(2), 20)
            .unwrap();

        let replaced = map.insert(CollidingKey(2), 21).unwrap();
        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced.get(&CollidingKey(2)), Some(&21));

        let kept = map.insert_if_absent(CollidingKey(2), 22).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.get(&CollidingKey(2)), Some(&20));
    }

    #[rstest]
    fn test_iteration_covers_collision_buckets() {
        let map = PersistentHashMap::new()
            .insert(CollidingKey(0), 0)
            .unwrap()
            .insert(CollidingKey(1), 1)
            .unwrap()
            .insert(CollidingKey(2), 2)
            .unwrap()
            .insert(CollidingKey(3), 3)
            .unwrap();

        let mut seen: Vec<u32> = map.iter().map(|(key, _)| key.0).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
