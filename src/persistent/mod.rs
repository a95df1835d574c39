//! Persistent collections with undo/redo history.
//!
//! Every structure in this module is immutable: mutating operations
//! return a new logical version that physically shares storage with its
//! predecessors, and every returned version carries an undo/redo history
//! navigable with `undo`/`redo`.
//!
//! - [`PersistentArray`]: indexed sequence over a re-rooting modification
//!   tree
//! - [`PersistentHashMap`]: hash map over a path-copied HAMT
//! - [`PersistentList`]: doubly-linked sequence over fat nodes and a
//!   [`VersionOrder`]
//!
//! # Persistence
//!
//! For any collection `v` and mutation `m`, after `v2 = m(v)` the
//! observable state of `v` is unchanged; `v2.undo()` is observationally
//! identical to `v`, and `v2.undo()` followed by `redo()` returns to
//! `v2`'s state.
//!
//! # Examples
//!
//! ## `PersistentArray`
//!
//! ```rust
//! use palimpsest::persistent::PersistentArray;
//!
//! let v0: PersistentArray<i32> = vec![1, 2, 3].into();
//! let v1 = v0.set(0, 10)?;
//!
//! assert_eq!(v0.value(0)?, 1);  // original unchanged
//! assert_eq!(v1.value(0)?, 10); // new version
//! assert_eq!(v1.undo()?, v0);
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```
//!
//! ## `PersistentHashMap`
//!
//! ```rust
//! use palimpsest::persistent::PersistentHashMap;
//!
//! let map = PersistentHashMap::new().insert("one", 1)?;
//! let updated = map.insert("one", 100)?;
//!
//! assert_eq!(map.get("one"), Some(&1));
//! assert_eq!(updated.get("one"), Some(&100));
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```
//!
//! ## `PersistentList`
//!
//! ```rust
//! use palimpsest::persistent::PersistentList;
//!
//! let list: PersistentList<i32> = vec![1, 2, 3, 4].into_iter().collect();
//! let branched = list.insert(1, 5)?;
//!
//! assert_eq!(branched.find(1)?, 5);
//! assert_eq!(list.find(1)?, 2); // sibling versions stay readable
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```

mod array;
mod hashmap;
mod list;
mod order;

pub use array::ArrayCore;
pub use array::PersistentArray;
pub use array::PersistentArrayIterator;
pub use hashmap::MapCore;
pub use hashmap::PersistentHashMap;
pub use hashmap::PersistentHashMapIterator;
pub use list::ListCore;
pub use list::PersistentList;
pub use list::PersistentListIterator;
pub use list::PersistentListReverseIterator;
pub use list::FAT_NODE_CAPACITY;
pub use order::VersionOrder;
