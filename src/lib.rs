//! # palimpsest
//!
//! Persistent collections with structural sharing and undo/redo history.
//!
//! ## Overview
//!
//! Every collection in this crate is immutable: a mutating operation
//! returns a new logical version while physically sharing storage with
//! its predecessors, and each returned version carries an undo/redo
//! history so applications can navigate a linear timeline of edits. The
//! crate provides:
//!
//! - **`PersistentArray`**: indexed sequence backed by one shared storage
//!   plus a re-rooting modification tree
//! - **`PersistentHashMap`**: hash array mapped trie with path copying
//! - **`PersistentList`**: doubly-linked sequence using fat-node
//!   versioning over an order-maintenance structure
//! - **`HistoryManager`**: the shared undo/redo engine, itself persistent
//! - **Contracts**: a recoverable precondition/assertion/postcondition
//!   failure taxonomy guarding every documented requirement
//!
//! ## Feature Flags
//!
//! - `history`: the undo/redo engine
//! - `persistent`: the collections (implies `history`; default)
//!
//! ## Example
//!
//! ```rust
//! use palimpsest::prelude::*;
//!
//! let v0: PersistentArray<i32> = vec![1, 2, 3].into();
//! let v1 = v0.push_back(100).set(2, 200)?;
//!
//! assert_eq!(v1.iter().collect::<Vec<_>>(), vec![1, 2, 200, 100]);
//! assert_eq!(v0.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
//!
//! let back = v1.undo()?.undo()?;
//! assert_eq!(back, v0);
//! # Ok::<(), palimpsest::contract::ContractViolation>(())
//! ```
//!
//! ## Sharing model
//!
//! Sub-structure sharing is reference-counted and single-threaded; the
//! collections are deliberately neither `Send` nor `Sync`. Reading a
//! fixed version from several workers requires giving each worker its own
//! value or adding external synchronization.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Option-heavy link plumbing reads better without `?` chains collapsed.
#![allow(clippy::option_if_let_else)]

/// Prelude module for convenient imports.
///
/// Re-exports the collections, the history engine, and the contract
/// types.
///
/// # Usage
///
/// ```rust
/// use palimpsest::prelude::*;
/// ```
pub mod prelude {
    pub use crate::contract::*;

    #[cfg(feature = "history")]
    pub use crate::history::*;

    #[cfg(feature = "persistent")]
    pub use crate::persistent::*;
}

pub mod contract;

#[cfg(feature = "history")]
pub mod history;

#[cfg(feature = "persistent")]
pub mod persistent;

pub mod util;

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        // Basic smoke test to ensure the library compiles
    }
}
