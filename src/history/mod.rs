//! Undo/redo engine shared by every persistent collection.
//!
//! This module provides [`HistoryManager`], an immutable pair of
//! persistent action stacks that lets a collection navigate a linear
//! timeline of its edits.
//!
//! # Overview
//!
//! Every mutating operation on a collection produces a new collection
//! *and* pushes a reversible [`HistoryAction`] onto its history, such that
//! `undo` on the returned collection yields a collection observationally
//! identical to the receiver, and `redo` returns to the post-operation
//! state.
//!
//! The manager itself is persistent: pushing an action extends a
//! shared-tail stack, so every historical manager remains valid and refers
//! to its own undo/redo prefix.
//!
//! # Snapshots, not closures
//!
//! An action is a pair of [`Restorable::Snapshot`] values — plain data
//! capturing the pre-state (for undo) and the post-state (for redo),
//! excluding the history. The manager supplies itself, repositioned, at
//! apply time, so the resulting collection carries the correctly moved
//! history.
//!
//! # Examples
//!
//! ```rust
//! use palimpsest::history::{HistoryAction, HistoryManager, Restorable};
//!
//! struct Counter {
//!     value: i64,
//!     history: HistoryManager<Counter>,
//! }
//!
//! impl Restorable for Counter {
//!     type Snapshot = i64;
//!
//!     fn restore(snapshot: &i64, history: HistoryManager<Self>) -> Self {
//!         Counter { value: *snapshot, history }
//!     }
//! }
//!
//! let history: HistoryManager<Counter> = HistoryManager::new();
//! let bumped = history.push(HistoryAction::new(0, 1));
//! assert!(bumped.has_undo());
//!
//! let restored = bumped.undo().unwrap();
//! assert_eq!(restored.value, 0);
//! assert!(restored.history.has_redo());
//! ```

use std::fmt;
use std::rc::Rc;

use crate::contract::ContractResult;
use crate::contract_expect;

/// A collection that can be rebuilt from a history snapshot.
///
/// The snapshot captures the collection's full state *except* its history;
/// [`Restorable::restore`] combines a snapshot with the repositioned
/// [`HistoryManager`] into a complete collection value.
pub trait Restorable: Sized {
    /// The by-value state of one version, excluding history.
    type Snapshot: Clone;

    /// Rebuilds a collection from a snapshot and a repositioned history.
    fn restore(snapshot: &Self::Snapshot, history: HistoryManager<Self>) -> Self;
}

/// A reversible edit: the pre-state and post-state of one operation.
pub struct HistoryAction<C: Restorable> {
    undo: C::Snapshot,
    redo: C::Snapshot,
}

impl<C: Restorable> HistoryAction<C> {
    /// Pairs the pre-state (applied by `undo`) with the post-state
    /// (applied by `redo`).
    #[must_use]
    pub const fn new(undo: C::Snapshot, redo: C::Snapshot) -> Self {
        Self { undo, redo }
    }
}

/// One cell of a persistent action stack; tails are shared.
struct StackCell<C: Restorable> {
    action: Rc<HistoryAction<C>>,
    next: Option<Rc<StackCell<C>>>,
}

/// Persistent singly-linked stack of actions.
///
/// All operations are O(1) and leave the receiver untouched. Dropping a
/// stack walks its chain iteratively, releasing only uniquely-owned cells,
/// so arbitrarily deep histories never overflow the call stack.
struct ActionStack<C: Restorable> {
    top: Option<Rc<StackCell<C>>>,
}

impl<C: Restorable> ActionStack<C> {
    const fn new() -> Self {
        Self { top: None }
    }

    fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    fn push(&self, action: Rc<HistoryAction<C>>) -> Self {
        Self {
            top: Some(Rc::new(StackCell {
                action,
                next: self.top.clone(),
            })),
        }
    }

    fn pop(&self) -> Self {
        Self {
            top: self.top.as_ref().and_then(|cell| cell.next.clone()),
        }
    }

    fn peek(&self) -> Option<&Rc<HistoryAction<C>>> {
        self.top.as_ref().map(|cell| &cell.action)
    }
}

impl<C: Restorable> Clone for ActionStack<C> {
    fn clone(&self) -> Self {
        Self {
            top: self.top.clone(),
        }
    }
}

impl<C: Restorable> Drop for ActionStack<C> {
    fn drop(&mut self) {
        // Unlink uniquely-owned cells one by one instead of letting the
        // nested `Rc` drops recurse through the whole chain.
        let mut top = self.top.take();
        while let Some(cell) = top {
            top = match Rc::try_unwrap(cell) {
                Ok(mut owned) => owned.next.take(),
                Err(_) => None,
            };
        }
    }
}

/// Immutable undo/redo manager: an ordered pair of persistent action
/// stacks.
///
/// Pushing a new action clears the redo stack. `undo` pops the top of the
/// undo stack, pushes it onto the redo stack, then applies its undo
/// snapshot to the resulting manager; `redo` is the mirror image.
pub struct HistoryManager<C: Restorable> {
    undo_stack: ActionStack<C>,
    redo_stack: ActionStack<C>,
}

impl<C: Restorable> HistoryManager<C> {
    /// Creates a manager with no recorded edits.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            undo_stack: ActionStack::new(),
            redo_stack: ActionStack::new(),
        }
    }

    /// Returns a new manager with `action` on top of the undo stack and an
    /// empty redo stack. The receiver is unchanged.
    #[must_use]
    pub fn push(&self, action: HistoryAction<C>) -> Self {
        Self {
            undo_stack: self.undo_stack.push(Rc::new(action)),
            redo_stack: ActionStack::new(),
        }
    }

    /// Returns `true` if there is an edit to undo.
    #[must_use]
    pub fn has_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns `true` if there is an undone edit to redo.
    #[must_use]
    pub fn has_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Applies the most recent action's undo snapshot.
    ///
    /// The returned collection carries a manager whose undo stack is
    /// popped and whose redo stack holds the moved action.
    ///
    /// # Errors
    ///
    /// Precondition failure when there is nothing to undo.
    pub fn undo(&self) -> ContractResult<C> {
        contract_expect!(self.has_undo());

        let action = crate::safe_deref!(self.undo_stack.peek()).clone();
        let repositioned = Self {
            undo_stack: self.undo_stack.pop(),
            redo_stack: self.redo_stack.push(Rc::clone(&action)),
        };
        Ok(C::restore(&action.undo, repositioned))
    }

    /// Applies the most recently undone action's redo snapshot.
    ///
    /// # Errors
    ///
    /// Precondition failure when there is nothing to redo.
    pub fn redo(&self) -> ContractResult<C> {
        contract_expect!(self.has_redo());

        let action = crate::safe_deref!(self.redo_stack.peek()).clone();
        let repositioned = Self {
            undo_stack: self.undo_stack.push(Rc::clone(&action)),
            redo_stack: self.redo_stack.pop(),
        };
        Ok(C::restore(&action.redo, repositioned))
    }
}

impl<C: Restorable> Default for HistoryManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Restorable> Clone for HistoryManager<C> {
    fn clone(&self) -> Self {
        Self {
            undo_stack: self.undo_stack.clone(),
            redo_stack: self.redo_stack.clone(),
        }
    }
}

impl<C: Restorable> fmt::Debug for HistoryManager<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HistoryManager")
            .field("has_undo", &self.has_undo())
            .field("has_redo", &self.has_redo())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug)]
    struct Probe {
        state: &'static str,
        history: HistoryManager<Probe>,
    }

    impl Restorable for Probe {
        type Snapshot = &'static str;

        fn restore(snapshot: &&'static str, history: HistoryManager<Self>) -> Self {
            Self {
                state: *snapshot,
                history,
            }
        }
    }

    #[rstest]
    fn test_new_has_neither_undo_nor_redo() {
        let manager: HistoryManager<Probe> = HistoryManager::new();
        assert!(!manager.has_undo());
        assert!(!manager.has_redo());
    }

    #[rstest]
    fn test_push_leaves_receiver_unchanged() {
        let manager: HistoryManager<Probe> = HistoryManager::new();
        let pushed = manager.push(HistoryAction::new("before", "after"));

        assert!(!manager.has_undo());
        assert!(pushed.has_undo());
        assert!(!pushed.has_redo());
    }

    #[rstest]
    fn test_undo_moves_action_to_redo_stack() {
        let manager =
            HistoryManager::<Probe>::new().push(HistoryAction::new("before", "after"));

        let undone = manager.undo().unwrap();
        assert_eq!(undone.state, "before");
        assert!(!undone.history.has_undo());
        assert!(undone.history.has_redo());

        let redone = undone.history.redo().unwrap();
        assert_eq!(redone.state, "after");
        assert!(redone.history.has_undo());
        assert!(!redone.history.has_redo());
    }

    #[rstest]
    fn test_push_clears_redo_stack() {
        let manager =
            HistoryManager::<Probe>::new().push(HistoryAction::new("before", "after"));
        let undone = manager.undo().unwrap();
        assert!(undone.history.has_redo());

        let pushed = undone.history.push(HistoryAction::new("pre", "post"));
        assert!(pushed.has_undo());
        assert!(!pushed.has_redo());
    }

    #[rstest]
    fn test_undo_on_empty_is_a_precondition_failure() {
        let manager: HistoryManager<Probe> = HistoryManager::new();
        let violation = manager.undo().unwrap_err();
        assert_eq!(
            violation.kind(),
            crate::contract::ContractKind::Precondition
        );
    }

    #[rstest]
    fn test_deep_history_drops_without_overflow() {
        let mut manager: HistoryManager<Probe> = HistoryManager::new();
        for _ in 0..200_000 {
            manager = manager.push(HistoryAction::new("before", "after"));
        }
        drop(manager);
    }

    #[rstest]
    fn test_shared_tail_survives_original_drop() {
        let base =
            HistoryManager::<Probe>::new().push(HistoryAction::new("first", "second"));
        let extended = base.push(HistoryAction::new("second", "third"));
        drop(base);

        let undone = extended.undo().unwrap();
        assert_eq!(undone.state, "second");
        let earlier = undone.history.undo().unwrap();
        assert_eq!(earlier.state, "first");
    }
}
