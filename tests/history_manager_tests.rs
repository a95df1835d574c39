#![cfg(feature = "history")]
//! Behavior tests for the undo/redo engine, driven through a minimal
//! fake collection.

use palimpsest::contract::ContractKind;
use palimpsest::history::{HistoryAction, HistoryManager, Restorable};
use rstest::rstest;

/// Minimal collection: its whole state is a label.
#[derive(Debug)]
struct Labeled {
    label: &'static str,
    history: HistoryManager<Labeled>,
}

impl Restorable for Labeled {
    type Snapshot = &'static str;

    fn restore(snapshot: &&'static str, history: HistoryManager<Self>) -> Self {
        Self {
            label: *snapshot,
            history,
        }
    }
}

fn action(undo: &'static str, redo: &'static str) -> HistoryAction<Labeled> {
    HistoryAction::new(undo, redo)
}

// =============================================================================
// Boundary behavior
// =============================================================================

#[rstest]
fn test_default_constructed_has_no_history() {
    let manager: HistoryManager<Labeled> = HistoryManager::new();
    assert!(!manager.has_undo());
    assert!(!manager.has_redo());
}

#[rstest]
fn test_undo_on_empty_history_fails() {
    let manager: HistoryManager<Labeled> = HistoryManager::new();
    let violation = manager.undo().unwrap_err();
    assert_eq!(violation.kind(), ContractKind::Precondition);
}

#[rstest]
fn test_redo_on_empty_history_fails() {
    let manager: HistoryManager<Labeled> = HistoryManager::new();
    let violation = manager.redo().unwrap_err();
    assert_eq!(violation.kind(), ContractKind::Precondition);
}

// =============================================================================
// Push
// =============================================================================

#[rstest]
fn test_push_action() {
    let manager: HistoryManager<Labeled> = HistoryManager::new();
    let with_undo = manager.push(action("before", "after"));

    assert!(!manager.has_undo());
    assert!(!manager.has_redo());
    assert!(with_undo.has_undo());
    assert!(!with_undo.has_redo());
}

// =============================================================================
// Undo / redo round trip
// =============================================================================

#[rstest]
fn test_undo_redo() {
    let original = HistoryManager::<Labeled>::new().push(action("before", "after"));

    // The collection returned by undo() carries a manager with the moved
    // action on its redo stack.
    let undone = original.undo().unwrap();
    assert_eq!(undone.label, "before");
    assert!(!undone.history.has_undo());
    assert!(undone.history.has_redo());

    // And redo() mirrors it back.
    let redone = undone.history.redo().unwrap();
    assert_eq!(redone.label, "after");
    assert!(redone.history.has_undo());
    assert!(!redone.history.has_redo());
}

#[rstest]
fn test_push_after_undo_clears_redo() {
    let original = HistoryManager::<Labeled>::new().push(action("before", "after"));
    let undone = original.undo().unwrap();
    assert!(undone.history.has_redo());

    let other = undone.history.push(action("pre", "post"));
    assert!(other.has_undo());
    assert!(!other.has_redo());
}

#[rstest]
fn test_multi_level_undo() {
    let manager = HistoryManager::<Labeled>::new()
        .push(action("v0", "v1"))
        .push(action("v1", "v2"))
        .push(action("v2", "v3"));

    let once = manager.undo().unwrap();
    assert_eq!(once.label, "v2");
    let twice = once.history.undo().unwrap();
    assert_eq!(twice.label, "v1");
    let thrice = twice.history.undo().unwrap();
    assert_eq!(thrice.label, "v0");
    assert!(!thrice.history.has_undo());

    let forward = thrice.history.redo().unwrap();
    assert_eq!(forward.label, "v1");
}

// =============================================================================
// Sharing and teardown
// =============================================================================

#[rstest]
fn test_historical_managers_stay_valid() {
    let base = HistoryManager::<Labeled>::new().push(action("first", "second"));
    let extended = base.push(action("second", "third"));

    // The shared-tail extension leaves the base manager fully usable.
    assert_eq!(base.undo().unwrap().label, "first");
    assert_eq!(extended.undo().unwrap().label, "second");
}

#[rstest]
fn test_deep_history_releases_iteratively() {
    let mut manager: HistoryManager<Labeled> = HistoryManager::new();
    for _ in 0..300_000 {
        manager = manager.push(action("before", "after"));
    }
    // Dropping the only owner unlinks the whole chain without exhausting
    // the call stack.
    drop(manager);
}
