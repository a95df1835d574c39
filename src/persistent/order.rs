//! Order maintenance for fully persistent list versions.
//!
//! [`VersionOrder`] assigns a real-valued label to every version id so
//! that label comparison answers "was version `a` created before version
//! `b` on the same path?" in O(1). Each id `v > 0` has a companion `-v`
//! whose label closes the interval during which `v`'s writes are visible;
//! reads for negative ids consult a separate reverse-label table.
//!
//! New ids are placed at one third and two thirds of the gap to the
//! parent's successor. When a gap is exhausted (the two fresh labels
//! coincide exactly), all labels are redistributed uniformly over
//! `[-W, W]`.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use crate::contract::ContractResult;
use crate::{contract_expect, safe_deref};

/// Labels live in `[-LABEL_BORDER, LABEL_BORDER]`.
const LABEL_BORDER: f64 = 2_000_000_000_000.0;

/// One slot of the labeling sequence; the sequence is a doubly-linked
/// chain threaded through an arena, so handles stay valid across
/// insertions.
struct SequenceCell {
    id: i64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Total order over version ids of one list lineage.
///
/// # Examples
///
/// ```rust
/// use palimpsest::persistent::VersionOrder;
///
/// let mut order = VersionOrder::new();
/// assert_eq!(order.add(1)?, 1);
/// assert_eq!(order.add(1)?, 2);
/// assert_eq!(order.add(2)?, 3);
///
/// assert!(order.less(1, 2));
/// assert!(order.less(3, -2)); // 3 was created inside 2's interval
/// # Ok::<(), palimpsest::contract::ContractViolation>(())
/// ```
pub struct VersionOrder {
    cells: Vec<SequenceCell>,
    head: Option<usize>,
    /// Version id → arena index of its forward cell. Index 0 is a filler
    /// so ids can be used directly.
    handles: Vec<usize>,
    forward_labels: Vec<f64>,
    reverse_labels: Vec<f64>,
}

impl VersionOrder {
    /// Creates an order with no versions.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cells: Vec::new(),
            head: None,
            handles: Vec::new(),
            forward_labels: Vec::new(),
            reverse_labels: Vec::new(),
        }
    }

    /// Number of versions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len().saturating_sub(1)
    }

    /// Returns `true` if no version was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Records a new version immediately inside `parent`'s interval and
    /// returns its id. The companion `-id` is placed right after it.
    ///
    /// The very first call ignores `parent` and returns 1.
    ///
    /// # Errors
    ///
    /// Precondition failure when `parent` is not a recorded version.
    pub fn add(&mut self, parent: i64) -> ContractResult<i64> {
        if self.handles.is_empty() {
            return Ok(self.bootstrap());
        }

        contract_expect!(parent > 0);
        let parent_index = parent as usize;
        contract_expect!(parent_index < self.handles.len());

        let parent_cell = self.handles[parent_index];
        let successor = safe_deref!(self.cells[parent_cell].next);
        let parent_label = self.forward_labels[parent_index];
        let successor_label = self.label_of(self.cells[successor].id);

        let version = self.handles.len() as i64;
        let forward_cell = self.insert_after(parent_cell, version);
        self.insert_after(forward_cell, -version);
        self.handles.push(forward_cell);

        let gap = successor_label - parent_label;
        let forward_label = parent_label + gap / 3.0;
        let reverse_label = parent_label + 2.0 * gap / 3.0;
        self.forward_labels.push(forward_label);
        self.reverse_labels.push(reverse_label);

        // An exactly collapsed gap is the relabel trigger.
        #[allow(clippy::float_cmp)]
        if forward_label == reverse_label {
            self.relabel();
        }
        Ok(version)
    }

    /// Returns `true` if `left` precedes `right` in the order. Negative
    /// ids read the reverse-label table of their absolute value.
    #[must_use]
    pub fn less(&self, left: i64, right: i64) -> bool {
        self.label_of(left) < self.label_of(right)
    }

    /// First version: sequence `[1, -1]`, labels at the borders.
    fn bootstrap(&mut self) -> i64 {
        let forward_cell = self.cells.len();
        self.cells.push(SequenceCell {
            id: 1,
            prev: None,
            next: Some(forward_cell + 1),
        });
        self.cells.push(SequenceCell {
            id: -1,
            prev: Some(forward_cell),
            next: None,
        });
        self.head = Some(forward_cell);
        self.handles.push(forward_cell); // filler for id 0
        self.handles.push(forward_cell);
        self.forward_labels.push(-LABEL_BORDER);
        self.forward_labels.push(-LABEL_BORDER);
        self.reverse_labels.push(LABEL_BORDER);
        self.reverse_labels.push(LABEL_BORDER);
        1
    }

    fn label_of(&self, id: i64) -> f64 {
        let index = id.unsigned_abs() as usize;
        debug_assert!(index < self.forward_labels.len());
        if id < 0 {
            self.reverse_labels[index]
        } else {
            self.forward_labels[index]
        }
    }

    /// Splices a new cell carrying `id` right after `cell`.
    fn insert_after(&mut self, cell: usize, id: i64) -> usize {
        let next = self.cells[cell].next;
        let index = self.cells.len();
        self.cells.push(SequenceCell {
            id,
            prev: Some(cell),
            next,
        });
        self.cells[cell].next = Some(index);
        if let Some(successor) = next {
            self.cells[successor].prev = Some(index);
        }
        index
    }

    /// Redistributes all labels uniformly across the sequence.
    fn relabel(&mut self) {
        let step = LABEL_BORDER / self.forward_labels.len() as f64;
        let mut current = -LABEL_BORDER;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let id = self.cells[index].id;
            let slot = id.unsigned_abs() as usize;
            if id < 0 {
                self.reverse_labels[slot] = current;
            } else {
                self.forward_labels[slot] = current;
            }
            current += step;
            cursor = self.cells[index].next;
        }
    }
}

impl Default for VersionOrder {
    fn default() -> Self {
        Self::new()
    }
}
