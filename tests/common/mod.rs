//! Shared test instrumentation.

use std::cell::Cell;
use std::rc::Rc;

/// Element that counts how many of its values have been dropped; clones
/// share the counter. Used to verify that collections release exactly the
/// elements they materialized.
pub struct DropCounter {
    drops: Rc<Cell<usize>>,
}

impl DropCounter {
    pub fn new(drops: &Rc<Cell<usize>>) -> Self {
        Self {
            drops: Rc::clone(drops),
        }
    }
}

impl Clone for DropCounter {
    fn clone(&self) -> Self {
        Self {
            drops: Rc::clone(&self.drops),
        }
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}
