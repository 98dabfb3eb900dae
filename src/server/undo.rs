// src/server/undo.rs

use std::sync::{Mutex, MutexGuard};

/// Rows written through this server, newest last.
///
/// Row numbers are positional, so removing a row moves everything remembered
/// below it up by one.
#[derive(Debug, Default)]
pub struct UndoStack {
    rows: Mutex<Vec<u32>>,
}

impl UndoStack {
    fn rows(&self) -> MutexGuard<'_, Vec<u32>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, row: u32) {
        self.rows().push(row);
    }

    pub fn pop(&self) -> Option<u32> {
        self.rows().pop()
    }

    /// Account for `row` having been deleted from the ledger.
    pub fn forget_row(&self, row: u32) {
        let mut rows = self.rows();
        rows.retain(|r| *r != row);
        for r in rows.iter_mut().filter(|r| **r > row) {
            *r -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_newest_first() {
        let stack = UndoStack::default();
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn deleting_a_row_shifts_later_rows() {
        let stack = UndoStack::default();
        for row in [2, 3, 4] {
            stack.push(row);
        }
        stack.forget_row(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn rows_above_the_deleted_one_stay() {
        let stack = UndoStack::default();
        stack.push(5);
        stack.forget_row(9);
        assert_eq!(stack.pop(), Some(5));
    }
}
