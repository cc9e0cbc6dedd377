//! Change tracking for single-column writes.
//!
//! Decides how a row's sync status and changed-set evolve. Callers must
//! already hold a write scope; that is enforced by [`crate::Record`].

use crate::{
    row::{SanitizedRow, SyncStatus},
    schema::ColumnSchema,
    value::{sanitize, Value},
};

/// What a write did to the row's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    /// Diff mode saw an equal value; bookkeeping untouched.
    Unchanged,
    /// The column was recorded in the changed-set.
    Tracked,
    /// The value was stored, but the row's status does not track changes
    /// (created rows are dirty by construction).
    Untracked,
}

/// Applies column writes to a row and keeps its bookkeeping consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeTracker {
    diff_mode: bool,
}

impl ChangeTracker {
    pub fn new(diff_mode: bool) -> Self {
        Self { diff_mode }
    }

    pub fn diff_mode(&self) -> bool {
        self.diff_mode
    }

    /// Store `value` (sanitized) in `column` and update status/changed-set.
    pub fn apply_write(
        &self,
        row: &mut SanitizedRow,
        column: &ColumnSchema,
        value: Value,
    ) -> WriteEffect {
        let value = sanitize(value, column);
        let unchanged = self.diff_mode && row.get(&column.name) == Some(&value);
        row.put(&column.name, value);

        if unchanged {
            return WriteEffect::Unchanged;
        }

        match row.status() {
            SyncStatus::Synced => {
                row.set_status(SyncStatus::Updated);
                row.changed_mut().insert(&column.name);
                WriteEffect::Tracked
            }
            SyncStatus::Updated => {
                row.changed_mut().insert(&column.name);
                WriteEffect::Tracked
            }
            SyncStatus::Created | SyncStatus::Deleted => WriteEffect::Untracked,
        }
    }

    /// Flag the row as deleted. The changed-set is kept for sync.
    pub fn mark_deleted(&self, row: &mut SanitizedRow) {
        row.set_status(SyncStatus::Deleted);
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(true)
    }
}
