//! Action scopes: proof that a write runs inside a serialized action.
//!
//! [`crate::Database::action`] runs one action at a time and hands each an
//! owned [`ActionScope`]. Write operations take the scope by reference;
//! holding one means the caller is inside the database's action queue.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes actions for one database.
#[derive(Debug, Default)]
pub(crate) struct ActionQueue {
    lock: Arc<Mutex<()>>,
}

impl ActionQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for every earlier action to finish, then open a scope.
    pub(crate) async fn enter(&self, database_id: u64) -> ActionScope {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        ActionScope {
            database_id,
            _guard: guard,
        }
    }

    /// Whether an action currently holds the queue.
    pub(crate) fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Token for a running action. Dropping it lets the next action start.
#[derive(Debug)]
pub struct ActionScope {
    database_id: u64,
    _guard: OwnedMutexGuard<()>,
}

impl ActionScope {
    /// Id of the database whose queue issued this scope.
    pub fn database_id(&self) -> u64 {
        self.database_id
    }
}
