use core::cell::{Cell, RefCell};
use fogwarden_protocol::{PersistedCell, SessionKey};
use hashbrown::HashMap;

use crate::StoreError;

/// Durable storage for fog rows, keyed by session and map.
///
/// Implementations bound each request by their own timeout and report [`StoreError::Timeout`] when it elapses.
#[allow(async_fn_in_trait)]
pub trait FogStore {
    /// All rows stored for `key`, an empty list when nothing was ever stored.
    async fn load(&self, key: &SessionKey) -> Result<Vec<PersistedCell>, StoreError>;

    /// Replaces everything stored for `key` with `cells`.
    async fn replace(&self, key: &SessionKey, cells: Vec<PersistedCell>) -> Result<(), StoreError>;
}

/// In-process store, also able to simulate an unreliable backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<SessionKey, Vec<PersistedCell>>>,
    failing_reads: Cell<usize>,
    failing_writes: Cell<usize>,
    writes: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` loads fail.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.set(count);
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.set(count);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn rows(&self, key: &SessionKey) -> Vec<PersistedCell> {
        self.tables.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn insert_rows(&self, key: SessionKey, rows: Vec<PersistedCell>) {
        self.tables.borrow_mut().insert(key, rows);
    }

    fn take_failure(counter: &Cell<usize>) -> bool {
        let remaining = counter.get();
        if remaining > 0 {
            counter.set(remaining - 1);
            true
        } else {
            false
        }
    }
}

impl FogStore for MemoryStore {
    async fn load(&self, key: &SessionKey) -> Result<Vec<PersistedCell>, StoreError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(StoreError::Unavailable(format!("simulated read failure for {key}")));
        }
        Ok(self.rows(key))
    }

    async fn replace(&self, key: &SessionKey, cells: Vec<PersistedCell>) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Unavailable(format!("simulated write failure for {key}")));
        }
        self.tables.borrow_mut().insert(key.clone(), cells);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}
