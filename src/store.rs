use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use log::{debug, warn};

use crate::data::model::Table;
use crate::service::SessionId;

/// Where uploaded tables live between requests.
pub trait TableStore: Send + Sync {
    fn get(&self, id: &SessionId) -> Option<Arc<Table>>;
    fn put(&self, id: SessionId, table: Arc<Table>);
    /// Returns whether `id` was present.
    fn delete(&self, id: &SessionId) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded in-memory store. Inserting past capacity evicts the session that
/// was least recently read or written.
pub struct MemoryStore {
    capacity: usize,
    /// Oldest first.
    tables: Mutex<IndexMap<SessionId, Arc<Table>>>,
}

impl MemoryStore {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        MemoryStore {
            capacity: capacity.max(1),
            tables: Mutex::new(IndexMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<SessionId, Arc<Table>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TableStore for MemoryStore {
    fn get(&self, id: &SessionId) -> Option<Arc<Table>> {
        let mut tables = self.lock();
        let table = tables.shift_remove(id)?;
        tables.insert(*id, Arc::clone(&table));
        Some(table)
    }

    fn put(&self, id: SessionId, table: Arc<Table>) {
        let mut tables = self.lock();
        tables.shift_remove(&id);
        tables.insert(id, table);
        while tables.len() > self.capacity {
            if let Some((evicted, _)) = tables.shift_remove_index(0) {
                warn!("session store full ({} tables), evicted {evicted}", self.capacity);
            }
        }
        debug!("session store holds {} tables", tables.len());
    }

    fn delete(&self, id: &SessionId) -> bool {
        self.lock().shift_remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
