//! Session table

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gateway::HandleId;

use super::Session;

/// Process-wide map from transport handle to session.
#[derive(Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<HandleId, Arc<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session for a newly attached handle.
    ///
    /// Returns `None` if the handle already has a session.
    pub fn create(&self, handle: HandleId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&handle) {
            return None;
        }
        let session = Arc::new(Session::new(handle));
        sessions.insert(handle, Arc::clone(&session));
        Some(session)
    }

    pub fn lookup(&self, handle: HandleId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&handle).cloned()
    }

    pub fn remove(&self, handle: HandleId) -> Option<Arc<Session>> {
        self.sessions.lock().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live session.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let table = SessionTable::new();
        let session = table.create(HandleId(1)).unwrap();

        let found = table.lookup(HandleId(1)).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_create_duplicate_handle() {
        let table = SessionTable::new();
        table.create(HandleId(1)).unwrap();
        assert!(table.create(HandleId(1)).is_none());
    }

    #[test]
    fn test_remove() {
        let table = SessionTable::new();
        table.create(HandleId(1)).unwrap();

        assert!(table.remove(HandleId(1)).is_some());
        assert!(table.lookup(HandleId(1)).is_none());
        assert!(table.remove(HandleId(1)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot() {
        let table = SessionTable::new();
        table.create(HandleId(1)).unwrap();
        table.create(HandleId(2)).unwrap();

        let all = table.snapshot();
        assert_eq!(all.len(), 2);

        table.remove(HandleId(1));
        let remaining = table.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].handle, HandleId(2));
    }
}
