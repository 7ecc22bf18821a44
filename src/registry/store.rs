//! Registry store

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PluginError;

use super::recording::{Recording, RecordingSummary};

/// Catalogue of recordings keyed by id.
#[derive(Default)]
pub struct RecordingRegistry {
    recordings: Mutex<HashMap<u64, Arc<Recording>>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new recording, allocating an id when none was requested.
    ///
    /// A requested id that already exists fails with `RecordingExists`;
    /// an absent or zero id gets a fresh random one (retrying on the
    /// vanishingly unlikely collision). Allocation and insertion are atomic
    /// under the registry lock; the `build` closure must not perform I/O.
    pub fn insert(
        &self,
        requested: Option<u64>,
        build: impl FnOnce(u64) -> Recording,
    ) -> Result<Arc<Recording>, PluginError> {
        let mut recordings = self.recordings.lock();
        let id = match requested.filter(|&id| id != 0) {
            Some(id) => {
                if recordings.contains_key(&id) {
                    return Err(PluginError::RecordingExists(id));
                }
                id
            }
            None => loop {
                let id = rand::random::<u64>();
                if id != 0 && !recordings.contains_key(&id) {
                    break id;
                }
            },
        };
        let rec = Arc::new(build(id));
        recordings.insert(id, Arc::clone(&rec));
        tracing::info!(id, name = %rec.name, "Recording registered");
        Ok(rec)
    }

    /// Look up a recording by id.
    pub fn lookup(&self, id: u64) -> Option<Arc<Recording>> {
        self.recordings.lock().get(&id).cloned()
    }

    /// Drop the registry's reference. The recording lives on until every
    /// other holder releases it.
    pub fn remove(&self, id: u64) -> Option<Arc<Recording>> {
        let removed = self.recordings.lock().remove(&id);
        if removed.is_some() {
            tracing::debug!(id, "Recording removed from registry");
        }
        removed
    }

    /// Snapshot of the completed, non-destroyed recordings.
    pub fn list(&self) -> Vec<RecordingSummary> {
        self.recordings
            .lock()
            .values()
            .filter(|rec| rec.is_completed() && !rec.is_destroyed())
            .map(|rec| rec.summary())
            .collect()
    }

    /// Whether the given id is registered.
    pub fn contains(&self, id: u64) -> bool {
        self.recordings.lock().contains_key(&id)
    }

    /// Number of registered recordings, completed or not.
    pub fn len(&self) -> usize {
        self.recordings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(id: u64) -> Recording {
        Recording::new(id, format!("rec {id}"), "2024-01-01 10:00:00".into(), None, None)
    }

    #[test]
    fn test_insert_with_requested_id() {
        let registry = RecordingRegistry::new();
        let rec = registry.insert(Some(42), recording).unwrap();

        assert_eq!(rec.id, 42);
        assert!(registry.contains(42));
    }

    #[test]
    fn test_insert_duplicate_id_conflicts() {
        let registry = RecordingRegistry::new();
        registry.insert(Some(42), recording).unwrap();

        let err = registry.insert(Some(42), recording).unwrap_err();
        assert!(matches!(err, PluginError::RecordingExists(42)));
        assert_eq!(err.code(), 420);
    }

    #[test]
    fn test_insert_allocates_random_id() {
        let registry = RecordingRegistry::new();
        let a = registry.insert(None, recording).unwrap();
        let b = registry.insert(Some(0), recording).unwrap();

        assert_ne!(a.id, 0);
        assert_ne!(b.id, 0);
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_and_remove() {
        let registry = RecordingRegistry::new();
        assert!(registry.is_empty());

        let rec = registry.insert(Some(7), recording).unwrap();
        assert!(!registry.is_empty());

        let found = registry.lookup(7).unwrap();
        assert!(Arc::ptr_eq(&rec, &found));

        // The removed entry survives through other holders.
        let removed = registry.remove(7).unwrap();
        assert!(registry.lookup(7).is_none());
        assert!(registry.is_empty());
        assert_eq!(removed.id, 7);
        assert!(Arc::strong_count(&rec) >= 2);
    }

    #[test]
    fn test_list_only_completed() {
        let registry = RecordingRegistry::new();
        let done = registry.insert(Some(1), recording).unwrap();
        registry.insert(Some(2), recording).unwrap(); // still in progress
        let gone = registry.insert(Some(3), recording).unwrap();

        done.mark_completed();
        gone.mark_completed();
        gone.mark_destroyed();

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, 1);
    }
}
