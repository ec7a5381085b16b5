use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::{Session, SessionId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session already exists: {0}")]
    Duplicate(SessionId),
}

/// The set of live sessions, keyed by session id.
///
/// Every insert, removal and iteration is serialized by one lock. Iteration
/// works on a snapshot, so callbacks may freely call back into the registry.
/// Duplicate ids are rejected rather than superseding the live entry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its own id.
    pub fn insert(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(session.id()) {
            return Err(RegistryError::Duplicate(session.id().to_string()));
        }
        sessions.insert(session.id().to_string(), session);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Remove a session. Removing an unknown id is not an error.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().remove(id)
    }

    /// Remove `id` only if the live entry is the given incarnation.
    ///
    /// Late callbacks from an earlier process use this so they can never
    /// remove a newer session that reused the id.
    pub fn remove_if_current(&self, id: &str, generation: u64) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        match sessions.get(id) {
            Some(session) if session.generation() == generation => sessions.remove(id),
            _ => None,
        }
    }

    /// Run `f` for every session in a snapshot taken under the lock.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Session>)) {
        let snapshot: Vec<Arc<Session>> = self.sessions.lock().values().cloned().collect();
        for session in &snapshot {
            f(session);
        }
    }

    /// Atomically remove and return every session.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().drain().map(|(_, session)| session).collect()
    }

    /// List all session ids, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::{SpawnCommand, Spawner};
    use crate::target::DeliveryTarget;
    use crate::testing::{FakeSpawner, RecordingTarget};
    use std::path::PathBuf;

    fn session(id: &str, generation: u64) -> Arc<Session> {
        let process = FakeSpawner::new()
            .spawn(&SpawnCommand::new("/bin/sh", "/tmp"))
            .unwrap();
        let target: Arc<dyn DeliveryTarget> = RecordingTarget::new();
        Arc::new(Session::new(
            id.to_string(),
            generation,
            PathBuf::from("/tmp"),
            process,
            Arc::downgrade(&target),
        ))
    }

    #[test]
    fn test_insert_and_get() {
        let registry = SessionRegistry::new();
        registry.insert(session("a", 1)).unwrap();

        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
        assert!(registry.contains("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let registry = SessionRegistry::new();
        registry.insert(session("a", 1)).unwrap();

        let err = registry.insert(session("a", 2)).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("a".to_string()));
        // The live entry is untouched.
        assert_eq!(registry.get("a").unwrap().generation(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.insert(session("a", 1)).unwrap();

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.remove("never-existed").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_if_current_checks_generation() {
        let registry = SessionRegistry::new();
        registry.insert(session("a", 2)).unwrap();

        assert!(registry.remove_if_current("a", 1).is_none());
        assert!(registry.contains("a"));
        assert!(registry.remove_if_current("a", 2).is_some());
        assert!(!registry.contains("a"));
    }

    #[test]
    fn test_for_each_tolerates_mutation() {
        let registry = SessionRegistry::new();
        registry.insert(session("a", 1)).unwrap();
        registry.insert(session("b", 2)).unwrap();

        let mut seen = Vec::new();
        registry.for_each(|s| {
            seen.push(s.id().to_string());
            // Re-entering the registry from the callback must not deadlock.
            registry.remove(s.id());
        });

        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = SessionRegistry::new();
        registry.insert(session("a", 1)).unwrap();
        registry.insert(session("b", 2)).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn test_ids_are_sorted() {
        let registry = SessionRegistry::new();
        registry.insert(session("c", 1)).unwrap();
        registry.insert(session("a", 2)).unwrap();
        registry.insert(session("b", 3)).unwrap();
        assert_eq!(registry.ids(), vec!["a", "b", "c"]);
    }
}
