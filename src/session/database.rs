//! External session storage capability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::{LifeTime, SessionId, Value};
use crate::error::DatabaseError;

/// A backing store that mirrors session values outside the process.
///
/// The registry calls these methods synchronously on the request path and
/// never while holding its own locks. Backends own their concurrency and
/// timeouts; transient failures should degrade to the documented defaults
/// rather than panic.
pub trait Database: Send + Sync {
    /// Return the backend's expiration for `id`.
    ///
    /// An unset lifetime lets the manager apply its own policy;
    /// [`LifeTime::expired`] asks it to drop the session immediately.
    fn acquire(&self, id: &SessionId, ttl: Option<Duration>) -> LifeTime;

    /// Refresh the backend-side TTL of `id`.
    fn on_update_expiration(&self, id: &SessionId, ttl: Duration) -> Result<(), DatabaseError>;

    /// Upsert one field. `immutable` is advisory.
    fn set(&self, id: &SessionId, lifetime: LifeTime, key: &str, value: &Value, immutable: bool);

    fn get(&self, id: &SessionId, key: &str) -> Option<Value>;

    /// Call `f` for every stored field, in no particular order.
    fn visit(&self, id: &SessionId, f: &mut dyn FnMut(&str, &Value));

    /// Number of stored fields.
    fn len(&self, id: &SessionId) -> usize;

    fn is_empty(&self, id: &SessionId) -> bool {
        self.len(id) == 0
    }

    /// Remove one field, reporting whether it existed.
    fn delete(&self, id: &SessionId, key: &str) -> bool;

    /// Remove every field but keep the session addressable.
    fn clear(&self, id: &SessionId);

    /// Remove every trace of the session.
    fn release(&self, id: &SessionId);

    /// Release connection resources.
    fn close(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Collect all fields of a session.
    fn load(&self, id: &SessionId) -> HashMap<String, Value> {
        let mut values = HashMap::new();
        self.visit(id, &mut |key, value| {
            values.insert(key.to_string(), value.clone());
        });
        values
    }

    /// Replace the stored fields with `values`.
    fn update(&self, id: &SessionId, lifetime: LifeTime, values: &HashMap<String, Value>) {
        self.clear(id);
        for (key, value) in values {
            self.set(id, lifetime, key, value, false);
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    values: HashMap<String, Value>,
    lifetime: LifeTime,
}

/// In-process [`Database`] keeping frozen copies of session values.
///
/// Useful as a second-tier store that survives memory sweeps, and as a
/// reference for backend authors.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    entries: RwLock<HashMap<SessionId, Entry>>,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with an entry.
    pub fn session_count(&self) -> usize {
        self.read_entries(|entries| entries.len())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn read_entries<R>(&self, f: impl FnOnce(&HashMap<SessionId, Entry>) -> R) -> R {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        f(&entries)
    }

    fn write_entries<R>(&self, f: impl FnOnce(&mut HashMap<SessionId, Entry>) -> R) -> R {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    /// Live entry for `id`, dropping it first if its lifetime has passed.
    fn with_live_entry<R>(&self, id: &SessionId, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        if self.is_closed() {
            return None;
        }
        self.write_entries(|entries| {
            if entries.get(id).is_some_and(|e| e.lifetime.has_expired()) {
                entries.remove(id);
            }
            entries.get_mut(id).map(f)
        })
    }
}

impl Database for MemoryDatabase {
    fn acquire(&self, id: &SessionId, ttl: Option<Duration>) -> LifeTime {
        if self.is_closed() {
            return LifeTime::expired();
        }
        self.write_entries(|entries| match entries.get(id) {
            Some(entry) if entry.lifetime.has_expired() => {
                entries.remove(id);
                LifeTime::expired()
            }
            Some(entry) => entry.lifetime,
            None => {
                let lifetime = ttl.map(LifeTime::after).unwrap_or_default();
                entries.insert(
                    id.clone(),
                    Entry {
                        values: HashMap::new(),
                        lifetime,
                    },
                );
                LifeTime::unset()
            }
        })
    }

    fn on_update_expiration(&self, id: &SessionId, ttl: Duration) -> Result<(), DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::Closed);
        }
        self.with_live_entry(id, |entry| entry.lifetime = LifeTime::after(ttl))
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))
    }

    fn set(&self, id: &SessionId, lifetime: LifeTime, key: &str, value: &Value, immutable: bool) {
        if self.is_closed() {
            return;
        }
        let stored = value.clone().frozen();
        self.write_entries(|entries| {
            let entry = entries.entry(id.clone()).or_default();
            if !lifetime.is_unset() {
                entry.lifetime = lifetime;
            }
            if immutable && entry.values.contains_key(key) {
                return;
            }
            entry.values.insert(key.to_string(), stored);
        });
    }

    fn get(&self, id: &SessionId, key: &str) -> Option<Value> {
        self.with_live_entry(id, |entry| entry.values.get(key).cloned())
            .flatten()
    }

    fn visit(&self, id: &SessionId, f: &mut dyn FnMut(&str, &Value)) {
        let values = self
            .with_live_entry(id, |entry| entry.values.clone())
            .unwrap_or_default();
        for (key, value) in &values {
            f(key, value);
        }
    }

    fn len(&self, id: &SessionId) -> usize {
        self.with_live_entry(id, |entry| entry.values.len())
            .unwrap_or(0)
    }

    fn delete(&self, id: &SessionId, key: &str) -> bool {
        self.with_live_entry(id, |entry| entry.values.remove(key).is_some())
            .unwrap_or(false)
    }

    fn clear(&self, id: &SessionId) {
        self.with_live_entry(id, |entry| entry.values.clear());
    }

    fn release(&self, id: &SessionId) {
        self.write_entries(|entries| entries.remove(id));
    }

    fn close(&self) -> Result<(), DatabaseError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DatabaseError::Closed);
        }
        self.write_entries(|entries| entries.clear());
        Ok(())
    }

    fn update(&self, id: &SessionId, lifetime: LifeTime, values: &HashMap<String, Value>) {
        if self.is_closed() {
            return;
        }
        let frozen = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().frozen()))
            .collect();
        self.write_entries(|entries| {
            let entry = entries.entry(id.clone()).or_default();
            if !lifetime.is_unset() {
                entry.lifetime = lifetime;
            }
            entry.values = frozen;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::from_raw(s)
    }

    #[test]
    fn test_acquire_creates_entry() {
        let db = MemoryDatabase::new();
        let lifetime = db.acquire(&sid("a"), Some(Duration::from_secs(60)));
        assert!(lifetime.is_unset());
        assert_eq!(db.session_count(), 1);

        // Second acquire reports the stored expiration.
        let again = db.acquire(&sid("a"), Some(Duration::from_secs(60)));
        assert!(!again.is_unset());
        assert!(!again.has_expired());
    }

    #[test]
    fn test_set_get_delete() {
        let db = MemoryDatabase::new();
        let id = sid("a");
        db.set(&id, LifeTime::unset(), "name", &Value::from("go"), false);

        assert_eq!(db.get(&id, "name"), Some(Value::from("go")));
        assert_eq!(db.len(&id), 1);
        assert!(db.delete(&id, "name"));
        assert!(!db.delete(&id, "name"));
        assert!(db.is_empty(&id));
    }

    #[test]
    fn test_immutable_does_not_overwrite() {
        let db = MemoryDatabase::new();
        let id = sid("a");
        db.set(&id, LifeTime::unset(), "k", &Value::Int(1), true);
        db.set(&id, LifeTime::unset(), "k", &Value::Int(2), true);
        assert_eq!(db.get(&id, "k"), Some(Value::Int(1)));
    }

    #[test]
    fn test_update_replaces_and_load_collects() {
        let db = MemoryDatabase::new();
        let id = sid("a");
        db.set(&id, LifeTime::unset(), "old", &Value::Int(1), false);

        let mut values = HashMap::new();
        values.insert("new".to_string(), Value::Bool(true));
        db.update(&id, LifeTime::unset(), &values);

        let loaded = db.load(&id);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("new"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_clear_keeps_entry_release_drops_it() {
        let db = MemoryDatabase::new();
        let id = sid("a");
        db.set(&id, LifeTime::unset(), "k", &Value::Int(1), false);

        db.clear(&id);
        assert_eq!(db.len(&id), 0);
        assert_eq!(db.session_count(), 1);

        db.release(&id);
        assert_eq!(db.session_count(), 0);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let db = MemoryDatabase::new();
        let id = sid("a");
        db.set(&id, LifeTime::expired(), "k", &Value::Int(1), false);

        assert_eq!(db.get(&id, "k"), None);
        assert_eq!(db.session_count(), 0);
    }

    #[test]
    fn test_update_expiration_missing() {
        let db = MemoryDatabase::new();
        let err = db
            .on_update_expiration(&sid("nope"), Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err, DatabaseError::NotFound("nope".into()));
    }

    #[test]
    fn test_close() {
        let db = MemoryDatabase::new();
        let id = sid("a");
        db.set(&id, LifeTime::unset(), "k", &Value::Int(1), false);

        assert!(db.close().is_ok());
        assert!(db.is_closed());
        assert_eq!(db.get(&id, "k"), None);
        assert_eq!(db.close(), Err(DatabaseError::Closed));
        assert!(db.acquire(&id, None).has_expired());
    }
}
