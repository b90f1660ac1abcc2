//! Per-client session records and the handle given to request handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::registry::Registry;
use super::{LifeTime, SessionId, Value};
use crate::error::{Result, SessionError};

/// Mutable part of a record, guarded by the record's own mutex.
#[derive(Debug)]
pub(crate) struct RecordState {
    pub(crate) values: HashMap<String, Value>,
    pub(crate) flashes: HashMap<String, Value>,
    pub(crate) last_accessed: Instant,
    pub(crate) lifetime: LifeTime,
}

/// Server-side state of one session. Owned by the registry.
#[derive(Debug)]
pub(crate) struct SessionRecord {
    id: SessionId,
    created_at: Instant,
    state: Mutex<RecordState>,
    push: Mutex<()>,
}

impl SessionRecord {
    pub(crate) fn new(id: SessionId, values: HashMap<String, Value>, lifetime: LifeTime) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            state: Mutex::new(RecordState {
                values,
                flashes: HashMap::new(),
                last_accessed: now,
                lifetime,
            }),
            push: Mutex::new(()),
        }
    }

    pub(crate) fn id(&self) -> &SessionId {
        &self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serializes database pushes for this record.
    pub(crate) fn lock_push(&self) -> MutexGuard<'_, ()> {
        self.push.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lifetime(&self) -> LifeTime {
        self.lock().lifetime
    }

    pub(crate) fn has_expired(&self) -> bool {
        self.lifetime().has_expired()
    }
}

/// Handle to a live session.
///
/// Handles are cheap to clone and all clones share the same record, so a
/// value set through one is immediately visible through the others.
/// Every value or flash accessor counts as an access and keeps the session
/// off the idle sweep. Mutations of values are pushed to every registered
/// database before returning.
#[derive(Clone)]
pub struct Session {
    pub(crate) record: Arc<SessionRecord>,
    pub(crate) registry: Registry,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", self.id())
            .field("created_at", &self.record.created_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(record: Arc<SessionRecord>, registry: Registry) -> Self {
        Self { record, registry }
    }

    pub fn id(&self) -> &SessionId {
        self.record.id()
    }

    pub fn created_at(&self) -> Instant {
        self.record.created_at
    }

    pub fn last_accessed_time(&self) -> Instant {
        self.record.lock().last_accessed
    }

    /// Expiration of this session; unset when it does not expire on its own.
    pub fn lifetime(&self) -> LifeTime {
        self.record.lifetime()
    }

    /// Look up a value. A missing key is `None`; a stored null is
    /// `Some(Value::Null)`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.record.lock().values.get(key).cloned();
        self.registry.refresh_record(&self.record);
        value
    }

    pub fn contains(&self, key: &str) -> bool {
        let found = self.record.lock().values.contains_key(key);
        self.registry.refresh_record(&self.record);
        found
    }

    fn get_as<T>(
        &self,
        key: &str,
        expected: &'static str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| SessionError::ValueNotFound(key.to_string()))?;
        convert(&value).ok_or_else(|| SessionError::Coercion {
            key: key.to_string(),
            expected,
            found: value.describe(),
        })
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get_as(key, "string", |v| v.as_str().map(str::to_string))
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Read as `i32`, parsing numeric strings.
    pub fn get_int(&self, key: &str) -> Result<i32> {
        self.get_as(key, "int", Value::to_i32)
    }

    pub fn get_int_or(&self, key: &str, default: i32) -> i32 {
        self.get_int(key).unwrap_or(default)
    }

    /// Read as `i64`, parsing numeric strings.
    pub fn get_int64(&self, key: &str) -> Result<i64> {
        self.get_as(key, "int64", Value::to_i64)
    }

    /// Read as `f32` from floats, integers or numeric strings.
    pub fn get_float32(&self, key: &str) -> Result<f32> {
        self.get_as(key, "float32", Value::to_f32)
    }

    /// Read as `f64` from floats, integers or numeric strings.
    pub fn get_float64(&self, key: &str) -> Result<f64> {
        self.get_as(key, "float64", Value::to_f64)
    }

    /// Read a stored boolean. Strings and numbers are not coerced.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get_as(key, "bool", Value::as_bool)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Snapshot of every stored value.
    pub fn get_all(&self) -> HashMap<String, Value> {
        let values = self.record.lock().values.clone();
        self.registry.refresh_record(&self.record);
        values
    }

    /// Call `f` for each stored value.
    ///
    /// Iterates over a snapshot, so `f` may call back into the session.
    pub fn visit_all(&self, mut f: impl FnMut(&str, &Value)) {
        for (key, value) in &self.get_all() {
            f(key, value);
        }
    }

    pub fn len(&self) -> usize {
        let len = self.record.lock().values.len();
        self.registry.refresh_record(&self.record);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a value as-is.
    ///
    /// A [`SharedValue`](crate::SharedValue) keeps its alias: later edits
    /// through the caller's handle show up in this session.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.record.lock().values.insert(key.into(), value.into());
        self.registry.touch_record(&self.record);
    }

    /// Store a deep copy of the value, immune to later edits by the caller.
    pub fn set_immutable(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.record
            .lock()
            .values
            .insert(key.into(), value.into().frozen());
        self.registry.touch_record(&self.record);
    }

    /// Remove a value, reporting whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.record.lock().values.remove(key).is_some();
        self.registry.touch_record(&self.record);
        removed
    }

    /// Remove every value. The session itself stays alive.
    pub fn clear(&self) {
        self.record.lock().values.clear();
        self.registry.touch_record(&self.record);
    }

    /// Add `by` to an integer value, starting from zero when absent.
    pub fn increment(&self, key: &str, by: i64) -> Result<i64> {
        let next = {
            let mut state = self.record.lock();
            let current = match state.values.get(key) {
                None => 0,
                Some(value) => value.to_i64().ok_or_else(|| SessionError::Coercion {
                    key: key.to_string(),
                    expected: "int64",
                    found: value.describe(),
                })?,
            };
            let next = current.saturating_add(by);
            state.values.insert(key.to_string(), Value::Int(next));
            next
        };
        self.registry.touch_record(&self.record);
        Ok(next)
    }

    pub fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.increment(key, by.saturating_neg())
    }

    /// Store a value that is removed the first time it is read with
    /// [`Session::get_flash`]. Flashes stay in memory and are not mirrored
    /// to databases.
    pub fn set_flash(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.record
            .lock()
            .flashes
            .insert(key.into(), value.into());
        self.registry.refresh_record(&self.record);
    }

    /// Take a flash value, removing it.
    pub fn get_flash(&self, key: &str) -> Option<Value> {
        let value = self.record.lock().flashes.remove(key);
        self.registry.refresh_record(&self.record);
        value
    }

    /// Take a flash string; empty when absent or not a string.
    pub fn get_flash_string(&self, key: &str) -> String {
        match self.get_flash(key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        }
    }

    /// Read a flash value without consuming it.
    pub fn peek_flash(&self, key: &str) -> Option<Value> {
        let value = self.record.lock().flashes.get(key).cloned();
        self.registry.refresh_record(&self.record);
        value
    }

    pub fn has_flashes(&self) -> bool {
        let any = !self.record.lock().flashes.is_empty();
        self.registry.refresh_record(&self.record);
        any
    }

    pub fn clear_flashes(&self) {
        self.record.lock().flashes.clear();
        self.registry.refresh_record(&self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Expiry, SharedValue};
    use serde_json::json;
    use std::thread;

    fn session() -> Session {
        Registry::new(Expiry::Unlimited).init(&SessionId::generate(16))
    }

    #[test]
    fn test_set_then_get() {
        let s = session();
        s.set("name", "gopher");
        s.set("age", 7);
        assert_eq!(s.get("name"), Some(Value::from("gopher")));
        assert_eq!(s.get("age"), Some(Value::Int(7)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_missing_vs_null() {
        let s = session();
        s.set("nothing", Value::Null);
        assert_eq!(s.get("nothing"), Some(Value::Null));
        assert_eq!(s.get("missing"), None);
        assert!(s.contains("nothing"));
    }

    #[test]
    fn test_delete_then_get() {
        let s = session();
        s.set("k", "v");
        assert!(s.delete("k"));
        assert_eq!(s.get("k"), None);
        assert!(!s.delete("k"));
    }

    #[test]
    fn test_clear_keeps_session_usable() {
        let s = session();
        s.set("a", 1);
        s.set("b", 2);
        s.clear();
        assert_eq!(s.len(), 0);
        assert!(s.is_empty());

        s.set("c", 3);
        assert_eq!(s.get_int("c").unwrap(), 3);
    }

    #[test]
    fn test_typed_getters() {
        let s = session();
        s.set("int", 42);
        s.set("numeric", "17");
        s.set("float", 1.5);
        s.set("flag", true);
        s.set("text", "hello");

        assert_eq!(s.get_int("int").unwrap(), 42);
        assert_eq!(s.get_int("numeric").unwrap(), 17);
        assert_eq!(s.get_int64("numeric").unwrap(), 17);
        assert_eq!(s.get_float64("float").unwrap(), 1.5);
        assert_eq!(s.get_float32("int").unwrap(), 42.0);
        assert!(s.get_bool("flag").unwrap());
        assert_eq!(s.get_string("text").unwrap(), "hello");
    }

    #[test]
    fn test_typed_getter_errors() {
        let s = session();
        s.set("flag", true);
        s.set("text", "hello");

        assert!(matches!(
            s.get_int("flag"),
            Err(SessionError::Coercion { expected: "int", .. })
        ));
        assert!(matches!(
            s.get_bool("text"),
            Err(SessionError::Coercion { expected: "bool", .. })
        ));
        assert!(matches!(
            s.get_float64("missing"),
            Err(SessionError::ValueNotFound(_))
        ));
        assert_eq!(s.get_int_or("flag", -1), -1);
        assert_eq!(s.get_string_or("missing", "anon"), "anon");
        assert!(!s.get_bool_or("missing", false));
    }

    #[test]
    fn test_mutable_set_aliases() {
        let s = session();
        let cart = SharedValue::new(json!(["apple"]));
        s.set("cart", cart.clone());

        cart.update(|doc| doc.as_array_mut().unwrap().push(json!("pear")));
        assert_eq!(s.get("cart").unwrap().to_json(), json!(["apple", "pear"]));
    }

    #[test]
    fn test_immutable_set_copies() {
        let s = session();
        let cart = SharedValue::new(json!(["apple"]));
        s.set_immutable("cart", cart.clone());

        cart.update(|doc| doc.as_array_mut().unwrap().push(json!("pear")));
        assert_eq!(s.get("cart").unwrap().to_json(), json!(["apple"]));
    }

    #[test]
    fn test_increment_decrement() {
        let s = session();
        assert_eq!(s.increment("visits", 1).unwrap(), 1);
        assert_eq!(s.increment("visits", 2).unwrap(), 3);
        assert_eq!(s.decrement("visits", 1).unwrap(), 2);

        s.set("name", "x");
        assert!(s.increment("name", 1).is_err());
    }

    #[test]
    fn test_flash_consumed_on_read() {
        let s = session();
        s.set_flash("notice", "saved");
        assert!(s.has_flashes());
        assert_eq!(s.peek_flash("notice"), Some(Value::from("saved")));
        assert_eq!(s.get_flash_string("notice"), "saved");
        assert_eq!(s.get_flash("notice"), None);
        assert!(!s.has_flashes());
        // Flashes do not count as values.
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_clones_share_record() {
        let a = session();
        let b = a.clone();
        a.set("k", "v");
        assert_eq!(b.get_string("k").unwrap(), "v");
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_visit_all() {
        let s = session();
        s.set("a", 1);
        s.set("b", 2);
        let mut total = 0;
        s.visit_all(|_, v| total += v.to_i64().unwrap());
        assert_eq!(total, 3);
    }

    #[test]
    fn test_every_read_accessor_counts_as_access() {
        let s = session();
        s.set("k", 1);
        s.set_flash("notice", "saved");

        let reads: [(&str, &dyn Fn(&Session)); 6] = [
            ("contains", &|s| {
                s.contains("k");
            }),
            ("len", &|s| {
                s.len();
            }),
            ("is_empty", &|s| {
                s.is_empty();
            }),
            ("get_int", &|s| {
                s.get_int("k").ok();
            }),
            ("peek_flash", &|s| {
                s.peek_flash("notice");
            }),
            ("has_flashes", &|s| {
                s.has_flashes();
            }),
        ];
        for (name, read) in reads {
            let before = s.last_accessed_time();
            thread::sleep(std::time::Duration::from_millis(2));
            read(&s);
            assert!(s.last_accessed_time() > before, "{name} did not refresh");
        }
    }

    #[test]
    fn test_concurrent_sets_distinct_keys() {
        let s = session();
        let mut handles = vec![];

        for t in 0..16 {
            let s = s.clone();
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    s.set(format!("k-{t}-{i}"), i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(s.len(), 16 * 50);
    }
}
