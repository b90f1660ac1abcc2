//! In-memory session registry.
//!
//! Records live in an arena of slots. An id map points into the arena and
//! the slots are threaded into a doubly linked list ordered by recency, most
//! recently used at the head. The sweep walks the list from the tail.
//!
//! Lock order is record push lock, then registry index, then record state.
//! Database calls are never made while the index or a record's state is
//! locked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tracing::debug;

use super::gc::expire_when_due;
use super::record::{Session, SessionRecord};
use super::{Database, Expiry, LifeTime, SessionId, Value};

struct Node {
    record: Arc<SessionRecord>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
struct Index {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    by_id: HashMap<SessionId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Index {
    fn node(&self, slot: usize) -> Option<&Node> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    fn slot_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    fn record(&self, id: &str) -> Option<&Arc<SessionRecord>> {
        self.slot_of(id)
            .and_then(|slot| self.node(slot))
            .map(|node| &node.record)
    }

    fn push_front(&mut self, record: Arc<SessionRecord>) -> usize {
        let id = record.id().clone();
        let node = Node {
            record,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.by_id.insert(id, slot);
        self.link_front(slot);
        slot
    }

    fn remove(&mut self, id: &str) -> Option<Arc<SessionRecord>> {
        let slot = self.by_id.remove(id)?;
        self.unlink(slot);
        let node = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        Some(node.record)
    }

    fn promote(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.link_front(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let Some((prev, next)) = self.node(slot).map(|n| (n.prev, n.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_front(&mut self, slot: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(slot) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(head) = old_head.and_then(|h| self.node_mut(h)) {
            head.prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn tail_record(&self) -> Option<Arc<SessionRecord>> {
        self.tail
            .and_then(|slot| self.node(slot))
            .map(|node| node.record.clone())
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Ids from most to least recently used.
    fn ids(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(node) = cursor.and_then(|slot| self.node(slot)) {
            ids.push(node.record.id().clone());
            cursor = node.next;
        }
        ids
    }

    fn drain(&mut self) -> Vec<Arc<SessionRecord>> {
        let records = self
            .slots
            .drain(..)
            .flatten()
            .map(|node| node.record)
            .collect();
        *self = Index::default();
        records
    }
}

struct Shared {
    index: Mutex<Index>,
    databases: RwLock<Vec<Arc<dyn Database>>>,
    expires: Expiry,
}

/// Owner of every live session record in the process.
///
/// Cloning is cheap and yields another handle to the same registry.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

/// Non-owning registry handle held by background tasks.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<Shared>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|shared| Registry { shared })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.len())
            .field("expires", &self.shared.expires)
            .finish()
    }
}

impl Registry {
    pub fn new(expires: Expiry) -> Self {
        Self {
            shared: Arc::new(Shared {
                index: Mutex::new(Index::default()),
                databases: RwLock::new(Vec::new()),
                expires,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.shared))
    }

    fn lock_index(&self) -> MutexGuard<'_, Index> {
        self.shared
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a backing store. Only later reads and writes see it.
    pub fn register_database(&self, db: Arc<dyn Database>) {
        self.shared
            .databases
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(db);
    }

    /// Snapshot of the registered stores, in registration order.
    pub fn databases(&self) -> Vec<Arc<dyn Database>> {
        self.shared
            .databases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Create the record for `id`, hydrating it from the first database
    /// holding values for it.
    ///
    /// If another caller created a live record for the same id first, that
    /// record is returned instead.
    pub fn init(&self, id: &SessionId) -> Session {
        let databases = self.databases();
        let ttl = self.shared.expires.ttl();

        let mut lifetime = LifeTime::unset();
        for db in &databases {
            let answer = db.acquire(id, ttl);
            if lifetime.is_unset() && !answer.is_unset() {
                lifetime = answer;
            }
        }
        if lifetime.is_unset() {
            if let Some(ttl) = ttl {
                lifetime = LifeTime::after(ttl);
            }
        }

        let values = if lifetime.has_expired() {
            HashMap::new()
        } else {
            databases
                .iter()
                .map(|db| db.load(id))
                .find(|values| !values.is_empty())
                .unwrap_or_default()
        };

        let candidate = Arc::new(SessionRecord::new(id.clone(), values, lifetime));
        let (record, inserted) = {
            let mut index = self.lock_index();
            match index.slot_of(id.as_str()) {
                Some(slot)
                    if index
                        .node(slot)
                        .is_some_and(|node| !node.record.has_expired()) =>
                {
                    index.promote(slot);
                    let existing = index.record(id.as_str()).cloned().unwrap_or(candidate);
                    existing.lock().last_accessed = Instant::now();
                    (existing, false)
                }
                _ => {
                    index.remove(id.as_str());
                    index.push_front(candidate.clone());
                    (candidate, true)
                }
            }
        };

        if inserted {
            debug!(session = %id, hydrated = !record.lock().values.is_empty(), "session created");
            self.schedule_expiration(&record);
        }
        Session::new(record, self.clone())
    }

    /// The live session for `id`, or a freshly initialised one.
    pub fn read_or_init(&self, id: &SessionId) -> Session {
        match self.get(id.as_str()) {
            Some(session) => session,
            None => self.init(id),
        }
    }

    /// The live session for `id`, refreshing it. Expired records are
    /// destroyed on the way.
    pub fn get(&self, id: &str) -> Option<Session> {
        let record = {
            let mut index = self.lock_index();
            let slot = index.slot_of(id)?;
            let record = index.node(slot)?.record.clone();
            if record.has_expired() {
                drop(index);
                self.destroy(id);
                return None;
            }
            index.promote(slot);
            record.lock().last_accessed = Instant::now();
            record
        };
        Some(Session::new(record, self.clone()))
    }

    /// Refresh `id` and push its values to every database.
    pub fn touch(&self, id: &str) {
        let record = self.lock_index().record(id).cloned();
        if let Some(record) = record {
            self.touch_record(&record);
        }
    }

    /// Refresh last access and recency of `id` without database traffic.
    pub fn refresh(&self, id: &str) {
        let record = self.lock_index().record(id).cloned();
        if let Some(record) = record {
            self.refresh_record(&record);
        }
    }

    /// Promote `record` and return its state for the databases, or `None`
    /// when it is no longer the registered record for its id.
    fn promote_record(
        &self,
        record: &Arc<SessionRecord>,
        snapshot: bool,
    ) -> Option<(LifeTime, HashMap<String, Value>)> {
        let mut index = self.lock_index();
        let slot = index.slot_of(record.id().as_str())?;
        if !index
            .node(slot)
            .is_some_and(|node| Arc::ptr_eq(&node.record, record))
        {
            return None;
        }
        index.promote(slot);

        let mut state = record.lock();
        state.last_accessed = Instant::now();
        let values = if snapshot {
            state.values.clone()
        } else {
            HashMap::new()
        };
        Some((state.lifetime, values))
    }

    pub(crate) fn touch_record(&self, record: &Arc<SessionRecord>) {
        // Held from the snapshot through the last update so pushes for one
        // record reach the databases in mutation order.
        let _push = record.lock_push();
        let Some((lifetime, values)) = self.promote_record(record, true) else {
            return;
        };
        for db in self.databases() {
            db.update(record.id(), lifetime, &values);
        }
    }

    pub(crate) fn refresh_record(&self, record: &Arc<SessionRecord>) {
        self.promote_record(record, false);
    }

    /// Remove `id` from memory and from every database.
    ///
    /// Returns whether a record was held in memory. Safe to call repeatedly.
    pub fn destroy(&self, id: &str) -> bool {
        let removed = self.lock_index().remove(id);
        self.finish_destroy(id, removed)
    }

    /// Destroy `record` only if it is still the registered record for its
    /// id.
    pub(crate) fn destroy_record(&self, record: &Arc<SessionRecord>) -> bool {
        let removed = {
            let mut index = self.lock_index();
            match index.record(record.id().as_str()) {
                Some(current) if Arc::ptr_eq(current, record) => index.remove(record.id().as_str()),
                _ => None,
            }
        };
        if removed.is_none() {
            return false;
        }
        self.finish_destroy(record.id().as_str(), removed)
    }

    fn finish_destroy(&self, id: &str, removed: Option<Arc<SessionRecord>>) -> bool {
        if let Some(record) = &removed {
            let mut state = record.lock();
            state.values.clear();
            state.flashes.clear();
        }

        let id = SessionId::from_raw(id);
        for db in self.databases() {
            db.release(&id);
        }

        if removed.is_some() {
            debug!(session = %id, "session destroyed");
        }
        removed.is_some()
    }

    /// Destroy every session, returning how many were held in memory.
    pub fn destroy_all(&self) -> usize {
        let records = self.lock_index().drain();
        let databases = self.databases();

        for record in &records {
            {
                let mut state = record.lock();
                state.values.clear();
                state.flashes.clear();
            }
            for db in &databases {
                db.release(record.id());
            }
        }

        debug!(count = records.len(), "all sessions destroyed");
        records.len()
    }

    /// Evict records idle for at least `stale_after`, oldest first.
    ///
    /// Memory only: databases keep their copy, so an evicted session can be
    /// hydrated again on its next request.
    pub fn sweep(&self, stale_after: Duration) -> usize {
        let now = Instant::now();
        let mut index = self.lock_index();
        let mut evicted = 0;

        while let Some(record) = index.tail_record() {
            let last_accessed = record.lock().last_accessed;
            if now.saturating_duration_since(last_accessed) < stale_after {
                break;
            }
            index.remove(record.id().as_str());
            evicted += 1;
        }

        evicted
    }

    /// Whether a non-expired record for `id` is in memory. An expired one is
    /// destroyed.
    pub fn is_live(&self, id: &str) -> bool {
        let expired = match self.lock_index().record(id) {
            None => return false,
            Some(record) => record.has_expired(),
        };
        if expired {
            self.destroy(id);
        }
        !expired
    }

    /// Whether a record for `id` is in memory, expired or not.
    pub fn contains(&self, id: &str) -> bool {
        self.lock_index().slot_of(id).is_some()
    }

    /// Whether any database still holds fields for `id`.
    pub fn has_backend_state(&self, id: &SessionId) -> bool {
        self.databases().iter().any(|db| db.len(id) > 0)
    }

    /// Replace the lifetime of `id`. Returns `false` if it is not in memory.
    pub fn set_lifetime(&self, id: &str, lifetime: LifeTime) -> bool {
        let record = self.lock_index().record(id).cloned();
        let Some(record) = record else {
            return false;
        };

        let was_unset = {
            let mut state = record.lock();
            let was_unset = state.lifetime.is_unset();
            state.lifetime = lifetime;
            was_unset
        };
        // A running expiration task picks up the new deadline by itself.
        if was_unset {
            self.schedule_expiration(&record);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids held in memory, most recently used first.
    pub fn ids(&self) -> Vec<SessionId> {
        self.lock_index().ids()
    }

    fn schedule_expiration(&self, record: &Arc<SessionRecord>) {
        if record.lifetime().is_unset() {
            return;
        }
        // Without a runtime, lazy expiration on access takes over.
        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(expire_when_due(self.downgrade(), Arc::downgrade(record)));
        }
    }
}
