//! Short-lived per-primary-key identity cache.
//!
//! Maps `(table, primary-key value)` to the in-flight entity instance so a
//! fetch can short-circuit re-fetching an object it is already in the middle
//! of constructing (the back-reference of a bidirectional relationship).
//! Entries are inserted only during row reconstruction, removed by a
//! per-entry scheduled eviction on a background thread, and cleared wholesale
//! for a table at the start of any write against it.
//!
//! The map is safe for uncoordinated concurrent read/insert/evict from any
//! number of worker threads.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rowmap_core::Value;
use tracing::warn;

/// Locks a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hashable projection of a primary-key [`Value`].
///
/// REAL keys have no stable identity and NULL is not a key; rows with such
/// primary-key values bypass the cache entirely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum CacheKey {
    Integer(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl CacheKey {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(CacheKey::Integer(*i)),
            Value::Text(s) => Some(CacheKey::Text(s.clone())),
            Value::Blob(b) => Some(CacheKey::Blob(b.clone())),
            Value::Real(_) | Value::Null => None,
        }
    }
}

type Instance = Arc<dyn Any + Send + Sync>;

struct Entry {
    instance: Instance,
    generation: u64,
}

/// A scheduled removal. Ordered by deadline so the heap surfaces the next
/// expiry first.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Expiry {
    at: Instant,
    table: String,
    key: CacheKey,
    generation: u64,
}

struct Shared {
    tables: Mutex<HashMap<String, HashMap<CacheKey, Entry>>>,
    state: Mutex<EvictorState>,
    wake: Condvar,
    next_generation: AtomicU64,
}

struct EvictorState {
    queue: BinaryHeap<Reverse<Expiry>>,
    shutdown: bool,
}

/// Process-lifetime identity cache for one database handle.
pub(crate) struct IdentityCache {
    shared: Arc<Shared>,
    ttl: Duration,
    evictor: Option<JoinHandle<()>>,
}

impl IdentityCache {
    /// Creates a cache whose entries live for `ttl` after insertion.
    pub(crate) fn new(ttl: Duration) -> Self {
        let shared = Arc::new(Shared {
            tables: Mutex::new(HashMap::new()),
            state: Mutex::new(EvictorState {
                queue: BinaryHeap::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            next_generation: AtomicU64::new(0),
        });
        let worker = Arc::clone(&shared);
        let evictor = match thread::Builder::new()
            .name("rowmap-identity-evictor".to_string())
            .spawn(move || run_evictor(&worker))
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "cannot spawn identity evictor; entries evict on clear only");
                None
            }
        };
        Self {
            shared,
            ttl,
            evictor,
        }
    }

    /// Looks up an instance. A hit downcasts to the caller's entity type;
    /// a type mismatch reads as a miss.
    pub(crate) fn get<E: Send + Sync + 'static>(
        &self,
        table: &str,
        key: &CacheKey,
    ) -> Option<Arc<E>> {
        let tables = lock(&self.shared.tables);
        let entry = tables.get(table)?.get(key)?;
        Arc::clone(&entry.instance).downcast::<E>().ok()
    }

    /// Inserts or overwrites an instance and schedules its removal at
    /// `now + ttl`. Overwrites bump the entry generation, so the superseded
    /// removal becomes a no-op.
    pub(crate) fn insert<E: Send + Sync + 'static>(
        &self,
        table: &str,
        key: CacheKey,
        instance: Arc<E>,
    ) {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut tables = lock(&self.shared.tables);
            tables.entry(table.to_string()).or_default().insert(
                key.clone(),
                Entry {
                    instance,
                    generation,
                },
            );
        }
        {
            let mut state = lock(&self.shared.state);
            state.queue.push(Reverse(Expiry {
                at: Instant::now() + self.ttl,
                table: table.to_string(),
                key,
                generation,
            }));
        }
        self.shared.wake.notify_one();
    }

    /// Drops every entry for a table.
    pub(crate) fn clear(&self, table: &str) {
        let mut tables = lock(&self.shared.tables);
        if let Some(map) = tables.get_mut(table) {
            map.clear();
        }
    }

    #[cfg(test)]
    fn len(&self, table: &str) -> usize {
        lock(&self.shared.tables)
            .get(table)
            .map_or(0, HashMap::len)
    }
}

impl Drop for IdentityCache {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.shared.state);
            state.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.evictor.take() {
            let _ = handle.join();
        }
    }
}

fn run_evictor(shared: &Shared) {
    let mut state = lock(&shared.state);
    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let mut due = Vec::new();
        while state.queue.peek().is_some_and(|e| e.0.at <= now) {
            if let Some(Reverse(expiry)) = state.queue.pop() {
                due.push(expiry);
            }
        }

        if !due.is_empty() {
            // Lock order is tables-then-state on the insert path; never hold
            // the state lock while taking the tables lock.
            drop(state);
            let mut tables = lock(&shared.tables);
            for expiry in due {
                if let Some(map) = tables.get_mut(&expiry.table) {
                    if map
                        .get(&expiry.key)
                        .is_some_and(|e| e.generation == expiry.generation)
                    {
                        map.remove(&expiry.key);
                    }
                }
            }
            drop(tables);
            state = lock(&shared.state);
            continue;
        }

        state = match state.queue.peek() {
            Some(next) => {
                let wait = next.0.at.saturating_duration_since(now);
                shared
                    .wake
                    .wait_timeout(state, wait)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
