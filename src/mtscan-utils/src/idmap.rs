//! Thread-safe bidirectional string/id interning.
//!
//! [`IdTable`] is shared between all workers and guarded by a single
//! mutex. Going through it for every node is too expensive, so each
//! worker wraps it in a [`LocalIdCache`] which absorbs the overwhelming
//! majority of lookups without touching the shared lock.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

/// One interned entry. Immutable once created.
#[derive(Debug)]
pub struct IdEntry<E> {
    pub id: u64,
    pub key: String,
    pub extra: E,
}

#[derive(Debug)]
struct Inner<E> {
    // Ids are dense and assigned in insertion order, starting at 0.
    by_id: Vec<Arc<IdEntry<E>>>,
    by_key: FxHashMap<String, u64>,
    // Ids inserted since the last `take_dirty()`.
    dirty: Vec<u64>,
}

/// Shared string/id mapping with a dirty set for incremental persistence.
pub struct IdTable<E> {
    inner: Mutex<Inner<E>>,
    extra_fn: Box<dyn Fn(&str) -> E + Send + Sync>,
}

impl<E: std::fmt::Debug> std::fmt::Debug for IdTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTable").field("inner", &self.inner).finish()
    }
}

impl<E> IdTable<E> {
    /// Creates an empty table.
    ///
    /// `extra_fn` is invoked exactly once per distinct key, when its
    /// entry is first created.
    pub fn new(extra_fn: impl Fn(&str) -> E + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_id: Vec::new(),
                by_key: FxHashMap::default(),
                dirty: Vec::new(),
            }),
            extra_fn: Box::new(extra_fn),
        }
    }

    /// Returns the id for `key`, interning it first if necessary.
    pub fn add(&self, key: &str) -> u64 {
        let mut inner = self.inner.lock().expect("lock is poisoned");
        if let Some(&id) = inner.by_key.get(key) {
            return id;
        }

        let id = inner.by_id.len() as u64;
        let entry = Arc::new(IdEntry {
            id,
            key: key.to_owned(),
            extra: (self.extra_fn)(key),
        });
        inner.by_id.push(entry);
        inner.by_key.insert(key.to_owned(), id);
        inner.dirty.push(id);
        id
    }

    /// Looks up an entry by id.
    ///
    /// # Panics
    ///
    /// Panics when `id` was never assigned; that is a caller bug, not
    /// an input error.
    pub fn entry(&self, id: u64) -> Arc<IdEntry<E>> {
        let inner = self.inner.lock().expect("lock is poisoned");
        inner.by_id[id as usize].clone()
    }

    /// Looks up an entry by key, without interning.
    pub fn lookup(&self, key: &str) -> Option<Arc<IdEntry<E>>> {
        let inner = self.inner.lock().expect("lock is poisoned");
        inner
            .by_key
            .get(key)
            .map(|&id| inner.by_id[id as usize].clone())
    }

    /// Atomically drains the set of entries created since the last call.
    pub fn take_dirty(&self) -> Vec<Arc<IdEntry<E>>> {
        let mut inner = self.inner.lock().expect("lock is poisoned");
        let dirty = std::mem::take(&mut inner.dirty);
        dirty
            .into_iter()
            .map(|id| inner.by_id[id as usize].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock is poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-worker read-through cache over a shared [`IdTable`].
pub struct LocalIdCache<'a, E> {
    shared: &'a IdTable<E>,
    by_key: FxHashMap<String, u64>,
    by_id: FxHashMap<u64, Arc<IdEntry<E>>>,
}

impl<'a, E> LocalIdCache<'a, E> {
    pub fn new(shared: &'a IdTable<E>) -> Self {
        Self {
            shared,
            by_key: FxHashMap::default(),
            by_id: FxHashMap::default(),
        }
    }

    /// Returns the id for `key`, consulting the local map first.
    pub fn add(&mut self, key: &str) -> u64 {
        if let Some(&id) = self.by_key.get(key) {
            return id;
        }

        let id = self.shared.add(key);
        self.by_key.insert(key.to_owned(), id);
        self.by_id.entry(id).or_insert_with(|| self.shared.entry(id));
        id
    }

    /// Returns the entry for `id`, consulting the local map first.
    pub fn entry(&mut self, id: u64) -> &Arc<IdEntry<E>> {
        self.by_id
            .entry(id)
            .or_insert_with(|| self.shared.entry(id))
    }
}
