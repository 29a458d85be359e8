//! Query-scoped scratch storage.
//!
//! Every running pipeline owns one [`Manager`]. Stages that need auxiliary
//! state (distinct keys, aggregation term indexes) open a private store from
//! it; the stores are dropped together with the pipeline.
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Ephemeral ordered key-value store.
pub trait TempKv: Send + Sync + fmt::Debug {
    /// Reads a key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Writes a key, replacing any previous value.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;
    /// True when the key is present.
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
    /// Inserts the key if absent. Returns true when this call inserted it.
    fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool>;
    /// Adds `delta` to the big-endian counter stored at `key`, starting from 0.
    fn add_counter(&self, key: &[u8], delta: u64) -> Result<u64>;
    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// [`TempKv`] backed by a mutex-guarded `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TempKv for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_vec(), value.to_vec());
        Ok(true)
    }

    fn add_counter(&self, key: &[u8], delta: u64) -> Result<u64> {
        let mut entries = self.entries.lock();
        let slot = entries.entry(key.to_vec()).or_insert_with(|| vec![0; 8]);
        let mut raw = [0u8; 8];
        if slot.len() == 8 {
            raw.copy_from_slice(slot);
        }
        let next = u64::from_be_bytes(raw).saturating_add(delta);
        *slot = next.to_be_bytes().to_vec();
        Ok(next)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.lock();
        Ok(entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

type KvFactory = dyn Fn() -> Arc<dyn TempKv> + Send + Sync;

/// Hands out private scratch stores for one query execution.
#[derive(Clone)]
pub struct Manager {
    factory: Arc<KvFactory>,
    opened: Arc<Mutex<Vec<Arc<dyn TempKv>>>>,
}

impl Manager {
    /// Manager opening [`MemoryKv`] stores.
    pub fn new() -> Self {
        Self::with_factory(|| Arc::new(MemoryKv::new()))
    }

    /// Manager opening stores from a custom factory, e.g. a disk-backed one.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<dyn TempKv> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Opens a fresh store private to the caller.
    pub fn open_kv(&self) -> Arc<dyn TempKv> {
        let kv = (self.factory)();
        self.opened.lock().push(Arc::clone(&kv));
        kv
    }

    /// Number of stores opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Releases every store opened through this manager.
    pub fn cleanup(&self) {
        self.opened.lock().clear();
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("open_stores", &self.open_count())
            .finish()
    }
}
