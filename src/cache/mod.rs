//! In-memory response cache.
//!
//! [`CacheStore`] maps a [`CacheKey`] to the wire bytes of a response. It is
//! guarded by a reader/writer lock: lookups share it, while writes and
//! flushes take it exclusively. No I/O is ever performed with the lock held.
//!
//! Entries never expire on their own and are never evicted one at a time.
//! The only way to age the cache is [`CacheStore::clear`], which discards
//! every entry at once.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

pub mod key;

pub use key::CacheKey;

/// Capacity hint used by [`CacheStore::clear`] and [`CacheStore::default`].
pub const DEFAULT_CAPACITY: usize = 1000;

/// Errors reported by [`CacheStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// No entry exists for the key. An uninitialized store reports this too.
    #[error("cache is empty")]
    EmptyCache,

    /// A write was attempted before the store was initialized.
    #[error("cache is not initialized")]
    Uninitialized,
}

/// A thread-safe map from [`CacheKey`] to serialized response bytes.
///
/// A store starts either uninitialized ([`CacheStore::new`]) or initialized
/// with a capacity hint ([`CacheStore::with_capacity`]). Lookups treat an
/// uninitialized store as empty, but writes to one fail with
/// [`CacheError::Uninitialized`].
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::{CacheError, CacheStore};
///
/// let store = CacheStore::with_capacity(16);
/// store.set("http://h/x", "HTTP/1.1 200 OK\r\n\r\n").unwrap();
/// assert!(store.get("http://h/x").is_ok());
///
/// store.clear();
/// assert_eq!(store.get("http://h/x"), Err(CacheError::EmptyCache));
/// ```
#[derive(Debug)]
pub struct CacheStore {
    entries: RwLock<Option<HashMap<CacheKey, Bytes>>>,
}

impl CacheStore {
    /// Creates an uninitialized store. Call [`init`](Self::init) or
    /// [`clear`](Self::clear) before writing to it.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(None),
        }
    }

    /// Creates an empty, initialized store sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Some(HashMap::with_capacity(capacity))),
        }
    }

    /// Replaces the backing map with a fresh empty one sized for `capacity`.
    pub fn init(&self, capacity: usize) {
        let previous = self
            .entries
            .write()
            .replace(HashMap::with_capacity(capacity));
        // The old map is freed after the lock is released.
        drop(previous);
    }

    /// Looks up the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptyCache`] on a miss, including when the store
    /// was never initialized.
    pub fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        self.entries
            .read()
            .as_ref()
            .and_then(|map| map.get(key))
            .cloned()
            .ok_or(CacheError::EmptyCache)
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Uninitialized`] if the store has no backing map.
    pub fn set(&self, key: impl Into<CacheKey>, value: impl Into<Bytes>) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        let map = entries.as_mut().ok_or(CacheError::Uninitialized)?;
        map.insert(key.into(), value.into());
        Ok(())
    }

    /// Discards every entry and reinitializes with [`DEFAULT_CAPACITY`].
    pub fn clear(&self) {
        self.clear_with_capacity(DEFAULT_CAPACITY);
    }

    /// Discards every entry and reinitializes sized for `capacity`.
    pub fn clear_with_capacity(&self, capacity: usize) {
        let previous = self
            .entries
            .write()
            .replace(HashMap::with_capacity(capacity));
        let flushed = previous.as_ref().map_or(0, HashMap::len);
        drop(previous);
        debug!(flushed, capacity, "cache cleared");
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().as_ref().map_or(0, HashMap::len)
    }

    /// Returns `true` if nothing is cached, including before initialization.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the store has a backing map.
    pub fn is_initialized(&self) -> bool {
        self.entries.read().is_some()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
