//! Bounded-memory tile cache.
//!
//! A single logical mapping `(owner, col, row) -> decoded tile bytes` with
//! an exact byte budget. Entries are reference counted through the handles
//! returned to callers: an evicted tile's storage is not freed until the
//! last outstanding handle drops, and a pinned tile (one with live handles)
//! is never evicted — it stays linked so its budget slot frees when the
//! caller releases it.
//!
//! One cache may be shared by several slides; owner tokens are allocated
//! from a process-wide counter so entries can never alias.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;

/// Default cache budget: 32 MiB.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 32 * 1024 * 1024;

static NEXT_OWNER_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh owner token, unique across the process.
pub(crate) fn next_owner_token() -> u64 {
    NEXT_OWNER_TOKEN.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Key and handle
// =============================================================================

/// Cache key scoping a tile to the area that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TileKey {
    owner: u64,
    col: i64,
    row: i64,
}

/// Reference-counted view of a cached tile.
///
/// While a handle is alive the tile bytes are pinned: eviction may drop the
/// cache's reference but the storage survives until the last handle drops.
#[derive(Debug, Clone)]
pub struct TileHandle {
    bytes: Arc<Vec<u8>>,
}

impl std::ops::Deref for TileHandle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

struct Entry {
    bytes: Arc<Vec<u8>>,
    size: usize,
}

struct Inner {
    map: LruCache<TileKey, Entry>,
    used: usize,
}

// =============================================================================
// TileCache
// =============================================================================

/// Fixed-byte-budget LRU cache of decoded ARGB tiles.
///
/// All operations take one short critical section; tile byte buffers live
/// outside the lock and are immutable once inserted.
pub struct TileCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl TileCache {
    /// Create a cache with the default 32 MiB budget.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache with the given byte budget.
    pub fn with_capacity(capacity: usize) -> Self {
        TileCache {
            inner: Mutex::new(Inner {
                map: LruCache::unbounded(),
                used: 0,
            }),
            capacity,
        }
    }

    /// Byte budget.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently accounted to cached tiles.
    pub fn bytes_used(&self) -> usize {
        self.inner.lock().unwrap().used
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a tile, refreshing its recency and pinning it.
    pub fn get(&self, owner: u64, col: i64, row: i64) -> Option<TileHandle> {
        let key = TileKey { owner, col, row };
        let mut inner = self.inner.lock().unwrap();
        inner.map.get(&key).map(|e| TileHandle {
            bytes: e.bytes.clone(),
        })
    }

    /// Insert (or replace) a tile and return a pinned handle to it.
    ///
    /// If the insert pushes the cache over budget, least-recently-used
    /// entries without live handles are unlinked and freed until the budget
    /// holds; pinned entries are skipped and stay linked.
    pub fn put(&self, owner: u64, col: i64, row: i64, bytes: Vec<u8>) -> TileHandle {
        let key = TileKey { owner, col, row };
        let size = bytes.len();
        let bytes = Arc::new(bytes);
        let handle = TileHandle {
            bytes: bytes.clone(),
        };

        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.map.push(key, Entry { bytes, size }) {
            // replaced an existing entry for the same key
            if old.0 == key {
                inner.used -= old.1.size;
            }
        }
        inner.used += size;
        self.evict_to_budget(&mut inner);
        handle
    }

    fn evict_to_budget(&self, inner: &mut Inner) {
        // Entries found pinned are set aside and relinked afterwards so the
        // scan below cannot revisit them.
        let mut pinned = Vec::new();
        while inner.used > self.capacity {
            match inner.map.pop_lru() {
                Some((key, entry)) => {
                    if Arc::strong_count(&entry.bytes) > 1 {
                        pinned.push((key, entry));
                    } else {
                        inner.used -= entry.size;
                    }
                }
                None => break,
            }
        }
        for (key, entry) in pinned {
            inner.map.push(key, entry);
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("capacity", &self.capacity)
            .field("bytes_used", &self.bytes_used())
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
