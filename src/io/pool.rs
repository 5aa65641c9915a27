//! Pool of reusable decoder cursors.
//!
//! Rendering threads each need a private cursor onto the slide file (current
//! directory state and decode scratch space are not shareable). The pool
//! keeps idle cursors on a free list so a render burst does not reconstruct
//! one per tile. `take` never blocks: it either reuses an idle cursor or
//! constructs a new one. Count is unbounded; the workload bounds it in
//! practice, and all cursors are destroyed when the slide closes.

use std::sync::Mutex;

use crate::error::Result;

type Constructor<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Free list of idle cursors plus a constructor for cache misses.
pub struct HandlePool<T> {
    free: Mutex<Vec<T>>,
    construct: Constructor<T>,
}

impl<T> HandlePool<T> {
    /// Create an empty pool with the given cursor constructor.
    pub fn new(construct: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        HandlePool {
            free: Mutex::new(Vec::new()),
            construct: Box::new(construct),
        }
    }

    /// Take an idle cursor, or construct a fresh one if none is free.
    pub fn take(&self) -> Result<T> {
        if let Some(handle) = self.free.lock().unwrap().pop() {
            return Ok(handle);
        }
        (self.construct)()
    }

    /// Return a cursor to the free list.
    pub fn give_back(&self, handle: T) {
        self.free.lock().unwrap().push(handle);
    }

    /// Number of idle cursors currently pooled.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

impl<T> std::fmt::Debug for HandlePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool").field("idle", &self.idle()).finish()
    }
}
