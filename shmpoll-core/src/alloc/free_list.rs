//! ## shmpoll-core::alloc::free_list
//! **LIFO pool of recyclable keys**
//!
//! There is no recoverable empty-pool path: callers check [`FreeList::is_empty`]
//! before popping, and popping an empty list is a fatal bug. Growth failures
//! abort through the global allocator.

use tracing::error;

#[derive(Debug, Clone, Default)]
pub struct FreeList<K> {
    keys: Vec<K>,
}

impl<K: Copy> FreeList<K> {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
        }
    }

    /// Store a key for reuse.
    #[inline]
    pub fn push(&mut self, key: K) {
        self.keys.push(key);
    }

    /// Remove and return the most recently pushed key.
    ///
    /// # Panics
    ///
    /// Panics if the list is empty.
    #[inline]
    pub fn pop(&mut self) -> K {
        match self.keys.pop() {
            Some(key) => key,
            None => {
                error!("free list popped while empty");
                panic!("free list popped while empty");
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }
}
