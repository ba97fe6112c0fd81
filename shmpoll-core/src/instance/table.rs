//! Fixed-capacity handle to entry store mapping.
//!
//! Handles are kernel epoll descriptors, so the slot index is the handle
//! itself and the table never searches.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use parking_lot::Mutex;

use super::store::EntryStore;

pub(crate) type InstanceCell = Arc<Mutex<EntryStore>>;

pub(crate) struct InstanceTable {
    slots: Vec<Option<InstanceCell>>,
    live: usize,
}

impl InstanceTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, live: 0 }
    }

    #[inline]
    fn index(&self, handle: RawFd) -> Option<usize> {
        usize::try_from(handle)
            .ok()
            .filter(|index| *index < self.slots.len())
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Whether `handle` can be stored at all.
    pub(crate) fn fits(&self, handle: RawFd) -> bool {
        self.index(handle).is_some()
    }

    /// Store a fresh instance under `handle`, returning whatever stale
    /// instance occupied the slot. Callers check [`fits`](Self::fits) first.
    pub(crate) fn insert(&mut self, handle: RawFd, store: EntryStore) -> Option<InstanceCell> {
        let index = self.index(handle)?;
        let previous = self.slots[index].replace(Arc::new(Mutex::new(store)));
        if previous.is_none() {
            self.live += 1;
        }
        previous
    }

    pub(crate) fn get(&self, handle: RawFd) -> Option<InstanceCell> {
        self.index(handle)
            .and_then(|index| self.slots[index].as_ref())
            .cloned()
    }

    pub(crate) fn remove(&mut self, handle: RawFd) -> Option<InstanceCell> {
        let index = self.index(handle)?;
        let removed = self.slots[index].take();
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }
}
