//! Entry container for one epoll instance.
//!
//! Most instances watch a single descriptor, so the first entry lives inline
//! and the overflow vector is only allocated once a second entry arrives.

use std::os::unix::io::RawFd;

use thiserror::Error;

use super::entry::EpollEntry;
use crate::error::PollError;
use crate::events::{new_event, EventFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("descriptor {0} is already watched")]
    AlreadyExists(RawFd),
    #[error("descriptor {0} is not watched")]
    NotFound(RawFd),
}

impl EntryError {
    pub(crate) fn within(self, epfd: RawFd) -> PollError {
        match self {
            EntryError::AlreadyExists(fd) => PollError::AlreadyExists { epfd, fd },
            EntryError::NotFound(fd) => PollError::DescriptorNotFound { epfd, fd },
        }
    }
}

/// Snapshot of an instance's entry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryCounts {
    pub real: usize,
    pub shared: usize,
    pub overflow_len: usize,
    pub overflow_capacity: usize,
}

impl EntryCounts {
    pub fn total(&self) -> usize {
        self.real + self.shared
    }
}

#[derive(Debug, Default)]
pub struct EntryStore {
    first: Option<EpollEntry>,
    overflow: Vec<EpollEntry>,
    overflow_reserve: usize,
    shared_count: usize,
    real_count: usize,
    shared_turn: bool,
}

impl EntryStore {
    pub fn new(overflow_reserve: usize) -> Self {
        Self {
            overflow_reserve,
            ..Self::default()
        }
    }

    pub fn add_entry(&mut self, entry: EpollEntry) -> Result<(), EntryError> {
        if self.find(entry.fd()).is_some() {
            return Err(EntryError::AlreadyExists(entry.fd()));
        }
        if entry.is_shared() {
            self.shared_count += 1;
        } else {
            self.real_count += 1;
        }
        if self.first.is_none() {
            self.first = Some(entry);
        } else {
            if self.overflow.capacity() == 0 {
                self.overflow.reserve_exact(self.overflow_reserve.max(1));
            }
            self.overflow.push(entry);
        }
        Ok(())
    }

    pub fn modify_entry(&mut self, fd: RawFd, events: EventFlags, data: u64) -> Result<(), EntryError> {
        let entry = self.find_mut(fd).ok_or(EntryError::NotFound(fd))?;
        entry.rearm(events, data);
        Ok(())
    }

    pub fn remove_entry(&mut self, fd: RawFd) -> Result<EpollEntry, EntryError> {
        let removed = if self.first.as_ref().is_some_and(|first| first.fd() == fd) {
            let promoted = (!self.overflow.is_empty()).then(|| self.overflow.swap_remove(0));
            std::mem::replace(&mut self.first, promoted)
        } else {
            self.overflow
                .iter()
                .position(|entry| entry.fd() == fd)
                .map(|index| self.overflow.swap_remove(index))
        };
        let removed = removed.ok_or(EntryError::NotFound(fd))?;
        if removed.is_shared() {
            self.shared_count -= 1;
        } else {
            self.real_count -= 1;
        }
        Ok(removed)
    }

    pub fn find(&self, fd: RawFd) -> Option<&EpollEntry> {
        self.iter().find(|entry| entry.fd() == fd)
    }

    fn find_mut(&mut self, fd: RawFd) -> Option<&mut EpollEntry> {
        self.iter_mut().find(|entry| entry.fd() == fd)
    }

    /// Entries in scan order: the inline entry, then overflow in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &EpollEntry> {
        self.first.iter().chain(self.overflow.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut EpollEntry> {
        self.first.iter_mut().chain(self.overflow.iter_mut())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared_count + self.real_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn shared_count(&self) -> usize {
        self.shared_count
    }

    #[inline]
    pub fn real_count(&self) -> usize {
        self.real_count
    }

    pub fn counts(&self) -> EntryCounts {
        EntryCounts {
            real: self.real_count,
            shared: self.shared_count,
            overflow_len: self.overflow.len(),
            overflow_capacity: self.overflow.capacity(),
        }
    }

    /// One shared-memory pass: write ready entries into `out` in scan order,
    /// stopping once it is full. Entries past the stopping point keep their
    /// edge and one-shot state.
    pub(crate) fn collect_ready(&mut self, out: &mut [libc::epoll_event]) -> usize {
        let mut found = 0;
        for entry in self.iter_mut().filter(|entry| entry.is_shared()) {
            if found == out.len() {
                break;
            }
            if let Some(ready) = entry.poll() {
                out[found] = new_event(ready, entry.data());
                found += 1;
            }
        }
        found
    }

    /// Number of shared-memory entries a pass would report. Visits every
    /// entry so dropped conditions re-arm their edges; consumes nothing.
    pub(crate) fn ready_shared(&mut self) -> usize {
        self.iter_mut()
            .filter(|entry| entry.is_shared())
            .map(|entry| usize::from(entry.is_ready()))
            .sum()
    }

    pub(crate) fn has_ready(&mut self) -> bool {
        self.ready_shared() > 0
    }

    /// Alternates on every call: whether the shared-memory side goes first
    /// when a mixed wait cannot hold both sides.
    pub(crate) fn take_shared_turn(&mut self) -> bool {
        self.shared_turn = !self.shared_turn;
        self.shared_turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{empty_event, event_data};
    use crate::session::{Connection, MemorySession};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn real(fd: RawFd) -> EpollEntry {
        EpollEntry::kernel(fd, EventFlags::IN, fd as u64)
    }

    fn shared(fd: RawFd, connection: &Arc<dyn Connection>) -> EpollEntry {
        EpollEntry::shared(fd, EventFlags::IN, fd as u64, connection)
    }

    #[test]
    fn first_entry_is_inline() {
        let mut store = EntryStore::new(8);
        store.add_entry(real(3)).unwrap();
        assert_eq!(store.counts().overflow_capacity, 0);

        store.add_entry(real(4)).unwrap();
        let counts = store.counts();
        assert_eq!(counts.overflow_len, 1);
        assert_eq!(counts.overflow_capacity, 8);
    }

    #[test]
    fn duplicate_add_leaves_store_unchanged() {
        let mut store = EntryStore::new(8);
        store.add_entry(real(3)).unwrap();
        store.add_entry(real(4)).unwrap();
        let before = store.counts();

        assert_eq!(store.add_entry(real(4)), Err(EntryError::AlreadyExists(4)));
        assert_eq!(store.counts(), before);
    }

    #[test]
    fn removing_inline_promotes_first_overflow() {
        let mut store = EntryStore::new(8);
        for fd in [3, 4, 5] {
            store.add_entry(real(fd)).unwrap();
        }
        store.remove_entry(3).unwrap();

        let order: Vec<RawFd> = store.iter().map(EpollEntry::fd).collect();
        assert_eq!(order[0], 4);
        assert_eq!(store.len(), 2);
        assert_eq!(store.counts().overflow_len, 1);
    }

    #[test]
    fn delete_then_add_reuses_inline_slot() {
        let mut store = EntryStore::new(8);
        store.add_entry(real(3)).unwrap();
        store.remove_entry(3).unwrap();
        store.add_entry(real(5)).unwrap();

        let counts = store.counts();
        assert_eq!(counts.overflow_len, 0);
        assert_eq!(counts.overflow_capacity, 0);
        assert_eq!(store.find(5).map(EpollEntry::fd), Some(5));
    }

    #[test]
    fn missing_descriptor_is_not_found() {
        let mut store = EntryStore::new(8);
        assert_eq!(store.remove_entry(3).unwrap_err(), EntryError::NotFound(3));
        assert_eq!(
            store.modify_entry(3, EventFlags::OUT, 0),
            Err(EntryError::NotFound(3))
        );
    }

    #[test]
    fn collect_ready_stops_at_capacity_without_consuming_the_rest() {
        let session = Arc::new(MemorySession::new());
        session.set_readable(true);
        let connection: Arc<dyn Connection> = session.clone();

        let mut store = EntryStore::new(8);
        store.add_entry(real(2)).unwrap();
        for fd in [10, 11, 12] {
            store
                .add_entry(EpollEntry::shared(
                    fd,
                    EventFlags::IN | EventFlags::ET,
                    fd as u64,
                    &connection,
                ))
                .unwrap();
        }

        let mut out = [empty_event(); 2];
        assert_eq!(store.collect_ready(&mut out), 2);
        assert_eq!(event_data(&out[0]), 10);
        assert_eq!(event_data(&out[1]), 11);

        // fd 12 was never examined, so its edge is still armed.
        assert_eq!(store.ready_shared(), 1);
        assert_eq!(store.collect_ready(&mut out), 1);
        assert_eq!(event_data(&out[0]), 12);
        assert!(!store.has_ready());
    }

    #[test]
    fn shared_turn_alternates() {
        let mut store = EntryStore::new(8);
        assert!(store.take_shared_turn());
        assert!(!store.take_shared_turn());
        assert!(store.take_shared_turn());
    }

    #[test]
    fn counts_split_by_kind() {
        let connection: Arc<dyn Connection> = Arc::new(MemorySession::new());
        let mut store = EntryStore::new(8);
        store.add_entry(real(3)).unwrap();
        store.add_entry(shared(20, &connection)).unwrap();
        store.add_entry(shared(21, &connection)).unwrap();

        assert_eq!(store.real_count(), 1);
        assert_eq!(store.shared_count(), 2);
        store.remove_entry(20).unwrap();
        assert_eq!(store.shared_count(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(RawFd, bool),
        Modify(RawFd),
        Remove(RawFd),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..12i32, any::<bool>()).prop_map(|(fd, shared)| Op::Add(fd, shared)),
            (0..12i32).prop_map(Op::Modify),
            (0..12i32).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn counts_match_watched_descriptors(ops in prop::collection::vec(op(), 0..64)) {
            let connection: Arc<dyn Connection> = Arc::new(MemorySession::new());
            let mut store = EntryStore::new(4);
            let mut watched = std::collections::HashMap::new();

            for op in ops {
                match op {
                    Op::Add(fd, is_shared) => {
                        let entry = if is_shared { shared(fd, &connection) } else { real(fd) };
                        let result = store.add_entry(entry);
                        prop_assert_eq!(result.is_ok(), !watched.contains_key(&fd));
                        watched.entry(fd).or_insert(is_shared);
                    }
                    Op::Modify(fd) => {
                        let result = store.modify_entry(fd, EventFlags::OUT, 0);
                        prop_assert_eq!(result.is_ok(), watched.contains_key(&fd));
                    }
                    Op::Remove(fd) => {
                        let result = store.remove_entry(fd);
                        prop_assert_eq!(result.is_ok(), watched.remove(&fd).is_some());
                    }
                }
                let expected_shared = watched.values().filter(|s| **s).count();
                prop_assert_eq!(store.len(), watched.len());
                prop_assert_eq!(store.iter().count(), watched.len());
                prop_assert_eq!(store.shared_count(), expected_shared);
                prop_assert_eq!(store.real_count(), watched.len() - expected_shared);
            }
        }
    }
}
