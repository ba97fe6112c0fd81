//! ## shmpoll-core::session
//! **Contracts with the shared-memory layer**
//!
//! The wait engine only ever asks a connection three questions. The bridge
//! answers whether a descriptor has been rerouted to shared memory. Both are
//! external to this crate; [`SessionTable`] and [`MemorySession`] are
//! in-process implementations used for embedding and tests.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::alloc::FreeList;

/// Readiness view of one shared-memory connection.
pub trait Connection: Send + Sync {
    fn is_readable(&self) -> bool;
    fn is_writable(&self) -> bool;
    fn is_peer_alive(&self) -> bool;
}

/// Decides whether a descriptor is backed by shared memory.
///
/// Must be idempotent and free of side effects.
pub trait Bridge: Send + Sync {
    fn session_for(&self, fd: RawFd) -> Option<Arc<dyn Connection>>;
}

/// Bridge that treats every descriptor as a kernel descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelOnly;

impl Bridge for KernelOnly {
    fn session_for(&self, _fd: RawFd) -> Option<Arc<dyn Connection>> {
        None
    }
}

/// Identifier of a shared-memory connection slot.
pub type SlotKey = u32;

struct Attached {
    slot: SlotKey,
    connection: Weak<dyn Connection>,
}

#[derive(Default)]
struct Slots {
    free: FreeList<SlotKey>,
    next: SlotKey,
    by_fd: HashMap<RawFd, Attached>,
}

impl Slots {
    fn allocate(&mut self) -> SlotKey {
        if self.free.is_empty() {
            let slot = self.next;
            self.next += 1;
            slot
        } else {
            self.free.pop()
        }
    }
}

/// Descriptor to connection map. Holds only weak references: connection
/// lifetime belongs to whoever attached it.
#[derive(Default)]
pub struct SessionTable {
    slots: RwLock<Slots>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `fd` to `connection`, returning the slot it occupies. Re-attaching
    /// a descriptor keeps its slot.
    pub fn attach(&self, fd: RawFd, connection: &Arc<dyn Connection>) -> SlotKey {
        let mut slots = self.slots.write();
        if let Some(existing) = slots.by_fd.get_mut(&fd) {
            existing.connection = Arc::downgrade(connection);
            return existing.slot;
        }
        let slot = slots.allocate();
        slots.by_fd.insert(
            fd,
            Attached {
                slot,
                connection: Arc::downgrade(connection),
            },
        );
        debug!(fd, slot, "attached shared-memory session");
        slot
    }

    /// Stop routing `fd` and release its slot for reuse.
    pub fn detach(&self, fd: RawFd) -> Option<SlotKey> {
        let mut slots = self.slots.write();
        let attached = slots.by_fd.remove(&fd)?;
        slots.free.push(attached.slot);
        debug!(fd, slot = attached.slot, "detached shared-memory session");
        Some(attached.slot)
    }

    pub fn len(&self) -> usize {
        self.slots.read().by_fd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Bridge for SessionTable {
    fn session_for(&self, fd: RawFd) -> Option<Arc<dyn Connection>> {
        self.slots
            .read()
            .by_fd
            .get(&fd)
            .and_then(|attached| attached.connection.upgrade())
    }
}

/// Connection whose readiness is driven by atomic flags.
#[derive(Debug)]
pub struct MemorySession {
    readable: AtomicBool,
    writable: AtomicBool,
    alive: AtomicBool,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// A live session with nothing to read and room to write.
    pub fn new() -> Self {
        Self {
            readable: AtomicBool::new(false),
            writable: AtomicBool::new(true),
            alive: AtomicBool::new(true),
        }
    }

    pub fn set_readable(&self, readable: bool) {
        self.readable.store(readable, Ordering::Release);
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::Release);
    }

    /// Mark the peer as terminated.
    pub fn hang_up(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Connection for MemorySession {
    fn is_readable(&self) -> bool {
        self.readable.load(Ordering::Acquire)
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    fn is_peer_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
