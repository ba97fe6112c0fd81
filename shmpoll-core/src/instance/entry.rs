use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::events::EventFlags;
use crate::session::Connection;

bitflags! {
    /// Delivery state of an entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        /// Cleared after a one-shot delivery until the next modify.
        const ENABLED = 0x1;
        /// An edge-triggered read may be delivered.
        const READ_EDGE = 0x2;
        /// An edge-triggered write may be delivered.
        const WRITE_EDGE = 0x4;
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn edge(self) -> EntryFlags {
        match self {
            Direction::Read => EntryFlags::READ_EDGE,
            Direction::Write => EntryFlags::WRITE_EDGE,
        }
    }
}

/// One watched descriptor inside an epoll instance.
///
/// Kernel entries carry no connection; readiness for them comes from the
/// kernel facility and this record only mirrors the registration.
#[derive(Clone)]
pub struct EpollEntry {
    fd: RawFd,
    events: EventFlags,
    data: u64,
    connection: Option<Weak<dyn Connection>>,
    flags: EntryFlags,
}

impl EpollEntry {
    pub fn kernel(fd: RawFd, events: EventFlags, data: u64) -> Self {
        Self::with_connection(fd, events, data, None)
    }

    pub fn shared(fd: RawFd, events: EventFlags, data: u64, connection: &Arc<dyn Connection>) -> Self {
        Self::with_connection(fd, events, data, Some(Arc::downgrade(connection)))
    }

    fn with_connection(
        fd: RawFd,
        events: EventFlags,
        data: u64,
        connection: Option<Weak<dyn Connection>>,
    ) -> Self {
        Self {
            fd,
            events,
            data,
            connection,
            flags: EntryFlags::all(),
        }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn events(&self) -> EventFlags {
        self.events
    }

    #[inline]
    pub fn data(&self) -> u64 {
        self.data
    }

    #[inline]
    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.connection.is_some()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(EntryFlags::ENABLED)
    }

    #[inline]
    pub fn is_edge_triggered(&self) -> bool {
        self.events.contains(EventFlags::ET)
    }

    #[inline]
    pub fn is_oneshot(&self) -> bool {
        self.events.contains(EventFlags::ONESHOT)
    }

    /// Replace the interest and re-arm every edge.
    pub(crate) fn rearm(&mut self, events: EventFlags, data: u64) {
        self.events = events;
        self.data = data;
        self.flags = EntryFlags::all();
    }

    /// Readiness of a shared-memory entry, consuming edges and one-shot state.
    ///
    /// A peer that is gone, or a connection that no longer exists, reads as a
    /// hangup every time regardless of trigger mode.
    pub(crate) fn poll(&mut self) -> Option<EventFlags> {
        if !self.is_enabled() {
            return None;
        }
        let connection = self.connection.as_ref()?.upgrade();
        let ready = match connection {
            Some(connection) if connection.is_peer_alive() => {
                let mut ready = EventFlags::empty();
                if self.events.contains(EventFlags::IN)
                    && self.consume(Direction::Read, connection.is_readable())
                {
                    ready |= EventFlags::IN;
                }
                if self.events.contains(EventFlags::OUT)
                    && self.consume(Direction::Write, connection.is_writable())
                {
                    ready |= EventFlags::OUT;
                }
                ready
            }
            _ => self.hangup(),
        };
        if ready.is_empty() {
            return None;
        }
        if self.is_oneshot() {
            self.flags.remove(EntryFlags::ENABLED);
        }
        Some(ready)
    }

    /// Whether [`poll`](Self::poll) would report something. Never consumes
    /// an edge, but re-arms one whose condition has dropped, exactly as a
    /// consuming pass would.
    pub(crate) fn is_ready(&mut self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let Some(connection) = self.connection.as_ref().map(Weak::upgrade) else {
            return false;
        };
        match connection {
            Some(connection) if connection.is_peer_alive() => {
                let readable = self.events.contains(EventFlags::IN)
                    && self.peek(Direction::Read, connection.is_readable());
                let writable = self.events.contains(EventFlags::OUT)
                    && self.peek(Direction::Write, connection.is_writable());
                readable || writable
            }
            _ => true,
        }
    }

    fn consume(&mut self, direction: Direction, condition: bool) -> bool {
        if !self.is_edge_triggered() {
            return condition;
        }
        let edge = direction.edge();
        if !condition {
            // Condition dropped: the next rise is a new edge.
            self.flags.insert(edge);
            return false;
        }
        if self.flags.contains(edge) {
            self.flags.remove(edge);
            return true;
        }
        false
    }

    fn peek(&mut self, direction: Direction, condition: bool) -> bool {
        if !self.is_edge_triggered() {
            return condition;
        }
        let edge = direction.edge();
        if !condition {
            self.flags.insert(edge);
            return false;
        }
        self.flags.contains(edge)
    }

    fn hangup(&self) -> EventFlags {
        EventFlags::HUP | (self.events & (EventFlags::IN | EventFlags::RDHUP))
    }
}

impl fmt::Debug for EpollEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpollEntry")
            .field("fd", &self.fd)
            .field("events", &self.events)
            .field("data", &self.data)
            .field("shared", &self.is_shared())
            .field("flags", &self.flags)
            .finish()
    }
}
