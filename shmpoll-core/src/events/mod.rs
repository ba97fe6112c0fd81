//! ## shmpoll-core::events
//! **Event masks and control operations in the kernel's own encoding**
//!
//! Wait results use `libc::epoll_event` directly so buffers can be handed to
//! the kernel facility unchanged.

use bitflags::bitflags;

use crate::error::PollError;

bitflags! {
    /// Interest and readiness bits of an `epoll_event`, including trigger modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u32 {
        const IN = libc::EPOLLIN as u32;
        const PRI = libc::EPOLLPRI as u32;
        const OUT = libc::EPOLLOUT as u32;
        const ERR = libc::EPOLLERR as u32;
        const HUP = libc::EPOLLHUP as u32;
        const RDNORM = libc::EPOLLRDNORM as u32;
        const RDBAND = libc::EPOLLRDBAND as u32;
        const WRNORM = libc::EPOLLWRNORM as u32;
        const WRBAND = libc::EPOLLWRBAND as u32;
        const MSG = libc::EPOLLMSG as u32;
        const RDHUP = libc::EPOLLRDHUP as u32;
        const EXCLUSIVE = libc::EPOLLEXCLUSIVE as u32;
        const WAKEUP = libc::EPOLLWAKEUP as u32;
        const ONESHOT = libc::EPOLLONESHOT as u32;
        const ET = libc::EPOLLET as u32;
    }
}

impl EventFlags {
    /// Parse a raw mask, rejecting bits the kernel does not define.
    pub fn from_mask(mask: u32) -> Result<Self, PollError> {
        Self::from_bits(mask)
            .ok_or_else(|| PollError::invalid(format!("unknown event bits in mask {mask:#x}")))
    }
}

/// `epoll_ctl` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ControlOp {
    Add = libc::EPOLL_CTL_ADD,
    Modify = libc::EPOLL_CTL_MOD,
    Delete = libc::EPOLL_CTL_DEL,
}

impl ControlOp {
    pub fn from_raw(op: i32) -> Result<Self, PollError> {
        match op {
            libc::EPOLL_CTL_ADD => Ok(ControlOp::Add),
            libc::EPOLL_CTL_MOD => Ok(ControlOp::Modify),
            libc::EPOLL_CTL_DEL => Ok(ControlOp::Delete),
            other => Err(PollError::invalid(format!("unknown control operation {other}"))),
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Build an `epoll_event` from flags and user data.
#[inline]
pub fn new_event(flags: EventFlags, data: u64) -> libc::epoll_event {
    libc::epoll_event {
        events: flags.bits(),
        u64: data,
    }
}

/// An all-zero event, used to initialise output buffers.
#[inline]
pub fn empty_event() -> libc::epoll_event {
    new_event(EventFlags::empty(), 0)
}

#[inline]
pub fn event_flags(event: &libc::epoll_event) -> EventFlags {
    EventFlags::from_bits_truncate(event.events)
}

#[inline]
pub fn event_data(event: &libc::epoll_event) -> u64 {
    event.u64
}
