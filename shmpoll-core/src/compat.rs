//! ## shmpoll-core::compat
//! **C-convention entry points over the global registry**
//!
//! Every function returns `-1` and sets `errno` on failure, so callers
//! written against the kernel API can switch over unchanged.

use std::os::unix::io::RawFd;
use std::slice;

use tracing::trace;

use crate::error::PollError;
use crate::events::ControlOp;
use crate::registry::global;

fn set_errno(code: i32) {
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe { *libc::__errno_location() = code };
}

fn status(result: Result<(), PollError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(error) => fail(error),
    }
}

fn fail(error: PollError) -> i32 {
    trace!(%error, errno = error.errno(), "compat call failed");
    set_errno(error.errno());
    -1
}

fn count(result: Result<usize, PollError>) -> i32 {
    match result {
        Ok(ready) => ready as i32,
        Err(error) => fail(error),
    }
}

pub fn epoll_create(size: i32) -> RawFd {
    global().create(size).unwrap_or_else(fail)
}

pub fn epoll_create1(flags: i32) -> RawFd {
    global().create1(flags).unwrap_or_else(fail)
}

/// # Safety
/// `event` must be null or point to a valid `epoll_event`.
pub unsafe fn epoll_ctl(epfd: RawFd, op: i32, fd: RawFd, event: *mut libc::epoll_event) -> i32 {
    let op = match ControlOp::from_raw(op) {
        Ok(op) => op,
        Err(error) => return fail(error),
    };
    // SAFETY: guaranteed by the caller.
    let event = unsafe { event.as_ref() };
    status(global().control(epfd, op, fd, event))
}

/// # Safety
/// `events` must point to `max_events` writable `epoll_event`s.
pub unsafe fn epoll_wait(
    epfd: RawFd,
    events: *mut libc::epoll_event,
    max_events: i32,
    timeout_ms: i32,
) -> i32 {
    // SAFETY: forwarded caller contract; a null mask is allowed.
    unsafe { epoll_pwait(epfd, events, max_events, timeout_ms, std::ptr::null()) }
}

/// # Safety
/// `events` must point to `max_events` writable `epoll_event`s and
/// `sigmask` must be null or point to a valid signal set.
pub unsafe fn epoll_pwait(
    epfd: RawFd,
    events: *mut libc::epoll_event,
    max_events: i32,
    timeout_ms: i32,
    sigmask: *const libc::sigset_t,
) -> i32 {
    if events.is_null() || max_events <= 0 {
        return fail(PollError::invalid("event buffer must be non-null with positive capacity"));
    }
    // SAFETY: guaranteed by the caller.
    let (buffer, sigmask) = unsafe {
        (
            slice::from_raw_parts_mut(events, max_events as usize),
            sigmask.as_ref(),
        )
    };
    count(global().pwait(epfd, buffer, timeout_ms, sigmask))
}

/// Close an instance created through this layer.
pub fn close_instance(epfd: RawFd) -> i32 {
    status(global().close(epfd))
}

pub fn has_instance(epfd: RawFd) -> bool {
    global().contains(epfd)
}

/// Number of entries registered on `epfd`.
pub fn instance_size(epfd: RawFd) -> i32 {
    count(global().instance_len(epfd))
}
