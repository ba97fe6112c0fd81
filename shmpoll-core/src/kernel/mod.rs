//! ## shmpoll-core::kernel
//! **The real epoll facility**
//!
//! Everything the registry needs from the kernel goes through
//! [`KernelPoller`], so kernel descriptors keep their exact kernel semantics
//! and tests can substitute a scripted facility.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use crate::events::ControlOp;

pub trait KernelPoller: Send + Sync {
    /// `epoll_create1`.
    fn create(&self, flags: i32) -> io::Result<RawFd>;

    /// `epoll_ctl`. `event` is ignored for [`ControlOp::Delete`].
    fn control(
        &self,
        epfd: RawFd,
        op: ControlOp,
        fd: RawFd,
        event: Option<&libc::epoll_event>,
    ) -> io::Result<()>;

    /// `epoll_wait`, or `epoll_pwait` when a signal mask is given.
    fn wait(
        &self,
        epfd: RawFd,
        events: &mut [libc::epoll_event],
        timeout_ms: i32,
        sigmask: Option<&libc::sigset_t>,
    ) -> io::Result<usize>;

    /// Release the kernel epoll descriptor.
    fn close(&self, epfd: RawFd) -> io::Result<()>;
}

/// [`KernelPoller`] backed by the libc epoll calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEpoll;

impl KernelPoller for SystemEpoll {
    fn create(&self, flags: i32) -> io::Result<RawFd> {
        // SAFETY: plain syscall, flags are validated by the kernel.
        let epfd = unsafe { libc::epoll_create1(flags) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(epfd)
    }

    fn control(
        &self,
        epfd: RawFd,
        op: ControlOp,
        fd: RawFd,
        event: Option<&libc::epoll_event>,
    ) -> io::Result<()> {
        let mut copy = event.copied();
        let event_ptr = match copy.as_mut() {
            Some(event) if op != ControlOp::Delete => event as *mut libc::epoll_event,
            _ => ptr::null_mut(),
        };
        // SAFETY: event_ptr is null or points to a live local copy.
        if unsafe { libc::epoll_ctl(epfd, op.as_raw(), fd, event_ptr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(
        &self,
        epfd: RawFd,
        events: &mut [libc::epoll_event],
        timeout_ms: i32,
        sigmask: Option<&libc::sigset_t>,
    ) -> io::Result<usize> {
        let max_events = events.len().min(i32::MAX as usize) as i32;
        // SAFETY: the kernel writes at most `max_events` entries into `events`.
        let ready = unsafe {
            match sigmask {
                Some(mask) => libc::epoll_pwait(
                    epfd,
                    events.as_mut_ptr(),
                    max_events,
                    timeout_ms,
                    mask as *const libc::sigset_t,
                ),
                None => libc::epoll_wait(epfd, events.as_mut_ptr(), max_events, timeout_ms),
            }
        };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ready as usize)
    }

    fn close(&self, epfd: RawFd) -> io::Result<()> {
        // SAFETY: closing a descriptor this facility created.
        if unsafe { libc::close(epfd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
