//! Control dispatch: `epoll_ctl` against the registry.
//!
//! Shared-memory descriptors only touch the entry store. Kernel descriptors
//! are registered with the kernel facility first and mirrored in the store
//! afterwards, so a kernel failure leaves the store untouched.

use std::os::unix::io::RawFd;

use tracing::debug;

use crate::error::PollError;
use crate::events::{event_data, new_event, ControlOp, EventFlags};
use crate::instance::EpollEntry;
use crate::registry::EpollRegistry;

fn parse_interest(
    op: ControlOp,
    event: Option<&libc::epoll_event>,
) -> Result<(EventFlags, u64), PollError> {
    let event = event.ok_or_else(|| PollError::invalid("missing event for add/modify"))?;
    let flags = EventFlags::from_mask(event.events)?;
    if op == ControlOp::Modify && flags.contains(EventFlags::EXCLUSIVE) {
        return Err(PollError::invalid("EPOLLEXCLUSIVE cannot be modified"));
    }
    Ok((flags, event_data(event)))
}

impl EpollRegistry {
    /// `epoll_ctl`. `event` is required for add and modify and ignored for delete.
    pub fn control(
        &self,
        epfd: RawFd,
        op: ControlOp,
        fd: RawFd,
        event: Option<&libc::epoll_event>,
    ) -> Result<(), PollError> {
        let cell = self.lookup(epfd)?;
        if fd == epfd {
            return Err(PollError::invalid("an epoll instance cannot watch itself"));
        }
        let mut store = cell.lock();
        match op {
            ControlOp::Add => {
                let (flags, data) = parse_interest(op, event)?;
                if store.find(fd).is_some() {
                    return Err(PollError::AlreadyExists { epfd, fd });
                }
                let entry = match self.bridge.session_for(fd) {
                    Some(connection) => EpollEntry::shared(fd, flags, data, &connection),
                    None => {
                        self.kernel
                            .control(epfd, op, fd, Some(&new_event(flags, data)))?;
                        EpollEntry::kernel(fd, flags, data)
                    }
                };
                let shared = entry.is_shared();
                store.add_entry(entry).map_err(|error| error.within(epfd))?;
                debug!(epfd, fd, shared, ?flags, "watching descriptor");
            }
            ControlOp::Modify => {
                let (flags, data) = parse_interest(op, event)?;
                let shared = store
                    .find(fd)
                    .ok_or(PollError::DescriptorNotFound { epfd, fd })?
                    .is_shared();
                if !shared {
                    self.kernel
                        .control(epfd, op, fd, Some(&new_event(flags, data)))?;
                }
                store
                    .modify_entry(fd, flags, data)
                    .map_err(|error| error.within(epfd))?;
                debug!(epfd, fd, shared, ?flags, "modified descriptor interest");
            }
            ControlOp::Delete => {
                let shared = store
                    .find(fd)
                    .ok_or(PollError::DescriptorNotFound { epfd, fd })?
                    .is_shared();
                if !shared {
                    self.kernel.control(epfd, op, fd, None)?;
                }
                store.remove_entry(fd).map_err(|error| error.within(epfd))?;
                debug!(epfd, fd, shared, "stopped watching descriptor");
            }
        }
        Ok(())
    }

    pub fn add(&self, epfd: RawFd, fd: RawFd, flags: EventFlags, data: u64) -> Result<(), PollError> {
        self.control(epfd, ControlOp::Add, fd, Some(&new_event(flags, data)))
    }

    pub fn modify(&self, epfd: RawFd, fd: RawFd, flags: EventFlags, data: u64) -> Result<(), PollError> {
        self.control(epfd, ControlOp::Modify, fd, Some(&new_event(flags, data)))
    }

    pub fn delete(&self, epfd: RawFd, fd: RawFd) -> Result<(), PollError> {
        self.control(epfd, ControlOp::Delete, fd, None)
    }
}
