//! Fixtures shared by the unit tests.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use shmpoll_config::ShmPollConfig;

use crate::events::ControlOp;
use crate::kernel::{KernelPoller, SystemEpoll};
use crate::registry::EpollRegistry;
use crate::session::{KernelOnly, SessionTable};

/// Non-blocking pipe whose read end serves as a kernel descriptor.
pub(crate) struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    pub(crate) fn new() -> Self {
        let mut fds = [0; 2];
        // SAFETY: fds has room for the two descriptors pipe2 writes.
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(rc, 0, "pipe2 failed: {}", io::Error::last_os_error());
        // SAFETY: both descriptors were just created and are owned here.
        unsafe {
            Self {
                read: OwnedFd::from_raw_fd(fds[0]),
                write: OwnedFd::from_raw_fd(fds[1]),
            }
        }
    }

    pub(crate) fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub(crate) fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    pub(crate) fn write(&self, bytes: &[u8]) {
        Self::write_to(self.write_fd(), bytes);
    }

    /// Write through a raw descriptor, for writers on another thread.
    pub(crate) fn write_to(fd: RawFd, bytes: &[u8]) {
        // SAFETY: bytes is a valid buffer of the given length.
        let written = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        assert_eq!(written, bytes.len() as isize);
    }

    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 256];
        // SAFETY: buf is a valid writable buffer of the given length.
        while unsafe { libc::read(self.read_fd(), buf.as_mut_ptr().cast(), buf.len()) } > 0 {}
    }
}

/// Registry over the real kernel facility with no shared-memory sessions.
pub(crate) fn registry() -> EpollRegistry {
    EpollRegistry::new(Arc::new(SystemEpoll), Arc::new(KernelOnly), &ShmPollConfig::default())
}

/// Registry over the real kernel facility that resolves shared-memory
/// descriptors through the returned session table.
pub(crate) fn shared_registry() -> (EpollRegistry, Arc<SessionTable>) {
    let sessions = Arc::new(SessionTable::new());
    let registry = EpollRegistry::new(Arc::new(SystemEpoll), sessions.clone(), &ShmPollConfig::default());
    (registry, sessions)
}

/// Registry over `kernel` with a session table.
pub(crate) fn scripted_registry(kernel: Arc<ScriptedKernel>) -> (EpollRegistry, Arc<SessionTable>) {
    let sessions = Arc::new(SessionTable::new());
    let registry = EpollRegistry::new(kernel, sessions.clone(), &ShmPollConfig::default());
    (registry, sessions)
}

/// Kernel stand-in that hands out predictable descriptors and never has
/// anything ready.
#[derive(Debug)]
pub(crate) struct ScriptedKernel {
    next: AtomicI32,
    step: i32,
    wait_errno: Option<i32>,
    closed: Mutex<Vec<RawFd>>,
}

impl ScriptedKernel {
    /// Descriptors `first`, `first + 1`, ...
    pub(crate) fn starting_at(first: RawFd) -> Self {
        Self::with_step(first, 1)
    }

    /// The same descriptor on every create.
    pub(crate) fn repeating(fd: RawFd) -> Self {
        Self::with_step(fd, 0)
    }

    fn with_step(first: RawFd, step: i32) -> Self {
        Self {
            next: AtomicI32::new(first),
            step,
            wait_errno: None,
            closed: Mutex::new(Vec::new()),
        }
    }

    /// Every wait fails with `errno`.
    pub(crate) fn failing_wait(mut self, errno: i32) -> Self {
        self.wait_errno = Some(errno);
        self
    }

    pub(crate) fn closed(&self) -> Vec<RawFd> {
        self.closed.lock().clone()
    }
}

impl KernelPoller for ScriptedKernel {
    fn create(&self, _flags: i32) -> io::Result<RawFd> {
        Ok(self.next.fetch_add(self.step, Ordering::Relaxed))
    }

    fn control(
        &self,
        _epfd: RawFd,
        _op: ControlOp,
        _fd: RawFd,
        _event: Option<&libc::epoll_event>,
    ) -> io::Result<()> {
        Ok(())
    }

    fn wait(
        &self,
        _epfd: RawFd,
        _events: &mut [libc::epoll_event],
        timeout_ms: i32,
        _sigmask: Option<&libc::sigset_t>,
    ) -> io::Result<usize> {
        if let Some(errno) = self.wait_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        // Bounded so a scripted wait can never hang a test.
        let nap = if timeout_ms < 0 { 5 } else { timeout_ms.min(50) };
        thread::sleep(Duration::from_millis(nap as u64));
        Ok(0)
    }

    fn close(&self, epfd: RawFd) -> io::Result<()> {
        self.closed.lock().push(epfd);
        Ok(())
    }
}
