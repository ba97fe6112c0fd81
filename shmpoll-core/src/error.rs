use std::io;
use std::os::unix::io::RawFd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No epoll instance registered for descriptor {0}")]
    InstanceNotFound(RawFd),

    #[error("Descriptor {fd} is not watched by epoll instance {epfd}")]
    DescriptorNotFound { epfd: RawFd, fd: RawFd },

    #[error("Descriptor {fd} is already watched by epoll instance {epfd}")]
    AlreadyExists { epfd: RawFd, fd: RawFd },

    #[error("Instance table exhausted (capacity {capacity})")]
    ResourceExhausted { capacity: usize },

    #[error("Kernel epoll call failed: {0}")]
    Kernel(#[from] io::Error),
}

impl PollError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        PollError::InvalidArgument(reason.into())
    }

    /// The errno the kernel API reports for the same failure.
    pub fn errno(&self) -> i32 {
        match self {
            PollError::InvalidArgument(_) => libc::EINVAL,
            PollError::InstanceNotFound(_) => libc::EBADF,
            PollError::DescriptorNotFound { .. } => libc::ENOENT,
            PollError::AlreadyExists { .. } => libc::EEXIST,
            PollError::ResourceExhausted { .. } => libc::EMFILE,
            PollError::Kernel(error) => error.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}
