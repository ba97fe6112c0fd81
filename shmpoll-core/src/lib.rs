//! # shmpoll-core
//!
//! epoll emulation over two kinds of watched descriptors: ordinary kernel
//! descriptors and descriptors rerouted to a shared-memory connection with a
//! peer on the same host.
//!
//! Callers see one epoll API. Underneath, kernel descriptors are delegated to
//! the real facility while shared-memory descriptors are polled through their
//! connection's readiness predicates, and a wait that spans both runs the two
//! mechanisms concurrently and merges the results.
//!
//! ### Key Submodules:
//! - `alloc`: LIFO free list for recycling slot keys
//! - `events`: event mask bitflags and control operations
//! - `session`: connection and bridge contracts plus in-memory implementations
//! - `kernel`: the real epoll facility behind a trait
//! - `instance`: entries, per-instance entry store and the instance table
//! - `registry`: process-wide registry, control dispatch and the wait engine
//! - `compat`: C-convention entry points (`-1` + `errno`) over the global registry

pub mod alloc;
pub mod compat;
pub mod error;
pub mod events;
pub mod instance;
pub mod kernel;
pub mod registry;
pub mod session;

mod control;
mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::instance::{EntryCounts, EpollEntry};
    pub use crate::kernel::*;
    pub use crate::registry::*;
    pub use crate::session::*;
}

pub use error::PollError;
pub use registry::{global, install, EpollRegistry};
