//! ## shmpoll-core::instance
//! **Per-instance bookkeeping**
//!
//! ### Key Submodules:
//! - `entry`: one watched descriptor and its trigger state
//! - `store`: inline-first entry container with real/shared-memory counts
//! - `table`: fixed-capacity handle to store mapping

mod entry;
mod store;
mod table;

pub use entry::{EntryFlags, EpollEntry};
pub use store::{EntryCounts, EntryError, EntryStore};
pub(crate) use table::{InstanceCell, InstanceTable};
