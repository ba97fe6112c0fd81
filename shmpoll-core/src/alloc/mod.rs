//! ## shmpoll-core::alloc
//! **Key recycling for shared-memory slot identifiers**
//!
//! ### Key Submodules:
//! - `free_list`: LIFO pool of released keys

pub mod free_list;

pub use free_list::FreeList;
