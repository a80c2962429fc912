//! Proton: a persistent, balanced, content-addressed B+-tree over an
//! abstract encrypted block store. An internal node (`Seam`) is an ordered
//! mapping of keys to child handles; a leaf node (`Quill`) is an ordered
//! mapping of keys to user-data handles. Both split and merge by
//! serialized footprint rather than entry count, and every mutation of a
//! node changes its content address, so the driver (`tree::Tree`) rebinds
//! parent inlets on the way back up the recursion (`Ambit::scope`).

pub mod ambit;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod factory;
pub mod handle;
pub mod node;
pub mod store;
pub mod tree;

pub use config::Config;
pub use error::{Error, Result};
pub use handle::{Address, Handle, Secret};
pub use tree::Tree;
