//! Block store adapter (C2, §4.2): a pluggable capability set for putting
//! and getting encrypted blocks by content address. Grounded directly in
//! the teacher's own dependency shape (`sdbtree::storage::Storage`,
//! `other_examples/.../lemosyne-sdbtree__src-lib.rs.rs`): a small trait
//! plus a directory-backed implementation.

pub mod directory;
pub mod memory;

use crate::error::Result;
use crate::handle::Address;

/// `put`/`get`/`exists` on encrypted blocks keyed by content address.
/// `put` must be idempotent — the same address always carries the same
/// bytes, by construction of C1 — and `get` is a partial function that
/// fails with `Error::NotFound`. No ordering is guaranteed across
/// concurrent operations on distinct addresses (§4.2, §5).
pub trait Storage {
    fn put(&mut self, address: &Address, bytes: &[u8]) -> Result<()>;
    fn get(&self, address: &Address) -> Result<Vec<u8>>;
    fn exists(&self, address: &Address) -> Result<bool>;
}

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;
