use super::Storage;
use crate::error::{Error, Result};
use crate::handle::Address;
use std::collections::HashMap;

/// An in-memory block store, used by the test suite (§1+) so tree tests
/// don't touch the filesystem.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    blocks: HashMap<Address, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn put(&mut self, address: &Address, bytes: &[u8]) -> Result<()> {
        self.blocks.entry(*address).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    fn get(&self, address: &Address) -> Result<Vec<u8>> {
        self.blocks
            .get(address)
            .cloned()
            .ok_or_else(|| Error::NotFound(address.to_string()))
    }

    fn exists(&self, address: &Address) -> Result<bool> {
        Ok(self.blocks.contains_key(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent_on_address() {
        let mut store = MemoryStorage::new();
        let address = Address([3; 32]);
        store.put(&address, b"first").unwrap();
        store.put(&address, b"first").unwrap();
        assert_eq!(store.get(&address).unwrap(), b"first");
    }
}
