use super::Storage;
use crate::error::{Error, Result};
use crate::handle::Address;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A block store backed by one file per address under a root directory,
/// named by the address's hex digest — the same "one file per block under
/// a metadata directory" shape the teacher uses for `DirectoryStorage`
/// over its own `metadir`.
#[derive(Clone, Debug)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, address: &Address) -> PathBuf {
        self.root.join(address.to_string())
    }
}

impl Storage for DirectoryStorage {
    fn put(&mut self, address: &Address, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(address);
        // put is idempotent by construction (same address implies same
        // bytes); an existing file for this address is left untouched
        // rather than rewritten.
        if path.exists() {
            return Ok(());
        }
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, address: &Address) -> Result<Vec<u8>> {
        fs::read(self.path_for(address)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(address.to_string())
            } else {
                Error::StoreIO(e.to_string())
            }
        })
    }

    fn exists(&self, address: &Address) -> Result<bool> {
        Ok(self.path_for(address).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trip() {
        let dir = std::env::temp_dir().join(format!("proton-dirstore-{}", std::process::id()));
        let mut store = DirectoryStorage::new(&dir).unwrap();
        let address = Address([7; 32]);
        store.put(&address, b"hello block").unwrap();
        assert!(store.exists(&address).unwrap());
        assert_eq!(store.get(&address).unwrap(), b"hello block");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_block_is_not_found() {
        let dir = std::env::temp_dir().join(format!("proton-dirstore-missing-{}", std::process::id()));
        let store = DirectoryStorage::new(&dir).unwrap();
        let err = store.get(&Address([1; 32])).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let _ = fs::remove_dir_all(&dir);
    }
}
