use serde::{Deserialize, Serialize};
use std::fmt;

/// Symmetric key material for one block. 32 bytes fits AES-256.
pub const SECRET_SZ: usize = 32;

/// Content address: the SHA-256 digest of `network_id ‖ family ‖ component
/// ‖ ciphertext` (§4.1, §6). Changes whenever the node's encrypted bytes
/// change, so every mutation of a node invalidates its current address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex(&self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

/// Symmetric secret used to decrypt a block's payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Secret(pub [u8; SECRET_SZ]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(..)")
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// An opaque reference to a stored block: a content address plus the
/// secret needed to decrypt it. Two handles are equal iff their addresses
/// and secrets are equal (§3). The "while loaded, a weak reference to the
/// in-memory node" half of the handle's contract lives in `Ambit`'s cache,
/// keyed by `Address` — a `Weak` pointer cannot round-trip through
/// `bincode` as part of a parent's serialized inlet, so it cannot live on
/// `Handle` itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub address: Address,
    pub secret: Secret,
}

impl Handle {
    pub fn new(address: Address, secret: Secret) -> Self {
        Self { address, secret }
    }
}

/// An estimate of a node or inlet's serialized size in bytes. Splitting by
/// footprint rather than entry count bounds block size exactly and is not
/// to be replaced by a count heuristic (§9).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Footprint {
    pub size: usize,
}

impl Footprint {
    pub fn zero() -> Self {
        Self { size: 0 }
    }
}

impl std::ops::AddAssign<usize> for Footprint {
    fn add_assign(&mut self, rhs: usize) {
        self.size += rhs;
    }
}

impl std::ops::SubAssign<usize> for Footprint {
    fn sub_assign(&mut self, rhs: usize) {
        self.size = self.size.saturating_sub(rhs);
    }
}

/// An entry inside a node: `{key, value, footprint}`. Owned exclusively by
/// the node that contains it (§3) — in Rust terms, it lives by value inside
/// the node's container and is dropped along with it.
///
/// `value` is always a `Handle`: a Seam inlet's value addresses a child
/// Nodule, a Quill inlet's value addresses a user data block (§4.6). Both
/// are "the content address of something else this tree doesn't own the
/// bytes of", so one shape suffices for both node kinds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Inlet<K> {
    pub key: K,
    pub value: Handle,
    pub footprint: usize,
}

impl<K> Inlet<K> {
    pub fn new(key: K, value: Handle, footprint: usize) -> Self {
        Self {
            key,
            value,
            footprint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_equality_is_address_and_secret() {
        let a = Handle::new(Address([1; 32]), Secret([2; SECRET_SZ]));
        let b = Handle::new(Address([1; 32]), Secret([2; SECRET_SZ]));
        let c = Handle::new(Address([9; 32]), Secret([2; SECRET_SZ]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn footprint_accounting() {
        let mut fp = Footprint::zero();
        fp += 10;
        fp += 5;
        fp -= 3;
        assert_eq!(fp.size, 12);
    }
}
