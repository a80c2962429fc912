//! Address & block codec (C1, §4.1, §6). Serializes a node to its
//! canonical byte sequence, seals it under the handle's secret, and
//! content-addresses the result with SHA-256. §1 scopes the concrete
//! asymmetric primitives out; only the symmetric `Cipher` (src/crypto.rs)
//! is consumed here.

use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::handle::{Address, Secret};
use crate::node::schema::Schema;
use crate::node::Node;
use openssl::sha::Sha256;

const MAGIC: [u8; 4] = *b"PRTN";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 2 + 2 + 4;

/// Family distinguishes ContentHashBlock from other block classes (§6).
/// This crate only ever produces content-hash blocks — other families
/// (PKB/OWB/IB in the original system) are external collaborators, out
/// of scope per §1 — so, mirroring the single-variant `Cryptosystem`
/// design noted as an open question in §9, `Family` has one variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Family {
    ContentHash = 1,
}

impl Family {
    fn wire(self) -> u16 {
        self as u16
    }

    fn from_wire(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(Family::ContentHash),
            _ => None,
        }
    }
}

/// A fully-decoded block: the component tag plus the plaintext canonical
/// bytes, ready for `bincode` deserialization into a concrete `Node<S>`
/// (whose variant, Seam or Quill, is recovered by `bincode` itself from
/// the bytes — no separate tag needed on top of it).
pub struct DecodedBlock {
    pub component: u16,
    pub plaintext: Vec<u8>,
}

fn content_hash(network_id: &[u8], family: Family, component: u16, ciphertext: &[u8]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(network_id);
    hasher.update(&family.wire().to_le_bytes());
    hasher.update(&component.to_le_bytes());
    hasher.update(ciphertext);
    Address(hasher.finish())
}

/// `encode(node, secret) -> (bytes, address)` (§4.1). The canonical
/// serialization is the node's natural `bincode` encoding — `Seam`'s and
/// `Quill`'s containers are `BTreeMap`s, which iterate in ascending key
/// order, satisfying §6's "for each inlet in ascending key order".
pub fn encode<S: Schema, C: Cipher>(
    node: &Node<S>,
    secret: &Secret,
    network_id: &[u8],
    cipher: &C,
) -> Result<(Vec<u8>, Address)> {
    let canonical = bincode::serialize(node)?;
    let ciphertext = cipher.seal(&canonical, secret)?;

    let family = Family::ContentHash;
    let component = S::COMPONENT.wire();
    let address = content_hash(network_id, family, component, &ciphertext);

    let mut bytes = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.push(VERSION);
    bytes.extend_from_slice(&family.wire().to_le_bytes());
    bytes.extend_from_slice(&component.to_le_bytes());
    bytes.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&ciphertext);

    Ok((bytes, address))
}

/// Recomputes the content hash over `bytes` and compares it against
/// `address` (§4.1 Verify). Content-hash blocks are immutable under their
/// address; any change to any field produces a different address.
pub fn verify(bytes: &[u8], address: &Address, network_id: &[u8]) -> Result<()> {
    let header = parse_header(bytes)?;
    let ciphertext = &bytes[HEADER_LEN..];
    let recomputed = content_hash(network_id, header.family, header.component, ciphertext);
    if recomputed != *address {
        return Err(Error::CorruptBlock(
            "recorded address does not match this block's content".into(),
        ));
    }
    Ok(())
}

struct WireHeader {
    family: Family,
    component: u16,
    payload_len: usize,
}

fn parse_header(bytes: &[u8]) -> Result<WireHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::CorruptBlock("block shorter than its own header".into()));
    }
    if bytes[0..4] != MAGIC {
        return Err(Error::CorruptBlock("bad magic".into()));
    }
    if bytes[4] != VERSION {
        return Err(Error::CorruptBlock(format!("unsupported version {}", bytes[4])));
    }
    let family_tag = u16::from_le_bytes([bytes[5], bytes[6]]);
    let family = Family::from_wire(family_tag)
        .ok_or_else(|| Error::SchemaMismatch(format!("unknown family tag {family_tag}")))?;
    let component = u16::from_le_bytes([bytes[7], bytes[8]]);
    let payload_len = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;

    if bytes.len() != HEADER_LEN + payload_len {
        return Err(Error::CorruptBlock("truncated payload".into()));
    }

    Ok(WireHeader {
        family,
        component,
        payload_len,
    })
}

/// `decode(bytes, address, secret) -> node` (§4.1). Verifies the address
/// first (a corrupt or tampered block must never reach deserialization),
/// then opens the ciphertext and hands the plaintext back for the caller
/// to deserialize into the concrete `Node<S>` its schema expects.
pub fn decode<C: Cipher>(
    bytes: &[u8],
    address: &Address,
    secret: &Secret,
    network_id: &[u8],
    cipher: &C,
) -> Result<DecodedBlock> {
    verify(bytes, address, network_id)?;
    let header = parse_header(bytes)?;
    let ciphertext = &bytes[HEADER_LEN..HEADER_LEN + header.payload_len];
    let plaintext = cipher.open(ciphertext, secret)?;

    Ok(DecodedBlock {
        component: header.component,
        plaintext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aes256Ctr;
    use crate::node::schema::GroupSchema;
    use crate::node::seam::Seam;
    use rand::rngs::ThreadRng;

    #[test]
    fn address_is_stable_for_identical_encodings() {
        let cipher = Aes256Ctr;
        let secret = cipher.generate_secret(&mut ThreadRng::default());
        let node: Node<GroupSchema> = Node::Seam(Seam::new(8));
        let (bytes_a, addr_a) = encode(&node, &secret, b"net", &cipher).unwrap();
        let (bytes_b, addr_b) = encode(&node, &secret, b"net", &cipher).unwrap();
        assert_eq!(addr_a, addr_b);
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn tamper_is_detected() {
        let cipher = Aes256Ctr;
        let secret = cipher.generate_secret(&mut ThreadRng::default());
        let node: Node<GroupSchema> = Node::Seam(Seam::new(8));
        let (mut bytes, address) = encode(&node, &secret, b"net", &cipher).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(verify(&bytes, &address, b"net").is_err());
    }

    #[test]
    fn round_trip_identity() {
        let cipher = Aes256Ctr;
        let secret = cipher.generate_secret(&mut ThreadRng::default());
        let mut seam: Seam<GroupSchema> = Seam::new(8);
        seam.insert(crate::handle::Inlet::new(
            1,
            crate::handle::Handle::new(crate::handle::Address([9; 32]), secret),
            0,
        ))
        .unwrap();
        let node = Node::Seam(seam);
        let (bytes, address) = encode(&node, &secret, b"net", &cipher).unwrap();
        let decoded = decode(&bytes, &address, &secret, b"net", &cipher).unwrap();
        let restored: Node<GroupSchema> = bincode::deserialize(&decoded.plaintext).unwrap();
        match (node, restored) {
            (Node::Seam(a), Node::Seam(b)) => assert_eq!(a.mayor().unwrap(), b.mayor().unwrap()),
            _ => panic!("expected seams"),
        }
    }
}
