//! Shared ordered-container operations used identically by `Seam` and
//! `Quill` (§4.5, §4.6: "same ordered-map, footprint... discipline"). Once
//! inlet values are uniformly `Handle` (§3+), the two node kinds differ
//! only in how `Search` terminates, so the container plumbing is factored
//! out here rather than duplicated.

use crate::error::{Error, Result};
use crate::handle::{Handle, Inlet};
use crate::node::schema::TreeKey;
use std::collections::BTreeMap;

pub type Container<K> = BTreeMap<K, Inlet<K>>;

/// The serialized size of one inlet, used to charge its footprint against
/// the owning node (§3: "Insert adds the inlet's computed footprint").
pub fn inlet_footprint<K: TreeKey>(inlet: &Inlet<K>) -> Result<usize> {
    Ok(bincode::serialized_size(inlet)? as usize)
}

/// Insert; rejects a duplicate key (§4.5 Insert step 1). Returns the
/// inlet's own footprint so the caller can add it to the node's total.
pub fn insert<K: TreeKey>(container: &mut Container<K>, mut inlet: Inlet<K>) -> Result<usize> {
    if container.contains_key(&inlet.key) {
        return Err(Error::DuplicateKey(format!("{:?}", inlet.key)));
    }
    let footprint = inlet_footprint(&inlet)?;
    inlet.footprint = footprint;
    container.insert(inlet.key.clone(), inlet);
    Ok(footprint)
}

/// Delete an exact key; errors if absent (§4.5 Delete). Returns the
/// removed inlet's footprint so the caller can subtract it.
pub fn delete<K: TreeKey>(container: &mut Container<K>, key: &K) -> Result<usize> {
    container
        .remove(key)
        .map(|inlet| inlet.footprint)
        .ok_or_else(|| Error::NotFound(format!("{key:?}")))
}

/// Exact match (§4.5 Locate).
pub fn locate<'a, K: TreeKey>(container: &'a Container<K>, key: &K) -> Result<&'a Inlet<K>> {
    container
        .get(key)
        .ok_or_else(|| Error::NotFound(format!("{key:?}")))
}

/// The B+-tree routing rule (§4.5 Lookup): the inlet whose key is the
/// smallest key `>= query_key`, or the last inlet if the query exceeds
/// every key present.
pub fn lookup<'a, K: TreeKey>(container: &'a Container<K>, key: &K) -> Result<&'a Inlet<K>> {
    if let Some((_, inlet)) = container.range(key.clone()..).next() {
        return Ok(inlet);
    }
    container
        .iter()
        .next_back()
        .map(|(_, inlet)| inlet)
        .ok_or_else(|| Error::InvariantViolation("lookup on an empty node".into()))
}

/// Rename a key in place (§4.5 Update). A no-op if `from == to`.
pub fn update<K: TreeKey>(container: &mut Container<K>, from: &K, to: &K) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if container.contains_key(to) {
        return Err(Error::DuplicateKey(format!("{to:?}")));
    }
    let mut inlet = container
        .remove(from)
        .ok_or_else(|| Error::NotFound(format!("{from:?}")))?;
    inlet.key = to.clone();
    container.insert(to.clone(), inlet);
    Ok(())
}

/// Rewrites an existing inlet's key and/or value in place (§9:
/// "content-hash rebinding... every ancestor's inlet value is rewritten
/// with the new child address"). A no-op on the key when `old_key ==
/// new_key`. Returns `(old_footprint, new_footprint)` so the caller can
/// adjust its own running total; the inlet's footprint can shift even
/// when only the value changes, since a key rename changes its own
/// encoded length.
pub fn relink<K: TreeKey>(
    container: &mut Container<K>,
    old_key: &K,
    new_key: &K,
    value: Handle,
) -> Result<(usize, usize)> {
    let mut inlet = container
        .remove(old_key)
        .ok_or_else(|| Error::NotFound(format!("{old_key:?}")))?;
    let old_footprint = inlet.footprint;

    if old_key != new_key && container.contains_key(new_key) {
        container.insert(old_key.clone(), inlet);
        return Err(Error::DuplicateKey(format!("{new_key:?}")));
    }

    inlet.key = new_key.clone();
    inlet.value = value;
    let new_footprint = inlet_footprint(&inlet)?;
    inlet.footprint = new_footprint;
    container.insert(new_key.clone(), inlet);
    Ok((old_footprint, new_footprint))
}

/// The maximum key present (§3: "the seam's mayor key equals the maximum
/// key present").
pub fn mayor<K: TreeKey>(container: &Container<K>) -> Result<K> {
    container
        .keys()
        .next_back()
        .cloned()
        .ok_or_else(|| Error::InvariantViolation("mayor of an empty node".into()))
}

/// The minimum key present — the other half of the "O(1) min/max" capability
/// §3 asks of the container (`mayor` gives the max).
pub fn minor<K: TreeKey>(container: &Container<K>) -> Result<K> {
    container
        .keys()
        .next()
        .cloned()
        .ok_or_else(|| Error::InvariantViolation("minor of an empty node".into()))
}

/// The sole remaining key, defined only when exactly one inlet remains
/// (§4.5 Maiden).
pub fn maiden<K: TreeKey>(container: &Container<K>) -> Result<K> {
    if container.len() != 1 {
        return Err(Error::InvariantViolation(
            "maiden is only defined for a single-inlet node".into(),
        ));
    }
    Ok(container.keys().next().cloned().expect("checked len == 1 above"))
}

/// Moves inlets out of `container` from the highest key down until its
/// running footprint (`current_size`) falls at or below `target_size`, or
/// only one inlet remains (never empty a node entirely via split — that
/// would defeat the purpose of splitting). Returns the moved inlets,
/// which the caller installs into the new right-hand node (§4.5 Split).
pub fn split_top<K: TreeKey>(
    container: &mut Container<K>,
    current_size: &mut usize,
    target_size: usize,
) -> Container<K> {
    let mut right = Container::new();
    while *current_size > target_size && container.len() > 1 {
        let Some(key) = container.keys().next_back().cloned() else {
            break;
        };
        if let Some(inlet) = container.remove(&key) {
            *current_size = current_size.saturating_sub(inlet.footprint);
            right.insert(key, inlet);
        }
    }
    right
}

/// Imports every inlet of `from` into `into`, returning the total
/// footprint absorbed (§4.5 Merge).
pub fn absorb<K: TreeKey>(into: &mut Container<K>, from: Container<K>) -> usize {
    let mut total = 0;
    for (key, inlet) in from {
        total += inlet.footprint;
        into.insert(key, inlet);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Address, Handle, Secret};

    fn h(n: u8) -> Handle {
        Handle::new(Address([n; 32]), Secret([n; 32]))
    }

    #[test]
    fn lookup_routing_rule() {
        let mut c: Container<u32> = Container::new();
        for k in [10u32, 20, 30] {
            insert(&mut c, Inlet::new(k, h(k as u8), 0)).unwrap();
        }
        assert_eq!(lookup(&c, &5).unwrap().key, 10);
        assert_eq!(lookup(&c, &20).unwrap().key, 20);
        assert_eq!(lookup(&c, &25).unwrap().key, 30);
        assert_eq!(lookup(&c, &999).unwrap().key, 30);
    }

    #[test]
    fn update_is_noop_when_equal() {
        let mut c: Container<u32> = Container::new();
        insert(&mut c, Inlet::new(10, h(1), 0)).unwrap();
        update(&mut c, &10, &10).unwrap();
        assert!(c.contains_key(&10));
    }

    #[test]
    fn insert_then_delete_restores_footprint() {
        let mut c: Container<u32> = Container::new();
        let added = insert(&mut c, Inlet::new(10, h(1), 0)).unwrap();
        let removed = delete(&mut c, &10).unwrap();
        assert_eq!(added, removed);
        assert!(c.is_empty());
    }

    #[test]
    fn relink_rebinds_value_and_renames_key() {
        let mut c: Container<u32> = Container::new();
        insert(&mut c, Inlet::new(10, h(1), 0)).unwrap();
        relink(&mut c, &10, &15, h(2)).unwrap();
        assert!(!c.contains_key(&10));
        assert_eq!(c.get(&15).unwrap().value, h(2));
    }

    #[test]
    fn relink_rejects_rename_onto_existing_key() {
        let mut c: Container<u32> = Container::new();
        insert(&mut c, Inlet::new(10, h(1), 0)).unwrap();
        insert(&mut c, Inlet::new(20, h(2), 0)).unwrap();
        assert!(relink(&mut c, &10, &20, h(1)).is_err());
        assert!(c.contains_key(&10));
    }

    #[test]
    fn duplicate_insert_is_an_error() {
        let mut c: Container<u32> = Container::new();
        insert(&mut c, Inlet::new(10, h(1), 0)).unwrap();
        assert!(insert(&mut c, Inlet::new(10, h(2), 0)).is_err());
    }

    #[test]
    fn split_moves_from_the_top() {
        let mut c: Container<u32> = Container::new();
        let mut size = 0usize;
        for k in 0u32..10 {
            let added = insert(&mut c, Inlet::new(k, h(k as u8), 0)).unwrap();
            size += added;
        }
        let target = size / 2;
        let right = split_top(&mut c, &mut size, target);
        assert!(c.keys().next_back().unwrap() < right.keys().next().unwrap());
        assert!(size <= target || c.len() == 1);
    }

    #[test]
    fn split_then_merge_restores_key_set() {
        let mut c: Container<u32> = Container::new();
        let mut size = 0usize;
        for k in 0u32..10 {
            size += insert(&mut c, Inlet::new(k, h(k as u8), 0)).unwrap();
        }
        let original_keys: Vec<_> = c.keys().cloned().collect();
        let right = split_top(&mut c, &mut size, size / 2);
        absorb(&mut c, right);
        let merged_keys: Vec<_> = c.keys().cloned().collect();
        assert_eq!(original_keys, merged_keys);
    }
}
