//! Seam: the internal B+-tree node (C5, §4.5) — an ordered mapping
//! `K -> child Handle`. The centerpiece of the tree: split/merge are
//! driven by serialized-size footprint, not entry count (§9).

use crate::error::Result;
use crate::handle::{Handle, Inlet};
use crate::node::{ordered, schema::Schema, Header};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "S::Key: Serialize + serde::de::DeserializeOwned")]
pub struct Seam<S: Schema> {
    pub header: Header,
    pub container: ordered::Container<S::Key>,
}

impl<S: Schema> Seam<S> {
    pub fn new(empty_footprint: usize) -> Self {
        Self {
            header: Header::new(empty_footprint),
            container: ordered::Container::new(),
        }
    }

    /// Insert(inlet): rejects a duplicate key, adds the inlet's footprint
    /// to the seam's own, marks Dirty. Ownership of the inlet transfers to
    /// the seam (§4.5 Insert).
    pub fn insert(&mut self, inlet: Inlet<S::Key>) -> Result<()> {
        let added = ordered::insert(&mut self.container, inlet)?;
        self.header.footprint += added;
        self.header.mark_dirty();
        Ok(())
    }

    /// Delete(key): locates the exact match, subtracts its footprint,
    /// marks Dirty (§4.5 Delete).
    pub fn delete(&mut self, key: &S::Key) -> Result<()> {
        let removed = ordered::delete(&mut self.container, key)?;
        self.header.footprint -= removed;
        self.header.mark_dirty();
        Ok(())
    }

    pub fn locate(&self, key: &S::Key) -> Result<&Inlet<S::Key>> {
        ordered::locate(&self.container, key)
    }

    /// The B+-tree routing rule: the responsible-child inlet for `key`
    /// (§4.5 Lookup).
    pub fn lookup(&self, key: &S::Key) -> Result<&Inlet<S::Key>> {
        ordered::lookup(&self.container, key)
    }

    /// Update(from, to): renames a key in place, rejecting a collision
    /// with an existing key, marking Dirty (§4.5 Update).
    pub fn update(&mut self, from: &S::Key, to: &S::Key) -> Result<()> {
        if from == to {
            return Ok(());
        }
        ordered::update(&mut self.container, from, to)?;
        self.header.mark_dirty();
        Ok(())
    }

    pub fn mayor(&self) -> Result<S::Key> {
        ordered::mayor(&self.container)
    }

    pub fn minor(&self) -> Result<S::Key> {
        ordered::minor(&self.container)
    }

    pub fn maiden(&self) -> Result<S::Key> {
        ordered::maiden(&self.container)
    }

    pub fn is_over_extent(&self, extent: usize) -> bool {
        self.header.footprint.size > extent
    }

    /// Rebinds the routing inlet for a child whose address (and possibly
    /// mayor key) changed after the driver unloaded it (§9: "content-hash
    /// rebinding"). A no-op on the key when `old_key == new_key`.
    pub fn relink(&mut self, old_key: &S::Key, new_key: &S::Key, new_handle: Handle) -> Result<()> {
        let (old_fp, new_fp) = ordered::relink(&mut self.container, old_key, new_key, new_handle)?;
        self.header.footprint -= old_fp;
        self.header.footprint += new_fp;
        self.header.mark_dirty();
        Ok(())
    }

    /// Split → right (§4.5): moves inlets from the top until this seam's
    /// footprint falls at or below `extent * contention`, installing the
    /// moved inlets into a freshly allocated right seam. The caller (the
    /// tree driver) must re-`Link` the right seam's children to its new
    /// handle and insert a routing inlet for it into the parent.
    pub fn split(&mut self, extent: usize, contention: f64, empty_footprint: usize) -> Self {
        let target_size = (extent as f64 * contention) as usize;
        let mut size = self.header.footprint.size;
        let moved = ordered::split_top(&mut self.container, &mut size, target_size);
        self.header.footprint.size = size;
        self.header.mark_dirty();

        let moved_footprint: usize = moved.values().map(|inlet| inlet.footprint).sum();
        let mut right = Self::new(empty_footprint);
        right.container = moved;
        right.header.footprint.size = empty_footprint + moved_footprint;
        right.header.mark_dirty();
        right
    }

    /// Merge(other): chooses direction by mayor-key comparison and
    /// absorbs every inlet of the smaller-mayor side into the other,
    /// leaving the absorbed side empty. Does not remove the emptied
    /// node's entry from the parent seam — that is the driver's
    /// responsibility (§9 open question, kept deliberately split).
    pub fn merge(&mut self, other: &mut Self) -> Result<()> {
        let self_mayor = self.mayor()?;
        let other_mayor = other.mayor()?;
        if other_mayor < self_mayor {
            let absorbed = ordered::absorb(&mut self.container, std::mem::take(&mut other.container));
            self.header.footprint += absorbed;
            other.header.footprint.size = 0;
        } else {
            let absorbed = ordered::absorb(&mut other.container, std::mem::take(&mut self.container));
            other.header.footprint += absorbed;
            self.header.footprint.size = 0;
        }
        self.header.mark_dirty();
        other.header.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{Address, Handle, Secret};
    use crate::node::schema::GroupSchema;

    fn h(n: u8) -> Handle {
        Handle::new(Address([n; 32]), Secret([n; 32]))
    }

    #[test]
    fn split_at_overflow_keeps_both_halves_within_target() {
        let mut left: Seam<GroupSchema> = Seam::new(8);
        for k in 0u64..40 {
            left.insert(Inlet::new(k, h(k as u8), 0)).unwrap();
        }
        let right = left.split(256, 0.5, 8);
        assert!(left.mayor().unwrap() < *right.container.keys().next().unwrap());
        assert!(left.header.footprint.size <= 128);
        assert!(right.header.footprint.size <= 256);
    }

    #[test]
    fn propagate_noop_when_keys_equal() {
        let mut seam: Seam<GroupSchema> = Seam::new(8);
        seam.insert(Inlet::new(1, h(1), 0)).unwrap();
        let before = seam.header.footprint;
        seam.update(&1, &1).unwrap();
        assert_eq!(before.size, seam.header.footprint.size);
    }

    #[test]
    fn relink_rebinds_child_after_mayor_change() {
        let mut seam: Seam<GroupSchema> = Seam::new(8);
        seam.insert(Inlet::new(10, h(1), 0)).unwrap();
        seam.relink(&10, &15, h(2)).unwrap();
        assert_eq!(seam.locate(&15).unwrap().value, h(2));
        assert!(seam.locate(&10).is_err());
    }
}
