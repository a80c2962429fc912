//! Quill: the leaf B+-tree node (C6, §4.6). Same ordered-map, footprint,
//! and split/merge discipline as Seam, but its inlets reference user data
//! blocks rather than further tree levels, and `Search` terminates here
//! instead of recursing.

use crate::error::Result;
use crate::handle::Inlet;
use crate::node::{ordered, schema::Schema, Header};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "S::Key: Serialize + serde::de::DeserializeOwned")]
pub struct Quill<S: Schema> {
    pub header: Header,
    pub container: ordered::Container<S::Key>,
}

impl<S: Schema> Quill<S> {
    pub fn new(empty_footprint: usize) -> Self {
        Self {
            header: Header::new(empty_footprint),
            container: ordered::Container::new(),
        }
    }

    pub fn insert(&mut self, inlet: Inlet<S::Key>) -> Result<()> {
        let added = ordered::insert(&mut self.container, inlet)?;
        self.header.footprint += added;
        self.header.mark_dirty();
        Ok(())
    }

    pub fn delete(&mut self, key: &S::Key) -> Result<()> {
        let removed = ordered::delete(&mut self.container, key)?;
        self.header.footprint -= removed;
        self.header.mark_dirty();
        Ok(())
    }

    pub fn locate(&self, key: &S::Key) -> Result<&Inlet<S::Key>> {
        ordered::locate(&self.container, key)
    }

    /// `Search`'s terminal case (§4.5): the inlet's value *is* the final
    /// answer returned to the caller, no further loading happens.
    pub fn lookup(&self, key: &S::Key) -> Result<&Inlet<S::Key>> {
        ordered::lookup(&self.container, key)
    }

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

    /// Split → right, identical discipline to `Seam::split` (§4.6).
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

    /// Merge, identical discipline to `Seam::merge` (§4.6).
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
