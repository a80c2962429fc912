//! Factory & footprint calibration (C8, §4.8). `Calibration::of::<S>()`
//! computes the footprint of an empty `Seam<S>`/`Quill<S>` once, seeding
//! every Insert/Delete's accounting for that schema. `Factory` maps the
//! wire header's `(family, component)` tag to the schema it must match
//! before a block's payload is handed to `bincode` for decoding.

use crate::error::{Error, Result};
use crate::node::schema::{Component, Schema};
use crate::node::{quill::Quill, seam::Seam};

/// The empty-node footprint for one schema, computed once per
/// `Tree::new`/`Tree::open` call (the generic analogue of "once per
/// process" when the node type is a monomorphization, not a singleton).
#[derive(Clone, Copy, Debug)]
pub struct Calibration {
    pub seam_empty_footprint: usize,
    pub quill_empty_footprint: usize,
}

impl Calibration {
    pub fn of<S: Schema>() -> Result<Self> {
        let seam: Seam<S> = Seam::new(0);
        let quill: Quill<S> = Quill::new(0);
        Ok(Self {
            seam_empty_footprint: bincode::serialized_size(&seam)? as usize,
            quill_empty_footprint: bincode::serialized_size(&quill)? as usize,
        })
    }
}

/// `(family, component, value-schema)` dispatch used by the codec during
/// `decode` (§4.8). Family is fixed to `ContentHash` for this crate (§6);
/// `Factory::expect_component` is the runtime-checked half of the
/// dispatch — verifying the wire tag names the schema the caller is about
/// to deserialize into — since the constructor itself is selected at
/// compile time by the caller's choice of `S` (see `DESIGN.md` for why a
/// fully dynamic registry isn't warranted here).
pub struct Factory;

impl Factory {
    pub fn expect_component<S: Schema>(wire_component: u16) -> Result<()> {
        let expected = S::COMPONENT;
        match Component::from_wire(wire_component) {
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(Error::SchemaMismatch(format!(
                "block tagged component {found:?}, expected {expected:?}"
            ))),
            None => Err(Error::SchemaMismatch(format!(
                "unknown component tag {wire_component}"
            ))),
        }
    }
}
