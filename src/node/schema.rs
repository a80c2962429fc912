use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A key fit to live inside a node's ordered container: totally ordered,
/// comparable, serializable (§3).
pub trait TreeKey: Ord + Clone + Debug + Serialize + DeserializeOwned {}
impl<T> TreeKey for T where T: Ord + Clone + Debug + Serialize + DeserializeOwned {}

/// The wire-format tag distinguishing what a tree indexes (§6: "component
/// distinguishes schema (Catalog, Group, …)"). `spec.md` leaves the set of
/// schemas abstract; this crate supplements it with the schemas a
/// filesystem metadata index would actually need (§3+).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum Component {
    Catalog = 1,
    Group = 2,
    Block = 3,
}

impl Component {
    pub fn wire(self) -> u16 {
        self as u16
    }

    pub fn from_wire(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(Component::Catalog),
            2 => Some(Component::Group),
            3 => Some(Component::Block),
            _ => None,
        }
    }
}

/// Fixes the key type a tree instance uses, and the wire tag that
/// identifies it (§3: "Polymorphic over value type V which fixes K =
/// V::K"). Every inlet value in this crate is a `Handle` (§3+
/// concretization note), so a schema only needs to name its key.
pub trait Schema: Sized {
    type Key: TreeKey;
    const COMPONENT: Component;
}

/// Directory entry names mapping to child catalog/file blocks.
pub struct CatalogSchema;
impl Schema for CatalogSchema {
    type Key = String;
    const COMPONENT: Component = Component::Catalog;
}

/// ACL principal/group ids mapping to group membership blocks.
pub struct GroupSchema;
impl Schema for GroupSchema {
    type Key = u64;
    const COMPONENT: Component = Component::Group;
}

/// File block offsets mapping to content blocks.
pub struct BlockSchema;
impl Schema for BlockSchema {
    type Key = u64;
    const COMPONENT: Component = Component::Block;
}
