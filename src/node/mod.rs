pub mod ordered;
pub mod quill;
pub mod schema;
pub mod seam;

use crate::error::{Error, Result};
use crate::handle::{Footprint, Handle};
use quill::Quill;
use schema::Schema;
use seam::Seam;
use serde::{Deserialize, Serialize};

/// Which concrete node kind a `Node<S>` wraps — the wire-format tag a
/// decoded block's payload leads with, used by the factory (C8) to
/// dispatch construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Seam = 1,
    Quill = 2,
}

/// A node's lifecycle state (§3, §4.4). Set to `Dirty` on any structural
/// change, cleared to `Consistent` after a successful write-back. Part of
/// the canonical wire header (§6), so it is serialized along with the
/// node even though it is transient bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Clean,
    Dirty,
    Consistent,
}

/// The common fields every Nodule carries (§3, §4.4), factored out as a
/// struct embedded in `Seam` and `Quill` rather than expressed through
/// inheritance (§9: "avoid open inheritance").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Header {
    pub parent: Option<Handle>,
    pub state: NodeState,
    pub footprint: Footprint,
}

impl Header {
    pub fn new(empty_footprint: usize) -> Self {
        Self {
            parent: None,
            state: NodeState::Dirty,
            footprint: Footprint {
                size: empty_footprint,
            },
        }
    }

    pub fn mark_dirty(&mut self) {
        self.state = NodeState::Dirty;
    }

    pub fn mark_consistent(&mut self) {
        self.state = NodeState::Consistent;
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state, NodeState::Dirty)
    }
}

/// The abstract node contract (C4), realized as a two-variant enum rather
/// than a trait object: dispatch is by tag, matching §9's guidance to
/// avoid open inheritance between Seam and Quill.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Node<S: Schema> {
    Seam(Seam<S>),
    Quill(Quill<S>),
}

impl<S: Schema> Node<S> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Seam(_) => NodeKind::Seam,
            Node::Quill(_) => NodeKind::Quill,
        }
    }

    pub fn header(&self) -> &Header {
        match self {
            Node::Seam(s) => &s.header,
            Node::Quill(q) => &q.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut Header {
        match self {
            Node::Seam(s) => &mut s.header,
            Node::Quill(q) => &mut q.header,
        }
    }

    pub fn footprint(&self) -> Footprint {
        self.header().footprint
    }

    pub fn parent(&self) -> Option<&Handle> {
        self.header().parent.as_ref()
    }

    pub fn set_parent(&mut self, parent: Option<Handle>) {
        self.header_mut().parent = parent;
        self.header_mut().mark_dirty();
    }

    /// The maximum key present in this node (§3: mayor key).
    pub fn mayor(&self) -> Result<S::Key> {
        match self {
            Node::Seam(s) => s.mayor(),
            Node::Quill(q) => q.mayor(),
        }
    }

    /// The sole remaining key, only defined with exactly one inlet
    /// (§4.5 Maiden).
    pub fn maiden(&self) -> Result<S::Key> {
        match self {
            Node::Seam(s) => s.maiden(),
            Node::Quill(q) => q.maiden(),
        }
    }

    /// The minimum key present (§3: "O(1) min/max").
    pub fn minor(&self) -> Result<S::Key> {
        match self {
            Node::Seam(s) => s.minor(),
            Node::Quill(q) => q.minor(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Seam(s) => s.container.len(),
            Node::Quill(q) => q.container.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_seam(&self) -> Result<&Seam<S>> {
        match self {
            Node::Seam(s) => Ok(s),
            Node::Quill(_) => Err(Error::InvariantViolation("expected a seam, found a quill".into())),
        }
    }

    pub fn as_seam_mut(&mut self) -> Result<&mut Seam<S>> {
        match self {
            Node::Seam(s) => Ok(s),
            Node::Quill(_) => Err(Error::InvariantViolation("expected a seam, found a quill".into())),
        }
    }

    pub fn as_quill(&self) -> Result<&Quill<S>> {
        match self {
            Node::Quill(q) => Ok(q),
            Node::Seam(_) => Err(Error::InvariantViolation("expected a quill, found a seam".into())),
        }
    }

    pub fn as_quill_mut(&mut self) -> Result<&mut Quill<S>> {
        match self {
            Node::Quill(q) => Ok(q),
            Node::Seam(_) => Err(Error::InvariantViolation("expected a quill, found a seam".into())),
        }
    }

    /// `Check(parent, self)` (§4.4, §4.5): the node's own parent field
    /// must match the handle the loader used to reach it.
    pub fn check_parent(&self, expected_parent: Option<&Handle>) -> Result<()> {
        if self.header().parent.as_ref() != expected_parent {
            return Err(Error::InvariantViolation(
                "node's parent field does not match its loader".into(),
            ));
        }
        Ok(())
    }
}
