//! Tree driver (C7, §4.7): root handle management and the `search`/
//! `insert`/`remove`/`update` orchestration across levels. The recursive
//! descent is expressed as a recursive function that itself opens nested
//! `Ambit::scope` calls, so the same call stack that performs the descent
//! also performs the post-order unwind-time write-back and rebind (§5:
//! "post-order write-back... consistent subtree").

use std::ops::Bound;

use crate::ambit::{Ambit, Cache};
use crate::crypto::{Cipher, TreeRng};
use crate::error::{Error, Result};
use crate::factory::Calibration;
use crate::handle::{Handle, Inlet};
use crate::node::schema::Schema;
use crate::node::seam::Seam;
use crate::node::Node;
use crate::store::Storage;

/// A tree instance: a root handle plus the configuration and collaborators
/// (store, cipher, secret source) every operation needs (§3: "holds root:
/// Handle, configured extent, contention... value schema V").
pub struct Tree<S: Schema, ST: Storage, C: Cipher> {
    root: Handle,
    extent: usize,
    contention: f64,
    network_id: Vec<u8>,
    store: ST,
    cipher: C,
    cache: Cache<S>,
    calibration: Calibration,
    rng: TreeRng,
}

impl<S: Schema, ST: Storage, C: Cipher> Tree<S, ST, C> {
    /// Builds a fresh, empty tree (a single empty root Quill), validating
    /// `extent`/`contention` per §6's recognized-option constraints.
    pub fn new(extent: usize, contention: f64, network_id: Vec<u8>, store: ST, cipher: C) -> Result<Self> {
        Self::new_with_rng(extent, contention, network_id, store, cipher, TreeRng::from_entropy())
    }

    /// As `new`, but seeds secret generation deterministically — the
    /// "deterministic-seed API" `rotation_enabled` gates (§6).
    pub fn new_with_seed(
        extent: usize,
        contention: f64,
        network_id: Vec<u8>,
        store: ST,
        cipher: C,
        seed: u64,
    ) -> Result<Self> {
        Self::new_with_rng(extent, contention, network_id, store, cipher, TreeRng::from_seed(seed))
    }

    fn new_with_rng(
        extent: usize,
        contention: f64,
        network_id: Vec<u8>,
        store: ST,
        cipher: C,
        rng: TreeRng,
    ) -> Result<Self> {
        let calibration = Calibration::of::<S>()?;
        Self::validate_config(extent, contention, &calibration)?;

        let placeholder = Handle::new(crate::handle::Address([0; 32]), crate::handle::Secret([0; 32]));
        let mut tree = Self {
            root: placeholder,
            extent,
            contention,
            network_id,
            store,
            cipher,
            cache: Cache::new(),
            calibration,
            rng,
        };

        let empty_quill: Node<S> = Node::Quill(crate::node::quill::Quill::new(calibration.quill_empty_footprint));
        tree.root = tree.ambit().create(empty_quill)?;
        Ok(tree)
    }

    /// Reopens a tree whose root was previously published at `root`.
    pub fn open(
        root: Handle,
        extent: usize,
        contention: f64,
        network_id: Vec<u8>,
        store: ST,
        cipher: C,
    ) -> Result<Self> {
        let calibration = Calibration::of::<S>()?;
        Self::validate_config(extent, contention, &calibration)?;
        Ok(Self {
            root,
            extent,
            contention,
            network_id,
            store,
            cipher,
            cache: Cache::new(),
            calibration,
            rng: TreeRng::from_entropy(),
        })
    }

    fn validate_config(extent: usize, contention: f64, calibration: &Calibration) -> Result<()> {
        if extent == 0 || extent < calibration.quill_empty_footprint || extent < calibration.seam_empty_footprint {
            return Err(Error::InvariantViolation(format!(
                "extent {extent} too small to hold an empty node (quill {}, seam {})",
                calibration.quill_empty_footprint, calibration.seam_empty_footprint
            )));
        }
        if !(contention > 0.0 && contention <= 1.0) {
            return Err(Error::InvariantViolation(format!(
                "contention {contention} outside (0, 1]"
            )));
        }
        Ok(())
    }

    pub fn root_handle(&self) -> &Handle {
        &self.root
    }

    fn ambit(&mut self) -> Ambit<'_, S, ST, C> {
        Ambit::new(&mut self.cache, &mut self.store, &self.cipher, &self.network_id, &mut self.rng)
    }

    /// `Search(key) -> leaf_handle` (§4.7): descends via `Lookup` at each
    /// seam, terminating at the quill that owns `key`'s leaf inlet.
    pub fn search(&mut self, key: &S::Key) -> Result<Handle> {
        log::debug!("tree search key={key:?}");
        let root = self.root.clone();
        let mut ambit = self.ambit();
        search_rec(&mut ambit, &root, key)
    }

    /// `Insert(key, value)` (§4.7): descends to the owning quill, inserts,
    /// splits on overflow, and propagates routing changes upward. A split
    /// that reaches the root publishes a fresh root seam over the two
    /// halves.
    pub fn insert(&mut self, key: S::Key, value: Handle) -> Result<()> {
        log::debug!("tree insert key={key:?}");
        let root = self.root.clone();
        let calibration = self.calibration;
        let (extent, contention) = (self.extent, self.contention);
        let mut ambit = self.ambit();

        let outcome = insert_rec(&mut ambit, &root, key, value, extent, contention, calibration)?;
        self.root = outcome.handle.clone();

        if let Some((split_mayor, split_handle)) = outcome.split {
            let mut new_root: Seam<S> = Seam::new(calibration.seam_empty_footprint);
            new_root.insert(Inlet::new(outcome.mayor.clone(), outcome.handle.clone(), 0))?;
            new_root.insert(Inlet::new(split_mayor, split_handle.clone(), 0))?;
            let new_root_handle = ambit.create(Node::Seam(new_root))?;

            link_children(&mut ambit, [outcome.handle, split_handle], &new_root_handle)?;
            self.root = flush(&mut ambit, &new_root_handle)?;
        }
        Ok(())
    }

    /// `Remove(key)` (§4.7): descends to the owning quill, deletes,
    /// attempts a merge with a sibling when the result falls below the
    /// sparse threshold, and collapses the root via `Maiden` if it is left
    /// holding exactly one inlet.
    pub fn remove(&mut self, key: &S::Key) -> Result<()> {
        log::debug!("tree remove key={key:?}");
        let root = self.root.clone();
        let (extent, contention) = (self.extent, self.contention);
        let mut ambit = self.ambit();

        let outcome = remove_rec(&mut ambit, &root, key, extent, contention)?;

        if outcome.len == 1 {
            let (collapsed, _) = ambit.scope(&outcome.handle, |node, _ambit| match node {
                Node::Seam(s) if s.container.len() == 1 => {
                    let maiden_key = s.maiden()?;
                    Ok(Some(s.locate(&maiden_key)?.value.clone()))
                }
                _ => Ok(None),
            })?;

            if let Some(child_handle) = collapsed {
                ambit.scope(&child_handle, |node, _ambit| {
                    node.set_parent(None);
                    Ok(())
                })?;
                self.root = child_handle;
                return Ok(());
            }
        }

        self.root = outcome.handle;
        Ok(())
    }

    /// `Update(from, to)` (§4.7): renames a key and propagates the mayor
    /// change upward through every ancestor whose routing key equals the
    /// renamed leaf's old mayor (§4.5 Propagate, realized as the natural
    /// unwind of the recursive `relink` chain rather than a second pass).
    pub fn update(&mut self, from: &S::Key, to: &S::Key) -> Result<()> {
        log::debug!("tree update from={from:?} to={to:?}");
        if from == to {
            return Ok(());
        }
        let root = self.root.clone();
        let mut ambit = self.ambit();
        let (new_root, _mayor) = update_rec(&mut ambit, &root, from, to)?;
        self.root = new_root;
        Ok(())
    }

    /// The P3-extended cross-sibling check (§8, §9): for every seam,
    /// verifies that adjacent children's key ranges do not overlap
    /// (`left.mayor < right.minor`). Opt-in rather than run on every
    /// mutation — see `DESIGN.md` for why.
    pub fn check_siblings(&mut self) -> Result<()> {
        let root = self.root.clone();
        let mut ambit = self.ambit();
        check_siblings_rec(&mut ambit, &root)
    }
}

fn search_rec<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    handle: &Handle,
    key: &S::Key,
) -> Result<Handle> {
    let (result, _) = ambit.scope(handle, |node, ambit| match node {
        Node::Quill(q) => Ok(q.lookup(key)?.value.clone()),
        Node::Seam(s) => {
            let child = s.lookup(key)?.value.clone();
            search_rec(ambit, &child, key)
        }
    })?;
    Ok(result)
}

/// Outcome of an `insert` at one subtree level: its rebound handle, its
/// current mayor, and an optional right sibling produced by a split at
/// this level (to be wired into the parent's routing inlets).
struct InsertOutcome<K> {
    handle: Handle,
    mayor: K,
    split: Option<(K, Handle)>,
}

fn insert_rec<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    handle: &Handle,
    key: S::Key,
    value: Handle,
    extent: usize,
    contention: f64,
    calibration: Calibration,
) -> Result<InsertOutcome<S::Key>> {
    let (outcome, rebound) = ambit.scope(handle, |node, ambit| -> Result<InsertOutcome<S::Key>> {
        match node {
            Node::Quill(q) => {
                q.insert(Inlet::new(key.clone(), value.clone(), 0))?;
                // A node holding a single oversized inlet cannot be split
                // without leaving one side empty (`mayor()` on an empty
                // node is an error), so such a node is left over-extent.
                let split = if q.is_over_extent(extent) && q.container.len() > 1 {
                    let right = q.split(extent, contention, calibration.quill_empty_footprint);
                    let right_mayor = right.mayor()?;
                    let right_handle = ambit.create(Node::Quill(right))?;
                    let right_handle = flush(ambit, &right_handle)?;
                    Some((right_mayor, right_handle))
                } else {
                    None
                };
                Ok(InsertOutcome {
                    handle: handle.clone(),
                    mayor: q.mayor()?,
                    split,
                })
            }
            Node::Seam(s) => {
                let routing = s.lookup(&key)?;
                let routing_key = routing.key.clone();
                let child_handle = routing.value.clone();

                let child_outcome =
                    insert_rec(ambit, &child_handle, key.clone(), value.clone(), extent, contention, calibration)?;
                s.relink(&routing_key, &child_outcome.mayor, child_outcome.handle)?;

                if let Some((split_mayor, split_handle)) = child_outcome.split {
                    s.insert(Inlet::new(split_mayor, split_handle, 0))?;
                }

                let split = if s.is_over_extent(extent) && s.container.len() > 1 {
                    let right = s.split(extent, contention, calibration.seam_empty_footprint);
                    let right_mayor = right.mayor()?;
                    let right_children: Vec<Handle> = right.container.values().map(|i| i.value.clone()).collect();
                    let right_handle = ambit.create(Node::Seam(right))?;
                    link_children(ambit, right_children, &right_handle)?;
                    let right_handle = flush(ambit, &right_handle)?;
                    Some((right_mayor, right_handle))
                } else {
                    None
                };
                Ok(InsertOutcome {
                    handle: handle.clone(),
                    mayor: s.mayor()?,
                    split,
                })
            }
        }
    })?;

    Ok(InsertOutcome {
        handle: rebound,
        ..outcome
    })
}

/// Outcome of a `remove` at one subtree level.
struct RemoveOutcome<K> {
    handle: Handle,
    mayor: Option<K>,
    sparse: bool,
    len: usize,
}

fn remove_rec<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    handle: &Handle,
    key: &S::Key,
    extent: usize,
    contention: f64,
) -> Result<RemoveOutcome<S::Key>> {
    let sparse_threshold = (extent as f64 * contention / 2.0) as usize;

    let (outcome, rebound) = ambit.scope(handle, |node, ambit| -> Result<RemoveOutcome<S::Key>> {
        match node {
            Node::Quill(q) => {
                q.delete(key)?;
                let len = q.container.len();
                let mayor = if len == 0 { None } else { Some(q.mayor()?) };
                let sparse = q.header.footprint.size < sparse_threshold;
                Ok(RemoveOutcome {
                    handle: handle.clone(),
                    mayor,
                    sparse,
                    len,
                })
            }
            Node::Seam(s) => {
                let routing = s.lookup(key)?;
                let routing_key = routing.key.clone();
                let child_handle = routing.value.clone();

                let child_outcome = remove_rec(ambit, &child_handle, key, extent, contention)?;

                match child_outcome.mayor.clone() {
                    None => {
                        s.delete(&routing_key)?;
                    }
                    Some(new_mayor) => {
                        s.relink(&routing_key, &new_mayor, child_outcome.handle.clone())?;
                        if child_outcome.sparse && child_outcome.len > 0 {
                            if let Some((sibling_key, sibling_handle)) = adjacent_sibling(s, &new_mayor) {
                                merge_with_sibling(
                                    ambit,
                                    s,
                                    &new_mayor,
                                    child_outcome.handle.clone(),
                                    sibling_key,
                                    sibling_handle,
                                )?;
                            }
                        }
                    }
                }

                let len = s.container.len();
                let mayor = if len == 0 { None } else { Some(s.mayor()?) };
                let sparse = s.header.footprint.size < sparse_threshold;
                Ok(RemoveOutcome {
                    handle: handle.clone(),
                    mayor,
                    sparse,
                    len,
                })
            }
        }
    })?;

    Ok(RemoveOutcome {
        handle: rebound,
        ..outcome
    })
}

/// The routing key immediately after `key` in `s`, falling back to the one
/// immediately before it — the adjacent sibling a sparse child should try
/// to merge with.
fn adjacent_sibling<S: Schema>(s: &Seam<S>, key: &S::Key) -> Option<(S::Key, Handle)> {
    if let Some((k, inlet)) = s
        .container
        .range((Bound::Excluded(key.clone()), Bound::Unbounded))
        .next()
    {
        return Some((k.clone(), inlet.value.clone()));
    }
    s.container
        .range(..key.clone())
        .next_back()
        .map(|(k, inlet)| (k.clone(), inlet.value.clone()))
}

/// `Link(parent_handle)`, bulk variant (§4.5): points every handle in
/// `children` at `parent_handle`. Used after a split mints a new right
/// sibling (its children's old parent link still points at the
/// pre-split seam), after a split reaches the root (both halves need
/// their parent set to the freshly published root), and after a seam-level
/// merge (the absorbed side's children still point at the now-discarded
/// sibling).
fn link_children<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    children: impl IntoIterator<Item = Handle>,
    parent_handle: &Handle,
) -> Result<()> {
    for child in children {
        ambit.scope(&child, |node, _ambit| {
            node.set_parent(Some(parent_handle.clone()));
            Ok(())
        })?;
    }
    Ok(())
}

/// Forces a write-back of a handle `Ambit::create` only just minted.
/// `create` caches the node Dirty with zero refs and defers all I/O to a
/// later `scope()` call on that exact address (§4.4); a node published
/// mid-operation — a split's new sibling, a fresh root — has no such later
/// call within the same operation chain, so it must be forced here instead
/// or it is never durably persisted. The node was not touched since
/// `create`, so this is a no-op write that just rebinds it onto the store.
fn flush<S: Schema, ST: Storage, C: Cipher>(ambit: &mut Ambit<'_, S, ST, C>, handle: &Handle) -> Result<Handle> {
    let (_, rebound) = ambit.scope(handle, |_node, _ambit| Ok(()))?;
    Ok(rebound)
}

fn merge_two<S: Schema>(a: &mut Node<S>, b: &mut Node<S>) -> Result<()> {
    match (a, b) {
        (Node::Seam(a), Node::Seam(b)) => a.merge(b),
        (Node::Quill(a), Node::Quill(b)) => a.merge(b),
        _ => Err(Error::InvariantViolation(
            "cannot merge a seam with a quill".into(),
        )),
    }
}

/// The child handles of a seam, for re-`Link`ing after a merge. Empty for a
/// quill: leaf inlets reference user-data blocks, not child Nodules, so
/// there is nothing to repoint.
fn seam_children<S: Schema>(node: &Node<S>) -> Vec<Handle> {
    match node {
        Node::Seam(s) => s.container.values().map(|inlet| inlet.value.clone()).collect(),
        Node::Quill(_) => Vec::new(),
    }
}

struct SiblingMergeInfo<K> {
    empty: bool,
    mayor: Option<K>,
}

/// Merges `node_handle` with its sibling `sibling_handle`, then rewrites
/// `parent`'s routing inlets: the absorbing side's inlet is relinked to its
/// new mayor and handle, the emptied side's inlet is removed (§4.5 Merge:
/// "the driver also removes the absorbed node's entry from the parent").
fn merge_with_sibling<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    parent: &mut Seam<S>,
    node_key: &S::Key,
    node_handle: Handle,
    sibling_key: S::Key,
    sibling_handle: Handle,
) -> Result<()> {
    let (
        (node_empty, node_mayor, node_children, sibling_info, sibling_children, sibling_new_handle),
        node_new_handle,
    ) = ambit.scope(&node_handle, |node, ambit| {
        let node_children = seam_children(node);
        let ((sibling_info, sibling_children), sibling_new_handle) =
            ambit.scope(&sibling_handle, |sibling, _ambit| {
                let sibling_children = seam_children(sibling);
                merge_two(node, sibling)?;
                let empty = sibling.is_empty();
                let mayor = if empty { None } else { Some(sibling.mayor()?) };
                Ok((SiblingMergeInfo { empty, mayor }, sibling_children))
            })?;

        let node_empty = node.is_empty();
        let node_mayor = if node_empty { None } else { Some(node.mayor()?) };
        Ok((node_empty, node_mayor, node_children, sibling_info, sibling_children, sibling_new_handle))
    })?;

    let (winner_key, winner_handle, winner_mayor, loser_key, loser_children) = if node_empty {
        (
            sibling_key,
            sibling_new_handle,
            sibling_info.mayor.expect("merge leaves exactly one side populated"),
            node_key.clone(),
            node_children,
        )
    } else {
        (
            node_key.clone(),
            node_new_handle,
            node_mayor.expect("merge leaves exactly one side populated"),
            sibling_key,
            sibling_children,
        )
    };

    parent.delete(&loser_key)?;
    parent.relink(&winner_key, &winner_mayor, winner_handle.clone())?;
    // The loser's children (if this merge was at the seam level) were
    // absorbed into the winner's container by `merge_two`, but their
    // `parent` field still points at the now-discarded loser handle.
    link_children(ambit, loser_children, &winner_handle)?;
    Ok(())
}

fn update_rec<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    handle: &Handle,
    from: &S::Key,
    to: &S::Key,
) -> Result<(Handle, S::Key)> {
    let (mayor, rebound) = ambit.scope(handle, |node, ambit| -> Result<S::Key> {
        match node {
            Node::Quill(q) => {
                q.update(from, to)?;
                q.mayor()
            }
            Node::Seam(s) => {
                let routing = s.lookup(from)?;
                let routing_key = routing.key.clone();
                let child_handle = routing.value.clone();
                let (new_child_handle, child_mayor) = update_rec(ambit, &child_handle, from, to)?;
                s.relink(&routing_key, &child_mayor, new_child_handle)?;
                s.mayor()
            }
        }
    })?;
    Ok((rebound, mayor))
}

fn check_siblings_rec<S: Schema, ST: Storage, C: Cipher>(
    ambit: &mut Ambit<'_, S, ST, C>,
    handle: &Handle,
) -> Result<()> {
    let (children, _) = ambit.scope(handle, |node, ambit| -> Result<Vec<Handle>> {
        let Node::Seam(s) = node else {
            return Ok(Vec::new());
        };
        let handles: Vec<Handle> = s.container.values().map(|i| i.value.clone()).collect();
        for pair in handles.windows(2) {
            let (left_mayor, _) = ambit.scope(&pair[0], |n, _ambit| n.mayor())?;
            let (right_minor, _) = ambit.scope(&pair[1], |n, _ambit| n.minor())?;
            if !(left_mayor < right_minor) {
                return Err(Error::InvariantViolation(
                    "sibling key ranges overlap or are out of order".into(),
                ));
            }
        }
        Ok(handles)
    })?;

    for child in children {
        check_siblings_rec(ambit, &child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aes256Ctr;
    use crate::node::schema::GroupSchema;
    use crate::store::MemoryStorage;

    fn small_tree() -> Tree<GroupSchema, MemoryStorage, Aes256Ctr> {
        Tree::new_with_seed(256, 0.5, b"net".to_vec(), MemoryStorage::new(), Aes256Ctr, 42).unwrap()
    }

    fn leaf_value(n: u8) -> Handle {
        Handle::new(crate::handle::Address([n; 32]), crate::handle::Secret([n; 32]))
    }

    #[test]
    fn insert_then_search_round_trips() {
        let mut tree = small_tree();
        tree.insert(1, leaf_value(1)).unwrap();
        tree.insert(2, leaf_value(2)).unwrap();
        assert_eq!(tree.search(&1).unwrap(), leaf_value(1));
        assert_eq!(tree.search(&2).unwrap(), leaf_value(2));
    }

    #[test]
    fn insert_many_keys_forces_a_split_and_stays_searchable() {
        let mut tree = small_tree();
        for k in 0u64..64 {
            tree.insert(k, leaf_value((k % 256) as u8)).unwrap();
        }
        for k in 0u64..64 {
            assert_eq!(tree.search(&k).unwrap(), leaf_value((k % 256) as u8));
        }
        tree.check_siblings().unwrap();
    }

    #[test]
    fn remove_restores_single_key_lookup_failure() {
        let mut tree = small_tree();
        tree.insert(1, leaf_value(1)).unwrap();
        tree.remove(&1).unwrap();
        assert!(tree.search(&1).is_err());
    }

    #[test]
    fn update_renames_a_key_in_place() {
        let mut tree = small_tree();
        tree.insert(1, leaf_value(1)).unwrap();
        tree.update(&1, &9).unwrap();
        assert_eq!(tree.search(&9).unwrap(), leaf_value(1));
        assert!(tree.search(&1).is_err());
    }

    #[test]
    fn insert_then_remove_all_keys_empties_the_tree() {
        let mut tree = small_tree();
        for k in 0u64..20 {
            tree.insert(k, leaf_value((k % 256) as u8)).unwrap();
        }
        for k in 0u64..20 {
            tree.remove(&k).unwrap();
        }
        assert!(tree.search(&0).is_err());
    }

    #[test]
    fn split_and_merge_round_trip_many_keys() {
        let mut tree = small_tree();
        for k in 0u64..80 {
            tree.insert(k, leaf_value((k % 256) as u8)).unwrap();
        }
        for k in (0u64..80).step_by(2) {
            tree.remove(&k).unwrap();
        }
        for k in (0u64..80).step_by(2) {
            assert!(tree.search(&k).is_err());
        }
        for k in (1u64..80).step_by(2) {
            assert_eq!(tree.search(&k).unwrap(), leaf_value((k % 256) as u8));
        }
    }
}
