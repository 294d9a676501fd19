// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! B+-Tree engine: insert / find / remove and their split, merge, and
//! redistribute subroutines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ BPlusTree<K, V>                                  │
//! ├─────────────────────────────────────────────────┤
//! │ - index_file: PagedFile<Index<K, V>>  (F.index)  │
//! │ - block_file: PagedFile<Block<K, V>>  (F.block)  │
//! │ - root, height, head                             │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! A write traces a root-to-leaf path through `F.index`, mutates the
//! target leaf in `F.block`, and, if the leaf over/underflows, propagates
//! a split or a redistribute/merge back up the recorded path — allocating
//! or freeing nodes in the paged files as it goes.

use crate::config::TreeConfig;
use crate::error::{BptError, BptResult};
use crate::node::{Block, Index, KeyValue};
use crate::paged_file::{Offset, PagedFile, NONE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const HEADER_SLOTS: usize = 2;

/// `(node_offset, child_index_taken)` pairs recorded during a root-to-leaf
/// descent, used to propagate splits and rebalances upward without
/// re-traversing from the root.
type Path = Vec<(Offset, usize)>;

/// Persistent, disk-backed B+-Tree ordered multimap.
///
/// ## Type Parameters
/// - `K`: totally ordered key type.
/// - `V`: totally ordered, equality-comparable value type (ordering is
///   required to break ties in the composite sort key; see spec §9).
///
/// ## Thread Safety
/// Not thread-safe, not reentrant. The caller must serialise access; no
/// operation suspends internally.
pub struct BPlusTree<K, V> {
    index_file: PagedFile<Index<K, V>>,
    block_file: PagedFile<Block<K, V>>,
    config: TreeConfig,
    root: Offset,
    height: usize,
    head: Offset,
}

impl<K, V> std::fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("root", &self.root)
            .field("height", &self.height)
            .field("head", &self.head)
            .finish()
    }
}

fn sibling_path(stem: &Path, suffix: &str) -> std::path::PathBuf {
    let mut s = stem.as_os_str().to_owned();
    s.push(".");
    s.push(suffix);
    std::path::PathBuf::from(s)
}

impl<K, V> BPlusTree<K, V>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
    V: Clone + Ord + Serialize + DeserializeOwned,
{
    /// Open or create a B+-Tree rooted at filename stem `F`, backed by
    /// `F.index` and `F.block`. Header slots (and therefore the tree's
    /// contents) are preserved across restarts — only a genuinely new pair
    /// of files is initialised to the empty-tree state.
    pub fn open(stem: impl AsRef<Path>, config: TreeConfig) -> BptResult<Self> {
        let stem = stem.as_ref();
        let index_path = sibling_path(stem, "index");
        let block_path = sibling_path(stem, "block");

        let is_new = !PagedFile::<Index<K, V>>::exist(&index_path);

        let mut index_file: PagedFile<Index<K, V>> =
            PagedFile::open(&index_path, HEADER_SLOTS, config.payload_cap())?;
        let mut block_file: PagedFile<Block<K, V>> =
            PagedFile::open(&block_path, HEADER_SLOTS, config.payload_cap())?;

        let (root, height, head) = if is_new {
            index_file.write_info(NONE, 1)?;
            index_file.write_info(0, 2)?;
            block_file.write_info(NONE, 1)?;
            block_file.write_info(0, 2)?;
            log::info!("tree: initialised new store at {:?}", stem);
            (NONE, 0usize, NONE)
        } else {
            let root = index_file.get_info(1)?;
            let height = index_file.get_info(2)?;
            let head = block_file.get_info(1)?;
            if height < 0 {
                return Err(BptError::InvariantViolation {
                    reason: "negative height in header slot".to_string(),
                });
            }
            log::info!(
                "tree: loaded store at {:?} (root={}, height={})",
                stem,
                root,
                height
            );
            (root, height as usize, head)
        };

        Ok(Self {
            index_file,
            block_file,
            config,
            root,
            height,
            head,
        })
    }

    /// Offset of the leftmost leaf, or [`NONE`] if the tree is empty.
    pub fn head(&self) -> Offset {
        self.head
    }

    /// Height of the tree (levels including the leaf level); `0` iff empty.
    pub fn height(&self) -> usize {
        self.height
    }

    fn descend(&self, mut route: impl FnMut(&Index<K, V>) -> usize) -> BptResult<(Path, Offset)> {
        if self.height == 0 {
            return Err(BptError::InvariantViolation {
                reason: "descend called on an empty tree".to_string(),
            });
        }
        let mut path = Vec::with_capacity(self.height - 1);
        let mut current = self.root;
        for _ in 0..self.height - 1 {
            let node: Index<K, V> = self.index_file.read(current)?;
            let idx = route(&node);
            let child = node.children[idx];
            path.push((current, idx));
            current = child;
        }
        Ok((path, current))
    }

    /// All values associated with `key`, in ascending composite (hence
    /// value) order.
    pub fn find(&self, key: &K) -> BptResult<Vec<V>> {
        let mut result = Vec::new();
        if self.height == 0 {
            return Ok(result);
        }

        let (_, leaf_offset) = self.descend(|node| node.child_for_key(key))?;
        let mut leaf: Block<K, V> = self.block_file.read(leaf_offset)?;
        let mut idx = leaf.key_lower_bound(key);

        loop {
            if idx >= leaf.size() {
                if leaf.next == NONE {
                    break;
                }
                leaf = self.block_file.read(leaf.next)?;
                idx = 0;
                continue;
            }
            if &leaf.data[idx].key != key {
                break;
            }
            result.push(leaf.data[idx].value.clone());
            idx += 1;
        }

        Ok(result)
    }

    /// Insert `(key, value)`. Idempotent: inserting an already-present
    /// composite pair is a no-op.
    pub fn insert(&mut self, key: K, value: V) -> BptResult<()> {
        let entry = KeyValue::new(key, value);

        if self.height == 0 {
            return self.insert_into_empty(entry);
        }

        let (path, leaf_offset) = self.descend(|node| node.child_for_entry(&entry))?;
        let mut leaf: Block<K, V> = self.block_file.read(leaf_offset)?;

        if !leaf.insert(entry) {
            return Ok(());
        }

        if leaf.is_overflow(&self.config) {
            let mut right = leaf.split(&self.config);
            right.next = leaf.next;
            let right_offset = self.block_file.write(&right)?;
            leaf.next = right_offset;
            self.block_file.update(&leaf, leaf_offset)?;
            let separator = right.first_entry().clone();
            log::trace!(
                "tree: leaf {} split, new right leaf at {}",
                leaf_offset,
                right_offset
            );
            self.propagate_split(path, separator, right_offset)?;
        } else {
            self.block_file.update(&leaf, leaf_offset)?;
        }

        Ok(())
    }

    fn insert_into_empty(&mut self, entry: KeyValue<K, V>) -> BptResult<()> {
        // Height 1 means the root IS the leaf: `descend` performs zero
        // internal-level hops and treats `self.root` as a `block_file`
        // offset directly. No `Index` node exists until a split grows the
        // tree past height 1 (see `propagate_split`'s new-root case).
        let mut leaf = Block::new();
        leaf.insert(entry);
        let leaf_offset = self.block_file.write(&leaf)?;

        self.root = leaf_offset;
        self.height = 1;
        self.head = leaf_offset;

        self.index_file.write_info(leaf_offset, 1)?;
        self.index_file.write_info(1, 2)?;
        self.block_file.write_info(leaf_offset, 1)?;

        log::debug!("tree: created single-leaf root at {}", leaf_offset);
        Ok(())
    }

    fn propagate_split(
        &mut self,
        path: Path,
        mut separator: KeyValue<K, V>,
        mut right_offset: Offset,
    ) -> BptResult<()> {
        for &(node_offset, _) in path.iter().rev() {
            let mut node: Index<K, V> = self.index_file.read(node_offset)?;
            node.insert_separator(separator.clone(), right_offset);

            if node.is_overflow(&self.config) {
                let (middle, right) = node.split(&self.config);
                let new_right_offset = self.index_file.write(&right)?;
                self.index_file.update(&node, node_offset)?;
                log::trace!(
                    "tree: internal node {} split, new right node at {}",
                    node_offset,
                    new_right_offset
                );
                separator = middle;
                right_offset = new_right_offset;
            } else {
                self.index_file.update(&node, node_offset)?;
                return Ok(());
            }
        }

        // Propagation ran off the top: grow a new root.
        let mut new_root = Index::new();
        new_root.children.push(self.root);
        new_root.keys.push(separator);
        new_root.children.push(right_offset);
        let new_root_offset = self.index_file.write(&new_root)?;

        self.root = new_root_offset;
        self.height += 1;
        self.index_file.write_info(new_root_offset, 1)?;
        self.index_file.write_info(self.height as i64, 2)?;

        log::info!("tree: grew to height {}", self.height);
        Ok(())
    }

    /// Remove the specific `(key, value)` entry; no-op if absent.
    pub fn remove(&mut self, key: K, value: V) -> BptResult<()> {
        if self.height == 0 {
            return Ok(());
        }

        let entry = KeyValue::new(key, value);
        let (path, leaf_offset) = self.descend(|node| node.child_for_entry(&entry))?;
        let mut leaf: Block<K, V> = self.block_file.read(leaf_offset)?;

        if !leaf.remove(&entry) {
            return Ok(());
        }

        if self.height == 1 {
            if leaf.size() == 0 {
                self.reset_to_empty()?;
            } else {
                self.block_file.update(&leaf, leaf_offset)?;
            }
            return Ok(());
        }

        if leaf.is_underflow(&self.config) {
            self.rebalance_leaf(path, leaf_offset, leaf)?;
        } else {
            self.block_file.update(&leaf, leaf_offset)?;
        }

        Ok(())
    }

    fn reset_to_empty(&mut self) -> BptResult<()> {
        self.root = NONE;
        self.height = 0;
        self.head = NONE;
        self.index_file.write_info(NONE, 1)?;
        self.index_file.write_info(0, 2)?;
        self.block_file.write_info(NONE, 1)?;
        log::info!("tree: removed last entry, tree is empty");
        Ok(())
    }

    fn rebalance_leaf(
        &mut self,
        path: Path,
        leaf_offset: Offset,
        mut leaf: Block<K, V>,
    ) -> BptResult<()> {
        let &(parent_offset, child_idx) = path.last().expect("height > 1 implies non-empty path");
        let mut parent: Index<K, V> = self.index_file.read(parent_offset)?;

        if child_idx > 0 {
            let left_offset = parent.children[child_idx - 1];
            let mut left: Block<K, V> = self.block_file.read(left_offset)?;
            if left.size() > self.config.leaf_min() as usize {
                let moved = left.data.pop().expect("non-empty checked above");
                leaf.data.insert(0, moved);
                parent.keys[child_idx - 1] = leaf.first_entry().clone();
                self.block_file.update(&left, left_offset)?;
                self.block_file.update(&leaf, leaf_offset)?;
                self.index_file.update(&parent, parent_offset)?;
                log::trace!("tree: leaf {} redistributed from left sibling", leaf_offset);
                return Ok(());
            }
        }

        if child_idx + 1 < parent.children.len() {
            let right_offset = parent.children[child_idx + 1];
            let mut right: Block<K, V> = self.block_file.read(right_offset)?;
            if right.size() > self.config.leaf_min() as usize {
                let moved = right.data.remove(0);
                leaf.data.push(moved);
                parent.keys[child_idx] = right.first_entry().clone();
                self.block_file.update(&right, right_offset)?;
                self.block_file.update(&leaf, leaf_offset)?;
                self.index_file.update(&parent, parent_offset)?;
                log::trace!(
                    "tree: leaf {} redistributed from right sibling",
                    leaf_offset
                );
                return Ok(());
            }
        }

        if child_idx > 0 {
            let left_offset = parent.children[child_idx - 1];
            let mut left: Block<K, V> = self.block_file.read(left_offset)?;
            left.data.extend(leaf.data.drain(..));
            left.next = leaf.next;
            self.block_file.update(&left, left_offset)?;
            parent.remove_separator(child_idx - 1);
            log::debug!(
                "tree: merged leaf {} into left sibling {}",
                leaf_offset,
                left_offset
            );
        } else {
            let right_offset = parent.children[child_idx + 1];
            let right: Block<K, V> = self.block_file.read(right_offset)?;
            leaf.data.extend(right.data);
            leaf.next = right.next;
            self.block_file.update(&leaf, leaf_offset)?;
            parent.remove_separator(child_idx);
            log::debug!(
                "tree: merged right sibling {} into leaf {}",
                right_offset,
                leaf_offset
            );
        }

        self.rebalance_internal(&path[..path.len() - 1], parent_offset, parent)
    }

    fn rebalance_internal(
        &mut self,
        path: &[(Offset, usize)],
        node_offset: Offset,
        mut node: Index<K, V>,
    ) -> BptResult<()> {
        if node_offset == self.root {
            self.index_file.update(&node, node_offset)?;
            if node.keys.is_empty() && node.children.len() == 1 {
                let only_child = node.children[0];
                self.root = only_child;
                self.height -= 1;
                self.index_file.write_info(only_child, 1)?;
                self.index_file.write_info(self.height as i64, 2)?;
                log::info!("tree: root promoted child {}, height {}", only_child, self.height);
            }
            return Ok(());
        }

        if !node.is_underflow(&self.config) {
            self.index_file.update(&node, node_offset)?;
            return Ok(());
        }

        let &(parent_offset, child_idx) = path.last().expect("non-root implies a recorded parent");
        let mut parent: Index<K, V> = self.index_file.read(parent_offset)?;

        if child_idx > 0 {
            let left_offset = parent.children[child_idx - 1];
            let mut left: Index<K, V> = self.index_file.read(left_offset)?;
            if left.children.len() > self.config.index_min_children() as usize {
                let moved_child = left.children.pop().expect("checked above");
                let moved_key = left.keys.pop().expect("checked above");
                let dropped = std::mem::replace(&mut parent.keys[child_idx - 1], moved_key);
                node.children.insert(0, moved_child);
                node.keys.insert(0, dropped);
                self.index_file.update(&left, left_offset)?;
                self.index_file.update(&node, node_offset)?;
                self.index_file.update(&parent, parent_offset)?;
                log::trace!("tree: internal node {} redistributed from left sibling", node_offset);
                return Ok(());
            }
        }

        if child_idx + 1 < parent.children.len() {
            let right_offset = parent.children[child_idx + 1];
            let mut right: Index<K, V> = self.index_file.read(right_offset)?;
            if right.children.len() > self.config.index_min_children() as usize {
                let moved_child = right.children.remove(0);
                let moved_key = right.keys.remove(0);
                let dropped = std::mem::replace(&mut parent.keys[child_idx], moved_key);
                node.children.push(moved_child);
                node.keys.push(dropped);
                self.index_file.update(&right, right_offset)?;
                self.index_file.update(&node, node_offset)?;
                self.index_file.update(&parent, parent_offset)?;
                log::trace!("tree: internal node {} redistributed from right sibling", node_offset);
                return Ok(());
            }
        }

        if child_idx > 0 {
            let left_offset = parent.children[child_idx - 1];
            let mut left: Index<K, V> = self.index_file.read(left_offset)?;
            let dropped = parent.keys[child_idx - 1].clone();
            left.keys.push(dropped);
            left.keys.extend(node.keys.drain(..));
            left.children.extend(node.children.drain(..));
            self.index_file.update(&left, left_offset)?;
            parent.remove_separator(child_idx - 1);
            log::debug!(
                "tree: merged internal node {} into left sibling {}",
                node_offset,
                left_offset
            );
        } else {
            let right_offset = parent.children[child_idx + 1];
            let right: Index<K, V> = self.index_file.read(right_offset)?;
            let dropped = parent.keys[child_idx].clone();
            node.keys.push(dropped);
            node.keys.extend(right.keys);
            node.children.extend(right.children);
            self.index_file.update(&node, node_offset)?;
            parent.remove_separator(child_idx);
            log::debug!(
                "tree: merged right sibling {} into internal node {}",
                right_offset,
                node_offset
            );
        }

        self.rebalance_internal(&path[..path.len() - 1], parent_offset, parent)
    }

    /// Walk the leaf chain from the head, collecting every live entry in
    /// ascending composite order. Intended for tests and diagnostics, not
    /// hot-path use (it materialises the whole tree).
    pub fn entries(&self) -> BptResult<Vec<KeyValue<K, V>>> {
        let mut out = Vec::new();
        let mut current = self.head;
        while current != NONE {
            let leaf: Block<K, V> = self.block_file.read(current)?;
            out.extend(leaf.data.iter().cloned());
            current = leaf.next;
        }
        Ok(out)
    }
}
