// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! # An allocator-aware AVL tree.
//!
//! An ordered associative container backed by a height-balanced binary search tree, primarily
//! for use in `no_std` environments such as the [k23 operating system][k23].
//!
//! AVL trees keep the heights of every node's two subtrees within one of each other, which bounds
//! the tree height at ~1.44log2(n) and makes lookups cheap. Entries are stored in a node arena
//! that is backed by a single allocation from an [`Allocator`], and nodes link to each other
//! through indices into that arena.
//!
//! Every tree also holds a *sentinel* node which never stores an entry. It anchors the root and
//! doubles as the "end" position of cursors, so traversal never has to special-case the empty
//! tree or the tree's boundaries: stepping past the last entry lands on the sentinel, stepping
//! once more wraps around to the first entry.
//!
//! ## when to use this
//!
//! - **want ordered lookups** - AVL trees are *sorted* collections that are efficient to search.
//! - **want stable cursors** - Cursors keep pointing at their entry across insertions and across
//!   erasures of other entries, and [`Position`]s can be stored to erase entries later.
//! - **need fallible allocation** - Every allocating operation reports [`AllocError`] instead of
//!   aborting, and the tree can be placed in any [`Allocator`].
//! - **want a custom ordering** - Any strict weak ordering can be used, see [`Compare`].
//!
//! ## features
//!
//! The following features are available:
//!
//! | Feature | Default | Explanation                                                                             |
//! |:--------|:--------|:----------------------------------------------------------------------------------------|
//! | `dot`   | `false` | Enables the `AvlTree::dot` method, which allows display of the tree in [graphviz format] |
//!
//! [k23]: https://github.com/JonasKruckenberg/k23
//! [graphviz format]: https://graphviz.org/doc/info/lang.html

#![cfg_attr(not(test), no_std)]
#![feature(allocator_api)]

extern crate alloc;

mod compare;
mod cursor;
#[cfg(feature = "dot")]
mod dot;
mod iter;
mod map;
mod node;
mod utils;

use alloc::alloc::{Global, handle_alloc_error};
use core::alloc::{AllocError, Allocator, Layout};
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use core::{fmt, mem};

pub use compare::{Compare, Natural, Reversed};
pub use cursor::{Cursor, CursorMut, Position};
#[cfg(feature = "dot")]
pub use dot::Dot;
pub use iter::{IntoIter, Iter, IterMut, Keys, Values, ValuesMut};
pub use map::AvlMap;

use crate::cursor::TreeId;
use crate::node::{Link, Node, NodePool, NodeRef};
use crate::utils::Side;

/// An ordered map from `K` to `V` backed by an AVL tree.
///
/// Keys are ordered by the comparator `C` (the natural [`Ord`] ordering by default), and nodes
/// are allocated from `A` ([`Global`] by default). Keys are unique: inserting a key that is
/// already present leaves the existing entry untouched.
pub struct AvlTree<K, V, C = Natural, A: Allocator = Global> {
    pub(crate) pool: NodePool<K, V>,
    size: usize,
    id: TreeId,
    comparator: C,
    alloc: A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebalance {
    /// A single rotation restores the balance of the whole tree.
    Insert,
    /// Every ancestor up to the root may need a rotation.
    Erase,
}

impl<K, V> AvlTree<K, V> {
    /// Creates a new, empty tree ordered by `K`'s [`Ord`] implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel node could not be allocated.
    pub fn try_new() -> Result<Self, AllocError> {
        Self::try_new_in(Natural, Global)
    }
}

impl<K, V, C> AvlTree<K, V, C> {
    /// Creates a new, empty tree ordered by `comparator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel node could not be allocated.
    pub fn try_with_comparator(comparator: C) -> Result<Self, AllocError> {
        Self::try_new_in(comparator, Global)
    }
}

impl<K, V, C, A: Allocator> AvlTree<K, V, C, A> {
    /// Creates a new, empty tree ordered by `comparator` whose nodes are allocated from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel node could not be allocated.
    pub fn try_new_in(comparator: C, alloc: A) -> Result<Self, AllocError> {
        let mut pool = NodePool::new();
        pool.alloc_sentinel(&alloc)?;

        Ok(Self {
            pool,
            size: 0,
            id: TreeId::next(),
            comparator,
            alloc,
        })
    }

    /// Returns the number of entries in the tree.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of entries in the tree.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the tree contains no entries.
    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(self.root().is_none(), self.size == 0);
        self.size == 0
    }

    /// Returns the maximum number of entries a tree of this type can hold.
    pub fn max_size(&self) -> usize {
        // one slot is taken up by the sentinel
        NodePool::<K, V>::max_nodes() - 1
    }

    /// Returns the height of the tree, `-1` for an empty tree and `0` for a single entry.
    pub fn height(&self) -> i32 {
        utils::link_height(&self.pool, self.root())
    }

    /// Returns a reference to the comparator ordering this tree.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Returns a reference to the underlying allocator.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Exchanges the contents of two trees in constant time.
    ///
    /// Positions travel with their entries: a [`Position`] obtained from `self` is valid on
    /// `other` afterwards and vice versa.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Returns a cursor pointing at the first entry, or the end position if the tree is empty.
    pub fn begin(&self) -> Cursor<'_, K, V, C, A> {
        Cursor {
            current: self.first_node().unwrap_or(NodeRef::SENTINEL),
            tree: self,
        }
    }

    /// Returns a cursor pointing at the end position.
    pub fn end(&self) -> Cursor<'_, K, V, C, A> {
        Cursor {
            current: NodeRef::SENTINEL,
            tree: self,
        }
    }

    /// Returns a mutable cursor pointing at the first entry, or the end position if the tree is empty.
    pub fn begin_mut(&mut self) -> CursorMut<'_, K, V, C, A> {
        CursorMut {
            current: self.first_node().unwrap_or(NodeRef::SENTINEL),
            tree: self,
        }
    }

    /// Returns a mutable cursor pointing at the end position.
    pub fn end_mut(&mut self) -> CursorMut<'_, K, V, C, A> {
        CursorMut {
            current: NodeRef::SENTINEL,
            tree: self,
        }
    }

    /// Returns a cursor pointing at `position`, or `None` if the position doesn't belong to this
    /// tree or its entry has since been erased.
    pub fn cursor_at(&self, position: Position) -> Option<Cursor<'_, K, V, C, A>> {
        let current = self.resolve(position)?;
        Some(Cursor {
            current,
            tree: self,
        })
    }

    /// Returns a mutable cursor pointing at `position`, or `None` if the position doesn't belong
    /// to this tree or its entry has since been erased.
    pub fn cursor_at_mut(&mut self, position: Position) -> Option<CursorMut<'_, K, V, C, A>> {
        let current = self.resolve(position)?;
        Some(CursorMut {
            current,
            tree: self,
        })
    }

    /// Returns the first entry in the tree.
    pub fn first(&self) -> Option<(&K, &V)> {
        self.begin().get()
    }

    /// Returns the last entry in the tree.
    pub fn last(&self) -> Option<(&K, &V)> {
        self.end().peek_prev()
    }

    /// Removes and returns the first entry in the tree.
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        let node = self.first_node()?;
        Some(self.remove_node(node))
    }

    /// Removes and returns the last entry in the tree.
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        let node = self.last_node()?;
        Some(self.remove_node(node))
    }

    /// Erases the entry at `position`, returning the number of erased entries.
    ///
    /// Erasing the end position, a position of another tree, or a position whose entry was
    /// already erased does nothing and returns `0`.
    pub fn erase(&mut self, position: Position) -> usize {
        match self.resolve(position) {
            Some(node) if node != NodeRef::SENTINEL => {
                drop(self.remove_node(node));
                1
            }
            _ => 0,
        }
    }

    /// Erases every entry from `first` up to, but excluding, `last`, returning the number of
    /// erased entries.
    ///
    /// Nothing is erased if either position is invalid for this tree. If `last` is not reachable
    /// from `first`, erasure stops at the end of the tree.
    pub fn erase_range(&mut self, first: Position, last: Position) -> usize {
        let (Some(mut curr), Some(last)) = (self.resolve(first), self.resolve(last)) else {
            return 0;
        };

        if Some(curr) == self.first_node() && last == NodeRef::SENTINEL {
            let erased = self.size;
            self.clear();
            return erased;
        }

        let mut erased = 0;
        while curr != last && curr != NodeRef::SENTINEL {
            let next = cursor::next(&self.pool, curr);
            drop(self.remove_node(curr));
            erased += 1;
            curr = next;
        }

        tracing::debug!(erased, "erased range");
        erased
    }

    /// Removes all entries from the tree.
    ///
    /// The sentinel and the node arena are kept around, so the tree can be reused without
    /// allocating again for up to as many entries as it held before.
    pub fn clear(&mut self) {
        let Some(root) = self.root() else {
            return;
        };

        // detach everything first so the tree is consistent even if dropping an entry panics
        let sentinel = self.pool.node_mut(NodeRef::SENTINEL);
        sentinel.left = None;
        sentinel.right = None;
        let len = mem::replace(&mut self.size, 0);

        self.destroy_subtree(root);

        tracing::debug!(len, "cleared tree");
    }

    /// Gets an iterator over the entries in the tree, sorted by their key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.pool, self.size)
    }

    /// Gets a mutable iterator over the entries in the tree, sorted by their key.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(&self.pool, self.size)
    }

    /// Gets an iterator over the keys in the tree, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    /// Gets an iterator over the values in the tree, sorted by their key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    /// Gets a mutable iterator over the values in the tree, sorted by their key.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut(self.iter_mut())
    }

    #[cfg(feature = "dot")]
    pub fn dot(&self) -> Dot<'_, K, V, C, A> {
        Dot { tree: self }
    }

    /// Returns a `Cursor` pointing to the entry with the given key, or the end position if
    /// there is none.
    ///
    /// The key may be any borrowed form of the entry’s key type, but the comparator's ordering
    /// on the borrowed form *must* match its ordering on the key type.
    pub fn find<Q>(&self, key: &Q) -> Cursor<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        Cursor {
            current: self.find_node(key),
            tree: self,
        }
    }

    /// Returns a `CursorMut` pointing to the entry with the given key, or the end position if
    /// there is none.
    pub fn find_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        CursorMut {
            current: self.find_node(key),
            tree: self,
        }
    }

    /// Returns a cursor pointing at the first entry whose key is not ordered before `key`, or
    /// the end position if there is none.
    pub fn lower_bound<Q>(&self, key: &Q) -> Cursor<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        Cursor {
            current: self.lower_bound_node(key),
            tree: self,
        }
    }

    /// Mutable version of [`lower_bound`](Self::lower_bound).
    pub fn lower_bound_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        CursorMut {
            current: self.lower_bound_node(key),
            tree: self,
        }
    }

    /// Returns a cursor pointing at the first entry whose key is ordered after `key`, or the
    /// end position if there is none.
    pub fn upper_bound<Q>(&self, key: &Q) -> Cursor<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        Cursor {
            current: self.upper_bound_node(key),
            tree: self,
        }
    }

    /// Mutable version of [`upper_bound`](Self::upper_bound).
    pub fn upper_bound_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        CursorMut {
            current: self.upper_bound_node(key),
            tree: self,
        }
    }

    /// Returns the range of entries equivalent to `key` as a pair of
    /// `(lower_bound(key), upper_bound(key))`.
    ///
    /// Since keys are unique the range holds at most one entry.
    pub fn equal_range<Q>(&self, key: &Q) -> (Cursor<'_, K, V, C, A>, Cursor<'_, K, V, C, A>)
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        (self.lower_bound(key), self.upper_bound(key))
    }

    /// Returns `true` if the tree contains an entry for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.find_node(key) != NodeRef::SENTINEL
    }

    /// Returns the number of entries with the given key, which is either `0` or `1`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// Removes the entry with the given key from the tree, returning it if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let node = self.find_node(key);
        (node != NodeRef::SENTINEL).then(|| self.remove_node(node))
    }

    /// Inserts a new entry into the tree.
    ///
    /// Returns a cursor pointing at the entry for `key` together with `true` if the entry was
    /// inserted. If the tree already holds an entry for `key`, it is left untouched, `value` is
    /// dropped and the returned flag is `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if a node for the new entry could not be allocated. The tree is left
    /// unchanged in that case.
    pub fn insert(&mut self, key: K, value: V) -> Result<(CursorMut<'_, K, V, C, A>, bool), AllocError>
    where
        C: Compare<K>,
    {
        self.insert_with(key, || value)
    }

    /// Like [`insert`](Self::insert), but only computes the value if `key` isn't present yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a node for the new entry could not be allocated. The tree is left
    /// unchanged in that case.
    pub fn insert_with<F>(&mut self, key: K, f: F) -> Result<(CursorMut<'_, K, V, C, A>, bool), AllocError>
    where
        C: Compare<K>,
        F: FnOnce() -> V,
    {
        let (current, inserted) = self.insert_node_with(key, f)?;
        Ok((
            CursorMut {
                current,
                tree: self,
            },
            inserted,
        ))
    }

    /// Inserts every entry of `iter` in iteration order. Entries whose key is already present
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a node could not be allocated. Entries inserted before the failure
    /// remain in the tree.
    pub fn try_extend<I>(&mut self, iter: I) -> Result<(), AllocError>
    where
        I: IntoIterator<Item = (K, V)>,
        C: Compare<K>,
    {
        for (key, value) in iter {
            self.insert_node_with(key, || value)?;
        }
        Ok(())
    }

    /// Creates a copy of this tree, holding clones of every entry.
    ///
    /// The copy is built by inserting the entries one by one in order, so its shape is derived
    /// anew and does not mirror this tree's.
    ///
    /// # Errors
    ///
    /// Returns an error if any node of the copy could not be allocated.
    pub fn try_clone(&self) -> Result<Self, AllocError>
    where
        K: Clone,
        V: Clone,
        C: Compare<K> + Clone,
        A: Clone,
    {
        let mut tree = Self::try_new_in(self.comparator.clone(), self.alloc.clone())?;
        tree.try_extend(self.iter().map(|(key, value)| (key.clone(), value.clone())))?;

        tracing::debug!(len = tree.size, "cloned tree");
        Ok(tree)
    }

    /// Asserts as many of the tree's invariants as possible.
    ///
    /// This checks the sentinel links, parent/child link symmetry, the ordering of keys, the AVL
    /// balance of every node, the cached node heights, and the entry count.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    #[track_caller]
    pub fn assert_valid(&self)
    where
        C: Compare<K>,
    {
        let sentinel = self.pool.node(NodeRef::SENTINEL);
        assert!(sentinel.parent.is_none(), "sentinel cannot have a parent");
        assert_eq!(
            sentinel.left, sentinel.right,
            "sentinel's left and right links must both point at the root"
        );

        let count = match sentinel.left {
            Some(root) => {
                assert_eq!(
                    self.pool.node(root).parent,
                    Some(NodeRef::SENTINEL),
                    "root's parent must be the sentinel"
                );
                self.assert_valid_inner(root, None, None).1
            }
            None => 0,
        };

        assert_eq!(
            count, self.size,
            "tree size is {} but {count} nodes are reachable from the root",
            self.size
        );
    }

    /// Validates the subtree rooted at `node`, whose keys must lie strictly between `lower`
    /// and `upper`. Returns the subtree's height and number of nodes.
    #[track_caller]
    fn assert_valid_inner(&self, node: NodeRef, lower: Option<&K>, upper: Option<&K>) -> (i32, usize)
    where
        C: Compare<K>,
    {
        let links = self.pool.node(node);
        let key = self.key_of(node);

        assert_ne!(links.left, Some(node), "node's left child cannot be itself; node={node:?}");
        assert_ne!(links.right, Some(node), "node's right child cannot be itself; node={node:?}");

        if let Some(lower) = lower {
            assert!(
                self.comparator.less(lower, key),
                "Ordering violation: {node:?} is not greater than its left-side ancestors"
            );
        }
        if let Some(upper) = upper {
            assert!(
                self.comparator.less(key, upper),
                "Ordering violation: {node:?} is not less than its right-side ancestors"
            );
        }

        let (left_height, left_count) = match links.left {
            Some(left) => {
                assert_eq!(
                    self.pool.node(left).parent,
                    Some(node),
                    "left child of {node:?} doesn't point back at it"
                );
                self.assert_valid_inner(left, lower, Some(key))
            }
            None => (-1, 0),
        };

        let (right_height, right_count) = match links.right {
            Some(right) => {
                assert_eq!(
                    self.pool.node(right).parent,
                    Some(node),
                    "right child of {node:?} doesn't point back at it"
                );
                self.assert_valid_inner(right, Some(key), upper)
            }
            None => (-1, 0),
        };

        let balance = left_height - right_height;
        assert!(
            balance.abs() <= 1,
            "AVL balance violation: {node:?} has left height {left_height} and right height {right_height}"
        );

        let height = 1 + left_height.max(right_height);
        assert_eq!(
            i32::from(links.height),
            height,
            "cached height of {node:?} is out of date"
        );
        if links.is_leaf() {
            assert_eq!(links.height, 0, "leaf {node:?} must have height 0");
        }

        (height, 1 + left_count + right_count)
    }

    // === internals ===

    #[inline]
    fn root(&self) -> Link {
        self.pool.node(NodeRef::SENTINEL).left
    }

    fn first_node(&self) -> Option<NodeRef> {
        self.root().map(|root| utils::find_minimum(&self.pool, root))
    }

    fn last_node(&self) -> Option<NodeRef> {
        self.root().map(|root| utils::find_maximum(&self.pool, root))
    }

    #[inline]
    fn parent_of(&self, node: NodeRef) -> NodeRef {
        let parent = self.pool.node(node).parent;
        debug_assert!(parent.is_some(), "{node:?} is not linked into the tree");
        parent.unwrap_or(NodeRef::SENTINEL)
    }

    #[inline]
    fn key_of(&self, node: NodeRef) -> &K {
        debug_assert_ne!(node, NodeRef::SENTINEL);
        // Safety: only called with nodes reached through the tree's links, which are all live
        unsafe { self.pool.node(node).key_value().0 }
    }

    /// Returns a mutable reference to the value stored in `node`.
    pub(crate) fn value_mut(&mut self, node: NodeRef) -> &mut V {
        debug_assert_ne!(node, NodeRef::SENTINEL);
        // Safety: `node` is live, and we hold the tree mutably
        unsafe { self.pool.node_mut(node).key_value_mut().1 }
    }

    pub(crate) fn position_of(&self, node: NodeRef) -> Position {
        Position {
            tree: self.id,
            node,
            generation: self.pool.node(node).generation,
        }
    }

    /// Maps a `Position` back to its node, if the position is still valid for this tree.
    fn resolve(&self, position: Position) -> Option<NodeRef> {
        if position.tree != self.id {
            return None;
        }

        let node = self.pool.get(position.node)?;
        if node.generation != position.generation {
            return None;
        }

        debug_assert!(
            self.belongs_to_tree(position.node),
            "{:?} passed the generation check but is not linked into the tree",
            position.node
        );
        Some(position.node)
    }

    fn belongs_to_tree(&self, mut node: NodeRef) -> bool {
        while let Some(parent) = self.pool.node(node).parent {
            node = parent;
        }
        node == NodeRef::SENTINEL
    }

    fn find_node<Q>(&self, key: &Q) -> NodeRef
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let mut curr = self.root();
        while let Some(node) = curr {
            let node_key: &Q = self.key_of(node).borrow();

            curr = if self.comparator.less(key, node_key) {
                self.pool.node(node).left
            } else if self.comparator.less(node_key, key) {
                self.pool.node(node).right
            } else {
                return node;
            };
        }

        NodeRef::SENTINEL
    }

    fn lower_bound_node<Q>(&self, key: &Q) -> NodeRef
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let mut candidate = NodeRef::SENTINEL;
        let mut curr = self.root();
        while let Some(node) = curr {
            let node_key: &Q = self.key_of(node).borrow();

            curr = if self.comparator.less(node_key, key) {
                self.pool.node(node).right
            } else if self.comparator.less(key, node_key) {
                candidate = node;
                self.pool.node(node).left
            } else {
                return node;
            };
        }

        candidate
    }

    fn upper_bound_node<Q>(&self, key: &Q) -> NodeRef
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        let mut candidate = NodeRef::SENTINEL;
        let mut curr = self.root();
        while let Some(node) = curr {
            let node_key: &Q = self.key_of(node).borrow();

            curr = if self.comparator.less(key, node_key) {
                candidate = node;
                self.pool.node(node).left
            } else {
                self.pool.node(node).right
            };
        }

        candidate
    }

    /// Finds either the node holding `key` or the empty child slot a node for `key` would be
    /// attached to.
    fn search_slot(&self, key: &K) -> Result<NodeRef, (NodeRef, Side)>
    where
        C: Compare<K>,
    {
        let mut parent = NodeRef::SENTINEL;
        let mut side = Side::Left;
        let mut curr = self.root();

        while let Some(node) = curr {
            let node_key = self.key_of(node);

            side = if self.comparator.less(key, node_key) {
                Side::Left
            } else if self.comparator.less(node_key, key) {
                Side::Right
            } else {
                return Ok(node);
            };

            parent = node;
            curr = self.pool.node(node).child(side);
        }

        Err((parent, side))
    }

    pub(crate) fn insert_node_with<F>(&mut self, key: K, f: F) -> Result<(NodeRef, bool), AllocError>
    where
        C: Compare<K>,
        F: FnOnce() -> V,
    {
        let (parent, side) = match self.search_slot(&key) {
            Ok(existing) => return Ok((existing, false)),
            Err(slot) => slot,
        };

        // allocate before touching any links, so a failed allocation leaves the tree unchanged
        let node = self.pool.alloc_node((key, f()), &self.alloc)?;

        self.pool.node_mut(node).parent = Some(parent);
        if parent == NodeRef::SENTINEL {
            let sentinel = self.pool.node_mut(NodeRef::SENTINEL);
            sentinel.left = Some(node);
            sentinel.right = Some(node);
        } else {
            self.pool.node_mut(parent).set_child(side, Some(node));
        }
        self.size += 1;

        tracing::trace!(?node, ?parent, %side, "inserted node");

        self.rebalance_from(parent, Rebalance::Insert);

        Ok((node, true))
    }

    /// Unlinks `node` from the tree, rebalances, and returns its entry.
    ///
    /// `node` must be a live, non-sentinel node of this tree.
    pub(crate) fn remove_node(&mut self, node: NodeRef) -> (K, V) {
        debug_assert_ne!(node, NodeRef::SENTINEL);

        let parent = self.parent_of(node);
        let links = self.pool.node(node);
        let (left, right, height) = (links.left, links.right, links.height);

        let rebalance_start = match (left, right) {
            (None, None) => {
                self.replace_child(parent, node, None);
                parent
            }
            (Some(child), None) | (None, Some(child)) => {
                self.pool.node_mut(child).parent = Some(parent);
                self.replace_child(parent, node, Some(child));
                parent
            }
            (Some(left), Some(right)) => {
                let successor = utils::find_minimum(&self.pool, right);

                // The successor is spliced into the erased node's place instead of moving its
                // entry, so outstanding cursors to the successor stay valid. Heights change
                // starting at the successor's former parent, so rebalancing starts there.
                let rebalance_start = if successor == right {
                    successor
                } else {
                    let successor_parent = self.parent_of(successor);
                    let successor_right = self.pool.node(successor).right;

                    self.pool.node_mut(successor_parent).left = successor_right;
                    if let Some(successor_right) = successor_right {
                        self.pool.node_mut(successor_right).parent = Some(successor_parent);
                    }

                    self.pool.node_mut(successor).right = Some(right);
                    self.pool.node_mut(right).parent = Some(successor);

                    successor_parent
                };

                self.pool.node_mut(left).parent = Some(successor);
                let successor_links = self.pool.node_mut(successor);
                successor_links.left = Some(left);
                successor_links.parent = Some(parent);
                successor_links.height = height;
                self.replace_child(parent, node, Some(successor));

                rebalance_start
            }
        };

        self.size -= 1;
        // Safety: `node` is live and no longer reachable from the tree
        let entry = unsafe { self.pool.free_node(node) };

        tracing::trace!(?node, ?rebalance_start, "removed node");

        self.rebalance_from(rebalance_start, Rebalance::Erase);

        entry
    }

    /// Points `parent`'s link to `old` at `new` instead.
    fn replace_child(&mut self, parent: NodeRef, old: NodeRef, new: Link) {
        if parent == NodeRef::SENTINEL {
            let sentinel = self.pool.node_mut(NodeRef::SENTINEL);
            debug_assert_eq!(sentinel.left, Some(old));
            sentinel.left = new;
            sentinel.right = new;
        } else {
            let parent = self.pool.node_mut(parent);
            if parent.left == Some(old) {
                parent.left = new;
            } else {
                debug_assert_eq!(parent.right, Some(old));
                parent.right = new;
            }
        }
    }

    /// Walks from `node` up to the root, updating cached heights and rotating every node whose
    /// subtrees differ in height by more than one.
    fn rebalance_from(&mut self, mut node: NodeRef, mode: Rebalance) {
        while node != NodeRef::SENTINEL {
            self.update_height(node);

            // read the parent first, a rotation moves `node` below its former child
            let parent = self.parent_of(node);
            let balance = self.balance(node);

            if balance.abs() > 1 {
                let heavy = if balance > 0 { Side::Left } else { Side::Right };

                let Some(child) = self.pool.node(node).child(heavy) else {
                    unreachable!("{heavy} subtree of {node:?} is higher but empty");
                };

                // the heavy child leans the other way: rotate it first (double rotation)
                let child_balance = self.balance(child);
                let leans_opposite = match heavy {
                    Side::Left => child_balance < 0,
                    Side::Right => child_balance > 0,
                };
                if leans_opposite {
                    self.rotate(child, heavy.opposite());
                }

                self.rotate(node, heavy);

                if mode == Rebalance::Insert {
                    return;
                }
            }

            node = parent;
        }
    }

    /// Promotes `node`'s `side` child into `node`'s place, making `node` its child.
    ///
    /// `Side::Left` is the LL rotation, `Side::Right` the RR rotation.
    fn rotate(&mut self, node: NodeRef, side: Side) {
        let parent = self.parent_of(node);
        let Some(pivot) = self.pool.node(node).child(side) else {
            unreachable!("cannot rotate {node:?}, it has no {side} child");
        };
        let inner = self.pool.node(pivot).child(side.opposite());

        // the pivot's inner subtree moves over to `node`
        self.pool.node_mut(node).set_child(side, inner);
        if let Some(inner) = inner {
            self.pool.node_mut(inner).parent = Some(node);
        }

        // `node` becomes the pivot's child
        self.pool.node_mut(pivot).set_child(side.opposite(), Some(node));
        self.pool.node_mut(node).parent = Some(pivot);

        // and the pivot takes `node`'s place
        self.pool.node_mut(pivot).parent = Some(parent);
        self.replace_child(parent, node, Some(pivot));

        self.update_height(node);
        self.update_height(pivot);

        tracing::trace!(?node, ?pivot, %side, "rotated");
    }

    #[inline]
    fn update_height(&mut self, node: NodeRef) {
        let links = self.pool.node(node);
        let height = 1 + utils::link_height(&self.pool, links.left)
            .max(utils::link_height(&self.pool, links.right));

        // The height of a tree indexed by `u32`s is at most ~46
        self.pool.node_mut(node).height = i8::try_from(height).unwrap_or(i8::MAX);
    }

    #[inline]
    fn balance(&self, node: NodeRef) -> i32 {
        let links = self.pool.node(node);
        utils::link_height(&self.pool, links.left) - utils::link_height(&self.pool, links.right)
    }

    /// Frees every node of the subtree rooted at `node`, children before parents.
    fn destroy_subtree(&mut self, node: NodeRef) {
        let links = self.pool.node(node);
        let (left, right) = (links.left, links.right);

        if let Some(left) = left {
            self.destroy_subtree(left);
        }
        if let Some(right) = right {
            self.destroy_subtree(right);
        }

        // Safety: the subtree was detached from the tree and `node`'s children are already freed
        drop(unsafe { self.pool.free_node(node) });
    }
}

impl<K, V, C, A: Allocator> Drop for AvlTree<K, V, C, A> {
    fn drop(&mut self) {
        self.clear();

        // Safety: all entries were dropped by `clear` and the pool was always used with `self.alloc`
        unsafe {
            self.pool.clear_and_free(&self.alloc);
        }
    }
}

impl<K, V, C, A> Clone for AvlTree<K, V, C, A>
where
    K: Clone,
    V: Clone,
    C: Compare<K> + Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(tree) => tree,
            Err(AllocError) => handle_alloc_error(Layout::new::<Node<K, V>>()),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.clear();
        self.comparator = source.comparator.clone();

        let entries = source.iter().map(|(key, value)| (key.clone(), value.clone()));
        if self.try_extend(entries).is_err() {
            handle_alloc_error(Layout::new::<Node<K, V>>());
        }
    }
}

impl<K, V, C, A> Extend<(K, V)> for AvlTree<K, V, C, A>
where
    C: Compare<K>,
    A: Allocator,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        if self.try_extend(iter).is_err() {
            handle_alloc_error(Layout::new::<Node<K, V>>());
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for AvlTree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let Ok(mut tree) = Self::try_new() else {
            handle_alloc_error(Layout::new::<Node<K, V>>());
        };
        tree.extend(iter);
        tree
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> fmt::Debug for AvlTree<K, V, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: PartialEq, V: PartialEq, C, A: Allocator> PartialEq for AvlTree<K, V, C, A> {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, C, A: Allocator> Eq for AvlTree<K, V, C, A> {}

impl<K: PartialOrd, V: PartialOrd, C, A: Allocator> PartialOrd for AvlTree<K, V, C, A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<K: Ord, V: Ord, C, A: Allocator> Ord for AvlTree<K, V, C, A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<K: Hash, V: Hash, C, A: Allocator> Hash for AvlTree<K, V, C, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.size);
        for entry in self {
            entry.hash(state);
        }
    }
}

impl<'a, K, V, C, A: Allocator> IntoIterator for &'a AvlTree<K, V, C, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, C, A: Allocator> IntoIterator for &'a mut AvlTree<K, V, C, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, C, A: Allocator> IntoIterator for AvlTree<K, V, C, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, C, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { tree: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use rand::seq::SliceRandom;

    #[test]
    fn random_inserts_and_removals() {
        let mut tree: AvlTree<usize, usize> = AvlTree::try_new().unwrap();

        let mut rng = rand::rng();

        let mut nums = (0..200).collect::<Vec<_>>();
        nums.shuffle(&mut rng);

        for i in nums.clone() {
            let (cursor, inserted) = tree.insert(i, i * 10).unwrap();
            assert!(inserted);
            assert_eq!(cursor.get(), Some((&i, &(i * 10))));
            tree.assert_valid();
        }
        assert_eq!(tree.size(), 200);

        nums.shuffle(&mut rng);

        for i in nums {
            assert_eq!(tree.remove(&i), Some((i, i * 10)));
            tree.assert_valid();
        }

        assert!(tree.is_empty());
        assert_eq!(tree.height(), -1);
        assert!(tree.begin() == tree.end());
    }

    #[test]
    fn random_inserts_and_searches() {
        let mut tree: AvlTree<usize, ()> = AvlTree::try_new().unwrap();

        let mut rng = rand::rng();

        let mut nums = (0..100).map(|i| i * 2).collect::<Vec<_>>();
        nums.shuffle(&mut rng);

        for i in nums.clone() {
            tree.insert(i, ()).unwrap();
        }

        nums.shuffle(&mut rng);

        for i in nums {
            assert_eq!(tree.find(&i).key(), Some(&i));
            // odd keys are never present
            assert!(tree.find(&(i + 1)).is_end());
            assert_eq!(tree.lower_bound(&(i + 1)).key().copied(), (i + 2 < 200).then_some(i + 2));
            assert_eq!(tree.upper_bound(&i).key().copied(), (i + 2 < 200).then_some(i + 2));
        }
    }

    #[test]
    fn duplicate_insert_keeps_existing_value() {
        let mut tree: AvlTree<u32, &str> = AvlTree::try_new().unwrap();

        tree.insert(1, "one").unwrap();
        let (cursor, inserted) = tree.insert(1, "uno").unwrap();
        assert!(!inserted);
        assert_eq!(cursor.get(), Some((&1, &"one")));
        assert_eq!(tree.size(), 1);

        let mut computed = false;
        tree.insert_with(1, || {
            computed = true;
            "eins"
        })
        .unwrap();
        assert!(!computed);
    }

    #[test]
    fn cached_heights_match_shape() {
        let mut tree: AvlTree<u32, ()> = AvlTree::try_new().unwrap();
        assert_eq!(tree.height(), -1);

        for (i, expected) in [(0, 0), (1, 1), (2, 1), (3, 2), (4, 2), (5, 2), (6, 2), (7, 3)] {
            tree.insert(i, ()).unwrap();
            assert_eq!(tree.height(), expected, "after inserting {i}");
        }
        tree.assert_valid();
    }

    #[test]
    fn clear_reuses_slots() {
        let mut tree: AvlTree<u32, u32> = AvlTree::try_new().unwrap();
        tree.try_extend((0..32).map(|i| (i, i))).unwrap();

        let stale = tree.find(&7).position();
        tree.clear();
        tree.assert_valid();
        assert!(tree.is_empty());
        assert!(tree.cursor_at(stale).is_none());

        tree.try_extend((0..32).map(|i| (i, i))).unwrap();
        tree.assert_valid();
        assert_eq!(tree.len(), 32);
        // the slot was reused, but the old position must not resolve to the new entry
        assert_eq!(tree.erase(stale), 0);
        assert_eq!(tree.len(), 32);
    }

    #[test]
    fn clone_is_disjoint() {
        let mut tree: AvlTree<u32, u32> = (0..50).map(|i| (i, i)).collect();
        let copy = tree.clone();
        copy.assert_valid();
        assert_eq!(tree, copy);

        *tree.find_mut(&3).into_mut().unwrap() = 300;
        assert_ne!(tree, copy);
        assert_eq!(copy.find(&3).value(), Some(&3));

        let mut assigned: AvlTree<u32, u32> = (100..103).map(|i| (i, i)).collect();
        assigned.clone_from(&tree);
        assigned.assert_valid();
        assert_eq!(assigned, tree);
    }
}
