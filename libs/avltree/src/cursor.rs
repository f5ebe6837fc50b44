// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::alloc::Allocator;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::node::{NodePool, NodeRef};
use crate::{utils, AvlTree};

/// Identifies a single tree instance, so `Position`s can't be used on the wrong tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TreeId(usize);

impl TreeId {
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A detached handle to an entry (or the end position) of an [`AvlTree`].
///
/// Cursors borrow the tree, which means they can't be handed to methods that mutate it.
/// A `Position` is the owned equivalent: it can be obtained from any cursor and passed to
/// [`AvlTree::erase`] and [`AvlTree::erase_range`], or turned back into a cursor with
/// [`AvlTree::cursor_at`].
///
/// A position stays valid for as long as the entry it refers to stays in the tree, even
/// across insertions, erasures of *other* entries and the rotations those cause. It
/// becomes invalid when its entry is erased or the tree is cleared. Invalid positions and
/// positions obtained from a different tree are detected and treated as no-ops.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub(crate) tree: TreeId,
    pub(crate) node: NodeRef,
    pub(crate) generation: u32,
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Position")
            .field("tree", &self.tree.0)
            .field("node", &self.node)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Position {
    /// Returns `true` if this is the end position of its tree.
    pub fn is_end(&self) -> bool {
        self.node == NodeRef::SENTINEL
    }
}

/// A cursor which provides read-only access to an [`AvlTree`].
///
/// A cursor always points either at an entry or at the "end" position, which sits both after
/// the last and before the first entry. Moving past either boundary lands on the end position,
/// moving again wraps around to the other boundary.
pub struct Cursor<'a, K, V, C, A: Allocator> {
    pub(crate) current: NodeRef,
    pub(crate) tree: &'a AvlTree<K, V, C, A>,
}

impl<K, V, C, A: Allocator> Clone for Cursor<'_, K, V, C, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, C, A: Allocator> Copy for Cursor<'_, K, V, C, A> {}

impl<K, V, C, A: Allocator> PartialEq for Cursor<'_, K, V, C, A> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.current == other.current
    }
}

impl<K, V, C, A: Allocator> Eq for Cursor<'_, K, V, C, A> {}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> fmt::Debug for Cursor<'_, K, V, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cursor").field(&self.get()).finish()
    }
}

impl<'a, K, V, C, A: Allocator> Cursor<'a, K, V, C, A> {
    /// Returns the entry the cursor points at, or `None` at the end position.
    pub fn get(&self) -> Option<(&'a K, &'a V)> {
        entry(&self.tree.pool, self.current)
    }

    /// Returns the key the cursor points at, or `None` at the end position.
    pub fn key(&self) -> Option<&'a K> {
        self.get().map(|(key, _)| key)
    }

    /// Returns the value the cursor points at, or `None` at the end position.
    pub fn value(&self) -> Option<&'a V> {
        self.get().map(|(_, value)| value)
    }

    /// Returns `true` if the cursor points at the end position.
    pub fn is_end(&self) -> bool {
        self.current == NodeRef::SENTINEL
    }

    /// Returns a detached [`Position`] for the current entry.
    pub fn position(&self) -> Position {
        self.tree.position_of(self.current)
    }

    /// Moves the cursor to the in-order successor.
    ///
    /// From the end position this moves to the first entry.
    pub fn move_next(&mut self) {
        self.current = next(&self.tree.pool, self.current);
    }

    /// Moves the cursor to the in-order predecessor.
    ///
    /// From the end position this moves to the last entry.
    pub fn move_prev(&mut self) {
        self.current = prev(&self.tree.pool, self.current);
    }

    /// Returns the entry after the current one without moving the cursor.
    pub fn peek_next(&self) -> Option<(&'a K, &'a V)> {
        entry(&self.tree.pool, next(&self.tree.pool, self.current))
    }

    /// Returns the entry before the current one without moving the cursor.
    pub fn peek_prev(&self) -> Option<(&'a K, &'a V)> {
        entry(&self.tree.pool, prev(&self.tree.pool, self.current))
    }
}

/// A cursor which provides mutable access to an [`AvlTree`].
///
/// In addition to the read-only operations of [`Cursor`], a `CursorMut` can mutate the value
/// it points at and remove the current entry. Keys are never handed out mutably since changing
/// them would break the tree's ordering.
pub struct CursorMut<'a, K, V, C, A: Allocator> {
    pub(crate) current: NodeRef,
    pub(crate) tree: &'a mut AvlTree<K, V, C, A>,
}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> fmt::Debug for CursorMut<'_, K, V, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CursorMut").field(&self.get()).finish()
    }
}

impl<'a, K, V, C, A: Allocator> CursorMut<'a, K, V, C, A> {
    /// Returns the entry the cursor points at, or `None` at the end position.
    pub fn get(&self) -> Option<(&K, &V)> {
        entry(&self.tree.pool, self.current)
    }

    /// Returns the key and a mutable reference to the value the cursor points at, or `None`
    /// at the end position.
    pub fn get_mut(&mut self) -> Option<(&K, &mut V)> {
        if self.current == NodeRef::SENTINEL {
            return None;
        }
        // Safety: the current node is live and not the sentinel, and we hold the tree mutably
        Some(unsafe { self.tree.pool.node_mut(self.current).key_value_mut() })
    }

    /// Converts the cursor into a mutable reference to the current value, borrowing from
    /// the tree for the rest of the cursor's lifetime.
    pub fn into_mut(self) -> Option<&'a mut V> {
        if self.current == NodeRef::SENTINEL {
            return None;
        }
        // Safety: the current node is live and not the sentinel, and we hold the tree mutably
        let (_, value) = unsafe { self.tree.pool.node_mut(self.current).key_value_mut() };
        Some(value)
    }

    /// Returns `true` if the cursor points at the end position.
    pub fn is_end(&self) -> bool {
        self.current == NodeRef::SENTINEL
    }

    /// Returns a detached [`Position`] for the current entry.
    pub fn position(&self) -> Position {
        self.tree.position_of(self.current)
    }

    /// Moves the cursor to the in-order successor.
    ///
    /// From the end position this moves to the first entry.
    pub fn move_next(&mut self) {
        self.current = next(&self.tree.pool, self.current);
    }

    /// Moves the cursor to the in-order predecessor.
    ///
    /// From the end position this moves to the last entry.
    pub fn move_prev(&mut self) {
        self.current = prev(&self.tree.pool, self.current);
    }

    /// Returns the entry after the current one without moving the cursor.
    pub fn peek_next(&self) -> Option<(&K, &V)> {
        entry(&self.tree.pool, next(&self.tree.pool, self.current))
    }

    /// Returns the entry before the current one without moving the cursor.
    pub fn peek_prev(&self) -> Option<(&K, &V)> {
        entry(&self.tree.pool, prev(&self.tree.pool, self.current))
    }

    /// Removes the current entry from the tree and returns it, moving the cursor to the
    /// entry that followed it.
    ///
    /// Does nothing and returns `None` at the end position.
    pub fn remove_current(&mut self) -> Option<(K, V)> {
        if self.current == NodeRef::SENTINEL {
            return None;
        }

        // The successor is never the node being erased and keeps its slot across the
        // erasure, so it is still the right place to continue from afterwards.
        let successor = next(&self.tree.pool, self.current);
        let entry = self.tree.remove_node(self.current);
        self.current = successor;

        Some(entry)
    }

    /// Returns a read-only cursor pointing at the same position.
    pub fn as_cursor(&self) -> Cursor<'_, K, V, C, A> {
        Cursor {
            current: self.current,
            tree: &*self.tree,
        }
    }
}

fn entry<K, V>(pool: &NodePool<K, V>, node: NodeRef) -> Option<(&K, &V)> {
    if node == NodeRef::SENTINEL {
        None
    } else {
        // Safety: cursors only ever point at live nodes or the sentinel
        Some(unsafe { pool.node(node).key_value() })
    }
}

/// Returns the in-order successor of `node`.
///
/// The sentinel's right link aliases the root, so the successor of the sentinel is the first
/// node, and walking up off the root's left edge arrives back at the sentinel.
pub(crate) fn next<K, V>(pool: &NodePool<K, V>, node: NodeRef) -> NodeRef {
    // If we have a right child, its least descendant is our next node
    if let Some(right) = pool.node(node).right {
        return utils::find_minimum(pool, right);
    }

    let mut curr = node;
    loop {
        // only the sentinel has no parent, which means we started there in an empty tree
        let Some(parent) = pool.node(curr).parent else {
            return curr;
        };

        // the first ancestor we reach through a left edge is our next node
        if pool.node(parent).left == Some(curr) {
            return parent;
        }

        curr = parent;
    }
}

/// Returns the in-order predecessor of `node`.
///
/// Mirror image of [`next`]: the predecessor of the sentinel is the last node.
pub(crate) fn prev<K, V>(pool: &NodePool<K, V>, node: NodeRef) -> NodeRef {
    // If we have a left child, its greatest descendant is our previous node
    if let Some(left) = pool.node(node).left {
        return utils::find_maximum(pool, left);
    }

    let mut curr = node;
    loop {
        let Some(parent) = pool.node(curr).parent else {
            return curr;
        };

        // the first ancestor we reach through a right edge is our previous node
        if pool.node(parent).right == Some(curr) {
            return parent;
        }

        curr = parent;
    }
}
