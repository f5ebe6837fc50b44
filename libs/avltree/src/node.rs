// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::alloc::{AllocError, Allocator, Layout};
use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::utils::Side;

// Maximum number of slots in a `NodePool`. `NodeRef`s are `u32` indices into the pool.
pub(crate) const MAX_NODES: u32 = u32::MAX;

pub(crate) type Link = Option<NodeRef>;

/// A reference to a node inside a `NodePool`.
///
/// This is encoded as a `u32` slot index to save space.
///
/// This doesn't have a lifetime, but is logically bound to the `NodePool` that
/// it was allocated from and is only valid for the lifetime of that pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeRef(u32);

impl NodeRef {
    /// The boundary node. It is allocated first, so it always lives in slot zero.
    pub(crate) const SENTINEL: Self = Self(0);

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::SENTINEL {
            f.write_str("NodeRef(sentinel)")
        } else {
            write!(f, "NodeRef({})", self.0)
        }
    }
}

/// A single tree node.
///
/// The sentinel never holds an entry. Freed slots reuse `left` as the next pointer
/// of the pool's free list.
pub(crate) struct Node<K, V> {
    pub(crate) parent: Link,
    pub(crate) left: Link,
    pub(crate) right: Link,
    /// Height of the subtree rooted here, a leaf has height 0.
    pub(crate) height: i8,
    /// Bumped every time the slot is freed, so stale `Position`s can be detected.
    pub(crate) generation: u32,
    /// Entries sit behind an `UnsafeCell` so that `IterMut` can hand out `&mut V`s
    /// while link fields of the same nodes are still being read.
    entry: UnsafeCell<MaybeUninit<(K, V)>>,
}

impl<K, V> Node<K, V> {
    #[inline]
    pub(crate) fn child(&self, side: Side) -> Link {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    #[inline]
    pub(crate) fn set_child(&mut self, side: Side, child: Link) {
        match side {
            Side::Left => self.left = child,
            Side::Right => self.right = child,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Returns the key and value stored in this node.
    ///
    /// # Safety
    ///
    /// The node must be live and must not be the sentinel, and no mutable reference to
    /// the entry may exist.
    #[inline]
    pub(crate) unsafe fn key_value(&self) -> (&K, &V) {
        // Safety: ensured by caller
        let (key, value) = unsafe { (*self.entry.get()).assume_init_ref() };
        (key, value)
    }

    /// Returns the key and a mutable reference to the value stored in this node.
    ///
    /// # Safety
    ///
    /// The node must be live and must not be the sentinel, and the caller must
    /// guarantee exclusive access to the entry for the returned lifetime.
    #[inline]
    #[allow(clippy::mut_from_ref, reason = "entries are behind an `UnsafeCell`")]
    pub(crate) unsafe fn key_value_mut(&self) -> (&K, &mut V) {
        // Safety: ensured by caller
        let (key, value) = unsafe { (*self.entry.get()).assume_init_mut() };
        (&*key, value)
    }
}

/// Arena of tree nodes.
///
/// This is the tree's only point of contact with the [`Allocator`]: nodes are handed out one
/// at a time from a single backing buffer that grows by doubling, and freed nodes are kept on
/// an intrusive free list for reuse. Moving an entry into a slot and reading it back out are
/// the construct and destroy steps; the allocator is never asked to track individual nodes.
pub(crate) struct NodePool<K, V> {
    ptr: NonNull<Node<K, V>>,
    /// Number of slots in the backing buffer.
    capacity: u32,
    /// Number of slots handed out so far, including freed ones.
    len: u32,
    free_list: Link,
    _owns: PhantomData<Node<K, V>>,
}

// Safety: the pool exclusively owns its buffer and the entries in it
unsafe impl<K: Send, V: Send> Send for NodePool<K, V> {}
// Safety: shared access to the pool only ever hands out shared references to entries
unsafe impl<K: Sync, V: Sync> Sync for NodePool<K, V> {}

impl<K, V> NodePool<K, V> {
    pub(crate) const fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            capacity: 0,
            len: 0,
            free_list: None,
            _owns: PhantomData,
        }
    }

    /// Maximum number of nodes (sentinel included) this pool can ever hold.
    pub(crate) fn max_nodes() -> usize {
        let by_size = isize::MAX.unsigned_abs() / size_of::<Node<K, V>>();
        by_size.min(MAX_NODES as usize)
    }

    fn layout(capacity: u32) -> Result<Layout, AllocError> {
        Layout::array::<Node<K, V>>(capacity as usize).map_err(|_| AllocError)
    }

    fn grow(&mut self, allocator: &impl Allocator) -> Result<(), AllocError> {
        if self.capacity == 0 {
            // Room for the sentinel plus a handful of nodes for the initial allocation.
            let new_layout = Self::layout(4)?;
            self.ptr = allocator.allocate(new_layout)?.cast();
            self.capacity = 4;
        } else {
            let max = u32::try_from(Self::max_nodes()).unwrap_or(MAX_NODES);
            let new_capacity = self.capacity.saturating_mul(2).min(max);
            if new_capacity <= self.capacity {
                return Err(AllocError);
            }

            let old_layout = Self::layout(self.capacity)?;
            let new_layout = Self::layout(new_capacity)?;

            // Safety: `ptr` was allocated by `allocator` with `old_layout` and the new layout is larger
            self.ptr = unsafe { allocator.grow(self.ptr.cast(), old_layout, new_layout)? }.cast();
            self.capacity = new_capacity;
        }

        tracing::trace!(capacity = self.capacity, "grew node pool");

        Ok(())
    }

    fn alloc_slot(&mut self, allocator: &impl Allocator) -> Result<NodeRef, AllocError> {
        // First try re-using a slot from the free list.
        if let Some(free) = self.free_list {
            let slot = self.node_mut(free);
            let next_free = slot.left.take();
            slot.parent = None;
            slot.right = None;
            slot.height = 0;
            self.free_list = next_free;
            return Ok(free);
        }

        if self.len == self.capacity {
            self.grow(allocator)?;
        }

        // grow() will have doubled the capacity or initialized it, which
        // guarantees at least enough space to allocate a single node.
        debug_assert!(self.len < self.capacity);
        let node = NodeRef(self.len);
        // Safety: `len < capacity` so the slot is inside the allocation and has never been written to
        unsafe {
            self.ptr.add(node.index()).write(Node {
                parent: None,
                left: None,
                right: None,
                height: 0,
                generation: 0,
                entry: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }
        self.len += 1;

        Ok(node)
    }

    /// Allocates the sentinel. Must be the first allocation from this pool.
    pub(crate) fn alloc_sentinel(&mut self, allocator: &impl Allocator) -> Result<NodeRef, AllocError> {
        debug_assert_eq!(self.len, 0);
        let sentinel = self.alloc_slot(allocator)?;
        debug_assert_eq!(sentinel, NodeRef::SENTINEL);
        Ok(sentinel)
    }

    /// Allocates a new detached node holding `entry`.
    ///
    /// On failure the pool is left untouched and `entry` is dropped.
    pub(crate) fn alloc_node(
        &mut self,
        entry: (K, V),
        allocator: &impl Allocator,
    ) -> Result<NodeRef, AllocError> {
        let node = self.alloc_slot(allocator)?;
        self.node_mut(node).entry.get_mut().write(entry);
        Ok(node)
    }

    /// Moves the entry out of `node` and puts its slot on the free list.
    ///
    /// # Safety
    ///
    /// `node` must be a live, non-sentinel node of this pool that is no longer reachable
    /// from the tree.
    pub(crate) unsafe fn free_node(&mut self, node: NodeRef) -> (K, V) {
        debug_assert_ne!(node, NodeRef::SENTINEL);

        let next_free = self.free_list;
        let slot = self.node_mut(node);
        // Safety: ensured by caller, live nodes always hold an initialized entry
        let entry = unsafe { slot.entry.get_mut().assume_init_read() };
        slot.generation = slot.generation.wrapping_add(1);
        slot.parent = None;
        slot.right = None;
        slot.left = next_free;
        self.free_list = Some(node);

        entry
    }

    /// Returns the node with the given index if it has ever been handed out by this pool.
    pub(crate) fn get(&self, node: NodeRef) -> Option<&Node<K, V>> {
        (node.0 < self.len).then(|| self.node(node))
    }

    #[inline]
    pub(crate) fn node(&self, node: NodeRef) -> &Node<K, V> {
        debug_assert!(node.0 < self.len, "{node:?} out of bounds");
        // Safety: `NodeRef`s are only created by this pool for initialized slots
        unsafe { self.ptr.add(node.index()).as_ref() }
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, node: NodeRef) -> &mut Node<K, V> {
        debug_assert!(node.0 < self.len, "{node:?} out of bounds");
        // Safety: `NodeRef`s are only created by this pool for initialized slots
        unsafe { self.ptr.add(node.index()).as_mut() }
    }

    /// Frees the pool's allocation. This invalidates all `NodeRef`s allocated from this pool.
    ///
    /// # Safety
    ///
    /// All entries must have been moved out (or leaked) beforehand and this pool must
    /// always be used with the same allocator.
    pub(crate) unsafe fn clear_and_free(&mut self, allocator: &impl Allocator) {
        if self.capacity > 0
            && let Ok(layout) = Self::layout(self.capacity)
        {
            // Safety: `ptr` was allocated by `allocator` with exactly this layout
            unsafe {
                allocator.deallocate(self.ptr.cast(), layout);
            }
        }

        self.ptr = NonNull::dangling();
        self.capacity = 0;
        self.len = 0;
        self.free_list = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::Global;

    #[test]
    fn slots_are_reused() {
        let mut pool: NodePool<u32, ()> = NodePool::new();
        assert_eq!(pool.alloc_sentinel(&Global).unwrap(), NodeRef::SENTINEL);

        let a = pool.alloc_node((1, ()), &Global).unwrap();
        let b = pool.alloc_node((2, ()), &Global).unwrap();
        assert_ne!(a, b);

        // Safety: `a` is live and detached
        let (key, ()) = unsafe { pool.free_node(a) };
        assert_eq!(key, 1);
        assert_eq!(pool.node(a).generation, 1);

        let c = pool.alloc_node((3, ()), &Global).unwrap();
        assert_eq!(c, a);
        assert_eq!(pool.node(c).generation, 1);
        // Safety: `c` is live and not the sentinel
        assert_eq!(*unsafe { pool.node(c).key_value() }.0, 3);

        // Safety: `b` and `c` are live and detached
        unsafe {
            drop(pool.free_node(b));
            drop(pool.free_node(c));
            pool.clear_and_free(&Global);
        }
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut pool: NodePool<usize, usize> = NodePool::new();
        pool.alloc_sentinel(&Global).unwrap();

        let nodes: Vec<_> = (0..100)
            .map(|i| pool.alloc_node((i, i * 2), &Global).unwrap())
            .collect();

        for (i, node) in nodes.iter().enumerate() {
            // Safety: every node is live and not the sentinel
            let (key, value) = unsafe { pool.node(*node).key_value() };
            assert_eq!((*key, *value), (i, i * 2));
        }

        // Safety: every node is live and detached
        unsafe {
            for node in nodes {
                drop(pool.free_node(node));
            }
            pool.clear_and_free(&Global);
        }
    }
}
