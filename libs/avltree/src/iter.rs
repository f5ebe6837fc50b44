// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::alloc::Allocator;
use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::node::{NodePool, NodeRef};
use crate::{AvlTree, cursor, utils};

/// An iterator over the entries of an [`AvlTree`], sorted by key.
pub struct Iter<'a, K, V> {
    pool: &'a NodePool<K, V>,
    head: NodeRef,
    tail: NodeRef,
    len: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(pool: &'a NodePool<K, V>, len: usize) -> Self {
        let (head, tail) = bounds(pool);
        Self {
            pool,
            head,
            tail,
            len,
        }
    }
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool,
            head: self.head,
            tail: self.tail,
            len: self.len,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let node = self.head;
        self.head = cursor::next(self.pool, node);
        self.len -= 1;

        // Safety: there are entries left, so `node` is a live entry of the tree
        Some(unsafe { self.pool.node(node).key_value() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let node = self.tail;
        self.tail = cursor::prev(self.pool, node);
        self.len -= 1;

        // Safety: there are entries left, so `node` is a live entry of the tree
        Some(unsafe { self.pool.node(node).key_value() })
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of an [`AvlTree`], sorted by key.
pub struct IterMut<'a, K, V> {
    pool: &'a NodePool<K, V>,
    head: NodeRef,
    tail: NodeRef,
    len: usize,
    _values: PhantomData<&'a mut V>,
}

impl<'a, K, V> IterMut<'a, K, V> {
    /// `pool` must be borrowed from a tree that is itself borrowed mutably for `'a`.
    pub(crate) fn new(pool: &'a NodePool<K, V>, len: usize) -> Self {
        let (head, tail) = bounds(pool);
        Self {
            pool,
            head,
            tail,
            len,
            _values: PhantomData,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for IterMut<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterMut").field("len", &self.len).finish_non_exhaustive()
    }
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let node = self.head;
        self.head = cursor::next(self.pool, node);
        self.len -= 1;

        // Safety: `node` is a live entry and is yielded exactly once, while the tree is
        // borrowed mutably for `'a`
        Some(unsafe { self.pool.node(node).key_value_mut() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let node = self.tail;
        self.tail = cursor::prev(self.pool, node);
        self.len -= 1;

        // Safety: `node` is a live entry and is yielded exactly once, while the tree is
        // borrowed mutably for `'a`
        Some(unsafe { self.pool.node(node).key_value_mut() })
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An owning iterator over the entries of an [`AvlTree`], sorted by key.
pub struct IntoIter<K, V, C, A: Allocator> {
    pub(crate) tree: AvlTree<K, V, C, A>,
}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> fmt::Debug for IntoIter<K, V, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.tree).finish()
    }
}

impl<K, V, C, A: Allocator> Iterator for IntoIter<K, V, C, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.tree.pop_first()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.tree.size(), Some(self.tree.size()))
    }
}

impl<K, V, C, A: Allocator> DoubleEndedIterator for IntoIter<K, V, C, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.tree.pop_last()
    }
}

impl<K, V, C, A: Allocator> ExactSizeIterator for IntoIter<K, V, C, A> {}
impl<K, V, C, A: Allocator> FusedIterator for IntoIter<K, V, C, A> {}

/// An iterator over the keys of an [`AvlTree`], in sorted order.
#[derive(Debug)]
pub struct Keys<'a, K, V>(pub(crate) Iter<'a, K, V>);

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(key, _)| key)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of an [`AvlTree`], sorted by their key.
#[derive(Debug)]
pub struct Values<'a, K, V>(pub(crate) Iter<'a, K, V>);

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(_, value)| value)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of an [`AvlTree`], sorted by their key.
#[derive(Debug)]
pub struct ValuesMut<'a, K, V>(pub(crate) IterMut<'a, K, V>);

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for ValuesMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(_, value)| value)
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

/// First and last node of the tree, or the sentinel twice for an empty tree.
fn bounds<K, V>(pool: &NodePool<K, V>) -> (NodeRef, NodeRef) {
    match pool.node(NodeRef::SENTINEL).left {
        Some(root) => (
            utils::find_minimum(pool, root),
            utils::find_maximum(pool, root),
        ),
        None => (NodeRef::SENTINEL, NodeRef::SENTINEL),
    }
}

#[cfg(test)]
mod tests {
    use crate::AvlTree;
    use alloc::vec::Vec;

    #[test]
    fn meet_in_the_middle() {
        let tree: AvlTree<u32, u32> = (0..10).map(|i| (i, i * i)).collect();

        let mut iter = tree.iter();
        assert_eq!(iter.len(), 10);
        assert_eq!(iter.next(), Some((&0, &0)));
        assert_eq!(iter.next_back(), Some((&9, &81)));

        let rest: Vec<_> = iter.by_ref().map(|(k, _)| *k).collect();
        assert_eq!(rest, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn reverse_is_exact_reverse() {
        let tree: AvlTree<i32, ()> = [5, 3, 8, 1, 4, 7, 9].into_iter().map(|i| (i, ())).collect();

        let forward: Vec<_> = tree.keys().copied().collect();
        let mut backward: Vec<_> = tree.keys().rev().copied().collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn iter_mut_and_into_iter() {
        let mut tree: AvlTree<u32, u32> = (0..8).map(|i| (i, i)).collect();

        for (key, value) in &mut tree {
            *value += key * 10;
        }
        for value in tree.values_mut().rev() {
            *value += 1;
        }
        assert_eq!(tree.values().copied().collect::<Vec<_>>(), [1, 12, 23, 34, 45, 56, 67, 78]);

        let mut owned = tree.into_iter();
        assert_eq!(owned.next_back(), Some((7, 78)));
        assert_eq!(owned.len(), 7);
        assert_eq!(owned.map(|(k, _)| k).collect::<Vec<_>>(), [0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn empty() {
        let mut tree: AvlTree<u32, u32> = AvlTree::try_new().unwrap();
        assert_eq!(tree.iter().next(), None);
        assert_eq!(tree.iter_mut().next_back(), None);
        assert_eq!(tree.into_iter().next(), None);
    }
}
