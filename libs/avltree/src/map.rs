// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::alloc::Global;
use core::alloc::{AllocError, Allocator};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{Hash, Hasher};

use crate::{
    AvlTree, Compare, Cursor, CursorMut, IntoIter, Iter, IterMut, Keys, Natural, Position, Values,
    ValuesMut,
};

/// An ordered map backed by an [`AvlTree`].
///
/// This is a thin layer over the tree that exposes the familiar map vocabulary. Inserting a key
/// that is already present never overwrites its value, use [`get_mut`](Self::get_mut) or
/// [`get_or_insert_with`](Self::get_or_insert_with) to update entries in place.
pub struct AvlMap<K, V, C = Natural, A: Allocator = Global> {
    tree: AvlTree<K, V, C, A>,
}

impl<K, V> AvlMap<K, V> {
    /// Creates an empty map ordered by `K`'s [`Ord`] implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree's sentinel could not be allocated.
    pub fn try_new() -> Result<Self, AllocError> {
        Ok(Self {
            tree: AvlTree::try_new()?,
        })
    }
}

impl<K, V, C> AvlMap<K, V, C> {
    /// Creates an empty map ordered by `comparator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree's sentinel could not be allocated.
    pub fn try_with_comparator(comparator: C) -> Result<Self, AllocError> {
        Ok(Self {
            tree: AvlTree::try_with_comparator(comparator)?,
        })
    }
}

impl<K, V, C, A: Allocator> AvlMap<K, V, C, A> {
    /// Creates an empty map ordered by `comparator` allocating from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree's sentinel could not be allocated.
    pub fn try_new_in(comparator: C, alloc: A) -> Result<Self, AllocError> {
        Ok(Self {
            tree: AvlTree::try_new_in(comparator, alloc)?,
        })
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the maximum number of entries a map of this type can hold.
    pub fn max_size(&self) -> usize {
        self.tree.max_size()
    }

    /// Returns a reference to the underlying allocator.
    pub fn allocator(&self) -> &A {
        self.tree.allocator()
    }

    /// Returns the comparator ordering the map's keys.
    pub fn key_comp(&self) -> &C {
        self.tree.comparator()
    }

    /// Returns a reference to the underlying tree.
    pub fn as_tree(&self) -> &AvlTree<K, V, C, A> {
        &self.tree
    }

    /// Inserts `value` under `key` unless the key is already present.
    ///
    /// Returns `true` if the entry was inserted. An existing entry is left untouched and `value`
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the node for the entry could not be allocated.
    pub fn insert(&mut self, key: K, value: V) -> Result<bool, AllocError>
    where
        C: Compare<K>,
    {
        let (_, inserted) = self.tree.insert_node_with(key, || value)?;
        Ok(inserted)
    }

    /// Returns a mutable reference to the value for `key`, inserting the value computed by `f`
    /// first if the key is not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the node for a new entry could not be allocated.
    pub fn get_or_insert_with<F>(&mut self, key: K, f: F) -> Result<&mut V, AllocError>
    where
        C: Compare<K>,
        F: FnOnce() -> V,
    {
        let (node, _) = self.tree.insert_node_with(key, f)?;
        Ok(self.tree.value_mut(node))
    }

    /// Returns a mutable reference to the value for `key`, inserting `V::default()` first if the
    /// key is not present.
    ///
    /// # Errors
    ///
    /// Returns an error if the node for a new entry could not be allocated.
    pub fn get_or_insert_default(&mut self, key: K) -> Result<&mut V, AllocError>
    where
        C: Compare<K>,
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.find(key).value()
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.find_mut(key).into_mut()
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.find(key).get()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.contains_key(key)
    }

    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.count(key)
    }

    /// Removes `key` from the map, returning its value if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.remove(key).map(|(_, value)| value)
    }

    /// Removes `key` from the map, returning the stored key and value if it was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.remove(key)
    }

    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first()
    }

    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last()
    }

    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first()
    }

    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last()
    }

    pub fn find<Q>(&self, key: &Q) -> Cursor<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.find(key)
    }

    pub fn find_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.find_mut(key)
    }

    pub fn lower_bound<Q>(&self, key: &Q) -> Cursor<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.lower_bound(key)
    }

    pub fn upper_bound<Q>(&self, key: &Q) -> Cursor<'_, K, V, C, A>
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.upper_bound(key)
    }

    pub fn equal_range<Q>(&self, key: &Q) -> (Cursor<'_, K, V, C, A>, Cursor<'_, K, V, C, A>)
    where
        K: Borrow<Q>,
        C: Compare<Q>,
        Q: ?Sized,
    {
        self.tree.equal_range(key)
    }

    pub fn begin(&self) -> Cursor<'_, K, V, C, A> {
        self.tree.begin()
    }

    pub fn end(&self) -> Cursor<'_, K, V, C, A> {
        self.tree.end()
    }

    /// Erases the entry at `position`, see [`AvlTree::erase`].
    pub fn erase(&mut self, position: Position) -> usize {
        self.tree.erase(position)
    }

    /// Erases the entries in `first..last`, see [`AvlTree::erase_range`].
    pub fn erase_range(&mut self, first: Position, last: Position) -> usize {
        self.tree.erase_range(first, last)
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Exchanges the contents of two maps in constant time.
    pub fn swap(&mut self, other: &mut Self) {
        self.tree.swap(&mut other.tree);
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        self.tree.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.tree.iter_mut()
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        self.tree.keys()
    }

    pub fn values(&self) -> Values<'_, K, V> {
        self.tree.values()
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        self.tree.values_mut()
    }
}

impl<K, V, C, A> Clone for AvlMap<K, V, C, A>
where
    K: Clone,
    V: Clone,
    C: Compare<K> + Clone,
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.tree.clone_from(&source.tree);
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C, A: Allocator> fmt::Debug for AvlMap<K, V, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.tree, f)
    }
}

impl<K: PartialEq, V: PartialEq, C, A: Allocator> PartialEq for AvlMap<K, V, C, A> {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
    }
}

impl<K: Eq, V: Eq, C, A: Allocator> Eq for AvlMap<K, V, C, A> {}

impl<K: PartialOrd, V: PartialOrd, C, A: Allocator> PartialOrd for AvlMap<K, V, C, A> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        self.tree.partial_cmp(&other.tree)
    }
}

impl<K: Ord, V: Ord, C, A: Allocator> Ord for AvlMap<K, V, C, A> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.tree.cmp(&other.tree)
    }
}

impl<K: Hash, V: Hash, C, A: Allocator> Hash for AvlMap<K, V, C, A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tree.hash(state);
    }
}

impl<K, V, C: Compare<K>, A: Allocator> Extend<(K, V)> for AvlMap<K, V, C, A> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.tree.extend(iter);
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            tree: AvlTree::from_iter(iter),
        }
    }
}

impl<K, V, C, A: Allocator> From<AvlTree<K, V, C, A>> for AvlMap<K, V, C, A> {
    fn from(tree: AvlTree<K, V, C, A>) -> Self {
        Self { tree }
    }
}

impl<'a, K, V, C, A: Allocator> IntoIterator for &'a AvlMap<K, V, C, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.tree.iter()
    }
}

impl<'a, K, V, C, A: Allocator> IntoIterator for &'a mut AvlMap<K, V, C, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.tree.iter_mut()
    }
}

impl<K, V, C, A: Allocator> IntoIterator for AvlMap<K, V, C, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, C, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.tree.into_iter()
    }
}
