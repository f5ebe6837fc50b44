// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// A strict weak ordering over `T`.
///
/// The tree only ever asks whether one key is *less* than another. Two keys `a` and `b` are
/// considered equivalent iff `!less(a, b) && !less(b, a)`, no three-way comparison is assumed.
///
/// Implementations must be irreflexive (`less(a, a)` is always `false`) and transitive, and
/// equivalence must be transitive as well. Violating this won't cause memory unsafety, but
/// lookups may miss entries and [`AvlTree::assert_valid`] will fail.
///
/// Any `Fn(&T, &T) -> bool` closure is a comparator:
///
/// ```rust
/// # #![feature(allocator_api)]
/// use avltree::AvlTree;
///
/// let mut tree = AvlTree::try_with_comparator(|a: &u32, b: &u32| a > b).unwrap();
/// for i in 0..4u32 {
///     tree.insert(i, ()).unwrap();
/// }
///
/// let keys: Vec<_> = tree.iter().map(|(k, _)| *k).collect();
/// assert_eq!(keys, [3, 2, 1, 0]);
/// ```
///
/// [`AvlTree::assert_valid`]: crate::AvlTree::assert_valid
pub trait Compare<T: ?Sized> {
    /// Returns `true` if `a` is ordered strictly before `b`.
    fn less(&self, a: &T, b: &T) -> bool;

    /// Returns `true` if neither key is ordered before the other.
    #[inline]
    fn equivalent(&self, a: &T, b: &T) -> bool {
        !self.less(a, b) && !self.less(b, a)
    }
}

/// The natural ordering of `T`, as given by its [`Ord`] implementation.
///
/// This is the default comparator and the only one that allows lookups through a borrowed
/// form of the key (e.g. a `&str` for a `String` key).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Natural;

impl<T: Ord + ?Sized> Compare<T> for Natural {
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        a < b
    }
}

/// Flips the ordering of the wrapped comparator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reversed<C>(pub C);

impl<T: ?Sized, C: Compare<T>> Compare<T> for Reversed<C> {
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        self.0.less(b, a)
    }
}

impl<T: ?Sized, F> Compare<T> for F
where
    F: Fn(&T, &T) -> bool,
{
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        self(a, b)
    }
}
