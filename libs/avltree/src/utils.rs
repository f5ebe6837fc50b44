// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::node::{NodePool, NodeRef};
use core::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

impl Side {
    pub(crate) fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Returns the leftmost node of the subtree rooted at `curr`.
pub(crate) fn find_minimum<K, V>(pool: &NodePool<K, V>, mut curr: NodeRef) -> NodeRef {
    while let Some(left) = pool.node(curr).left {
        curr = left;
    }

    curr
}

/// Returns the rightmost node of the subtree rooted at `curr`.
pub(crate) fn find_maximum<K, V>(pool: &NodePool<K, V>, mut curr: NodeRef) -> NodeRef {
    while let Some(right) = pool.node(curr).right {
        curr = right;
    }

    curr
}

/// Height of an optional subtree, `-1` for an absent one.
#[inline]
pub(crate) fn link_height<K, V>(pool: &NodePool<K, V>, link: Option<NodeRef>) -> i32 {
    link.map_or(-1, |node| i32::from(pool.node(node).height))
}
