// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::AvlTree;
use crate::node::NodeRef;
use crate::utils::Side;
use core::alloc::Allocator;
use core::fmt;

/// Renders an [`AvlTree`] in [graphviz format](https://graphviz.org/doc/info/lang.html).
pub struct Dot<'a, K, V, C, A: Allocator> {
    pub(crate) tree: &'a AvlTree<K, V, C, A>,
}

impl<K, V, C, A> Dot<'_, K, V, C, A>
where
    K: fmt::Debug,
    A: Allocator,
{
    fn node_fmt(&self, f: &mut fmt::Formatter, node: NodeRef) -> fmt::Result {
        let pool = &self.tree.pool;
        let links = pool.node(node);
        let id = node.index();

        // Safety: `node` was reached from the root, so it is live and not the sentinel
        let (key, _) = unsafe { links.key_value() };
        let shape = if links.is_leaf() { "box" } else { "ellipse" };
        f.write_fmt(format_args!(
            r#"{id} [label="key = {key:?} height = {height}", shape={shape}];"#,
            height = links.height,
        ))?;

        if let Some(up) = links.parent {
            f.write_fmt(format_args!(r#"{id} -> {} [label="up"];"#, up.index()))?;
        }

        for side in [Side::Left, Side::Right] {
            if let Some(child) = links.child(side) {
                f.write_fmt(format_args!(r#"{id} -> {} [label="{side}"];"#, child.index()))?;
                self.node_fmt(f, child)?;
            }
        }

        Ok(())
    }
}

impl<K, V, C, A> fmt::Display for Dot<'_, K, V, C, A>
where
    K: fmt::Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("digraph {")?;
        f.write_fmt(format_args!(
            r#"{} [label="sentinel", shape=point];"#,
            NodeRef::SENTINEL.index()
        ))?;

        if let Some(root) = self.tree.pool.node(NodeRef::SENTINEL).left {
            f.write_fmt(format_args!(
                r#"{} -> {} [label="root"];"#,
                NodeRef::SENTINEL.index(),
                root.index()
            ))?;
            self.node_fmt(f, root)?;
        }

        f.write_str("}")
    }
}

impl<K, V, C, A> fmt::Debug for Dot<'_, K, V, C, A>
where
    K: fmt::Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use crate::AvlTree;
    use alloc::string::ToString;

    #[test]
    fn renders_every_node() {
        let tree: AvlTree<u32, ()> = (1..=3).map(|i| (i, ())).collect();
        let dot = tree.dot().to_string();

        assert!(dot.starts_with("digraph {"));
        assert!(dot.ends_with('}'));
        for key in 1..=3 {
            assert!(dot.contains(&alloc::format!("key = {key} ")));
        }
    }
}
