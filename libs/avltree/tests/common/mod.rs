#![allow(unused, reason = "not used by all tests")]

use avltree::{AvlTree, Compare};
use core::alloc::Allocator;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to the test output, filtered by `RUST_LOG`.
///
/// Safe to call from every test, only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn keys<K: Clone, V, C, A: Allocator>(tree: &AvlTree<K, V, C, A>) -> Vec<K> {
    tree.keys().cloned().collect()
}

/// Collects keys by stepping a cursor backwards from the end position.
pub fn keys_rev<K: Clone, V, C: Compare<K>, A: Allocator>(tree: &AvlTree<K, V, C, A>) -> Vec<K> {
    let mut out = Vec::new();
    let mut cursor = tree.end();
    cursor.move_prev();
    while let Some(key) = cursor.key() {
        out.push(key.clone());
        cursor.move_prev();
    }
    out
}
