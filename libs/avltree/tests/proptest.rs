#![feature(allocator_api)]

mod common;

use std::collections::BTreeMap;

use avltree::AvlTree;
use proptest::prelude::*;

use crate::common::{keys, keys_rev};

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, u32),
    Erase(u16),
    EraseAt(u16),
    PopFirst,
    PopLast,
}

fn op() -> impl Strategy<Value = Op> {
    // a small key space makes duplicate inserts and erasures of present keys likely
    prop_oneof![
        4 => (0..256u16, any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (0..256u16).prop_map(Op::Erase),
        2 => (0..256u16).prop_map(Op::EraseAt),
        1 => Just(Op::PopFirst),
        1 => Just(Op::PopLast),
    ]
}

fn unique_keys(len: impl Into<proptest::collection::SizeRange>) -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::hash_set(any::<u32>(), len).prop_map(|set| set.into_iter().collect())
}

proptest! {
    #[test]
    fn matches_btreemap(ops in proptest::collection::vec(op(), 1..600)) {
        let mut tree: AvlTree<u16, u32> = AvlTree::try_new().unwrap();
        let mut oracle = BTreeMap::new();

        for op in ops {
            tracing::debug!(?op);
            match op {
                Op::Insert(key, value) => {
                    let (cursor, inserted) = tree.insert(key, value).unwrap();
                    prop_assert_eq!(cursor.get().map(|(k, _)| *k), Some(key));
                    prop_assert_eq!(inserted, !oracle.contains_key(&key));
                    oracle.entry(key).or_insert(value);
                }
                Op::Erase(key) => {
                    prop_assert_eq!(tree.remove(&key), oracle.remove_entry(&key));
                }
                Op::EraseAt(key) => {
                    let position = tree.lower_bound(&key).position();
                    let expected = oracle.range(key..).next().map(|(k, _)| *k);
                    prop_assert_eq!(tree.erase(position), usize::from(expected.is_some()));
                    if let Some(k) = expected {
                        oracle.remove(&k);
                    }
                }
                Op::PopFirst => {
                    prop_assert_eq!(tree.pop_first(), oracle.pop_first());
                }
                Op::PopLast => {
                    prop_assert_eq!(tree.pop_last(), oracle.pop_last());
                }
            }

            tree.assert_valid();
            prop_assert_eq!(tree.size(), oracle.len());
        }

        prop_assert!(tree.iter().map(|(k, v)| (*k, *v)).eq(oracle.into_iter()));
    }

    #[test]
    fn traversal_order(input in unique_keys(0..500)) {
        let tree: AvlTree<u32, ()> = input.iter().map(|k| (*k, ())).collect();
        tree.assert_valid();

        let forward = keys(&tree);
        let mut sorted = input.clone();
        sorted.sort_unstable();
        prop_assert_eq!(&forward, &sorted);

        let mut backward = keys_rev(&tree);
        backward.reverse();
        prop_assert_eq!(forward, backward);

        // AVL trees are at most ~1.44 log2(n + 2) high, 5/3 of the rounded up log is above that
        let bound = 5 * ((input.len() + 2).ilog2() + 1) / 3;
        prop_assert!(tree.height() <= i32::try_from(bound).unwrap());
    }

    #[test]
    fn round_trip((input, order) in unique_keys(1..500).prop_flat_map(|k| (Just(k.clone()), Just(k).prop_shuffle()))) {
        let mut tree: AvlTree<u32, u32> = AvlTree::try_new().unwrap();
        for key in &input {
            prop_assert!(tree.insert(*key, !*key).unwrap().1);
        }
        tree.assert_valid();

        for key in order {
            let position = tree.find(&key).position();
            prop_assert_eq!(tree.erase(position), 1);
            tree.assert_valid();
        }

        prop_assert!(tree.is_empty());
        prop_assert!(tree.begin() == tree.end());
    }

    #[test]
    fn duplicates_are_rejected(input in unique_keys(1..200), pick in any::<prop::sample::Index>()) {
        let mut tree: AvlTree<u32, u32> = input.iter().map(|k| (*k, 0)).collect();
        let key = input[pick.index(input.len())];
        let before = tree.find(&key).position();

        let (cursor, inserted) = tree.insert(key, 1).unwrap();
        prop_assert!(!inserted);
        prop_assert_eq!(cursor.position(), before);
        prop_assert_eq!(tree.size(), input.len());
        prop_assert_eq!(tree.find(&key).value(), Some(&0));
    }
}
