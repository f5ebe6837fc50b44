#![feature(allocator_api)]

mod common;

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use avltree::{AvlMap, AvlTree, Natural, Reversed};

use crate::common::init_tracing;

#[test]
fn insert_never_overwrites() {
    init_tracing();

    let mut map: AvlMap<&str, u32> = AvlMap::try_new().unwrap();
    assert_eq!(map.insert("a", 1), Ok(true));
    assert_eq!(map.insert("a", 2), Ok(false));
    assert_eq!(map.get("a"), Some(&1));

    // updates go through the existing entry
    *map.get_mut("a").unwrap() = 2;
    assert_eq!(map.get("a"), Some(&2));
    *map.get_or_insert_with("a", || 100).unwrap() += 1;
    assert_eq!(map.get("a"), Some(&3));
}

#[test]
fn counts_words() {
    let text = "the quick brown fox jumps over the lazy dog the end";

    let mut map: AvlMap<&str, usize> = AvlMap::try_new().unwrap();
    let mut oracle = BTreeMap::new();
    for word in text.split_whitespace() {
        *map.get_or_insert_default(word).unwrap() += 1;
        *oracle.entry(word).or_insert(0) += 1;
    }

    assert_eq!(map.len(), oracle.len());
    assert!(map.iter().eq(oracle.iter()));
    assert_eq!(map.get("the"), Some(&3));
    assert_eq!(map.count("fox"), 1);
    assert_eq!(map.first_key_value(), Some((&"brown", &1)));
    assert_eq!(map.last_key_value(), Some((&"the", &3)));
}

#[test]
fn cursors_and_erase() {
    let mut map: AvlMap<u32, char> = (0..).zip('a'..='j').collect();

    assert_eq!(map.lower_bound(&3).value(), Some(&'d'));
    assert_eq!(map.upper_bound(&3).value(), Some(&'e'));
    assert_eq!(map.find(&42).value(), None);

    let (lower, upper) = map.equal_range(&9);
    assert_eq!(lower.key(), Some(&9));
    assert!(upper == map.end());

    let from = map.find(&2).position();
    let to = map.find(&8).position();
    assert_eq!(map.erase_range(from, to), 6);
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), [0, 1, 8, 9]);

    let first = map.begin().position();
    assert_eq!(map.erase(first), 1);
    assert_eq!(map.erase(first), 0);

    if let Some(value) = map.find_mut(&8).into_mut() {
        *value = 'z';
    }
    assert_eq!(map.values().collect::<String>(), "bzj");
    map.as_tree().assert_valid();
}

#[test]
fn copy_and_assign() {
    let source: AvlMap<u32, String> = (0..20).map(|i| (i, i.to_string())).collect();

    let mut copy = source.clone();
    assert_eq!(copy, source);
    copy.remove(&3);
    assert_ne!(copy, source);
    assert!(copy > source, "[.., 4] sorts after [.., 3]");

    let mut assigned: AvlMap<u32, String> = AvlMap::try_new().unwrap();
    assigned.insert(100, "x".into()).unwrap();
    assigned.clone_from(&source);
    assert_eq!(assigned, source);

    let mut other: AvlMap<u32, String> = AvlMap::try_new().unwrap();
    other.swap(&mut assigned);
    assert!(assigned.is_empty());
    assert_eq!(other.len(), 20);

    assert_eq!(
        format!("{:?}", AvlMap::from_iter([(2, 'b'), (1, 'a')])),
        r#"{1: 'a', 2: 'b'}"#
    );
}

#[test]
fn reversed_map() {
    let mut map = AvlMap::try_with_comparator(Reversed(Natural)).unwrap();
    map.extend((0..5).map(|i| (i, i * i)));

    assert_eq!(map.keys().copied().collect::<Vec<_>>(), [4, 3, 2, 1, 0]);
    assert_eq!(map.pop_first(), Some((4, 16)));
    assert_eq!(map.pop_last(), Some((0, 0)));
    assert_eq!(map.remove_entry(&2), Some((2, 4)));
    assert_eq!(map.into_iter().collect::<Vec<_>>(), [(3, 9), (1, 1)]);
}

#[test]
fn tree_converts_into_map() {
    let mut tree: AvlTree<u8, u8> = AvlTree::try_new().unwrap();
    tree.insert(1, 1).unwrap();

    let mut map = AvlMap::from(tree);
    for (_, value) in &mut map {
        *value += 1;
    }
    for value in map.values_mut() {
        *value *= 10;
    }
    assert_eq!(map.iter().collect::<Vec<_>>(), [(&1, &20)]);
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn observers_and_hash() {
    let map: AvlMap<u32, u32> = (0..10).map(|i| (i, i)).collect();

    assert!(map.max_size() >= map.len());
    assert_eq!(map.max_size(), map.as_tree().max_size());
    let _: &std::alloc::Global = map.allocator();

    // equal maps hash equally, regardless of insertion order
    let shuffled: AvlMap<u32, u32> = (0..10).rev().map(|i| (i, i)).collect();
    assert_eq!(map, shuffled);
    assert_eq!(hash_of(&map), hash_of(&shuffled));
    assert_eq!(hash_of(&map), hash_of(map.as_tree()));

    let mut changed = map.clone();
    *changed.get_mut(&3).unwrap() = 30;
    assert_ne!(hash_of(&map), hash_of(&changed));
}
