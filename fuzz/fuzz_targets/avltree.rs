#![no_main]

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Bound;

use avltree::AvlTree;
use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Action<Key, Value> {
    Clear,
    Insert(Key, Value),
    Get(Key),
    Remove(Key),
    EraseRange(Key, Key),
    LowerBound(Key),
    UpperBound(Key),
    Clone,
    Cursor(Option<Key>, Vec<CursorAction>),
    CursorMut(Option<Key>, Vec<CursorMutAction<Value>>),
}

#[derive(Arbitrary, Debug)]
enum CursorAction {
    Next,
    Prev,
}

#[derive(Arbitrary, Debug)]
enum CursorMutAction<Value> {
    Next,
    Prev,
    Replace(Value),
    Remove,
}

#[derive(Arbitrary, Debug)]
enum KeyType<Value> {
    U8(Vec<Action<u8, Value>>),
    U16(Vec<Action<u16, Value>>),
    U64(Vec<Action<u64, Value>>),
}

#[derive(Arbitrary, Debug)]
enum ValueType {
    Empty(KeyType<()>),
    U8(KeyType<u8>),
    U64(KeyType<u64>),
}

/// Index of `key` in the oracle's sorted key list, i.e. the position `lower_bound` should land on.
fn lower_index<K: Ord + Copy, V>(map: &BTreeMap<K, V>, key: K) -> usize {
    map.range(..key).count()
}

fn run<'a, Key, Value>(actions: Vec<Action<Key, Value>>)
where
    Key: Ord + Arbitrary<'a> + Debug + Copy,
    Value: Eq + Arbitrary<'a> + Debug + Copy,
{
    let mut tree: AvlTree<Key, Value> = AvlTree::try_new().unwrap();
    let mut map: BTreeMap<Key, Value> = BTreeMap::new();

    for action in actions {
        match action {
            Action::Clear => {
                tree.clear();
                map.clear();
            }
            Action::Insert(key, value) => {
                let (cursor, inserted) = tree.insert(key, value).unwrap();
                assert_eq!(inserted, !map.contains_key(&key));
                let value = *map.entry(key).or_insert(value);
                assert_eq!(cursor.get(), Some((&key, &value)));
            }
            Action::Get(key) => {
                assert_eq!(tree.find(&key).value(), map.get(&key));
            }
            Action::Remove(key) => {
                assert_eq!(tree.remove(&key), map.remove_entry(&key));
            }
            Action::EraseRange(from, to) => {
                let (from, to) = (from.min(to), from.max(to));
                let first = tree.lower_bound(&from).position();
                let last = tree.lower_bound(&to).position();

                let doomed: Vec<_> = map.range(from..to).map(|(k, _)| *k).collect();
                assert_eq!(tree.erase_range(first, last), doomed.len());
                for key in doomed {
                    map.remove(&key);
                }
            }
            Action::LowerBound(key) => {
                let expected = map.range(key..).next();
                assert_eq!(tree.lower_bound(&key).get(), expected);
            }
            Action::UpperBound(key) => {
                let expected = map.range((Bound::Excluded(key), Bound::Unbounded)).next();
                assert_eq!(tree.upper_bound(&key).get(), expected);
            }
            Action::Clone => {
                let copy = tree.clone();
                copy.assert_valid();
                assert_eq!(copy, tree);
            }
            Action::Cursor(at, actions) => {
                let keys: Vec<_> = map.keys().copied().collect();
                let (mut cursor, mut index) = match at {
                    Some(at) => (tree.lower_bound(&at), lower_index(&map, at)),
                    None => (tree.begin(), 0),
                };

                for action in actions {
                    // index `keys.len()` is the end position, stepping is circular through it
                    match action {
                        CursorAction::Next => {
                            cursor.move_next();
                            index = (index + 1) % (keys.len() + 1);
                        }
                        CursorAction::Prev => {
                            cursor.move_prev();
                            index = (index + keys.len()) % (keys.len() + 1);
                        }
                    }

                    assert_eq!(cursor.key(), keys.get(index));
                    assert_eq!(cursor.is_end(), index == keys.len());
                }
            }
            Action::CursorMut(at, actions) => {
                let mut keys: Vec<_> = map.keys().copied().collect();
                let (mut cursor, mut index) = match at {
                    Some(at) => (tree.lower_bound_mut(&at), lower_index(&map, at)),
                    None => (tree.begin_mut(), 0),
                };

                for action in actions {
                    match action {
                        CursorMutAction::Next => {
                            cursor.move_next();
                            index = (index + 1) % (keys.len() + 1);
                        }
                        CursorMutAction::Prev => {
                            cursor.move_prev();
                            index = (index + keys.len()) % (keys.len() + 1);
                        }
                        CursorMutAction::Replace(value) => {
                            if let Some((key, slot)) = cursor.get_mut() {
                                *slot = value;
                                map.insert(*key, value);
                            }
                        }
                        CursorMutAction::Remove => {
                            let removed = cursor.remove_current();
                            if index == keys.len() {
                                assert_eq!(removed, None);
                            } else {
                                let key = keys.remove(index);
                                assert_eq!(removed, map.remove_entry(&key));
                            }
                        }
                    }

                    assert_eq!(cursor.get().map(|(k, _)| k), keys.get(index));
                    assert_eq!(cursor.is_end(), index == keys.len());
                }
            }
        }

        tree.assert_valid();
        assert_eq!(tree.is_empty(), map.is_empty());
        assert!(tree.iter().eq(map.iter()));
        assert!(tree.iter().rev().eq(map.iter().rev()));
    }
}

fn dispatch_by_key<'a, Value: Eq + Arbitrary<'a> + Debug + Copy>(actions: KeyType<Value>) {
    match actions {
        KeyType::U8(actions) => run(actions),
        KeyType::U16(actions) => run(actions),
        KeyType::U64(actions) => run(actions),
    }
}

fuzz_target!(|actions: ValueType| {
    match actions {
        ValueType::Empty(actions) => dispatch_by_key(actions),
        ValueType::U8(actions) => dispatch_by_key(actions),
        ValueType::U64(actions) => dispatch_by_key(actions),
    }
});
