#![feature(allocator_api)]

mod common;

use std::alloc::{AllocError, Allocator, Global, Layout};
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use avltree::{AvlMap, AvlTree, Natural};

use crate::common::{init_tracing, keys};

/// An allocator that fails once a fixed number of allocations have been handed out.
#[derive(Clone, Default)]
struct Budget {
    remaining: Rc<Cell<usize>>,
    live: Rc<Cell<isize>>,
}

impl Budget {
    fn new(allocations: usize) -> Self {
        let budget = Self::default();
        budget.remaining.set(allocations);
        budget
    }
}

// Safety: every block is handed out and released by `Global`
unsafe impl Allocator for Budget {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let remaining = self.remaining.get();
        if remaining == 0 {
            return Err(AllocError);
        }
        let block = Global.allocate(layout)?;
        self.remaining.set(remaining - 1);
        self.live.set(self.live.get() + 1);
        Ok(block)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.live.set(self.live.get() - 1);
        // Safety: `ptr` was allocated by `Global` through `allocate`
        unsafe { Global.deallocate(ptr, layout) }
    }
}

#[test]
fn construction_fails_without_memory() {
    assert!(AvlTree::<u32, u32, Natural, _>::try_new_in(Natural, Budget::new(0)).is_err());
    assert!(AvlMap::<u32, u32, Natural, _>::try_new_in(Natural, Budget::new(0)).is_err());
}

#[test]
fn failed_insert_leaves_tree_unchanged() {
    init_tracing();

    let budget = Budget::new(1);
    let mut tree = AvlTree::try_new_in(Natural, budget.clone()).unwrap();

    // the first block holds the sentinel and three nodes
    for key in [2, 1, 3] {
        assert!(tree.insert(key, key).unwrap().1);
    }

    assert_eq!(tree.insert(4, 4).map(|(_, inserted)| inserted), Err(AllocError));
    tree.assert_valid();
    assert_eq!(tree.size(), 3);
    assert_eq!(keys(&tree), [1, 2, 3]);

    // duplicates don't allocate
    assert_eq!(tree.insert(2, 20).map(|(_, inserted)| inserted), Ok(false));
    assert_eq!(tree.find(&2).value(), Some(&2));

    // freed slots are reused without asking the allocator
    assert_eq!(tree.remove(&1), Some((1, 1)));
    assert!(tree.insert(4, 4).unwrap().1);
    tree.assert_valid();
    assert_eq!(keys(&tree), [2, 3, 4]);

    drop(tree);
    assert_eq!(budget.live.get(), 0);
}

#[test]
fn failed_clone_reports_error() {
    let budget = Budget::new(3);
    let mut tree = AvlTree::try_new_in(Natural, budget.clone()).unwrap();
    tree.try_extend((0..5).map(|k| (k, k))).unwrap();
    assert_eq!(budget.remaining.get(), 1);

    // the copy gets its first block, but can't grow it
    assert!(tree.try_clone().is_err());
    tree.assert_valid();
    assert_eq!(keys(&tree), [0, 1, 2, 3, 4]);

    drop(tree);
    assert_eq!(budget.live.get(), 0);
}

#[test]
fn map_insert_reports_error() {
    let mut map = AvlMap::try_new_in(Natural, Budget::new(1)).unwrap();
    for key in 0..3 {
        assert_eq!(map.insert(key, ()), Ok(true));
    }

    assert_eq!(map.insert(3, ()), Err(AllocError));
    assert_eq!(map.insert(0, ()), Ok(false));
    assert!(map.get_or_insert_with(3, || ()).is_err());
    assert_eq!(map.len(), 3);
}
