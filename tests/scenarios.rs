// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios against the library API, `L_MAX = 2, I_MAX = 4`.

use bptree::{BPlusTree, TreeConfig};
use tempfile::tempdir;

fn small_tree(dir: &tempfile::TempDir, name: &str) -> BPlusTree<i64, i64> {
    let config = TreeConfig::new(2, 4).unwrap();
    BPlusTree::open(dir.path().join(name), config).unwrap()
}

#[test]
fn scenario_1_single_insert() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s1");
    tree.insert(5, 50).unwrap();
    assert_eq!(tree.find(&5).unwrap(), vec![50]);
}

#[test]
fn scenario_2_multiple_values_per_key() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s2");
    tree.insert(5, 50).unwrap();
    tree.insert(5, 60).unwrap();
    tree.insert(5, 70).unwrap();
    assert_eq!(tree.find(&5).unwrap(), vec![50, 60, 70]);
}

#[test]
fn scenario_3_cascading_split_grows_height() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s3");
    for i in 1..=5 {
        tree.insert(i, i).unwrap();
    }
    assert_eq!(tree.find(&3).unwrap(), vec![3]);
    assert_eq!(tree.height(), 2);
}

#[test]
fn scenario_4_remove_middle_entry() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s4");
    tree.insert(1, 1).unwrap();
    tree.insert(2, 2).unwrap();
    tree.insert(3, 3).unwrap();
    tree.remove(2, 2).unwrap();

    assert_eq!(tree.find(&2).unwrap(), Vec::<i64>::new());
    assert_eq!(tree.find(&1).unwrap(), vec![1]);
    assert_eq!(tree.find(&3).unwrap(), vec![3]);
}

#[test]
fn scenario_5_remove_evens_leaves_odds_in_chain_order() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s5");
    for i in 1..=9 {
        tree.insert(i, i).unwrap();
    }
    for i in (2..=9).step_by(2) {
        tree.remove(i, i).unwrap();
    }

    for i in 1..=9 {
        let expected = if i % 2 == 1 { vec![i] } else { vec![] };
        assert_eq!(tree.find(&i).unwrap(), expected, "find({i})");
    }

    let chain: Vec<(i64, i64)> = tree
        .entries()
        .unwrap()
        .into_iter()
        .map(|kv| (kv.key, kv.value))
        .collect();
    assert_eq!(chain, vec![(1, 1), (3, 3), (5, 5), (7, 7), (9, 9)]);
}

#[test]
fn scenario_6_remove_then_reinsert() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s6");
    tree.insert(7, 1).unwrap();
    tree.insert(7, 2).unwrap();
    tree.remove(7, 1).unwrap();
    assert_eq!(tree.find(&7).unwrap(), vec![2]);

    tree.insert(7, 1).unwrap();
    assert_eq!(tree.find(&7).unwrap(), vec![1, 2]);
}

#[test]
fn empty_tree_round_trips_to_one_leaf_one_level() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s7");
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.head(), -1);

    tree.insert(1, 1).unwrap();
    assert_eq!(tree.height(), 1);
    assert_ne!(tree.head(), -1);
}

#[test]
fn removing_last_entry_resets_to_empty() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s8");
    tree.insert(1, 1).unwrap();
    tree.remove(1, 1).unwrap();
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.find(&1).unwrap(), Vec::<i64>::new());
    assert_eq!(tree.entries().unwrap().len(), 0);
}

#[test]
fn idempotent_insert_of_duplicate_pair() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s9");
    tree.insert(3, 30).unwrap();
    tree.insert(3, 30).unwrap();
    assert_eq!(tree.find(&3).unwrap(), vec![30]);
}

#[test]
fn remove_of_absent_pair_is_noop() {
    let dir = tempdir().unwrap();
    let mut tree = small_tree(&dir, "s10");
    tree.insert(3, 30).unwrap();
    tree.remove(3, 99).unwrap();
    assert_eq!(tree.find(&3).unwrap(), vec![30]);
}
