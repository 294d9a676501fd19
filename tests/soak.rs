// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Randomized insert/remove workload, small capacities to force frequent
//! splits/merges, checked against a `BTreeSet` shadow model after every
//! operation.

use bptree::{BPlusTree, TreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tempfile::tempdir;

#[test]
fn randomized_workload_matches_shadow_model() {
    let dir = tempdir().unwrap();
    let config = TreeConfig::new(2, 3).unwrap();
    let mut tree: BPlusTree<i64, i64> = BPlusTree::open(dir.path().join("soak"), config).unwrap();
    let mut model: BTreeSet<(i64, i64)> = BTreeSet::new();

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let key_space = 1..=20i64;
    let value_space = 1..=5i64;

    for _ in 0..2000 {
        let key = rng.gen_range(key_space.clone());
        let value = rng.gen_range(value_space.clone());

        if rng.gen_bool(0.65) {
            tree.insert(key, value).unwrap();
            model.insert((key, value));
        } else {
            tree.remove(key, value).unwrap();
            model.remove(&(key, value));
        }

        let expected: Vec<i64> = model
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(tree.find(&key).unwrap(), expected, "find({key}) diverged from model");
    }

    let chain: Vec<(i64, i64)> = tree
        .entries()
        .unwrap()
        .into_iter()
        .map(|kv| (kv.key, kv.value))
        .collect();
    let expected_chain: Vec<(i64, i64)> = model.into_iter().collect();
    assert_eq!(chain, expected_chain, "leaf chain diverged from model");

    if chain.is_empty() {
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.head(), -1);
    } else {
        assert!(tree.height() >= 1);
        assert_ne!(tree.head(), -1);
    }
}

#[test]
fn randomized_workload_with_wider_capacities() {
    let dir = tempdir().unwrap();
    let config = TreeConfig::new(4, 4).unwrap();
    let mut tree: BPlusTree<i64, i64> = BPlusTree::open(dir.path().join("soak_wide"), config).unwrap();
    let mut model: BTreeSet<(i64, i64)> = BTreeSet::new();

    let mut rng = StdRng::seed_from_u64(0xFACADE);

    for _ in 0..1500 {
        let key = rng.gen_range(1..=100i64);
        let value = rng.gen_range(1..=10i64);

        if rng.gen_bool(0.7) {
            tree.insert(key, value).unwrap();
            model.insert((key, value));
        } else {
            tree.remove(key, value).unwrap();
            model.remove(&(key, value));
        }
    }

    let chain: Vec<(i64, i64)> = tree
        .entries()
        .unwrap()
        .into_iter()
        .map(|kv| (kv.key, kv.value))
        .collect();
    let expected_chain: Vec<(i64, i64)> = model.into_iter().collect();
    assert_eq!(chain, expected_chain);
}
