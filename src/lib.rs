// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! A persistent, disk-backed B+-Tree ordered multimap.
//!
//! `BPlusTree<K, V>` stores `(Key, Value)` pairs as a single composite sort
//! key, giving every key zero or more values in ascending `Value` order.
//! State lives in two memory-mapped paged files, `F.index` and `F.block`,
//! and survives process restarts: reopening the same filename stem resumes
//! exactly where the tree left off.
//!
//! ```rust
//! use bptree::{BPlusTree, TreeConfig};
//! use tempfile::tempdir;
//!
//! # fn main() -> Result<(), bptree::BptError> {
//! let dir = tempdir().unwrap();
//! let mut tree: BPlusTree<i64, i64> =
//!     BPlusTree::open(dir.path().join("demo"), TreeConfig::default())?;
//!
//! tree.insert(5, 50)?;
//! tree.insert(5, 51)?;
//! assert_eq!(tree.find(&5)?, vec![50, 51]);
//!
//! tree.remove(5, 50)?;
//! assert_eq!(tree.find(&5)?, vec![51]);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod hash;
mod node;
mod paged_file;
mod search;
mod tree;

pub use config::{TreeConfig, DEFAULT_PAYLOAD_CAP, MIN_INDEX_MAX, MIN_LEAF_MAX};
pub use error::{BptError, BptResult};
pub use hash::fnv1a64;
pub use node::KeyValue;
pub use tree::BPlusTree;
