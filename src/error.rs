// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the B+-Tree store.
//!
//! Provides structured error handling with detailed context for debugging.

use std::fmt;

/// Standard Result type for all B+-Tree operations.
pub type BptResult<T> = Result<T, BptError>;

/// Error types produced by the paged file store and the B+-Tree engine.
#[derive(Debug, Clone)]
pub enum BptError {
    /// I/O error during file operations.
    Io { operation: String, reason: String },

    /// Serialisation error.
    Serialization { reason: String },

    /// Deserialisation error.
    Deserialization { reason: String },

    /// A record read from a paged file failed its checksum or is otherwise
    /// unreadable.
    CorruptedRecord { offset: i64, reason: String },

    /// An internal invariant was violated (unexpected sentinel during
    /// descent, corrupted header slot, fanout bound broken). Fatal.
    InvariantViolation { reason: String },

    /// `TreeConfig` was constructed with an out-of-range capacity.
    InvalidConfig { reason: String },

    /// A record's encoded form exceeds the paged file's fixed slot width.
    RecordTooLarge {
        offset: i64,
        limit: usize,
        actual: usize,
    },
}

impl fmt::Display for BptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { operation, reason } => {
                write!(f, "I/O error during '{}': {}", operation, reason)
            }
            Self::Serialization { reason } => {
                write!(f, "serialisation error: {}", reason)
            }
            Self::Deserialization { reason } => {
                write!(f, "deserialisation error: {}", reason)
            }
            Self::CorruptedRecord { offset, reason } => {
                write!(f, "corrupted record at offset {}: {}", offset, reason)
            }
            Self::InvariantViolation { reason } => {
                write!(f, "invariant violation: {}", reason)
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid tree configuration: {}", reason)
            }
            Self::RecordTooLarge {
                offset,
                limit,
                actual,
            } => write!(
                f,
                "record at offset {} encodes to {} bytes, exceeds slot width {}",
                offset, actual, limit
            ),
        }
    }
}

impl std::error::Error for BptError {}
