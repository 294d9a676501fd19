// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Typed, fixed-record paged file storage.
//!
//! `PagedFile<T>` backs a single filesystem file with a small header of
//! `H` caller-visible metadata slots followed by a sequence of fixed-width
//! record slots. Appends are the only allocation; offsets returned by
//! [`PagedFile::write`] are stable for the lifetime of the file and round
//! trip through [`PagedFile::read`] / [`PagedFile::update`].
//!
//! ## File Layout
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ caller slot 1 (i64) .. caller slot H (i64)     │
//! │ private allocation cursor (i64)                │
//! ├───────────────────────────────────────────────┤
//! │ record 0: [len:u32][crc32:u32][payload, padded]│
//! │ record 1: [len:u32][crc32:u32][payload, padded]│
//! │ ...                                             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The allocation cursor is a paged-file implementation detail (it is not
//! one of the `H` slots the caller addresses via [`PagedFile::get_info`] /
//! [`PagedFile::write_info`]) — it lets the file track where the next
//! `write` should append across process restarts.

use crate::error::{BptError, BptResult};
use memmap2::MmapMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const SLOT_WIDTH: usize = 8;
const RECORD_PREFIX: usize = 8; // 4-byte length + 4-byte CRC32
const GROWTH_INCREMENT: u64 = 1024 * 1024;

/// Opaque stable handle to a record, as returned by [`PagedFile::write`].
///
/// Backed by a byte offset into the file; never produced by the caller.
pub type Offset = i64;

/// Sentinel meaning "no offset" / "end of chain" / "empty tree".
pub const NONE: Offset = -1;

/// Typed, fixed-record paged file.
///
/// ## Type Parameters
/// - `T`: record type, must round-trip through `bincode`.
pub struct PagedFile<T> {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    header_slots: usize,
    payload_cap: usize,
    record_slot_size: u64,
    header_region_bytes: u64,
    next_record_index: u64,
    _marker: PhantomData<T>,
}

impl<T> PagedFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Report whether a file with persisted state already exists at `path`.
    pub fn exist(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    /// Open an existing paged file, or create a new one if none exists.
    ///
    /// `header_slots` is `H`, the number of caller-visible metadata slots
    /// (`H >= 2`). `payload_cap` bounds the largest bincode-encoded record
    /// this file will ever store; records that exceed it are rejected with
    /// [`BptError::RecordTooLarge`].
    ///
    /// Per the initialise-only-if-new contract, header slots (and the
    /// allocation cursor) are preserved across restarts: only a genuinely
    /// new file is zero-initialised.
    pub fn open(
        path: impl AsRef<Path>,
        header_slots: usize,
        payload_cap: usize,
    ) -> BptResult<Self> {
        if header_slots < 2 {
            return Err(BptError::InvalidConfig {
                reason: format!("paged file header must have >= 2 slots, got {header_slots}"),
            });
        }

        let path = path.as_ref().to_path_buf();
        let is_new = !path.exists();
        let record_slot_size = (RECORD_PREFIX + payload_cap) as u64;
        let header_region_bytes = ((header_slots + 1) * SLOT_WIDTH) as u64;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| BptError::Io {
                operation: "open_paged_file".to_string(),
                reason: e.to_string(),
            })?;

        if is_new {
            let initial_len = header_region_bytes.max(GROWTH_INCREMENT);
            file.set_len(initial_len).map_err(|e| BptError::Io {
                operation: "size_paged_file".to_string(),
                reason: e.to_string(),
            })?;
        }

        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|e| BptError::Io {
                operation: "mmap_paged_file".to_string(),
                reason: e.to_string(),
            })?
        };

        let mut pf = Self {
            path,
            file,
            mmap,
            header_slots,
            payload_cap,
            record_slot_size,
            header_region_bytes,
            next_record_index: 0,
            _marker: PhantomData,
        };

        if is_new {
            log::debug!("paged_file: initialising {:?}", pf.path);
            pf.initialise()?;
        } else {
            log::debug!("paged_file: loading {:?}", pf.path);
            pf.load()?;
        }

        Ok(pf)
    }

    fn initialise(&mut self) -> BptResult<()> {
        // File is already zeroed by `set_len` on a new file, so the header
        // slots and the allocation cursor all read back as zero. The
        // cursor must be explicit zero, which it already is.
        self.next_record_index = 0;
        Ok(())
    }

    fn load(&mut self) -> BptResult<()> {
        if (self.mmap.len() as u64) < self.header_region_bytes {
            return Err(BptError::InvariantViolation {
                reason: format!(
                    "paged file {:?} is smaller than its header region",
                    self.path
                ),
            });
        }
        let cursor_offset = (self.header_slots * SLOT_WIDTH) as u64;
        self.next_record_index = self.read_raw_slot(cursor_offset)?;
        Ok(())
    }

    fn read_raw_slot(&self, byte_offset: u64) -> BptResult<u64> {
        let start = byte_offset as usize;
        let bytes: [u8; 8] = self.mmap[start..start + 8].try_into().unwrap();
        Ok(i64::from_be_bytes(bytes) as u64)
    }

    fn write_raw_slot(&mut self, byte_offset: u64, value: u64) {
        let start = byte_offset as usize;
        self.mmap[start..start + 8].copy_from_slice(&(value as i64).to_be_bytes());
    }

    fn persist_cursor(&mut self) -> BptResult<()> {
        let cursor_offset = (self.header_slots * SLOT_WIDTH) as u64;
        self.write_raw_slot(cursor_offset, self.next_record_index);
        self.flush()
    }

    fn flush(&mut self) -> BptResult<()> {
        self.mmap.flush().map_err(|e| BptError::Io {
            operation: "flush_paged_file".to_string(),
            reason: e.to_string(),
        })
    }

    fn ensure_capacity(&mut self, required: u64) -> BptResult<()> {
        if required <= self.mmap.len() as u64 {
            return Ok(());
        }
        let mut new_len = self.mmap.len() as u64;
        while new_len < required {
            new_len += GROWTH_INCREMENT;
        }
        self.file.set_len(new_len).map_err(|e| BptError::Io {
            operation: "grow_paged_file".to_string(),
            reason: e.to_string(),
        })?;
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).map_err(|e| BptError::Io {
                operation: "remap_paged_file".to_string(),
                reason: e.to_string(),
            })?
        };
        Ok(())
    }

    /// Set a header slot. `slot` is 1-indexed, in `[1, H]`.
    pub fn write_info(&mut self, value: i64, slot: usize) -> BptResult<()> {
        self.check_slot(slot)?;
        let byte_offset = ((slot - 1) * SLOT_WIDTH) as u64;
        self.write_raw_slot(byte_offset, value as u64);
        self.flush()
    }

    /// Read a header slot. `slot` is 1-indexed, in `[1, H]`.
    pub fn get_info(&self, slot: usize) -> BptResult<i64> {
        self.check_slot(slot)?;
        let byte_offset = ((slot - 1) * SLOT_WIDTH) as u64;
        Ok(self.read_raw_slot(byte_offset)? as i64)
    }

    fn check_slot(&self, slot: usize) -> BptResult<()> {
        if slot == 0 || slot > self.header_slots {
            return Err(BptError::InvariantViolation {
                reason: format!(
                    "header slot {} out of range [1, {}]",
                    slot, self.header_slots
                ),
            });
        }
        Ok(())
    }

    /// Append `record`, returning its stable offset.
    pub fn write(&mut self, record: &T) -> BptResult<Offset> {
        let payload = bincode::serialize(record).map_err(|e| BptError::Serialization {
            reason: e.to_string(),
        })?;
        if payload.len() > self.payload_cap {
            return Err(BptError::RecordTooLarge {
                offset: -1,
                limit: self.payload_cap,
                actual: payload.len(),
            });
        }

        let byte_offset = self.header_region_bytes + self.next_record_index * self.record_slot_size;
        self.ensure_capacity(byte_offset + self.record_slot_size)?;
        self.write_slot_bytes(byte_offset, &payload)?;

        self.next_record_index += 1;
        self.persist_cursor()?;

        Ok(byte_offset as Offset)
    }

    /// Overwrite the record at `offset`.
    pub fn update(&mut self, record: &T, offset: Offset) -> BptResult<()> {
        let payload = bincode::serialize(record).map_err(|e| BptError::Serialization {
            reason: e.to_string(),
        })?;
        if payload.len() > self.payload_cap {
            return Err(BptError::RecordTooLarge {
                offset,
                limit: self.payload_cap,
                actual: payload.len(),
            });
        }
        self.write_slot_bytes(offset as u64, &payload)?;
        self.flush()
    }

    fn write_slot_bytes(&mut self, byte_offset: u64, payload: &[u8]) -> BptResult<()> {
        let start = byte_offset as usize;
        let len_bytes = (payload.len() as u32).to_be_bytes();
        let crc = crc32fast::hash(payload).to_be_bytes();

        self.mmap[start..start + 4].copy_from_slice(&len_bytes);
        self.mmap[start + 4..start + 8].copy_from_slice(&crc);

        let payload_start = start + RECORD_PREFIX;
        self.mmap[payload_start..payload_start + payload.len()].copy_from_slice(payload);
        // Zero any bytes left over from a previously larger record at this slot.
        let pad_start = payload_start + payload.len();
        let pad_end = start + self.record_slot_size as usize;
        self.mmap[pad_start..pad_end].fill(0);

        Ok(())
    }

    /// Fetch the record at `offset`.
    pub fn read(&self, offset: Offset) -> BptResult<T> {
        if offset < 0 {
            return Err(BptError::InvariantViolation {
                reason: "attempted to read sentinel offset".to_string(),
            });
        }
        let start = offset as usize;
        if start + self.record_slot_size as usize > self.mmap.len() {
            return Err(BptError::CorruptedRecord {
                offset,
                reason: "offset exceeds file bounds".to_string(),
            });
        }

        let len = u32::from_be_bytes(self.mmap[start..start + 4].try_into().unwrap()) as usize;
        let crc = u32::from_be_bytes(self.mmap[start + 4..start + 8].try_into().unwrap());

        if len > self.payload_cap {
            return Err(BptError::CorruptedRecord {
                offset,
                reason: format!("stored length {} exceeds slot capacity", len),
            });
        }

        let payload_start = start + RECORD_PREFIX;
        let payload = &self.mmap[payload_start..payload_start + len];

        let computed = crc32fast::hash(payload);
        if computed != crc {
            return Err(BptError::CorruptedRecord {
                offset,
                reason: format!("CRC32 mismatch: expected 0x{crc:X}, computed 0x{computed:X}"),
            });
        }

        bincode::deserialize(payload).map_err(|e| BptError::Deserialization {
            reason: e.to_string(),
        })
    }
}

impl<T> std::fmt::Debug for PagedFile<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFile")
            .field("path", &self.path)
            .field("header_slots", &self.header_slots)
            .field("payload_cap", &self.payload_cap)
            .field("next_record_index", &self.next_record_index)
            .finish()
    }
}
