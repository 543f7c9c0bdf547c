//! The flat byte-region, key-indexed append-only NVRAM store.
//!
//! A single backing region holds a magic sentinel word followed by a
//! contiguous run of `{id: u16, capacity: u16, payload}` records, each
//! 4-byte aligned. `id == 0` marks a tombstone left by [`NvStore::delete`];
//! `id == END_OF_STORE` marks the first unused slot, which is also what an
//! erased (all-`0xFF`) region reads as without any initialization at all.

use tracing::{debug, trace};

use crate::error::NvError;

/// Size, in bytes, of one record's `{id, capacity}` header.
pub const ENTRY_HEADER_SIZE: usize = 4;

/// Byte pattern an erased region is filled with. Chosen so the first two
/// bytes of an erased slot read as [`END_OFF_STORE`] without any header
/// ever having been written there.
const INVALID_DATA_BYTE: u8 = 0xFF;

/// Sentinel id marking the first unused slot in the record area (also what
/// an untouched, erased slot reads as).
const END_OF_STORE: u16 = 0xFFFF;

/// Tombstone id left behind by [`NvStore::delete`], awaiting [`NvStore::compact`].
const TOMBSTONE: u16 = 0;

/// Magic bytes identifying an initialized store, written at the very start
/// of the backing region. The record area begins immediately after.
pub const SENTINEL: &[u8; 4] = b"AJNV";

fn align4(n: u16) -> u16 {
    (n + 3) & !3
}

/// Side effect a write to the backing region should have beyond updating
/// the in-memory bytes — e.g. mirroring to a shadow file, as the platform
/// adapter's `_StoreNVToFile` does. The store calls this after every
/// mutation, matching the original's "every write is immediately
/// persisted" behavior.
pub trait NvPersist {
    /// Called with the entire current backing region after a mutation.
    fn persist(&mut self, region: &[u8]);
}

/// A [`NvPersist`] that does nothing: the backing region *is* the
/// persistent medium (battery-backed RAM, real flash mapped directly),
/// with no separate shadow file to keep in sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersist;

impl NvPersist for NoopPersist {
    fn persist(&mut self, _region: &[u8]) {}
}

/// Which direction a [`NvHandle`] was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the record must already exist.
    Read,
    /// Write-only; any existing record with the same id is deleted and a
    /// fresh one created.
    Write,
}

/// An open cursor onto one record's payload, returned by [`NvStore::open`].
#[derive(Debug, Clone, Copy)]
pub struct NvHandle {
    id: u16,
    mode: OpenMode,
    cursor: u16,
    /// Absolute offset of the record's header in the backing region.
    entry_offset: usize,
    capacity: u16,
}

impl NvHandle {
    /// The id this handle was opened for.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Which direction the handle was opened for.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Bytes already consumed from (or written to) the payload.
    #[must_use]
    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    /// Total payload capacity of the underlying record.
    #[must_use]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }
}

/// The NVRAM store: one backing byte region, treated as a sequence of
/// length-prefixed records keyed by small integer ids.
pub struct NvStore<P: NvPersist> {
    region: Box<[u8]>,
    persist: P,
}

impl<P: NvPersist> NvStore<P> {
    /// Builds a fresh, erased store of `size` bytes (including the
    /// sentinel), writing the sentinel immediately.
    #[must_use]
    pub fn new(size: usize, persist: P) -> Self {
        let mut region = vec![INVALID_DATA_BYTE; size].into_boxed_slice();
        region[..SENTINEL.len()].copy_from_slice(SENTINEL);
        let mut store = Self { region, persist };
        store.persist.persist(&store.region);
        store
    }

    /// Wraps an existing backing region (e.g. loaded from a file by the
    /// platform adapter). If the sentinel doesn't match, the region is
    /// erased and re-stamped, mirroring the original's "load, then erase
    /// if the sentinel is missing" boot sequence.
    pub fn from_backing(region: Box<[u8]>, persist: P) -> Self {
        let mut store = Self { region, persist };
        if store.region.len() < SENTINEL.len() || &store.region[..SENTINEL.len()] != SENTINEL {
            store.erase();
        }
        store
    }

    /// Re-fills the entire region with the erased byte pattern and
    /// re-stamps the sentinel, discarding all records.
    pub fn erase(&mut self) {
        self.region.fill(INVALID_DATA_BYTE);
        self.region[..SENTINEL.len()].copy_from_slice(SENTINEL);
        self.persist.persist(&self.region);
        debug!(size = self.region.len(), "NVRAM erased");
    }

    /// Current backing region, for diagnostics or snapshotting.
    #[must_use]
    pub fn region(&self) -> &[u8] {
        &self.region
    }

    fn record_header(&self, offset: usize) -> (u16, u16) {
        let id = u16::from_le_bytes([self.region[offset], self.region[offset + 1]]);
        let capacity = u16::from_le_bytes([self.region[offset + 2], self.region[offset + 3]]);
        (id, capacity)
    }

    fn write_record_header(&mut self, offset: usize, id: u16, capacity: u16) {
        self.region[offset..offset + 2].copy_from_slice(&id.to_le_bytes());
        self.region[offset + 2..offset + 4].copy_from_slice(&capacity.to_le_bytes());
        self.persist.persist(&self.region);
    }

    /// Scans the record area and returns the absolute offset of the first
    /// record with the given id, or `None` at end-of-store.
    #[must_use]
    pub fn find_entry(&self, id: u16) -> Option<usize> {
        let mut offset = SENTINEL.len();
        while offset + ENTRY_HEADER_SIZE <= self.region.len() {
            let (entry_id, capacity) = self.record_header(offset);
            if entry_id == END_OF_STORE {
                return None;
            }
            if entry_id == id {
                return Some(offset);
            }
            offset += ENTRY_HEADER_SIZE + usize::from(capacity);
        }
        None
    }

    fn find_end_of_store(&self) -> Option<usize> {
        let mut offset = SENTINEL.len();
        while offset + ENTRY_HEADER_SIZE <= self.region.len() {
            let (entry_id, capacity) = self.record_header(offset);
            if entry_id == END_OF_STORE {
                return Some(offset);
            }
            offset += ENTRY_HEADER_SIZE + usize::from(capacity);
        }
        None
    }

    /// Whether a (non-tombstoned) record with `id` exists.
    #[must_use]
    pub fn exists(&self, id: u16) -> bool {
        id != 0 && self.find_entry(id).is_some()
    }

    /// Creates a new, empty record of `capacity` bytes (rounded up to a
    /// multiple of 4). Compacts once and retries if the tail has no room.
    ///
    /// # Errors
    ///
    /// Returns [`NvError::Invalid`] for `id == 0`. Returns
    /// [`NvError::Failure`] if `capacity == 0`, `id` already exists, or
    /// there is no room even after compaction.
    pub fn create(&mut self, id: u16, capacity: u16) -> Result<(), NvError> {
        if id == 0 {
            return Err(NvError::Invalid);
        }
        if capacity == 0 || self.exists(id) {
            return Err(NvError::Failure);
        }
        let capacity = align4(capacity);
        let fits = |offset: usize, region_len: usize| offset + ENTRY_HEADER_SIZE + usize::from(capacity) <= region_len;

        let mut offset = self.find_end_of_store();
        if offset.is_none_or(|o| !fits(o, self.region.len())) {
            self.compact();
            offset = self.find_end_of_store();
        }
        let Some(offset) = offset.filter(|&o| fits(o, self.region.len())) else {
            return Err(NvError::Failure);
        };
        self.write_record_header(offset, id, capacity);
        debug!(id, capacity, offset, "NVRAM record created");
        Ok(())
    }

    /// Tombstones an existing record (`id = 0`). Payload bytes are left
    /// intact until the next [`Self::compact`].
    ///
    /// # Errors
    ///
    /// Returns [`NvError::Failure`] if no record with `id` exists.
    pub fn delete(&mut self, id: u16) -> Result<(), NvError> {
        let offset = self.find_entry(id).ok_or(NvError::Failure)?;
        let (_, capacity) = self.record_header(offset);
        self.write_record_header(offset, TOMBSTONE, capacity);
        debug!(id, "NVRAM record deleted");
        Ok(())
    }

    /// Opens a record for reading or writing. `mode == Write` deletes any
    /// existing record with the same id and creates a fresh one of
    /// `capacity` bytes; `mode == Read` requires the record to already
    /// exist (`capacity` is ignored).
    ///
    /// # Errors
    ///
    /// Returns [`NvError::Invalid`] for `id == 0`. Returns
    /// [`NvError::Failure`] if a read is requested on a missing record, a
    /// write is requested with `capacity == 0`, or creation otherwise
    /// fails.
    pub fn open(&mut self, id: u16, mode: OpenMode, capacity: u16) -> Result<NvHandle, NvError> {
        if id == 0 {
            return Err(NvError::Invalid);
        }
        let entry_offset = match mode {
            OpenMode::Read => self.find_entry(id).ok_or(NvError::Failure)?,
            OpenMode::Write => {
                if capacity == 0 {
                    return Err(NvError::Failure);
                }
                if self.exists(id) {
                    self.delete(id)?;
                }
                self.create(id, capacity)?;
                self.find_entry(id).ok_or(NvError::Failure)?
            }
        };
        let (_, record_capacity) = self.record_header(entry_offset);
        Ok(NvHandle { id, mode, cursor: 0, entry_offset, capacity: record_capacity })
    }

    fn payload_start(handle: &NvHandle) -> usize {
        handle.entry_offset + ENTRY_HEADER_SIZE
    }

    /// Reads up to `buf.len()` bytes from the handle's current cursor.
    ///
    /// # Errors
    ///
    /// Returns [`NvError::Invalid`] if the handle was opened [`OpenMode::Write`],
    /// or if the cursor is already at or past `capacity`.
    pub fn read(&mut self, handle: &mut NvHandle, buf: &mut [u8]) -> Result<usize, NvError> {
        if handle.mode != OpenMode::Read {
            return Err(NvError::Invalid);
        }
        if handle.capacity <= handle.cursor {
            return Err(NvError::Invalid);
        }
        let remaining = usize::from(handle.capacity - handle.cursor);
        let n = remaining.min(buf.len());
        let start = Self::payload_start(handle) + usize::from(handle.cursor);
        buf[..n].copy_from_slice(&self.region[start..start + n]);
        handle.cursor += n as u16;
        trace!(id = handle.id, n, "NVRAM read");
        Ok(n)
    }

    /// Writes up to `buf.len()` bytes at the handle's current cursor,
    /// read-modify-writing a 4-byte-aligned word when the cursor starts
    /// mid-word so the underlying flash-write granularity is respected.
    ///
    /// # Errors
    ///
    /// Returns [`NvError::Invalid`] if the handle was opened [`OpenMode::Read`],
    /// or if the cursor is already at or past `capacity`.
    pub fn write(&mut self, handle: &mut NvHandle, buf: &[u8]) -> Result<usize, NvError> {
        if handle.mode != OpenMode::Write {
            return Err(NvError::Invalid);
        }
        if handle.capacity <= handle.cursor {
            return Err(NvError::Invalid);
        }
        let remaining = usize::from(handle.capacity - handle.cursor);
        let mut bytes_write = remaining.min(buf.len());
        let mut src = buf;
        let mut patch_bytes = 0usize;

        let misalignment = usize::from(handle.cursor) & 0x3;
        if bytes_write > 0 && misalignment != 0 {
            patch_bytes = (4 - misalignment).min(bytes_write);
            let aligned_pos = usize::from(handle.cursor) & !0x3;
            let word_start = Self::payload_start(handle) + aligned_pos;
            let mut word = [0u8; 4];
            word.copy_from_slice(&self.region[word_start..word_start + 4]);
            word[misalignment..misalignment + patch_bytes].copy_from_slice(&src[..patch_bytes]);
            self.region[word_start..word_start + 4].copy_from_slice(&word);
            self.persist.persist(&self.region);
            src = &src[patch_bytes..];
            bytes_write -= patch_bytes;
            handle.cursor += patch_bytes as u16;
        }

        if bytes_write > 0 {
            let start = Self::payload_start(handle) + usize::from(handle.cursor);
            self.region[start..start + bytes_write].copy_from_slice(&src[..bytes_write]);
            self.persist.persist(&self.region);
            handle.cursor += bytes_write as u16;
        }

        let total = patch_bytes + bytes_write;
        trace!(id = handle.id, total, "NVRAM write");
        Ok(total)
    }

    /// Releases a handle. The store itself has no per-handle resources to
    /// free; this exists for API symmetry with open/close pairing and so a
    /// caller's RAII usage reads naturally.
    pub fn close(&self, _handle: NvHandle) {}

    /// Copies each live record forward over tombstones, preserving order,
    /// then erases the freed tail. Idempotent: a second call on an
    /// already-compacted store is a no-op that reproduces the same bytes.
    pub fn compact(&mut self) {
        let mut read_offset = SENTINEL.len();
        let mut write_offset = SENTINEL.len();
        let mut garbage = 0usize;

        while read_offset + ENTRY_HEADER_SIZE <= self.region.len() {
            let (id, capacity) = self.record_header(read_offset);
            if id == END_OF_STORE {
                break;
            }
            let entry_size = ENTRY_HEADER_SIZE + usize::from(capacity);
            if id != TOMBSTONE {
                self.region.copy_within(read_offset..read_offset + entry_size, write_offset);
                write_offset += entry_size;
            } else {
                garbage += entry_size;
            }
            read_offset += entry_size;
        }

        self.region[write_offset..write_offset + garbage].fill(INVALID_DATA_BYTE);
        self.persist.persist(&self.region);
        debug!(garbage, "NVRAM compacted");
    }

    /// A human-readable dump of the record layout (id, capacity per
    /// record), for tests and tracing — not a public wire-level operation.
    #[must_use]
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        let mut offset = SENTINEL.len();
        while offset + ENTRY_HEADER_SIZE <= self.region.len() {
            let (id, capacity) = self.record_header(offset);
            if id == END_OF_STORE {
                break;
            }
            out.push_str(&format!("id={id} capacity={capacity}\n"));
            offset += ENTRY_HEADER_SIZE + usize::from(capacity);
        }
        out
    }
}
