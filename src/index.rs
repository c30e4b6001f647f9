//! The header/index manager.
//!
//! Owns the 12-byte header at offset 0 of the index segment and the
//! append-only array of 16-byte entries that follows it: versioned
//! initialization, lookup by `(cluster, item, instance)`, and append with
//! segment-full detection. Every mutation of layout happens under the
//! exclusive rendezvous lock; lookups happen under the shared lock.

use crate::error::{LockKind, StoreError, StoreResult};
use crate::lockfile::RendezvousLock;
use crate::pack::{Format, FormatCache, TypeCode, INDEX_ENTRY_FIELDS, INDEX_ENTRY_LEN, INDEX_HEADER_LEN};
use crate::platform::Platform;
use crate::segment::SegmentPair;
use std::path::Path;

const HEADER_FORMAT_ID: &str = "index_header";
const ENTRY_FORMAT_ID: &str = "index_entry";

const HEADER_FIELDS: &[(&str, TypeCode)] = &[
    ("version", TypeCode::U32),
    ("next_index_offset", TypeCode::U32),
    ("next_data_offset", TypeCode::U32),
];

/// Decoded index-segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Schema version; 0 means "not yet initialized".
    pub version: u32,
    /// Offset just past the last written index entry.
    pub next_index_offset: u32,
    /// Offset just past the last allocated data byte.
    pub next_data_offset: u32,
}

/// A decoded 16-byte index entry, plus the index-segment offset it lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Offset of this entry within the index segment.
    pub index_offset: u32,
    /// Reserved, always 0 in this version.
    pub flags: u8,
    /// Packing-code type of the value stored at `offset` in the data segment.
    pub type_code: TypeCode,
    /// Byte width of the value.
    pub length: u16,
    /// Byte offset into the data segment.
    pub offset: u32,
    /// PCP cluster id.
    pub cluster: u16,
    /// PCP item id.
    pub item: u16,
    /// PCP instance id (`-1` for "no instance domain").
    pub instance: i32,
}

/// Owns format caches for the header and entry records and implements the
/// versioned-init / find / append protocol over a [`SegmentPair`].
pub struct IndexManager {
    formats: FormatCache,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager {
    /// Create a fresh manager with an empty (per-instance) format cache.
    pub fn new() -> Self {
        Self {
            formats: FormatCache::new(),
        }
    }

    fn header_format(&mut self) -> &Format {
        self.formats.get_or_build(HEADER_FORMAT_ID, HEADER_FIELDS)
    }

    fn entry_format(&mut self) -> &Format {
        self.formats.get_or_build(ENTRY_FORMAT_ID, INDEX_ENTRY_FIELDS)
    }

    fn decode_header(&mut self, bytes: &[u8]) -> Header {
        let fmt = self.header_format();
        Header {
            version: fmt.decode_u64(bytes, "version") as u32,
            next_index_offset: fmt.decode_u64(bytes, "next_index_offset") as u32,
            next_data_offset: fmt.decode_u64(bytes, "next_data_offset") as u32,
        }
    }

    fn encode_header(&mut self, header: &Header) -> Vec<u8> {
        let fmt = self.header_format();
        let mut buf = vec![0u8; INDEX_HEADER_LEN];
        fmt.encode_u64(&mut buf, "version", header.version as u64);
        fmt.encode_u64(&mut buf, "next_index_offset", header.next_index_offset as u64);
        fmt.encode_u64(&mut buf, "next_data_offset", header.next_data_offset as u64);
        buf
    }

    fn decode_entry(&mut self, index_offset: u32, bytes: &[u8]) -> Option<IndexEntry> {
        let fmt = self.entry_format();
        let type_code = TypeCode::from_code_char(fmt.decode_u64(bytes, "type") as u8)?;
        Some(IndexEntry {
            index_offset,
            flags: fmt.decode_u64(bytes, "flags") as u8,
            type_code,
            length: fmt.decode_u64(bytes, "length") as u16,
            offset: fmt.decode_u64(bytes, "offset") as u32,
            cluster: fmt.decode_u64(bytes, "cluster") as u16,
            item: fmt.decode_u64(bytes, "item") as u16,
            instance: fmt.decode_i64(bytes, "instance") as i32,
        })
    }

    fn encode_entry(
        &mut self,
        type_code: TypeCode,
        length: u16,
        offset: u32,
        cluster: u16,
        item: u16,
        instance: i32,
    ) -> Vec<u8> {
        let fmt = self.entry_format();
        let mut buf = vec![0u8; INDEX_ENTRY_LEN];
        fmt.encode_u64(&mut buf, "flags", 0);
        fmt.encode_u64(&mut buf, "type", type_code.code_char() as u64);
        fmt.encode_u64(&mut buf, "length", length as u64);
        fmt.encode_u64(&mut buf, "offset", offset as u64);
        fmt.encode_u64(&mut buf, "cluster", cluster as u64);
        fmt.encode_u64(&mut buf, "item", item as u64);
        fmt.encode_i64(&mut buf, "instance", instance as i64);
        buf
    }

    /// Read the raw header, lock-free: header reads don't need a lock,
    /// only writes that move the cursors do.
    pub fn read_header<P: Platform>(
        &mut self,
        platform: &P,
        segments: &SegmentPair<P>,
    ) -> StoreResult<Header> {
        let bytes = segments.read(platform, crate::segment::SegmentKind::Index, 0, INDEX_HEADER_LEN)?;
        Ok(self.decode_header(&bytes))
    }

    fn write_header<P: Platform>(
        &mut self,
        platform: &P,
        segments: &SegmentPair<P>,
        header: &Header,
    ) -> StoreResult<()> {
        let bytes = self.encode_header(header);
        segments.write(platform, crate::segment::SegmentKind::Index, 0, &bytes)
    }

    /// Versioned initialization. Ensures the header carries a
    /// nonzero version, upgrading in place if the stored version is older
    /// than `configured_version`. `configured_version` of 0 is rejected
    /// outright: writing a zero version would violate the "version != 0
    /// once initialized" invariant.
    ///
    /// Returns `Ok(true)` when the stored version is newer than
    /// `configured_version` ([`StoreError::VersionConflict`], non-fatal):
    /// the caller must demote itself to read-only, since mutating the
    /// entry table under an older schema than what's on disk is unsafe.
    /// Returns `Ok(false)` on a fresh init, an upgrade, or an exact match.
    pub fn initialize<P: Platform>(
        &mut self,
        platform: &P,
        segments: &SegmentPair<P>,
        rendezvous_path: &Path,
        configured_version: u32,
        writable: bool,
    ) -> StoreResult<bool> {
        if configured_version == 0 {
            return Err(StoreError::ConfigInvalid {
                reason: "configured version must be >= 1 (0 means 'uninitialized' in the index header)".into(),
            });
        }

        let header = self.read_header(platform, segments)?;

        if header.version == 0 {
            if !writable {
                return Err(StoreError::SegmentUnavailable {
                    reason: "index segment not yet initialized and store is read-only".into(),
                });
            }
            let _lock = RendezvousLock::acquire_default(platform, rendezvous_path, LockKind::Exclusive)?;
            // Double-checked: someone may have initialized it while we waited.
            let recheck = self.read_header(platform, segments)?;
            if recheck.version == 0 {
                let fresh = Header {
                    version: configured_version,
                    next_index_offset: INDEX_HEADER_LEN as u32,
                    next_data_offset: 0,
                };
                self.write_header(platform, segments, &fresh)?;
            }
            return Ok(false);
        }

        if header.version < configured_version {
            if !writable {
                return Ok(false);
            }
            let _lock = RendezvousLock::acquire_default(platform, rendezvous_path, LockKind::Exclusive)?;
            let recheck = self.read_header(platform, segments)?;
            if recheck.version < configured_version {
                let upgraded = Header {
                    version: configured_version,
                    ..recheck
                };
                self.write_header(platform, segments, &upgraded)?;
            }
            return Ok(false);
        }

        if header.version > configured_version {
            tracing::info!(
                stored = header.version,
                requested = configured_version,
                "stored index version is newer than requested; demoting to read-only"
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// Scan entries from offset 12 up to `next_index_offset` looking for the
    /// first match on `(cluster, item, instance)`.
    pub fn find<P: Platform>(
        &mut self,
        platform: &P,
        segments: &SegmentPair<P>,
        rendezvous_path: &Path,
        cluster: u16,
        item: u16,
        instance: i32,
    ) -> StoreResult<Option<IndexEntry>> {
        let _lock = RendezvousLock::acquire_default(platform, rendezvous_path, LockKind::Shared)?;
        self.find_locked(platform, segments, cluster, item, instance)
    }

    /// Variant of [`Self::find`] for callers that already hold a lock
    /// (used internally by [`Self::append`]'s double-checked re-scan).
    fn find_locked<P: Platform>(
        &mut self,
        platform: &P,
        segments: &SegmentPair<P>,
        cluster: u16,
        item: u16,
        instance: i32,
    ) -> StoreResult<Option<IndexEntry>> {
        let header = self.read_header(platform, segments)?;
        let mut pos = INDEX_HEADER_LEN as u32;
        while pos < header.next_index_offset {
            let bytes = segments.read(
                platform,
                crate::segment::SegmentKind::Index,
                pos as usize,
                INDEX_ENTRY_LEN,
            )?;
            if let Some(entry) = self.decode_entry(pos, &bytes) {
                if entry.cluster == cluster && entry.item == item && entry.instance == instance {
                    return Ok(Some(entry));
                }
            }
            pos += INDEX_ENTRY_LEN as u32;
        }
        Ok(None)
    }

    /// Append a new entry for `(cluster, item, instance)` of type
    /// `type_code`. Returns the data-segment offset the new
    /// slot lives at. Re-scans under the exclusive lock first to resolve a
    /// lost race against another writer.
    pub fn append<P: Platform>(
        &mut self,
        platform: &P,
        segments: &SegmentPair<P>,
        rendezvous_path: &Path,
        cluster: u16,
        item: u16,
        instance: i32,
        type_code: TypeCode,
    ) -> StoreResult<u32> {
        let _lock = RendezvousLock::acquire_default(platform, rendezvous_path, LockKind::Exclusive)?;

        if let Some(existing) = self.find_locked(platform, segments, cluster, item, instance)? {
            return Ok(existing.offset);
        }

        let header = self.read_header(platform, segments)?;

        if header.next_index_offset as usize + INDEX_ENTRY_LEN > segments.size(crate::segment::SegmentKind::Index) {
            return Err(StoreError::IndexFull);
        }

        let new_length = type_code.len() as u16;
        if header.next_data_offset as usize + new_length as usize
            > segments.size(crate::segment::SegmentKind::Data)
        {
            return Err(StoreError::DataFull);
        }

        // Zero the target bytes before publishing the entry. If this fails,
        // next_data_offset is left un-advanced and the header untouched.
        let zeros = vec![0u8; new_length as usize];
        segments.write(
            platform,
            crate::segment::SegmentKind::Data,
            header.next_data_offset as usize,
            &zeros,
        )?;

        let entry_bytes = self.encode_entry(
            type_code,
            new_length,
            header.next_data_offset,
            cluster,
            item,
            instance,
        );
        segments.write(
            platform,
            crate::segment::SegmentKind::Index,
            header.next_index_offset as usize,
            &entry_bytes,
        )?;

        let updated = Header {
            version: header.version,
            next_index_offset: header.next_index_offset + INDEX_ENTRY_LEN as u32,
            next_data_offset: header.next_data_offset + new_length as u32,
        };
        self.write_header(platform, segments, &updated)?;

        Ok(header.next_data_offset)
    }
}
