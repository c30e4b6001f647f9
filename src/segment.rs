//! The index and data segment pair.
//!
//! `SegmentPair` wraps two shared-memory segments that share a rendezvous
//! file and differ only in their project byte (`'i'` for the index, `'d'`
//! for the data segment). It is purely byte-granular: callers serialize
//! concurrent access themselves via [`crate::lockfile::RendezvousLock`].

use crate::consts::{PAGE_SIZE, PROJECT_DATA, PROJECT_INDEX};
use crate::error::StoreResult;
use crate::pack::{INDEX_ENTRY_LEN, INDEX_HEADER_LEN};
use crate::platform::{Platform, ShmHandle};
use std::path::{Path, PathBuf};

/// Which of the two segments a read or write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// The index segment (header + entry table)
    Index,
    /// The data segment (packed scalar values)
    Data,
}

/// The index and data segments behind one rendezvous file.
pub struct SegmentPair<P: Platform> {
    rendezvous_path: PathBuf,
    index: P::Handle,
    data: P::Handle,
}

/// Page count required to hold `bytes` bytes, rounded up.
fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
}

/// Index-segment size (in bytes) for `n_physical_metrics` physical metrics,
/// `ceil((12 + 4 * N * 16) / 4096)` pages, with the 4x factor
/// reserving headroom for metrics registered after construction.
pub fn index_segment_bytes(n_physical_metrics: usize) -> usize {
    let needed = INDEX_HEADER_LEN + 4 * n_physical_metrics * INDEX_ENTRY_LEN;
    pages_for(needed) * PAGE_SIZE
}

/// Data-segment size (in bytes) for `n_physical_metrics` physical metrics,
/// `ceil((4 * 4 * N) / 4096)` pages.
pub fn data_segment_bytes(n_physical_metrics: usize) -> usize {
    let needed = 4 * 4 * n_physical_metrics;
    pages_for(needed) * PAGE_SIZE
}

impl<P: Platform> SegmentPair<P> {
    /// Open (creating if absent and `writable`) both segments behind
    /// `rendezvous_path`, sized to hold `n_physical_metrics` metrics.
    pub fn open_or_create(
        platform: &P,
        rendezvous_path: &Path,
        n_physical_metrics: usize,
        writable: bool,
    ) -> StoreResult<Self> {
        if writable {
            platform.ensure_rendezvous_file(rendezvous_path)?;
        }

        let index = platform.shm_open_or_create(
            rendezvous_path,
            PROJECT_INDEX,
            index_segment_bytes(n_physical_metrics),
            writable,
        )?;
        let data = platform.shm_open_or_create(
            rendezvous_path,
            PROJECT_DATA,
            data_segment_bytes(n_physical_metrics),
            writable,
        )?;

        Ok(Self {
            rendezvous_path: rendezvous_path.to_path_buf(),
            index,
            data,
        })
    }

    /// The rendezvous path this pair was opened against.
    pub fn rendezvous_path(&self) -> &Path {
        &self.rendezvous_path
    }

    /// Size in bytes of the given segment.
    pub fn size(&self, kind: SegmentKind) -> usize {
        match kind {
            SegmentKind::Index => self.index.size(),
            SegmentKind::Data => self.data.size(),
        }
    }

    /// Read `len` bytes at `offset` from the given segment.
    pub fn read(&self, platform: &P, kind: SegmentKind, offset: usize, len: usize) -> StoreResult<Vec<u8>> {
        let handle = match kind {
            SegmentKind::Index => &self.index,
            SegmentKind::Data => &self.data,
        };
        platform.shm_read(handle, offset, len)
    }

    /// Write `bytes` at `offset` into the given segment.
    pub fn write(&self, platform: &P, kind: SegmentKind, offset: usize, bytes: &[u8]) -> StoreResult<()> {
        let handle = match kind {
            SegmentKind::Index => &self.index,
            SegmentKind::Data => &self.data,
        };
        platform.shm_write(handle, offset, bytes)
    }

    /// Delete both segments. Idempotent.
    pub fn delete(&self, platform: &P) -> StoreResult<()> {
        platform.shm_delete(&self.index)?;
        platform.shm_delete(&self.data)?;
        Ok(())
    }
}
