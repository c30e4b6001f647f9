//! Host collaborators: the shared-memory primitive and the advisory-lock
//! primitive the rest of the crate is built on.
//!
//! These are treated as external collaborators, specified only by the
//! interface they must satisfy. [`Platform`] is that interface;
//! [`sysv::SysvPlatform`] is the default implementation, built
//! directly on raw SysV IPC syscalls and POSIX `flock`. Swapping in a
//! different `Platform` (an in-memory fake, say) never requires touching
//! [`crate::segment`], [`crate::lockfile`], or anything above them.

pub mod sysv;

use crate::error::StoreResult;
use std::path::Path;
use std::time::Duration;

/// A kind of advisory lock, matching [`crate::error::LockKind`].
pub use crate::error::LockKind;

/// An opaque handle to an attached shared-memory segment.
///
/// Platform implementations are free to stash whatever they need behind
/// this; callers only ever pass it back to other `Platform` methods.
pub trait ShmHandle: Send {
    /// Total size in bytes of the attached segment.
    fn size(&self) -> usize;
}

/// A held advisory lock. Released unconditionally when dropped.
pub trait LockGuard: Send {}

/// The host's shared-memory and advisory-locking primitives.
///
/// A `Platform` implementation owns: deriving a key from a rendezvous path
/// and a one-byte project id, opening or creating the segment behind that
/// key, byte-granular reads and writes, segment deletion, and advisory
/// shared/exclusive locking of the rendezvous file itself.
pub trait Platform: Send + Sync {
    /// Concrete handle type returned by [`Platform::shm_open_or_create`].
    type Handle: ShmHandle;
    /// Concrete guard type returned by [`Platform::lock_acquire`].
    type Lock: LockGuard;

    /// Open an existing segment keyed by `(key_path, project)`, or create one
    /// of `bytes` size with mode `0o644` if `writable` and none exists.
    ///
    /// In read-only mode (`writable == false`), a missing segment is an
    /// error rather than something this call may create.
    fn shm_open_or_create(
        &self,
        key_path: &Path,
        project: u8,
        bytes: usize,
        writable: bool,
    ) -> StoreResult<Self::Handle>;

    /// Read `len` bytes at `offset` from `handle`.
    fn shm_read(&self, handle: &Self::Handle, offset: usize, len: usize) -> StoreResult<Vec<u8>>;

    /// Write `bytes` at `offset` into `handle`.
    fn shm_write(&self, handle: &Self::Handle, offset: usize, bytes: &[u8]) -> StoreResult<()>;

    /// Mark a segment for destruction. Idempotent: deleting an
    /// already-deleted segment is not an error.
    fn shm_delete(&self, handle: &Self::Handle) -> StoreResult<()>;

    /// Acquire an advisory lock on the rendezvous file at `path`, retrying
    /// with randomized backoff until `timeout` elapses.
    fn lock_acquire(
        &self,
        path: &Path,
        kind: LockKind,
        timeout: Duration,
    ) -> StoreResult<Self::Lock>;

    /// Ensure the rendezvous file at `path` exists, creating it zero-length
    /// if absent (producers only; readers treat a missing file as fatal).
    fn ensure_rendezvous_file(&self, path: &Path) -> StoreResult<()>;

    /// Remove the rendezvous file at `path`. Idempotent.
    fn remove_rendezvous_file(&self, path: &Path) -> StoreResult<()>;
}
