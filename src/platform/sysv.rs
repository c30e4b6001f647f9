//! Default [`Platform`](super::Platform) built on raw SysV IPC syscalls and
//! POSIX advisory `flock`.
//!
//! This is the only module in the crate that reaches for raw libc and
//! `unsafe`; everything above it only ever sees the safe [`Platform`] trait.

use super::{LockGuard as LockGuardTrait, Platform, ShmHandle as ShmHandleTrait};
use crate::error::{LockKind, StoreError, StoreResult};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::{Duration, Instant};

/// A SysV shared-memory segment attached into this process's address space.
pub struct SysvShmHandle {
    shmid: libc::c_int,
    addr: *mut libc::c_void,
    size: usize,
}

// The handle is only ever touched through `&self` methods that bounds-check
// before dereferencing; sharing the raw pointer across threads is the
// caller's responsibility, same as any other shared-memory mapping.
unsafe impl Send for SysvShmHandle {}

impl ShmHandleTrait for SysvShmHandle {
    fn size(&self) -> usize {
        self.size
    }
}

impl Drop for SysvShmHandle {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.addr);
        }
    }
}

/// A held `flock` on the rendezvous file, released on drop.
pub struct SysvLockGuard {
    file: std::fs::File,
}

impl LockGuardTrait for SysvLockGuard {}

impl Drop for SysvLockGuard {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// The default [`Platform`]: SysV `shmget`/`shmat`/`shmdt`/`shmctl` for
/// segments, `ftok`-style keying from the rendezvous file's inode, and
/// `flock(2)` for the rendezvous lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysvPlatform;

impl SysvPlatform {
    /// Construct a new handle to the default platform. Stateless; cheap to
    /// create as many as convenient.
    pub fn new() -> Self {
        Self
    }

    fn ftok(path: &Path, project: u8) -> StoreResult<libc::key_t> {
        let c_path = path_to_cstring(path)?;
        let key = unsafe { libc::ftok(c_path.as_ptr(), project as libc::c_int) };
        if key == -1 {
            return Err(StoreError::SegmentUnavailable {
                reason: format!(
                    "ftok({}, {project}) failed: {}",
                    path.display(),
                    std::io::Error::last_os_error()
                ),
            });
        }
        Ok(key)
    }
}

fn path_to_cstring(path: &Path) -> StoreResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|e| StoreError::SegmentUnavailable {
        reason: format!("rendezvous path contains NUL byte: {e}"),
    })
}

impl Platform for SysvPlatform {
    type Handle = SysvShmHandle;
    type Lock = SysvLockGuard;

    fn shm_open_or_create(
        &self,
        key_path: &Path,
        project: u8,
        bytes: usize,
        writable: bool,
    ) -> StoreResult<Self::Handle> {
        let key = Self::ftok(key_path, project)?;

        // Try to attach to an existing segment first.
        let mut shmid = unsafe { libc::shmget(key, 0, 0) };
        if shmid == -1 {
            if !writable {
                return Err(StoreError::SegmentUnavailable {
                    reason: format!(
                        "segment for project '{}' does not exist and store is read-only",
                        project as char
                    ),
                });
            }
            shmid = unsafe {
                libc::shmget(
                    key,
                    bytes,
                    libc::IPC_CREAT | crate::consts::SHARED_MEMORY_MODE as libc::c_int,
                )
            };
            if shmid == -1 {
                return Err(StoreError::SegmentUnavailable {
                    reason: format!(
                        "shmget(create) failed: {}",
                        std::io::Error::last_os_error()
                    ),
                });
            }
        }

        let addr = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if addr == usize::MAX as *mut libc::c_void {
            return Err(StoreError::SegmentUnavailable {
                reason: format!("shmat failed: {}", std::io::Error::last_os_error()),
            });
        }

        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::shmctl(shmid, libc::IPC_STAT, &mut ds) };
        let size = if rc == 0 { ds.shm_segsz } else { bytes as u64 };

        Ok(SysvShmHandle {
            shmid,
            addr,
            size: size as usize,
        })
    }

    fn shm_read(&self, handle: &Self::Handle, offset: usize, len: usize) -> StoreResult<Vec<u8>> {
        if offset + len > handle.size {
            return Err(StoreError::SegmentUnavailable {
                reason: format!(
                    "read [{offset}, {}) out of bounds for segment of size {}",
                    offset + len,
                    handle.size
                ),
            });
        }
        let mut buf = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(
                (handle.addr as *const u8).add(offset),
                buf.as_mut_ptr(),
                len,
            );
        }
        Ok(buf)
    }

    fn shm_write(&self, handle: &Self::Handle, offset: usize, bytes: &[u8]) -> StoreResult<()> {
        if offset + bytes.len() > handle.size {
            return Err(StoreError::SegmentUnavailable {
                reason: format!(
                    "write [{offset}, {}) out of bounds for segment of size {}",
                    offset + bytes.len(),
                    handle.size
                ),
            });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (handle.addr as *mut u8).add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    fn shm_delete(&self, handle: &Self::Handle) -> StoreResult<()> {
        let rc = unsafe { libc::shmctl(handle.shmid, libc::IPC_RMID, std::ptr::null_mut()) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // Already removed is not a failure — deletion is idempotent.
            if err.raw_os_error() != Some(libc::EINVAL) {
                return Err(StoreError::Io { source: err });
            }
        }
        Ok(())
    }

    fn lock_acquire(
        &self,
        path: &Path,
        kind: LockKind,
        timeout: Duration,
    ) -> StoreResult<Self::Lock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| StoreError::Io { source })?;

        let op = match kind {
            LockKind::Shared => libc::LOCK_SH,
            LockKind::Exclusive => libc::LOCK_EX,
        };

        let deadline = Instant::now() + timeout;
        loop {
            let rc = unsafe { libc::flock(file.as_raw_fd(), op | libc::LOCK_NB) };
            if rc == 0 {
                return Ok(SysvLockGuard { file });
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EWOULDBLOCK) {
                return Err(StoreError::Io { source: err });
            }
            if Instant::now() >= deadline {
                return Err(StoreError::LockTimeout { kind });
            }
            let backoff_ms = rand::random::<u64>() % 11;
            std::thread::sleep(Duration::from_millis(backoff_ms));
        }
    }

    fn ensure_rendezvous_file(&self, path: &Path) -> StoreResult<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(())
    }

    fn remove_rendezvous_file(&self, path: &Path) -> StoreResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { source: e }),
        }
    }
}
