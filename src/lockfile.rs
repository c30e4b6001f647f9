//! Advisory locking against the rendezvous file.
//!
//! All mutation of the index segment's header or entry table happens under
//! an [`LockKind::Exclusive`] lock; index scans take [`LockKind::Shared`].
//! The lock itself is delegated to the [`Platform`]; this module only owns
//! the timeout/backoff policy and the typed guard.

use crate::consts::LOCK_WAIT_TIMEOUT_MS;
use crate::error::{LockKind, StoreResult};
use crate::platform::Platform;
use std::path::Path;
use std::time::Duration;

/// A held lock on a rendezvous file, released when dropped.
pub struct RendezvousLock<P: Platform> {
    _guard: P::Lock,
}

impl<P: Platform> RendezvousLock<P> {
    /// Acquire `kind` on the rendezvous file at `path`, retrying with
    /// randomized 0-10ms backoff until `timeout` elapses.
    pub fn acquire(
        platform: &P,
        path: &Path,
        kind: LockKind,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let guard = platform.lock_acquire(path, kind, timeout)?;
        Ok(Self { _guard: guard })
    }

    /// Acquire using the default 100ms timeout.
    pub fn acquire_default(platform: &P, path: &Path, kind: LockKind) -> StoreResult<Self> {
        Self::acquire(
            platform,
            path,
            kind,
            Duration::from_millis(LOCK_WAIT_TIMEOUT_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sysv::SysvPlatform;

    #[test]
    fn shared_locks_do_not_exclude_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rendezvous.lock");
        let platform = SysvPlatform::new();
        platform.ensure_rendezvous_file(&path).unwrap();

        let _a = RendezvousLock::acquire_default(&platform, &path, LockKind::Shared).unwrap();
        let _b = RendezvousLock::acquire_default(&platform, &path, LockKind::Shared).unwrap();
    }

    #[test]
    fn exclusive_excludes_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rendezvous2.lock");
        let platform = SysvPlatform::new();
        platform.ensure_rendezvous_file(&path).unwrap();

        let _excl = RendezvousLock::acquire(
            &platform,
            &path,
            LockKind::Exclusive,
            Duration::from_millis(20),
        )
        .unwrap();
        let shared = RendezvousLock::acquire(
            &platform,
            &path,
            LockKind::Shared,
            Duration::from_millis(20),
        );
        assert!(shared.is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rendezvous3.lock");
        let platform = SysvPlatform::new();
        platform.ensure_rendezvous_file(&path).unwrap();

        {
            let _excl =
                RendezvousLock::acquire_default(&platform, &path, LockKind::Exclusive).unwrap();
        }
        let _excl_again =
            RendezvousLock::acquire_default(&platform, &path, LockKind::Exclusive).unwrap();
    }
}
