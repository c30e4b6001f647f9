//! Shared constants governing segment sizing, locking, and wire layout.

/// Page size used to compute segment sizes, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Default bound on cumulative wall-clock time spent retrying a lock
/// acquisition, in milliseconds.
pub const LOCK_WAIT_TIMEOUT_MS: u64 = 100;

/// Mode bits a newly created shared-memory segment is given.
pub const SHARED_MEMORY_MODE: u32 = 0o644;

/// Sentinel `instance` value meaning "no instance domain".
pub const INSTANCE_DOMAIN_NULL: i32 = -1;

/// Project byte identifying the index segment.
pub const PROJECT_INDEX: u8 = b'i';

/// Project byte identifying the data segment.
pub const PROJECT_DATA: u8 = b'd';
