//! Mount configuration for the FUSE filesystem.

use std::time::Duration;

/// Kernel cache timeout for attributes, entries, and negative lookups.
///
/// Kept short: nothing is cached on our side, so this bounds how stale the
/// kernel's view of the remote tree can get.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Maximum number of `exists` probes in flight while listing one directory.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 25;

/// Configuration options for the FUSE filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Whether writes are enabled. Read-only mounts present 0555/0444 modes
    /// and refuse every mutating operation.
    pub read_write: bool,

    /// Time-to-live for attributes returned to the kernel.
    pub attr_ttl: Duration,

    /// Time-to-live for name lookups returned to the kernel.
    pub entry_ttl: Duration,

    /// Time-to-live for negative (ENOENT) lookups.
    pub negative_ttl: Duration,

    /// Upper bound on concurrent child probes during a directory listing.
    pub probe_concurrency: usize,

    /// Number of worker threads serving FUSE requests.
    pub request_workers: usize,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            read_write: false,
            attr_ttl: DEFAULT_TTL,
            entry_ttl: DEFAULT_TTL,
            negative_ttl: DEFAULT_TTL,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            request_workers: (num_cpus::get() * 2).max(4),
        }
    }
}

impl MountConfig {
    /// Enables or disables write access.
    #[must_use]
    pub fn read_write(mut self, read_write: bool) -> Self {
        self.read_write = read_write;
        self
    }

    /// Sets all three kernel cache timeouts at once.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self.entry_ttl = ttl;
        self.negative_ttl = ttl;
        self
    }

    /// Sets the listing fan-out bound. Zero is treated as one.
    #[must_use]
    pub fn probe_concurrency(mut self, limit: usize) -> Self {
        self.probe_concurrency = limit.max(1);
        self
    }

    /// Sets the number of request worker threads. Zero is treated as one.
    #[must_use]
    pub fn request_workers(mut self, workers: usize) -> Self {
        self.request_workers = workers.max(1);
        self
    }
}
