//! Process memory usage sampling for progress and stats reporting.

/// Memory usage of the current process, in bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryStats {
    pub vsize: u64,
    pub rss: u64,
}

const PAGE_SIZE: u64 = 4096;

/// Samples `/proc/self/statm`. Returns zeroes on platforms or in
/// environments where it cannot be read.
pub fn memory_stats() -> MemoryStats {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return MemoryStats::default();
    };

    let mut fields = statm.split_whitespace();
    let vsize = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0u64);
    let rss = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0u64);

    MemoryStats {
        vsize: vsize * PAGE_SIZE,
        rss: rss * PAGE_SIZE,
    }
}
