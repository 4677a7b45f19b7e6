//! Run counters and the appended stats file.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use mtscan_utils::mem;

/// Counters shared between all pipeline stages. Updated with relaxed
/// ordering; the progress reporter only needs approximate reads.
#[derive(Default)]
pub struct Counters {
    /// Block ids enqueued by the producer.
    pub queued: AtomicU64,
    /// Blocks decoded successfully.
    pub good: AtomicU64,
    /// Blocks that failed to load or decode.
    pub bad: AtomicU64,

    peak_rss: AtomicU64,
    peak_vsize: AtomicU64,
}

impl Counters {
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn good(&self) -> u64 {
        self.good.load(Ordering::Relaxed)
    }

    pub fn bad(&self) -> u64 {
        self.bad.load(Ordering::Relaxed)
    }

    pub fn total_blocks(&self) -> u64 {
        self.good() + self.bad()
    }

    /// Samples current memory usage and folds it into the peaks.
    pub fn sample_memory(&self) {
        let stats = mem::memory_stats();
        self.peak_rss.fetch_max(stats.rss, Ordering::Relaxed);
        self.peak_vsize.fetch_max(stats.vsize, Ordering::Relaxed);
    }

    pub fn peak_rss(&self) -> u64 {
        self.peak_rss.load(Ordering::Relaxed)
    }

    pub fn peak_vsize(&self) -> u64 {
        self.peak_vsize.load(Ordering::Relaxed)
    }
}

/// Appends one CSV line of runtime stats:
/// `threads, blocks_queued, seconds_until_flush, seconds_flush, peak_vsize`.
pub fn append_stats_line(
    path: &Path,
    threads: usize,
    queued: u64,
    secs_scan: f64,
    secs_flush: f64,
    peak_vsize: u64,
) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{threads},{queued},{secs_scan:.3},{secs_flush:.3},{peak_vsize}"
    )
}
