use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for one source worker.
///
/// The worker is the only writer; anyone holding the `Arc` may read a
/// [`SourceSnapshot`] while it runs.
#[derive(Debug)]
pub struct SourceStats {
    name: &'static str,
    records: AtomicU64,
    decode_errors: AtomicU64,
    orphans: AtomicU64,
    completed: AtomicU64,
    lost: AtomicU64,
}

/// Point-in-time copy of [`SourceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub records: u64,
    pub decode_errors: u64,
    pub orphans: u64,
    pub completed: u64,
    pub lost: u64,
}

impl SourceStats {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            orphans: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn record_received(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphan(&self) {
        self.orphans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add records the producer reported as dropped before they reached us.
    pub fn record_lost(&self, n: u64) {
        self.lost.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            records: self.records.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            orphans: self.orphans.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}
