//! Per-run pipeline counters
//!
//! Record and restore both tally their per-file outcomes into a shared
//! [`RunStats`]: how many files were processed, how many needed fresh
//! library work (*dirty*), how many were reused in place (*links*) and how
//! many were already known content (*duplicate*). The dirtyness percentage
//! feeds the debug journal at the end of a run.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for one pipeline run
#[derive(Debug, Default)]
pub struct RunStats {
    total: AtomicU64,
    dirty: AtomicU64,
    links: AtomicU64,
    duplicate: AtomicU64,
}

/// Plain copy of the counters at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Files visited
    pub total: u64,
    /// Files that required fresh insertion or fresh linking
    pub dirty: u64,
    /// Files reused in place (restore) or hardlinked into the library (record)
    pub links: u64,
    /// Files whose content the library already carried
    pub duplicate: u64,
}

impl RunStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a file whose content was already present
    pub fn duplicate(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.duplicate.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a file reused through a hardlink
    pub fn link(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.links.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a visited file, dirty when fresh work was needed
    pub fn dirty(&self, dirty: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if dirty {
            self.dirty.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record that an inserted object shares its inode with the source
    pub fn linked_insert(&self) {
        self.links.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of dirty files as a percentage with one decimal
    pub fn dirtyness(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let dirty = self.dirty.load(Ordering::Relaxed);
        ((1000 * dirty) / total) as f64 / 10.0
    }

    /// Copy out the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            dirty: self.dirty.load(Ordering::Relaxed),
            links: self.links.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RunStats::new();
        stats.dirty(true);
        stats.dirty(false);
        stats.duplicate();
        stats.link();

        let snap = stats.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.dirty, 1);
        assert_eq!(snap.duplicate, 1);
        assert_eq!(snap.links, 1);
    }

    #[test]
    fn test_dirtyness_has_one_decimal() {
        let stats = RunStats::new();
        for index in 0..3 {
            stats.dirty(index == 0);
        }
        assert_eq!(stats.dirtyness(), 33.3);

        let empty = RunStats::new();
        assert_eq!(empty.dirtyness(), 0.0);
    }
}
