//! Interception outcome counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a single intercepted request, or one of its side effects, ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Answered from a partition.
    CacheHit,
    /// Answered with a live network response.
    Network,
    /// Navigation answered from the Shell after a network failure.
    OfflineFallback,
    /// Answered with the synthetic unavailable response.
    Unavailable,
    /// Not a GET; left to the host.
    PassThrough,
    /// A cache write failed and was discarded.
    WriteFailure,
    /// A background revalidation replaced a Runtime entry.
    Revalidated,
}

/// Lock-free counters shared by every strategy of one interceptor.
#[derive(Debug, Default)]
pub struct InterceptStats {
    cache_hits: AtomicU64,
    network: AtomicU64,
    offline_fallbacks: AtomicU64,
    unavailable: AtomicU64,
    pass_through: AtomicU64,
    write_failures: AtomicU64,
    revalidated: AtomicU64,
}

impl InterceptStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one occurrence of `outcome`.
    pub fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::CacheHit => &self.cache_hits,
            Outcome::Network => &self.network,
            Outcome::OfflineFallback => &self.offline_fallbacks,
            Outcome::Unavailable => &self.unavailable,
            Outcome::PassThrough => &self.pass_through,
            Outcome::WriteFailure => &self.write_failures,
            Outcome::Revalidated => &self.revalidated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            network: self.network.load(Ordering::Relaxed),
            offline_fallbacks: self.offline_fallbacks.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            pass_through: self.pass_through.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            revalidated: self.revalidated.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`InterceptStats`] at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Responses served from a partition.
    pub cache_hits: u64,
    /// Responses served live from the network.
    pub network: u64,
    /// Navigations served from the Shell while offline.
    pub offline_fallbacks: u64,
    /// Synthetic unavailable responses.
    pub unavailable: u64,
    /// Non-GET requests left to the host.
    pub pass_through: u64,
    /// Discarded cache write failures.
    pub write_failures: u64,
    /// Runtime entries refreshed in the background.
    pub revalidated: u64,
}

impl StatsSnapshot {
    /// Total number of intercepted GET requests answered.
    #[must_use]
    pub const fn answered(&self) -> u64 {
        self.cache_hits + self.network + self.offline_fallbacks + self.unavailable
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} answered ({} cache, {} network, {} offline, {} unavailable), {} passed through, {} revalidated, {} write failures",
            self.answered(),
            self.cache_hits,
            self.network,
            self.offline_fallbacks,
            self.unavailable,
            self.pass_through,
            self.revalidated,
            self.write_failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_outcome() {
        let stats = InterceptStats::new();
        stats.record(Outcome::CacheHit);
        stats.record(Outcome::CacheHit);
        stats.record(Outcome::Network);
        stats.record(Outcome::Unavailable);
        stats.record(Outcome::WriteFailure);

        let snap = stats.snapshot();
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.network, 1);
        assert_eq!(snap.unavailable, 1);
        assert_eq!(snap.write_failures, 1);
        assert_eq!(snap.answered(), 4);
    }

    #[test]
    fn display_summary() {
        let snap = StatsSnapshot {
            cache_hits: 3,
            network: 1,
            ..StatsSnapshot::default()
        };
        assert!(snap.to_string().starts_with("4 answered (3 cache, 1 network"));
    }
}
