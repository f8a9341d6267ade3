//! Engine counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Packets successfully read from the source (all streams).
    pub packets_read: u64,
    pub frames_decoded: u64,
    /// Frames handed to the consumer channel.
    pub frames_delivered: u64,
    /// Frames lost because the consumer channel was full.
    pub frames_dropped: u64,
    /// Frames decoded while paused or stopping.
    pub frames_discarded: u64,
    pub decode_errors: u64,
    pub read_retries: u64,
    /// Sessions opened over the engine's lifetime; survives `open`.
    pub sessions_opened: u64,
}

impl EngineStats {
    /// Fraction of decoded frames that reached the consumer.
    pub fn delivery_ratio(&self) -> f64 {
        if self.frames_decoded == 0 {
            return 0.0;
        }
        self.frames_delivered as f64 / self.frames_decoded as f64
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub packets_read: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_discarded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub read_retries: AtomicU64,
    pub sessions_opened: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Zero the per-session counters. `sessions_opened` counts across the
    /// engine's lifetime and is left alone.
    pub fn reset(&self) {
        for counter in self.per_session() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> EngineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineStats {
            packets_read: load(&self.packets_read),
            frames_decoded: load(&self.frames_decoded),
            frames_delivered: load(&self.frames_delivered),
            frames_dropped: load(&self.frames_dropped),
            frames_discarded: load(&self.frames_discarded),
            decode_errors: load(&self.decode_errors),
            read_retries: load(&self.read_retries),
            sessions_opened: load(&self.sessions_opened),
        }
    }

    fn per_session(&self) -> [&AtomicU64; 7] {
        [
            &self.packets_read,
            &self.frames_decoded,
            &self.frames_delivered,
            &self.frames_dropped,
            &self.frames_discarded,
            &self.decode_errors,
            &self.read_retries,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset() {
        let counters = StatsCounters::default();
        StatsCounters::bump(&counters.frames_decoded);
        StatsCounters::add(&counters.frames_decoded, 3);
        StatsCounters::bump(&counters.frames_delivered);
        StatsCounters::bump(&counters.sessions_opened);

        let stats = counters.snapshot();
        assert_eq!(stats.frames_decoded, 4);
        assert_eq!(stats.frames_delivered, 1);
        assert_eq!(stats.sessions_opened, 1);
        assert!((stats.delivery_ratio() - 0.25).abs() < f64::EPSILON);

        counters.reset();
        assert_eq!(
            counters.snapshot(),
            EngineStats {
                sessions_opened: 1,
                ..EngineStats::default()
            }
        );
    }

    #[test]
    fn ratio_without_frames_is_zero() {
        assert_eq!(EngineStats::default().delivery_ratio(), 0.0);
    }
}
