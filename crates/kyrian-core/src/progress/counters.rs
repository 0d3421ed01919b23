use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Byte counters published by the engine during a backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSample {
    pub full: bool,
    pub volume: u64,
    /// Bytes of source data examined so far.
    pub processed: u64,
    /// Estimated total bytes to examine.
    pub expected: u64,
    /// Bytes found to differ from the previous snapshot.
    pub delta: u64,
    /// Bytes written to the target.
    pub sent: u64,
}

/// Lock-free counters written by the engine driver and read by the
/// progress poller. `generation` advances on every write so the reader can
/// tell fresh evidence from a repeat.
#[derive(Debug, Default)]
pub struct TransferCounters {
    full: AtomicBool,
    volume: AtomicU64,
    processed: AtomicU64,
    expected: AtomicU64,
    delta: AtomicU64,
    sent: AtomicU64,
    generation: AtomicU64,
}

impl TransferCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter. Called before each backup is polled.
    pub fn reset(&self) {
        for c in [
            &self.volume,
            &self.processed,
            &self.expected,
            &self.delta,
            &self.sent,
            &self.generation,
        ] {
            c.store(0, Ordering::Relaxed);
        }
        self.full.store(false, Ordering::Release);
    }

    pub fn record(&self, sample: TransferSample) {
        self.full.store(sample.full, Ordering::Relaxed);
        self.volume.store(sample.volume, Ordering::Relaxed);
        self.processed.store(sample.processed, Ordering::Relaxed);
        self.expected.store(sample.expected, Ordering::Relaxed);
        self.delta.store(sample.delta, Ordering::Relaxed);
        self.sent.store(sample.sent, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Current values and the generation they belong to. Generation 0 means
    /// nothing has been recorded since [`reset`](Self::reset).
    pub fn snapshot(&self) -> (u64, TransferSample) {
        let generation = self.generation.load(Ordering::Acquire);
        let sample = TransferSample {
            full: self.full.load(Ordering::Relaxed),
            volume: self.volume.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            expected: self.expected.load(Ordering::Relaxed),
            delta: self.delta.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
        };
        (generation, sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_and_record_bumps_generation() {
        let counters = TransferCounters::new();
        counters.record(TransferSample {
            processed: 10,
            ..Default::default()
        });
        counters.reset();
        assert_eq!(counters.snapshot(), (0, TransferSample::default()));

        let sample = TransferSample {
            full: true,
            volume: 2,
            processed: 50,
            expected: 100,
            delta: 40,
            sent: 30,
        };
        counters.record(sample);
        counters.record(sample);
        assert_eq!(counters.snapshot(), (2, sample));
    }
}
