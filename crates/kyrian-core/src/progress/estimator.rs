use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::counters::TransferSample;

/// Highest fraction reported before the engine finishes. The remainder
/// covers trailing metadata uploads, which publish no byte counts.
pub const MAX_RUNNING_FRACTION: f64 = 0.99;

const THROUGHPUT_WINDOW: usize = 30;
const THROUGHPUT_WEIGHT: f64 = 0.3;
const MIN_STALL: Duration = Duration::from_secs(5);

/// Standard-deviation multiples tried, widest first, for the incremental
/// confidence interval.
const CI_SIGMAS: [f64; 2] = [0.67, 0.33];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    /// 0..=99 while running, 100 once finished.
    pub percent: u8,
    pub fraction: f64,
    pub eta: Option<Duration>,
    /// Smoothed bytes per second sent to the target.
    pub throughput: f64,
    pub stalled: bool,
}

impl ProgressReport {
    pub fn is_complete(&self) -> bool {
        self.percent == 100
    }
}

/// Running mean/variance (Welford).
#[derive(Debug, Default, Clone, Copy)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

/// Turns raw transfer counters into a monotonic completion estimate.
///
/// Full backups use `processed / expected` directly. Incremental backups
/// learn the ratio of bytes sent to bytes changed and project the total
/// transfer from it, blending the ends of a confidence interval around the
/// mean. Each volume boundary re-anchors the dampened base, so the estimate
/// moves as `base + (1 - base) * progress_since_anchor`.
#[derive(Debug)]
pub struct ProgressEstimator {
    started: Instant,
    stall_after: Duration,
    sent_per_changed: Welford,
    base: f64,
    base_ratio: f64,
    base_volume: u64,
    fraction: f64,
    generation: u64,
    last_evidence: Instant,
    last_sent: Option<(Instant, u64)>,
    rates: VecDeque<f64>,
    throughput: f64,
}

impl ProgressEstimator {
    pub fn new(poll_interval: Duration, now: Instant) -> Self {
        Self {
            started: now,
            stall_after: MIN_STALL.max(poll_interval * 2),
            sent_per_changed: Welford::default(),
            base: 0.0,
            base_ratio: 0.0,
            base_volume: 0,
            fraction: 0.0,
            generation: 0,
            last_evidence: now,
            last_sent: None,
            rates: VecDeque::with_capacity(THROUGHPUT_WINDOW),
            throughput: 0.0,
        }
    }

    /// Feed the counters read at `now`. `generation` tells whether they
    /// changed since the previous call.
    pub fn update(&mut self, generation: u64, sample: TransferSample, now: Instant) -> ProgressReport {
        if generation == self.generation {
            let stalled = now.duration_since(self.last_evidence) > self.stall_after;
            return self.report(now, stalled);
        }
        self.generation = generation;
        self.last_evidence = now;

        self.update_throughput(sample.sent, now);

        let Some(ratio) = self.overall_ratio(&sample) else {
            return self.report(now, false);
        };

        if sample.volume > self.base_volume {
            self.base = self.fraction;
            self.base_ratio = ratio;
            self.base_volume = sample.volume;
        }

        let since_anchor = if self.base_ratio < 1.0 {
            ((ratio - self.base_ratio) / (1.0 - self.base_ratio)).max(0.0)
        } else {
            1.0
        };
        let estimate = (self.base + (1.0 - self.base) * since_anchor).clamp(0.0, MAX_RUNNING_FRACTION);
        self.fraction = self.fraction.max(estimate);
        self.report(now, false)
    }

    /// Final report once the engine has returned.
    pub fn finish(&mut self) -> ProgressReport {
        self.fraction = 1.0;
        ProgressReport {
            percent: 100,
            fraction: 1.0,
            eta: Some(Duration::ZERO),
            throughput: self.throughput,
            stalled: false,
        }
    }

    /// Fraction of the whole backup done, before dampening.
    fn overall_ratio(&mut self, s: &TransferSample) -> Option<f64> {
        if s.expected == 0 {
            return None;
        }
        let direct = (s.processed as f64 / s.expected as f64).min(1.0);
        if s.full {
            return Some(direct);
        }
        if s.delta == 0 || s.processed == 0 {
            return Some(direct);
        }

        self.sent_per_changed.push(s.sent as f64 / s.delta as f64);
        let mean = self.sent_per_changed.mean;
        let sigma = self.sent_per_changed.stddev();
        // Changed bytes over the whole source, extrapolated from what has
        // been examined so far.
        let projected_delta = s.delta as f64 * s.expected as f64 / s.processed as f64;
        let done_at = |factor: f64| (s.sent as f64 / (projected_delta * factor)).min(1.0);

        let interval = CI_SIGMAS
            .iter()
            .map(|k| (mean - k * sigma, mean + k * sigma))
            .find(|(low, _)| *low > 0.0);
        let ratio = match interval {
            Some((low, high)) => (done_at(low) + done_at(high)) / 2.0,
            None if mean > 0.0 => done_at(mean),
            None => direct,
        };
        Some(ratio)
    }

    fn update_throughput(&mut self, sent: u64, now: Instant) {
        if let Some((at, prev)) = self.last_sent {
            let dt = now.duration_since(at).as_secs_f64();
            if dt > 0.0 {
                if self.rates.len() == THROUGHPUT_WINDOW {
                    self.rates.pop_front();
                }
                self.rates.push_back(sent.saturating_sub(prev) as f64 / dt);
                let mut rates = self.rates.iter();
                let first = rates.next().copied().unwrap_or(0.0);
                self.throughput = rates.fold(first, |ema, r| {
                    THROUGHPUT_WEIGHT * r + (1.0 - THROUGHPUT_WEIGHT) * ema
                });
            }
        }
        self.last_sent = Some((now, sent));
    }

    fn report(&self, now: Instant, stalled: bool) -> ProgressReport {
        let elapsed = now.duration_since(self.started);
        let eta = (self.fraction > 0.0)
            .then(|| elapsed.mul_f64((1.0 - self.fraction) / self.fraction));
        ProgressReport {
            percent: (self.fraction * 100.0).round() as u8,
            fraction: self.fraction,
            eta,
            throughput: self.throughput,
            stalled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(volume: u64, processed: u64, expected: u64, sent: u64) -> TransferSample {
        TransferSample {
            full: true,
            volume,
            processed,
            expected,
            delta: processed,
            sent,
        }
    }

    #[test]
    fn full_backup_follows_direct_ratio() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        let r = est.update(1, full(0, 25, 100, 10), t0 + Duration::from_secs(1));
        assert_eq!(r.percent, 25);
        // 25% after 1s leaves 3s.
        assert_eq!(r.eta, Some(Duration::from_secs(3)));
        let r = est.update(2, full(0, 100, 100, 90), t0 + Duration::from_secs(2));
        assert_eq!(r.percent, 99);
        assert!(!r.is_complete());
    }

    #[test]
    fn estimate_never_decreases() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        let mut last = 0;
        let samples = [(40, 100), (30, 100), (50, 200), (180, 200), (190, 400)];
        for (i, (processed, expected)) in samples.into_iter().enumerate() {
            let gen = i as u64 + 1;
            let r = est.update(gen, full(0, processed, expected, 0), t0 + Duration::from_secs(gen));
            assert!(r.percent >= last, "{} < {last}", r.percent);
            assert!(r.percent <= 99);
            last = r.percent;
        }
        assert_eq!(est.finish().percent, 100);
    }

    #[test]
    fn volume_boundary_reanchors_base() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        est.update(1, full(0, 50, 100, 0), t0);
        // New volume at the same overall ratio: anchored, no jump.
        let r = est.update(2, full(1, 50, 100, 0), t0);
        assert_eq!(r.percent, 50);
        // Half of the remaining work after the anchor.
        let r = est.update(3, full(1, 75, 100, 0), t0);
        assert_eq!(r.percent, 75);
    }

    #[test]
    fn incremental_uses_learned_transfer_ratio() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        let inc = |processed, delta, sent| TransferSample {
            full: false,
            volume: 0,
            processed,
            expected: 1000,
            delta,
            sent,
        };
        // Half examined, sending half of each changed byte: the whole
        // backup should transfer about 100 bytes, 50 of which are out.
        let r = est.update(1, inc(500, 100, 50), t0 + Duration::from_secs(1));
        assert_eq!(r.percent, 50);
        let r = est.update(2, inc(750, 150, 75), t0 + Duration::from_secs(2));
        assert!(r.percent >= 50 && r.percent <= 99, "{}", r.percent);
    }

    #[test]
    fn no_new_evidence_turns_stalled_after_threshold() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        let r = est.update(1, full(0, 10, 100, 0), t0);
        assert_eq!(r.percent, 10);

        let r = est.update(1, full(0, 10, 100, 0), t0 + Duration::from_secs(4));
        assert!(!r.stalled);
        let r = est.update(1, full(0, 10, 100, 0), t0 + Duration::from_secs(6));
        assert!(r.stalled);
        assert_eq!(r.percent, 10);

        let r = est.update(2, full(0, 20, 100, 0), t0 + Duration::from_secs(7));
        assert!(!r.stalled);
        assert_eq!(r.percent, 20);
    }

    #[test]
    fn stall_threshold_scales_with_poll_interval() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(4), t0);
        est.update(1, full(0, 10, 100, 0), t0);
        let r = est.update(1, full(0, 10, 100, 0), t0 + Duration::from_secs(7));
        assert!(!r.stalled);
        let r = est.update(1, full(0, 10, 100, 0), t0 + Duration::from_secs(9));
        assert!(r.stalled);
    }

    #[test]
    fn throughput_is_exponentially_smoothed() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        est.update(1, full(0, 1, 100, 0), t0);
        let r = est.update(2, full(0, 2, 100, 100), t0 + Duration::from_secs(1));
        assert!((r.throughput - 100.0).abs() < 1e-9);
        let r = est.update(3, full(0, 3, 100, 300), t0 + Duration::from_secs(2));
        // 0.3 * 200 + 0.7 * 100
        assert!((r.throughput - 130.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_total_reports_zero() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(Duration::from_secs(1), t0);
        let r = est.update(1, full(0, 10, 0, 0), t0);
        assert_eq!(r.percent, 0);
        assert_eq!(r.eta, None);
    }
}
