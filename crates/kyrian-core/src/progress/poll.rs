use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::counters::TransferCounters;
use super::estimator::{ProgressEstimator, ProgressReport};

/// Sample `counters` every `interval` until `cancel` fires (a message or a
/// dropped sender), then emit the final 100% report. Nothing is emitted
/// after that.
pub fn poll_progress(
    counters: &TransferCounters,
    interval: Duration,
    cancel: &Receiver<()>,
    mut emit: impl FnMut(ProgressReport),
) {
    let mut estimator = ProgressEstimator::new(interval, Instant::now());
    let mut last_percent = None;
    loop {
        match cancel.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let (generation, sample) = counters.snapshot();
        let report = estimator.update(generation, sample, Instant::now());
        if last_percent != Some((report.percent, report.stalled)) {
            last_percent = Some((report.percent, report.stalled));
            emit(report);
        }
    }
    emit(estimator.finish());
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::progress::TransferSample;

    #[test]
    fn emits_non_decreasing_percentages_ending_at_100() {
        let counters = Arc::new(TransferCounters::new());
        counters.reset();
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let poller = {
            let counters = Arc::clone(&counters);
            let seen = Arc::clone(&seen);
            std::thread::spawn(move || {
                poll_progress(&counters, Duration::from_millis(10), &cancel_rx, |r| {
                    seen.lock().unwrap().push(r.percent)
                })
            })
        };

        for processed in [10, 5, 40, 80, 100] {
            counters.record(TransferSample {
                full: true,
                processed,
                expected: 100,
                ..Default::default()
            });
            std::thread::sleep(Duration::from_millis(30));
        }
        drop(cancel_tx);
        poller.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert!(seen.iter().all(|&p| p <= 100));
        assert_eq!(seen.iter().filter(|&&p| p == 100).count(), 1);
    }

    #[test]
    fn immediate_cancel_still_reports_completion() {
        let counters = TransferCounters::new();
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        cancel_tx.send(()).unwrap();
        let mut seen = Vec::new();
        poll_progress(&counters, Duration::from_secs(60), &cancel_rx, |r| {
            seen.push(r.percent)
        });
        assert_eq!(seen, [100]);
    }
}
