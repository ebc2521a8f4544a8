//! Start/stop interval probes
//!
//! A [`Probe`] owns one clock and accumulates the durations between matched
//! `start`/`stop` calls. [`ProbesCollector`] addresses many probes by label.

pub mod collector;

pub use collector::ProbesCollector;

use crate::clock::{Clock, PriorityElevatedClock, TimeStamp};
use crate::error::ProbeError;
use crate::stats::{ProbeMeasurement, ProbeStatistics};

/// Named interval accumulator. Either idle or running with one pending start.
#[derive(Debug, Clone)]
pub struct Probe<C = PriorityElevatedClock> {
    name: String,
    clock: C,
    statistics: ProbeStatistics,
    samples: Vec<f64>,
    pending_start: Option<TimeStamp>,
}

impl<C: Clock> Probe<C> {
    pub fn new(name: impl Into<String>, clock: C) -> Self {
        Self {
            name: name.into(),
            clock,
            statistics: ProbeStatistics::new(),
            samples: Vec::new(),
            pending_start: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.pending_start.is_some()
    }

    /// Begin an interval. Starting a running probe is an error; the pending start is kept.
    pub fn start(&mut self) -> Result<(), ProbeError> {
        if self.is_running() {
            return Err(ProbeError::AlreadyRunning {
                label: self.name.clone(),
            });
        }
        self.pending_start = Some(self.clock.timestamp()?);
        Ok(())
    }

    /// End the current interval and return its duration in seconds.
    ///
    /// If the clock fails here the pending start is dropped and nothing is recorded.
    pub fn stop(&mut self) -> Result<f64, ProbeError> {
        let started = self.pending_start.take().ok_or_else(|| ProbeError::NotRunning {
            label: self.name.clone(),
        })?;
        let now = self.clock.timestamp()?;
        let duration = (now - started).max(0.0);
        self.statistics.push(duration);
        self.samples.push(duration);
        Ok(duration)
    }

    /// Forget all measurements and any pending start.
    pub fn reset(&mut self) {
        self.statistics.clear();
        self.samples.clear();
        self.pending_start = None;
    }

    pub fn statistics(&self) -> ProbeStatistics {
        self.statistics
    }

    /// Per-iteration durations in the order they were stopped.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn measurement(&self) -> ProbeMeasurement {
        ProbeMeasurement {
            label: self.name.clone(),
            statistics: self.statistics,
            samples: self.samples.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, PriorityControl};
    use crate::error::PriorityError;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Control whose restore starts failing once `broken` is set.
    struct BreakableRestore {
        broken: Arc<AtomicBool>,
    }

    impl PriorityControl for BreakableRestore {
        type Snapshot = ();

        fn raise(&self) -> Result<(), PriorityError> {
            Ok(())
        }

        fn restore(&self, _previous: ()) -> Result<(), PriorityError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(PriorityError::RestoreFailed(io::Error::from(
                    io::ErrorKind::PermissionDenied,
                )));
            }
            Ok(())
        }
    }

    fn probe() -> (Probe<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (Probe::new("Add", clock.clone()), clock)
    }

    #[test]
    fn start_stop_records_duration() {
        let (mut probe, clock) = probe();
        probe.start().unwrap();
        clock.advance(0.5);
        assert_eq!(probe.stop().unwrap(), 0.5);
        assert_eq!(probe.statistics().count(), 1);
        assert!(!probe.is_running());
    }

    #[test]
    fn stop_without_start_is_a_state_error() {
        let (mut probe, _clock) = probe();
        let err = probe.stop().unwrap_err();
        assert!(err.is_state_error());
        assert!(probe.statistics().is_empty());
    }

    #[test]
    fn double_start_fails_fast_and_keeps_first_start() {
        let (mut probe, clock) = probe();
        probe.start().unwrap();
        clock.advance(1.0);
        assert!(matches!(probe.start(), Err(ProbeError::AlreadyRunning { .. })));
        clock.advance(1.0);
        assert_eq!(probe.stop().unwrap(), 2.0);
    }

    #[test]
    fn reset_forces_idle_and_empty() {
        let (mut probe, clock) = probe();
        probe.start().unwrap();
        clock.advance(1.0);
        probe.stop().unwrap();
        probe.start().unwrap();
        probe.reset();
        assert!(!probe.is_running());
        assert!(probe.statistics().is_empty());
        assert!(probe.samples().is_empty());
    }

    #[test]
    fn zero_length_interval_is_counted() {
        let (mut probe, _clock) = probe();
        probe.start().unwrap();
        assert_eq!(probe.stop().unwrap(), 0.0);
        assert_eq!(probe.statistics().count(), 1);
    }

    #[test]
    fn clock_failure_on_stop_discards_interval() {
        let broken = Arc::new(AtomicBool::new(false));
        let inner = ManualClock::new();
        let clock = PriorityElevatedClock::with_parts(
            BreakableRestore {
                broken: Arc::clone(&broken),
            },
            inner.clone(),
        );
        let mut probe = Probe::new("Add", clock);

        probe.start().unwrap();
        inner.advance(1.0);
        probe.stop().unwrap();

        probe.start().unwrap();
        inner.advance(1.0);
        broken.store(true, Ordering::SeqCst);
        let err = probe.stop().unwrap_err();
        assert!(matches!(
            err,
            ProbeError::PriorityRestore(PriorityError::RestoreFailed(_))
        ));
        assert!(!probe.is_running());
        assert_eq!(probe.statistics().count(), 1);
        assert_eq!(probe.samples(), &[1.0]);

        broken.store(false, Ordering::SeqCst);
        probe.start().unwrap();
        inner.advance(0.5);
        assert_eq!(probe.stop().unwrap(), 0.5);
    }
}
