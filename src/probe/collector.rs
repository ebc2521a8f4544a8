//! Label-addressed probe registry

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::clock::{Clock, PriorityElevatedClock};
use crate::error::ProbeError;
use crate::probe::Probe;
use crate::stats::{ProbeMeasurement, ProbeStatistics};

type SharedProbe<C> = Arc<Mutex<Probe<C>>>;

struct Registry<C> {
    order: Vec<SharedProbe<C>>,
    index: HashMap<String, usize>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Probes keyed by label, created on first reference and kept in first-seen order.
///
/// Every probe gets its own clone of the prototype clock. The label map and each
/// probe are locked separately, so labels can be used from several threads. Where the
/// priority raise is process-wide it is shared, and restored when the last measuring
/// thread lets go.
pub struct ProbesCollector<C = PriorityElevatedClock> {
    clock: C,
    registry: Mutex<Registry<C>>,
}

impl Default for ProbesCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbesCollector {
    pub fn new() -> Self {
        Self::with_clock(PriorityElevatedClock::new())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Clock + Clone> ProbesCollector<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            registry: Mutex::new(Registry::default()),
        }
    }

    fn probe_or_create(&self, label: &str) -> SharedProbe<C> {
        let mut registry = lock(&self.registry);
        if let Some(&slot) = registry.index.get(label) {
            return Arc::clone(&registry.order[slot]);
        }
        debug!(label, "creating probe");
        let probe = Arc::new(Mutex::new(Probe::new(label, self.clock.clone())));
        let slot = registry.order.len();
        registry.order.push(Arc::clone(&probe));
        registry.index.insert(label.to_owned(), slot);
        probe
    }

    fn probe(&self, label: &str) -> Result<SharedProbe<C>, ProbeError> {
        let registry = lock(&self.registry);
        registry
            .index
            .get(label)
            .map(|&slot| Arc::clone(&registry.order[slot]))
            .ok_or_else(|| ProbeError::UnknownLabel(label.to_owned()))
    }

    pub fn start(&self, label: &str) -> Result<(), ProbeError> {
        lock(&self.probe_or_create(label)).start()
    }

    /// Stop the probe for `label`, returning the interval just measured.
    pub fn stop(&self, label: &str) -> Result<f64, ProbeError> {
        lock(&self.probe_or_create(label)).stop()
    }

    /// Time one synchronous unit of work under `label`.
    pub fn measure<T>(&self, label: &str, work: impl FnOnce() -> T) -> Result<T, ProbeError> {
        self.start(label)?;
        let output = work();
        self.stop(label)?;
        Ok(output)
    }

    pub fn statistics(&self, label: &str) -> Result<ProbeStatistics, ProbeError> {
        Ok(lock(&*self.probe(label)?).statistics())
    }

    pub fn samples(&self, label: &str) -> Result<Vec<f64>, ProbeError> {
        Ok(lock(&*self.probe(label)?).samples().to_vec())
    }

    /// Snapshot of every label in first-seen order. Iterate it as often as needed.
    pub fn report_all(&self) -> Vec<ProbeMeasurement> {
        let probes: Vec<SharedProbe<C>> = lock(&self.registry).order.clone();
        probes.iter().map(|probe| lock(probe).measurement()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        lock(&self.registry)
            .order
            .iter()
            .map(|probe| lock(probe).name().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self, label: &str) -> Result<(), ProbeError> {
        lock(&*self.probe(label)?).reset();
        Ok(())
    }

    /// Drop every probe.
    pub fn clear(&self) {
        *lock(&self.registry) = Registry::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn collector() -> (ProbesCollector<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (ProbesCollector::with_clock(clock.clone()), clock)
    }

    #[test]
    fn labels_are_case_sensitive() {
        let (collector, _clock) = collector();
        collector.start("add").unwrap();
        collector.start("Add").unwrap();
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn stop_creates_label_then_fails() {
        let (collector, _clock) = collector();
        let err = collector.stop("never-started").unwrap_err();
        assert!(err.is_state_error());
        assert_eq!(collector.statistics("never-started").unwrap().count(), 0);
    }

    #[test]
    fn reset_unknown_label_fails() {
        let (collector, _clock) = collector();
        assert!(matches!(
            collector.reset("missing"),
            Err(ProbeError::UnknownLabel(label)) if label == "missing"
        ));
    }

    #[test]
    fn reset_one_label_keeps_others() {
        let (collector, clock) = collector();
        for label in ["A", "B"] {
            collector.start(label).unwrap();
            clock.advance(1.0);
            collector.stop(label).unwrap();
        }
        collector.reset("A").unwrap();
        assert_eq!(collector.statistics("A").unwrap().count(), 0);
        assert_eq!(collector.statistics("B").unwrap().count(), 1);
    }

    #[test]
    fn lookups_read_the_existing_probe() {
        let (collector, clock) = collector();
        collector.start("Resample").unwrap();
        clock.advance(0.75);
        collector.stop("Resample").unwrap();

        assert_eq!(collector.statistics("Resample").unwrap().total(), 0.75);
        assert_eq!(collector.samples("Resample").unwrap(), vec![0.75]);
        collector.reset("Resample").unwrap();
        assert!(collector.samples("Resample").unwrap().is_empty());
        assert!(matches!(
            collector.samples("resample"),
            Err(ProbeError::UnknownLabel(_))
        ));
    }

    #[test]
    fn clear_forgets_labels() {
        let (collector, _clock) = collector();
        collector.start("A").unwrap();
        collector.clear();
        assert!(collector.is_empty());
        assert!(collector.statistics("A").is_err());
    }

    #[test]
    fn measure_returns_work_output() {
        let (collector, clock) = collector();
        let value = collector
            .measure("work", || {
                clock.advance(0.25);
                42
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(collector.samples("work").unwrap(), vec![0.25]);
    }

    #[test]
    fn concurrent_labels_do_not_lose_updates() {
        let (collector, _clock) = collector();
        thread::scope(|scope| {
            for worker in 0..4 {
                let collector = &collector;
                scope.spawn(move || {
                    let label = format!("worker-{worker}");
                    for _ in 0..100 {
                        collector.start(&label).unwrap();
                        collector.stop(&label).unwrap();
                    }
                });
            }
        });
        assert_eq!(collector.len(), 4);
        for measurement in collector.report_all() {
            assert_eq!(measurement.statistics.count(), 100);
        }
    }
}
