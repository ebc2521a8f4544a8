//! Property-based checks of probe statistics against synthetic durations.

use proptest::prelude::*;
use probe_bench::{ManualClock, Probe};

fn durations_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..10.0, 0..64)
}

proptest! {
    /// Property: N start/stop pairs yield exactly the N synthetic durations
    #[test]
    fn prop_statistics_match_synthetic_durations(durations in durations_strategy()) {
        let clock = ManualClock::new();
        let mut probe = Probe::new("synthetic", clock.clone());
        for &duration in &durations {
            probe.start().unwrap();
            clock.advance(duration);
            probe.stop().unwrap();
        }

        let stats = probe.statistics();
        prop_assert_eq!(stats.count() as usize, durations.len());

        let sum: f64 = durations.iter().sum();
        prop_assert!((stats.total() - sum).abs() <= 1e-6);

        if durations.is_empty() {
            prop_assert!(stats.mean().is_none());
            prop_assert!(stats.min().is_none());
            prop_assert!(stats.max().is_none());
        } else {
            let mean = stats.mean().unwrap();
            let min = stats.min().unwrap();
            let max = stats.max().unwrap();
            prop_assert!((mean - stats.total() / durations.len() as f64).abs() <= 1e-6);
            prop_assert!(min <= mean && mean <= max);
            let expected_min = durations.iter().copied().fold(f64::INFINITY, f64::min);
            let expected_max = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!((min - expected_min).abs() <= 1e-6);
            prop_assert!((max - expected_max).abs() <= 1e-6);
            prop_assert!(stats.variance().unwrap() >= 0.0);
        }
    }

    /// Property: reset always returns to the empty state
    #[test]
    fn prop_reset_empties(durations in durations_strategy(), leave_running in any::<bool>()) {
        let clock = ManualClock::new();
        let mut probe = Probe::new("reset", clock.clone());
        for &duration in &durations {
            probe.start().unwrap();
            clock.advance(duration);
            probe.stop().unwrap();
        }
        if leave_running {
            probe.start().unwrap();
        }
        probe.reset();
        prop_assert_eq!(probe.statistics().count(), 0);
        prop_assert!(!probe.is_running());
    }
}
