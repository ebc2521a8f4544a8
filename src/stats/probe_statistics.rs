//! Online interval statistics
//!
//! Uses Welford's update so variance never comes from subtracting two large sums.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Running statistics for one probe.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeStatistics {
    count: u64,
    total: f64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl ProbeStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples<I: IntoIterator<Item = f64>>(samples: I) -> Self {
        let mut statistics = Self::new();
        for sample in samples {
            statistics.push(sample);
        }
        statistics
    }

    /// Fold one duration in.
    pub fn push(&mut self, duration: f64) {
        if self.count == 0 {
            self.min = duration;
            self.max = duration;
        } else {
            self.min = self.min.min(duration);
            self.max = self.max.max(duration);
        }
        self.count += 1;
        self.total += duration;
        let delta = duration - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (duration - self.mean);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn mean(&self) -> Option<f64> {
        // Rounding can push the running mean an ulp past the extremes.
        (self.count > 0).then(|| self.mean.clamp(self.min, self.max))
    }

    /// Sample variance (n - 1 denominator); zero for a single measurement.
    pub fn variance(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            n => Some((self.m2 / (n - 1) as f64).max(0.0)),
        }
    }

    pub fn standard_deviation(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn standard_error(&self) -> Option<f64> {
        self.standard_deviation()
            .map(|stdev| stdev / (self.count as f64).sqrt())
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

impl Serialize for ProbeStatistics {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ProbeStatistics", 7)?;
        state.serialize_field("count", &self.count)?;
        state.serialize_field("total", &self.total)?;
        state.serialize_field("mean", &self.mean())?;
        state.serialize_field("std_dev", &self.standard_deviation())?;
        state.serialize_field("std_error", &self.standard_error())?;
        state.serialize_field("min", &self.min())?;
        state.serialize_field("max", &self.max())?;
        state.end()
    }
}
