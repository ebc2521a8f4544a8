//! Timestamp sources
//!
//! [`RealTimeClock`] reads the monotonic clock. [`PriorityElevatedClock`] wraps any
//! [`Clock`] and brackets every read with a priority raise/restore.

pub mod priority;

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use crate::error::ProbeError;
pub use priority::{ElevatedPriority, NoopPriority, PlatformPriority, PriorityControl};

/// Seconds since an arbitrary, clock-specific origin.
pub type TimeStamp = f64;

/// Source of timestamps for a probe.
pub trait Clock: Send {
    fn timestamp(&self) -> Result<TimeStamp, ProbeError>;
}

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic wall clock, seconds since first use in this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeClock;

impl Clock for RealTimeClock {
    fn timestamp(&self) -> Result<TimeStamp, ProbeError> {
        Ok(EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64())
    }
}

/// Clock that raises scheduling priority around each read of the inner clock.
#[derive(Debug, Clone, Default)]
pub struct PriorityElevatedClock<P = PlatformPriority, C = RealTimeClock> {
    control: P,
    inner: C,
}

impl PriorityElevatedClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: PriorityControl, C: Clock> PriorityElevatedClock<P, C> {
    pub fn with_parts(control: P, inner: C) -> Self {
        Self { control, inner }
    }

    pub fn control(&self) -> &P {
        &self.control
    }
}

impl<P: PriorityControl, C: Clock> Clock for PriorityElevatedClock<P, C> {
    fn timestamp(&self) -> Result<TimeStamp, ProbeError> {
        let elevated = ElevatedPriority::acquire(&self.control);
        let stamp = self.inner.timestamp();
        elevated.release().map_err(ProbeError::PriorityRestore)?;
        stamp
    }
}

/// Hand-driven clock for deterministic measurements. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<TimeStamp>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += seconds;
    }

    pub fn set(&self, now: TimeStamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Clock for ManualClock {
    fn timestamp(&self) -> Result<TimeStamp, ProbeError> {
        Ok(*self.now.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
