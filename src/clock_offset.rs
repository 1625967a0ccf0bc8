// Clock offset estimation between node and station clocks
//
// The node stamps each message with its own millisecond clock; the station
// stamps receipt with its wall clock. The two epochs are unrelated, so the
// raw difference receive - transmit is relay latency plus a constant skew.
// The skew is learned once per session from a fixed calibration window.

use std::fmt;
use std::sync::{Mutex, OnceLock};

use tracing::{debug, info};

use crate::constants::CALIBRATION_WINDOW;
use crate::extract::TelemetryRecord;

/// Calibration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Uncalibrated,
    Collecting,
    Calibrated,
}

/// Result of feeding one record to the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    Calibrated(i64),
    Calibrating { collected: usize, window: usize },
}

/// Immutable view of the estimator, taken once per record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSnapshot {
    pub state: CalibrationState,
    pub offset_ms: Option<i64>,
    pub collected: usize,
    pub window: usize,
}

impl OffsetSnapshot {
    /// Offset to apply, only once calibration has finished
    pub fn calibrated_offset(&self) -> Option<i64> {
        match self.state {
            CalibrationState::Calibrated => self.offset_ms,
            _ => None,
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        CalibrationStatus(*self)
    }
}

/// Human readable calibration progress, e.g. "calibrating, 6/10 samples"
#[derive(Debug, Clone, Copy)]
pub struct CalibrationStatus(OffsetSnapshot);

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.0;
        match (s.state, s.offset_ms) {
            (CalibrationState::Calibrated, Some(offset)) => {
                write!(f, "calibrated, offset {} ms", offset)
            }
            (CalibrationState::Uncalibrated, _) => {
                write!(f, "uncalibrated, 0/{} samples", s.window)
            }
            _ => write!(f, "calibrating, {}/{} samples", s.collected, s.window),
        }
    }
}

/// Skew estimator over a fixed calibration window
#[derive(Debug, Clone)]
pub struct ClockOffsetEstimator {
    samples: Box<[i64]>,
    n: usize,
    offset_ms: Option<i64>,
    state: CalibrationState,
}

impl ClockOffsetEstimator {
    /// Create an estimator with the default window
    pub fn new() -> Self {
        Self::with_window(CALIBRATION_WINDOW)
    }

    /// Create an estimator that calibrates after `window` samples (at least 1)
    pub fn with_window(window: usize) -> Self {
        ClockOffsetEstimator {
            samples: vec![0; window.max(1)].into_boxed_slice(),
            n: 0,
            offset_ms: None,
            state: CalibrationState::Uncalibrated,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn offset_ms(&self) -> Option<i64> {
        self.offset_ms
    }

    pub fn window(&self) -> usize {
        self.samples.len()
    }

    /// Skew observations collected so far
    pub fn samples(&self) -> &[i64] {
        &self.samples[..self.n]
    }

    pub fn snapshot(&self) -> OffsetSnapshot {
        OffsetSnapshot {
            state: self.state,
            offset_ms: self.offset_ms,
            collected: self.n,
            window: self.window(),
        }
    }

    /// Feed a record; returns the offset once calibrated.
    ///
    /// Only non-approximate records carrying both timestamps contribute.
    pub fn estimate(&mut self, record: &TelemetryRecord) -> Estimate {
        if let Some(skew) = raw_skew(record) {
            self.observe(skew);
        }
        self.current()
    }

    /// Feed a raw skew observation (receive time - node time)
    pub fn observe(&mut self, skew: i64) {
        if self.state == CalibrationState::Calibrated {
            debug!(skew_ms = skew, offset_ms = ?self.offset_ms, "Skew after calibration (ignored)");
            return;
        }

        self.samples[self.n] = skew;
        self.n += 1;
        self.state = CalibrationState::Collecting;

        if self.n == self.samples.len() {
            let offset = lower_median(&mut self.samples);
            self.offset_ms = Some(offset);
            self.state = CalibrationState::Calibrated;
            info!(offset_ms = offset, window = self.n, "Clock offset calibrated");
        } else {
            debug!(collected = self.n, window = self.samples.len(), "Collecting clock skew sample");
        }
    }

    fn current(&self) -> Estimate {
        match self.offset_ms {
            Some(offset) if self.state == CalibrationState::Calibrated => Estimate::Calibrated(offset),
            _ => Estimate::Calibrating {
                collected: self.n,
                window: self.window(),
            },
        }
    }
}

impl Default for ClockOffsetEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Skew observation for a record, if it is allowed to take part in calibration
pub fn raw_skew(record: &TelemetryRecord) -> Option<i64> {
    if record.approximate {
        return None;
    }
    let node = record.node_timestamp?;
    let station = record.station_receive_time?;
    station.checked_sub(node)
}

/// Sort in place and return the lower median
fn lower_median(values: &mut [i64]) -> i64 {
    values.sort_unstable();
    values[(values.len() - 1) / 2]
}

/// Estimator shared between concurrent intake sources.
///
/// Appends go through a mutex (single writer). Once calibrated the offset
/// is published to a write-once cell and read without locking.
#[derive(Debug)]
pub struct SharedEstimator {
    inner: Mutex<ClockOffsetEstimator>,
    finalized: OnceLock<OffsetSnapshot>,
}

impl SharedEstimator {
    pub fn new(window: usize) -> Self {
        SharedEstimator {
            inner: Mutex::new(ClockOffsetEstimator::with_window(window)),
            finalized: OnceLock::new(),
        }
    }

    /// Feed a record and return the snapshot to reconcile it with
    pub fn estimate(&self, record: &TelemetryRecord) -> OffsetSnapshot {
        if let Some(done) = self.finalized.get() {
            if let Some(skew) = raw_skew(record) {
                debug!(skew_ms = skew, offset_ms = ?done.offset_ms, "Skew after calibration (ignored)");
            }
            return *done;
        }

        let snapshot = {
            let mut est = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            est.estimate(record);
            est.snapshot()
        };

        if snapshot.state == CalibrationState::Calibrated {
            let _ = self.finalized.set(snapshot);
        }
        snapshot
    }

    /// Current snapshot without feeding anything
    pub fn snapshot(&self) -> OffsetSnapshot {
        if let Some(done) = self.finalized.get() {
            return *done;
        }
        match self.inner.lock() {
            Ok(guard) => guard.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }
}

impl Default for SharedEstimator {
    fn default() -> Self {
        Self::new(CALIBRATION_WINDOW)
    }
}
