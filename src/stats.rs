// Latency statistics
// Summaries over reconciled samples for periodic status logs and reports

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::constants::ROLLING_WINDOW;
use crate::reconcile::ReconciledSample;

/// Summary of one latency series (ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl LatencySummary {
    /// Returns None for an empty series
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        // Population standard deviation
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

        Some(LatencySummary {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean={:.2}ms min={:.0}ms max={:.0}ms median={:.2}ms sd={:.2}ms",
            self.mean, self.min, self.max, self.median, self.std_dev
        )
    }
}

/// Radio, relay and total summaries side by side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyReport {
    pub radio: LatencySummary,
    pub relay: LatencySummary,
    pub total: LatencySummary,
    /// Mean relay latency as a percentage of mean radio latency
    pub relay_overhead_pct: Option<f64>,
    pub clamped: usize,
    pub provisional: usize,
}

impl LatencyReport {
    pub fn from_samples<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a ReconciledSample>,
    {
        let mut radio = Vec::new();
        let mut relay = Vec::new();
        let mut total = Vec::new();
        let mut clamped = 0;
        let mut provisional = 0;

        for s in samples {
            radio.push(s.radio_latency_ms() as f64);
            relay.push(s.relay_latency_ms() as f64);
            total.push(s.total_latency_ms() as f64);
            if s.clamped() {
                clamped += 1;
            }
            if s.relay_provisional() {
                provisional += 1;
            }
        }

        let radio = LatencySummary::from_values(&radio)?;
        let relay = LatencySummary::from_values(&relay)?;
        let total = LatencySummary::from_values(&total)?;
        let relay_overhead_pct = if radio.mean > 0.0 {
            Some(relay.mean / radio.mean * 100.0)
        } else {
            None
        };

        Some(LatencyReport {
            radio,
            relay,
            total,
            relay_overhead_pct,
            clamped,
            provisional,
        })
    }
}

/// Most recent samples, bounded
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<ReconciledSample>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RollingWindow {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: ReconciledSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn report(&self) -> Option<LatencyReport> {
        LatencyReport::from_samples(&self.samples)
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(ROLLING_WINDOW)
    }
}
