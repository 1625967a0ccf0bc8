// Coordinator - glue between line intake, reconciliation and outputs
//
// Lines may arrive from several intake tasks at once. Extraction and
// reconciliation need no locking; the clock offset estimator serializes its
// own appends and is lock-free once calibrated.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clock_offset::{CalibrationState, OffsetSnapshot, SharedEstimator};
use crate::extract::Extractor;
use crate::intake::RawLine;
use crate::output::OutputHandler;
use crate::overflow::CorrectedLatency;
use crate::reconcile::{Limits, ReconciledSample, Reconciler};
use crate::stats::RollingWindow;

pub struct Coordinator {
    extractor: Extractor,
    estimator: Arc<SharedEstimator>,
    reconciler: Reconciler,
    outputs: RwLock<Vec<Box<dyn OutputHandler>>>,
    recent: Mutex<RollingWindow>,
    /// Last calibration state seen, for transition logging
    last_state: Mutex<CalibrationState>,
    /// Log a summary every N samples. 0 = disabled.
    summary_every: usize,

    // Stats
    total_samples: AtomicUsize,
    total_misses: AtomicUsize,
    total_clamped: AtomicUsize,
}

impl Coordinator {
    pub fn new(calibration_window: usize, limits: Limits, summary_every: usize) -> Self {
        Coordinator {
            extractor: Extractor::new(),
            estimator: Arc::new(SharedEstimator::new(calibration_window)),
            reconciler: Reconciler::new(limits),
            outputs: RwLock::new(Vec::new()),
            recent: Mutex::new(RollingWindow::default()),
            last_state: Mutex::new(CalibrationState::Uncalibrated),
            summary_every,
            total_samples: AtomicUsize::new(0),
            total_misses: AtomicUsize::new(0),
            total_clamped: AtomicUsize::new(0),
        }
    }

    /// Add an output handler
    pub async fn add_output(&self, output: Box<dyn OutputHandler>) {
        self.outputs.write().await.push(output);
    }

    /// Current calibration snapshot
    pub fn snapshot(&self) -> OffsetSnapshot {
        self.estimator.snapshot()
    }

    pub fn sample_count(&self) -> usize {
        self.total_samples.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> usize {
        self.total_misses.load(Ordering::Relaxed)
    }

    pub fn clamped_count(&self) -> usize {
        self.total_clamped.load(Ordering::Relaxed)
    }

    /// Process one raw line end to end. Returns None if no layout matched.
    pub async fn handle_line(&self, raw: &RawLine) -> Option<ReconciledSample> {
        let record = match self.extractor.try_extract(&raw.text, raw.received_at_ms) {
            Ok(record) => record,
            Err(miss) => {
                self.total_misses.fetch_add(1, Ordering::Relaxed);
                debug!("{}", miss);
                return None;
            }
        };

        if record.approximate {
            debug!(id = record.id, layout = record.layout.name(), "Approximate record");
        }

        let corrected = CorrectedLatency::from_raw(record.radio_latency_raw);
        let snapshot = self.estimator.estimate(&record);
        self.note_calibration(&snapshot).await;

        let sample = self.reconciler.reconcile(corrected, &record, &snapshot);
        let count = self.total_samples.fetch_add(1, Ordering::Relaxed) + 1;
        if sample.clamped() {
            self.total_clamped.fetch_add(1, Ordering::Relaxed);
            warn!(
                id = sample.id(),
                radio_clamped = sample.radio_clamped(),
                relay_clamped = sample.relay_clamped(),
                "Implausible latency replaced by typical value"
            );
        }

        debug!(
            id = sample.id(),
            radio_ms = sample.radio_latency_ms(),
            relay_ms = sample.relay_latency_ms(),
            total_ms = sample.total_latency_ms(),
            "Reconciled"
        );

        for output in self.outputs.write().await.iter_mut() {
            output.handle_sample(&sample);
        }

        let mut recent = self.recent.lock().await;
        recent.push(sample.clone());
        if self.summary_every > 0 && count % self.summary_every == 0 {
            if let Some(report) = recent.report() {
                info!("Radio latency: {}", report.radio);
                info!("Relay latency: {}", report.relay);
                info!("Total latency: {}", report.total);
                if let Some(pct) = report.relay_overhead_pct {
                    info!(
                        "Relay adds {:.2}ms ({:.2}% over radio), {} clamped, {} provisional in last {}",
                        report.relay.mean,
                        pct,
                        report.clamped,
                        report.provisional,
                        recent.len()
                    );
                }
            }
        }

        Some(sample)
    }

    async fn note_calibration(&self, snapshot: &OffsetSnapshot) {
        let mut last = self.last_state.lock().await;
        if *last != snapshot.state {
            info!("Clock offset: {}", snapshot.status());
            *last = snapshot.state;
        } else if snapshot.state == CalibrationState::Collecting {
            debug!("Clock offset: {}", snapshot.status());
        }
    }

    /// Drain the intake channel until every sender is gone
    pub async fn run(&self, mut rx: mpsc::Receiver<RawLine>) {
        while let Some(raw) = rx.recv().await {
            self.handle_line(&raw).await;
        }
        self.flush().await;
        info!(
            "Intake closed: {} samples, {} unmatched lines, {} clamped. {}",
            self.sample_count(),
            self.miss_count(),
            self.clamped_count(),
            self.snapshot().status()
        );
    }

    /// Flush all outputs
    pub async fn flush(&self) {
        for output in self.outputs.write().await.iter_mut() {
            output.flush();
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(crate::constants::CALIBRATION_WINDOW, Limits::default(), 0)
    }
}
