// Per-record reconciliation pipeline
// raw line -> extract -> overflow correct -> offset estimate -> reconcile

use crate::clock_offset::{ClockOffsetEstimator, OffsetSnapshot};
use crate::extract::{ExtractionMiss, Extractor, TelemetryRecord};
use crate::overflow::CorrectedLatency;
use crate::reconcile::{Limits, ReconciledSample, Reconciler};
use crate::synthetic::{self, SyntheticSample};

/// Single-owner pipeline. Each line is fully processed before the next.
#[derive(Debug)]
pub struct Pipeline {
    extractor: Extractor,
    estimator: ClockOffsetEstimator,
    reconciler: Reconciler,
}

impl Pipeline {
    pub fn new(window: usize, limits: Limits) -> Self {
        Pipeline {
            extractor: Extractor::new(),
            estimator: ClockOffsetEstimator::with_window(window),
            reconciler: Reconciler::new(limits),
        }
    }

    pub fn estimator(&self) -> &ClockOffsetEstimator {
        &self.estimator
    }

    pub fn snapshot(&self) -> OffsetSnapshot {
        self.estimator.snapshot()
    }

    /// Process one raw line, with the station time it was received at if known
    pub fn process(
        &mut self,
        line: &str,
        received_at: Option<i64>,
    ) -> Result<ReconciledSample, ExtractionMiss> {
        let record = self.extractor.try_extract(line, received_at)?;
        Ok(self.process_record(&record))
    }

    /// Process an already extracted record
    pub fn process_record(&mut self, record: &TelemetryRecord) -> ReconciledSample {
        let corrected = CorrectedLatency::from_raw(record.radio_latency_raw);
        self.estimator.estimate(record);
        let snapshot = self.estimator.snapshot();
        self.reconciler.reconcile(corrected, record, &snapshot)
    }

    /// Process a batch of `(line, received_at)` pairs in order
    pub fn process_batch<'a, I>(&mut self, lines: I) -> Batch
    where
        I: IntoIterator<Item = (&'a str, Option<i64>)>,
    {
        let mut batch = Batch::default();
        for (line, received_at) in lines {
            match self.process(line, received_at) {
                Ok(sample) => batch.samples.push(sample),
                Err(miss) => batch.misses.push(miss),
            }
        }
        batch
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(crate::constants::CALIBRATION_WINDOW, Limits::default())
    }
}

/// Outcome of a batch: authoritative samples and dropped lines
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub samples: Vec<ReconciledSample>,
    pub misses: Vec<ExtractionMiss>,
}

impl Batch {
    pub fn is_degenerate(&self) -> bool {
        synthetic::is_degenerate(&self.samples)
    }

    /// Synthetic stand-in data for visualization, only when this batch has
    /// nothing usable. Returned separately; never merged into `samples`.
    pub fn continuity(&self, n: usize, seed: u64) -> Option<Vec<SyntheticSample>> {
        if self.is_degenerate() {
            Some(synthetic::synthesize_samples(n, seed))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock_offset::CalibrationState;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SKEWS: [i64; 10] = [190, 205, 300, 195, 200, 198, 202, 750, 199, 201];

    fn line(id: u64, node_ts: i64, radio: u32) -> String {
        format!("ID: {} | Timestamp: {} | RadioLatency: {} ms", id, node_ts, radio)
    }

    fn calibrate(pipeline: &mut Pipeline) {
        for (i, skew) in SKEWS.iter().enumerate() {
            let node = 10_000 + 1000 * i as i64;
            pipeline.process(&line(i as u64, node, 40), Some(node + skew)).unwrap();
        }
    }

    #[test]
    fn test_provisional_until_calibrated() {
        let mut pipeline = Pipeline::default();
        for (i, skew) in SKEWS[..9].iter().enumerate() {
            let node = 1000 * i as i64;
            let sample = pipeline.process(&line(i as u64, node, 40), Some(node + skew)).unwrap();
            assert_eq!(sample.relay_latency_ms(), 50);
            assert!(sample.relay_provisional());
        }
        assert_eq!(pipeline.snapshot().state, CalibrationState::Collecting);
        assert_eq!(pipeline.snapshot().collected, 9);
    }

    #[test]
    fn test_calibrated_end_to_end() {
        let mut pipeline = Pipeline::default();
        calibrate(&mut pipeline);
        assert_eq!(pipeline.estimator().offset_ms(), Some(200));

        let sample = pipeline.process(&line(77, 1000, 45), Some(1248)).unwrap();
        assert_eq!(sample.relay_latency_ms(), 48);
        assert_eq!(sample.radio_latency_ms(), 45);
        assert_eq!(sample.total_latency_ms(), 93);
        assert!(!sample.relay_provisional());
    }

    #[test]
    fn test_approximate_after_calibration() {
        let mut pipeline = Pipeline::default();
        calibrate(&mut pipeline);

        let sample = pipeline.process("RadioLatency: 40 ms", Some(50_000)).unwrap();
        assert!(sample.approximate());
        assert!(sample.relay_provisional());
        assert!(!sample.clamped());
        assert_eq!(sample.total_latency_ms(), 90);
    }

    #[test]
    fn test_extreme_clock_values() {
        let mut pipeline = Pipeline::default();
        let sample = pipeline
            .process("ID: 1 | Timestamp: 9223372036854775807 | RadioLatency: 4 ms", Some(-2))
            .unwrap();
        assert!(sample.relay_provisional());
        assert!(pipeline.estimator().samples().is_empty());

        let sample = pipeline.process("RadioLatency: 4 ms", Some(i64::MIN)).unwrap();
        assert!(sample.approximate());
        assert_eq!(sample.total_latency_ms(), 4 + 50);
    }

    #[test]
    fn test_wrapped_radio_latency() {
        let mut pipeline = Pipeline::default();
        calibrate(&mut pipeline);
        let sample = pipeline.process(&line(1, 1000, 4_294_967_271), Some(1248)).unwrap();
        assert_eq!(sample.radio_latency_ms(), 25);
        assert!(!sample.radio_clamped());
        assert_eq!(sample.total_latency_ms(), 73);
    }

    #[test]
    fn test_radio_clamp_through_pipeline() {
        let mut pipeline = Pipeline::default();
        let sample = pipeline.process(&line(1, 1000, 2_000_000), Some(1248)).unwrap();
        assert_eq!(sample.radio_latency_ms(), 50);
        assert!(sample.radio_clamped());
    }

    #[test]
    fn test_approximate_lines_do_not_advance_calibration() {
        let mut pipeline = Pipeline::default();
        for i in 0..25 {
            let sample = pipeline
                .process("RadioLatency: 48 ms", Some(5000 + i))
                .unwrap();
            assert!(sample.approximate());
        }
        assert_eq!(pipeline.snapshot().state, CalibrationState::Uncalibrated);
        assert!(pipeline.estimator().samples().is_empty());
    }

    #[test]
    fn test_batch_and_continuity() {
        let mut pipeline = Pipeline::default();
        let lines = vec![
            ("garbage", None),
            ("RadioLatency: 40 ms", Some(1)),
            ("RadioLatency: 40 ms", Some(2)),
        ];
        let batch = pipeline.process_batch(lines);
        assert_eq!(batch.misses.len(), 1);
        assert_eq!(batch.samples.len(), 2);
        assert!(batch.is_degenerate());

        let synthetic = batch.continuity(40, 42).unwrap();
        assert_eq!(synthetic.len(), 40);
        assert!(synthetic.iter().all(|s| s.synthetic));
        // Authoritative samples untouched
        assert_eq!(batch.samples.len(), 2);
    }

    #[test]
    fn test_varied_batch_has_no_continuity() {
        let mut pipeline = Pipeline::default();
        let batch = pipeline.process_batch(vec![
            ("RadioLatency: 40 ms", None),
            ("RadioLatency: 55 ms", None),
        ]);
        assert!(!batch.is_degenerate());
        assert!(batch.continuity(10, 1).is_none());
    }

    #[test]
    fn test_invariant_fuzz() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut pipeline = Pipeline::new(5, Limits::default());

        for i in 0..5000u64 {
            let node: i64 = rng.gen_range(-1_000_000..1_000_000);
            let radio: u32 = if rng.gen_bool(0.2) {
                rng.gen_range(4_000_000_000..=u32::MAX)
            } else {
                rng.gen()
            };
            let received = node + rng.gen_range(-2000..2000);
            let text = match rng.gen_range(0..4) {
                0 => line(i, node.abs(), radio),
                1 => format!("ID: {} | Timestamp: {} | Pressao: 1.0 hPa | RadioLatency: {} ms", i, node.abs(), radio),
                2 => format!("RadioLatency: {} ms", radio),
                _ => format!("{}.5,{},{}", i, i, radio),
            };
            let received = if rng.gen_bool(0.1) { None } else { Some(received) };

            let sample = pipeline.process(&text, received).unwrap();
            assert_eq!(
                sample.total_latency_ms(),
                sample.radio_latency_ms() as u64 + sample.relay_latency_ms() as u64
            );
            assert!(sample.radio_latency_ms() <= 1000);
            assert!(sample.relay_latency_ms() <= 500);
        }
    }
}
