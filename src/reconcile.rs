// Latency reconciliation
// Derives relay latency from clock-compensated timestamps and builds the
// (radio, relay, total) triple. Total is always the sum of the parts.

use serde::Serialize;
use tracing::debug;

use crate::clock_offset::OffsetSnapshot;
use crate::constants::{
    PROVISIONAL_RELAY_LATENCY, RADIO_CAP, RELAY_CAP, TYPICAL_RADIO_LATENCY, TYPICAL_RELAY_LATENCY,
};
use crate::extract::TelemetryRecord;
use crate::overflow::CorrectedLatency;

/// Plausibility bounds and substitute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub relay_cap: u32,
    pub radio_cap: u32,
    pub typical_relay: u32,
    pub typical_radio: u32,
    pub provisional_relay: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            relay_cap: RELAY_CAP,
            radio_cap: RADIO_CAP,
            typical_relay: TYPICAL_RELAY_LATENCY,
            typical_radio: TYPICAL_RADIO_LATENCY,
            provisional_relay: PROVISIONAL_RELAY_LATENCY,
        }
    }
}

/// One reconciled observation.
///
/// Only [`Reconciler::reconcile`] creates these, so
/// `total_latency_ms == radio_latency_ms + relay_latency_ms` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledSample {
    id: u64,
    received_at_ms: Option<i64>,
    radio_latency_ms: u32,
    relay_latency_ms: u32,
    total_latency_ms: u64,
    radio_clamped: bool,
    relay_clamped: bool,
    relay_provisional: bool,
    approximate: bool,
}

impl ReconciledSample {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn received_at_ms(&self) -> Option<i64> {
        self.received_at_ms
    }

    pub fn radio_latency_ms(&self) -> u32 {
        self.radio_latency_ms
    }

    pub fn relay_latency_ms(&self) -> u32 {
        self.relay_latency_ms
    }

    pub fn total_latency_ms(&self) -> u64 {
        self.total_latency_ms
    }

    /// Radio latency was out of range and replaced
    pub fn radio_clamped(&self) -> bool {
        self.radio_clamped
    }

    /// Relay latency was out of range and replaced
    pub fn relay_clamped(&self) -> bool {
        self.relay_clamped
    }

    /// Relay latency is the provisional constant, not a measurement
    pub fn relay_provisional(&self) -> bool {
        self.relay_provisional
    }

    /// Source record had a synthesized id or node timestamp
    pub fn approximate(&self) -> bool {
        self.approximate
    }

    /// Any substitution happened
    pub fn clamped(&self) -> bool {
        self.radio_clamped || self.relay_clamped
    }
}

/// Builds reconciled samples under a fixed set of limits
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    limits: Limits,
}

impl Reconciler {
    pub fn new(limits: Limits) -> Self {
        Reconciler { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Reconcile one record. Never fails; unusable inputs degrade to
    /// provisional or typical values and are flagged.
    pub fn reconcile(
        &self,
        corrected: CorrectedLatency,
        record: &TelemetryRecord,
        offset: &OffsetSnapshot,
    ) -> ReconciledSample {
        let limits = &self.limits;

        // A placeholder node timestamp carries no relay information
        let measured = match (
            offset.calibrated_offset(),
            record.station_receive_time,
            record.node_timestamp,
        ) {
            _ if record.approximate => None,
            (Some(offset_ms), Some(received), Some(sent)) => {
                Some(received as i128 - sent as i128 - offset_ms as i128)
            }
            _ => None,
        };

        let (relay_latency_ms, relay_provisional, relay_clamped) = match measured {
            None => (limits.provisional_relay, true, false),
            Some(relay) if (0..=limits.relay_cap as i128).contains(&relay) => {
                (relay as u32, false, false)
            }
            Some(relay) => {
                debug!(
                    id = record.id,
                    relay_ms = %relay,
                    substitute_ms = limits.typical_relay,
                    "Relay latency out of range, clamped"
                );
                (limits.typical_relay, false, true)
            }
        };

        let (radio_latency_ms, radio_clamped) = if corrected.radio_latency_ms <= limits.radio_cap {
            (corrected.radio_latency_ms, false)
        } else {
            debug!(
                id = record.id,
                radio_ms = corrected.radio_latency_ms,
                substitute_ms = limits.typical_radio,
                "Radio latency out of range, clamped"
            );
            (limits.typical_radio, true)
        };

        ReconciledSample {
            id: record.id,
            received_at_ms: record.station_receive_time,
            radio_latency_ms,
            relay_latency_ms,
            total_latency_ms: radio_latency_ms as u64 + relay_latency_ms as u64,
            radio_clamped,
            relay_clamped,
            relay_provisional,
            approximate: record.approximate,
        }
    }
}
