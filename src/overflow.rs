// 32-bit wraparound repair for node-reported radio latency
//
// The node computes latency as an unsigned difference of two millisecond
// tick counts. When the subtraction underflows the value lands just below
// 2^32 instead of going negative.

use crate::constants::{OVERFLOW_THRESHOLD, WRAP_MODULUS};

/// Radio latency after wraparound repair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectedLatency {
    pub radio_latency_ms: u32,
}

impl CorrectedLatency {
    pub fn from_raw(raw: u32) -> Self {
        CorrectedLatency {
            radio_latency_ms: correct(raw),
        }
    }
}

/// Undo a 32-bit underflow in a raw latency value.
///
/// Values above [`OVERFLOW_THRESHOLD`] become `|raw - 2^32|`, everything else
/// passes through. The result is always at most `2^32 - OVERFLOW_THRESHOLD`,
/// so a second application is a no-op.
pub fn correct(raw: u32) -> u32 {
    if raw > OVERFLOW_THRESHOLD {
        // raw < 2^32, so the difference fits and is positive
        (WRAP_MODULUS - raw as u64) as u32
    } else {
        raw
    }
}

/// True if `raw` falls in the wrap region and would be rewritten by [`correct`].
pub fn is_wrapped(raw: u32) -> bool {
    raw > OVERFLOW_THRESHOLD
}
