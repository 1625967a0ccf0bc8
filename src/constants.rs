// Shared constants for latency reconciliation
// Values are in milliseconds unless noted otherwise

/// Raw radio latencies above this are treated as 32-bit underflow.
/// Sits between any plausible latency and the wrap region near 2^32.
pub const OVERFLOW_THRESHOLD: u32 = 4_000_000_000;

/// Modulus of the node's millisecond tick counter (2^32).
pub const WRAP_MODULUS: u64 = 1 << 32;

/// Number of skew observations used to fix the clock offset.
pub const CALIBRATION_WINDOW: usize = 10;

/// Relay latency reported while the clock offset is still calibrating.
pub const PROVISIONAL_RELAY_LATENCY: u32 = 50;

/// Upper bound for a believable relay latency on the local network.
pub const RELAY_CAP: u32 = 500;

/// Substitute for a relay latency outside `[0, RELAY_CAP]`.
pub const TYPICAL_RELAY_LATENCY: u32 = 15;

/// Upper bound for a believable radio latency.
pub const RADIO_CAP: u32 = 1000;

/// Substitute for a radio latency outside `[0, RADIO_CAP]`.
pub const TYPICAL_RADIO_LATENCY: u32 = 50;

/// Placeholder node timestamp for approximate records is the receive time minus this.
pub const PLACEHOLDER_TIMESTAMP_LEAD: i64 = 50;

/// Number of recent samples kept for rolling statistics.
pub const ROLLING_WINDOW: usize = 100;
