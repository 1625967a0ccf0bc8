// Telemetry line field extraction
//
// Tool versions on the node and station side have printed telemetry in
// several layouts. Each layout has a recognizer; the cascade tries them from
// most specific to least specific and the first hit wins.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::PLACEHOLDER_TIMESTAMP_LEAD;

/// Known telemetry layouts, in cascade order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `ID: n | Timestamp: n | <fields> | RadioLatency: n ms | ...`
    SensorPayload,
    /// `ID: n | Timestamp: n | RadioLatency: n ms`
    LatencyPayload,
    /// `station_ts,id,radio_latency,...` dashboard row
    Columnar,
    /// `Radio Latency: nms, MQTT Latency: nms, Total: nms`
    RelaySummary,
    /// `RadioLatency: n ms` anywhere in the line
    LatencyOnly,
}

/// Recognizers in priority order. A looser layout must never be tried
/// before a stricter one.
pub const CASCADE: [Layout; 5] = [
    Layout::SensorPayload,
    Layout::LatencyPayload,
    Layout::Columnar,
    Layout::RelaySummary,
    Layout::LatencyOnly,
];

/// What a single recognizer could read out of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    pub id: Option<u64>,
    pub node_timestamp: Option<i64>,
    pub radio_latency_raw: u32,
    /// Station clock time carried inside the line itself (columnar rows)
    pub station_time: Option<i64>,
}

impl Layout {
    pub fn name(&self) -> &'static str {
        match self {
            Layout::SensorPayload => "sensor_payload",
            Layout::LatencyPayload => "latency_payload",
            Layout::Columnar => "columnar",
            Layout::RelaySummary => "relay_summary",
            Layout::LatencyOnly => "latency_only",
        }
    }

    /// Try this layout against a line
    pub fn recognize(&self, line: &str) -> Option<Partial> {
        match self {
            Layout::SensorPayload => recognize_payload(line, true),
            Layout::LatencyPayload => recognize_payload(line, false),
            Layout::Columnar => recognize_columnar(line),
            Layout::RelaySummary => recognize_relay_summary(line),
            Layout::LatencyOnly => recognize_latency_only(line),
        }
    }
}

/// One observation from the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    /// Node sequence number, or a placeholder when not observable
    pub id: u64,
    /// Node clock at transmit time (ms). Placeholder for approximate records.
    pub node_timestamp: Option<i64>,
    /// Radio latency as reported, possibly wrapped modulo 2^32
    pub radio_latency_raw: u32,
    /// Station clock at relay receipt (ms)
    pub station_receive_time: Option<i64>,
    /// Id and/or node timestamp were synthesized; never use for calibration
    pub approximate: bool,
    pub layout: Layout,
}

/// No recognizer matched the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionMiss {
    pub line: String,
}

impl fmt::Display for ExtractionMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no telemetry layout matched line: {:?}", self.line)
    }
}

impl std::error::Error for ExtractionMiss {}

/// Field extractor with its placeholder id counter
#[derive(Debug)]
pub struct Extractor {
    next_placeholder_id: AtomicU64,
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            next_placeholder_id: AtomicU64::new(1),
        }
    }

    /// Turn a raw line into a record.
    ///
    /// `received_at` is the station time (ms) at which the collaborator got
    /// the line, if it knows it.
    pub fn try_extract(
        &self,
        line: &str,
        received_at: Option<i64>,
    ) -> Result<TelemetryRecord, ExtractionMiss> {
        let line = line.trim();
        for layout in CASCADE {
            if let Some(partial) = layout.recognize(line) {
                return Ok(self.build(layout, partial, received_at));
            }
        }
        Err(ExtractionMiss {
            line: line.to_string(),
        })
    }

    fn build(&self, layout: Layout, partial: Partial, received_at: Option<i64>) -> TelemetryRecord {
        let station_receive_time = received_at.or(partial.station_time);

        match (partial.id, partial.node_timestamp) {
            (Some(id), Some(node_timestamp)) => TelemetryRecord {
                id,
                node_timestamp: Some(node_timestamp),
                radio_latency_raw: partial.radio_latency_raw,
                station_receive_time,
                approximate: false,
                layout,
            },
            (id, _) => TelemetryRecord {
                id: id.unwrap_or_else(|| self.placeholder_id()),
                node_timestamp: station_receive_time
                    .and_then(|t| t.checked_sub(PLACEHOLDER_TIMESTAMP_LEAD)),
                radio_latency_raw: partial.radio_latency_raw,
                station_receive_time,
                approximate: true,
                layout,
            },
        }
    }

    fn placeholder_id(&self) -> u64 {
        self.next_placeholder_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split leading ASCII digits off `s`
fn leading_digits(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(s.split_at(end))
}

/// Parse `<key><digits>` with nothing after the digits
fn keyed_number(segment: &str, key: &str) -> Option<u64> {
    let (digits, rest) = leading_digits(segment.strip_prefix(key)?)?;
    if !rest.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parse `RadioLatency: <digits> ms` at the start of `s`
fn radio_latency_at(s: &str) -> Option<u32> {
    let (digits, rest) = leading_digits(s.strip_prefix("RadioLatency: ")?)?;
    if !rest.starts_with(" ms") {
        return None;
    }
    digits.parse().ok()
}

/// Id at the tail of a segment, e.g. `ID: 42` or `Recebido: ID: 42`
fn trailing_id(segment: &str) -> Option<u64> {
    let start = segment.rfind("ID: ")?;
    keyed_number(&segment[start..], "ID: ")
}

/// Pipe-separated payload with id, node timestamp and radio latency.
///
/// With `with_fields` at least one extra segment must sit between
/// `Timestamp` and `RadioLatency`; without it they must be adjacent.
fn recognize_payload(line: &str, with_fields: bool) -> Option<Partial> {
    let segments: Vec<&str> = line.split('|').map(str::trim).collect();

    for i in 0..segments.len() {
        let Some(id) = trailing_id(segments[i]) else {
            continue;
        };
        let Some(node_timestamp) = segments
            .get(i + 1)
            .and_then(|s| keyed_number(s, "Timestamp: "))
        else {
            continue;
        };

        let radio = if with_fields {
            segments
                .iter()
                .skip(i + 3)
                .find_map(|s| radio_latency_at(s))
        } else {
            segments.get(i + 2).and_then(|s| radio_latency_at(s))
        };

        if let Some(radio_latency_raw) = radio {
            return Some(Partial {
                id: Some(id),
                node_timestamp: i64::try_from(node_timestamp).ok(),
                radio_latency_raw,
                station_time: None,
            });
        }
    }
    None
}

/// `station_ts,id,radio_latency[,...]` with unix seconds in the first column
fn recognize_columnar(line: &str) -> Option<Partial> {
    let mut cols = line.split(',').map(str::trim);
    let station_secs: f64 = cols.next()?.parse().ok()?;
    let id: u64 = cols.next()?.parse().ok()?;
    let radio_latency_raw: u32 = cols.next()?.parse().ok()?;

    if !station_secs.is_finite() || station_secs < 0.0 {
        return None;
    }

    Some(Partial {
        id: Some(id),
        node_timestamp: None,
        radio_latency_raw,
        station_time: Some((station_secs * 1000.0).round() as i64),
    })
}

/// Legacy relay log line; only the radio part is trusted
fn recognize_relay_summary(line: &str) -> Option<Partial> {
    let start = line.find("Radio Latency: ")?;
    let rest = &line[start + "Radio Latency: ".len()..];
    let (radio, rest) = leading_digits(rest)?;
    let rest = rest.strip_prefix("ms, MQTT Latency: ")?;
    let (_, rest) = leading_digits(rest)?;
    let rest = rest.strip_prefix("ms, Total: ")?;
    let (_, rest) = leading_digits(rest)?;
    if !rest.starts_with("ms") {
        return None;
    }

    Some(Partial {
        id: None,
        node_timestamp: None,
        radio_latency_raw: radio.parse().ok()?,
        station_time: None,
    })
}

fn recognize_latency_only(line: &str) -> Option<Partial> {
    line.match_indices("RadioLatency: ")
        .find_map(|(idx, _)| radio_latency_at(&line[idx..]))
        .map(|radio_latency_raw| Partial {
            id: None,
            node_timestamp: None,
            radio_latency_raw,
            station_time: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR_LINE: &str = "ID: 17 | Timestamp: 1000 | Intervalo: 1000 ms | RadioLatency: 45 ms | Temperatura: 23.60 C";

    #[test]
    fn test_sensor_payload() {
        let extractor = Extractor::new();
        let record = extractor.try_extract(SENSOR_LINE, Some(1248)).unwrap();
        assert_eq!(record.layout, Layout::SensorPayload);
        assert_eq!(record.id, 17);
        assert_eq!(record.node_timestamp, Some(1000));
        assert_eq!(record.radio_latency_raw, 45);
        assert_eq!(record.station_receive_time, Some(1248));
        assert!(!record.approximate);
    }

    #[test]
    fn test_latency_payload() {
        let extractor = Extractor::new();
        let record = extractor
            .try_extract("ID: 3 | Timestamp: 52000 | RadioLatency: 4294967271 ms", None)
            .unwrap();
        assert_eq!(record.layout, Layout::LatencyPayload);
        assert_eq!(record.id, 3);
        assert_eq!(record.node_timestamp, Some(52000));
        assert_eq!(record.radio_latency_raw, 4_294_967_271);
        assert_eq!(record.station_receive_time, None);
        assert!(!record.approximate);
    }

    #[test]
    fn test_latency_payload_with_trailing_fields() {
        let record = Extractor::new()
            .try_extract("ID: 9 | Timestamp: 10 | RadioLatency: 12 ms | Pressao: 1023.6 hPa", None)
            .unwrap();
        assert_eq!(record.layout, Layout::LatencyPayload);
        assert_eq!(record.radio_latency_raw, 12);
    }

    #[test]
    fn test_specific_layout_wins_over_substring() {
        // LatencyOnly also matches this line; the payload layout must win
        assert!(Layout::LatencyOnly.recognize(SENSOR_LINE).is_some());
        let record = Extractor::new().try_extract(SENSOR_LINE, Some(5000)).unwrap();
        assert_eq!(record.layout, Layout::SensorPayload);
        assert!(!record.approximate);
    }

    #[test]
    fn test_prefixed_id_segment() {
        let record = Extractor::new()
            .try_extract("Recebido: ID: 8 | Timestamp: 700 | RadioLatency: 30 ms", None)
            .unwrap();
        assert_eq!(record.id, 8);
        assert_eq!(record.node_timestamp, Some(700));
    }

    #[test]
    fn test_latency_only_is_approximate() {
        let extractor = Extractor::new();
        let record = extractor.try_extract("RadioLatency: 61 ms", Some(10_000)).unwrap();
        assert_eq!(record.layout, Layout::LatencyOnly);
        assert!(record.approximate);
        assert_eq!(record.radio_latency_raw, 61);
        assert_eq!(record.node_timestamp, Some(10_000 - PLACEHOLDER_TIMESTAMP_LEAD));
        assert_eq!(record.station_receive_time, Some(10_000));
    }

    #[test]
    fn test_latency_only_without_receive_time() {
        let record = Extractor::new().try_extract("x RadioLatency: 61 ms", None).unwrap();
        assert!(record.approximate);
        assert_eq!(record.node_timestamp, None);
    }

    #[test]
    fn test_placeholder_at_clock_minimum() {
        let record = Extractor::new()
            .try_extract("RadioLatency: 4 ms", Some(i64::MIN))
            .unwrap();
        assert!(record.approximate);
        assert_eq!(record.node_timestamp, None);
        assert_eq!(record.station_receive_time, Some(i64::MIN));
    }

    #[test]
    fn test_placeholder_ids_increase() {
        let extractor = Extractor::new();
        let a = extractor.try_extract("RadioLatency: 1 ms", None).unwrap();
        let b = extractor.try_extract("RadioLatency: 2 ms", None).unwrap();
        let c = extractor.try_extract("RadioLatency: 3 ms", None).unwrap();
        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn test_columnar_row() {
        let extractor = Extractor::new();
        let record = extractor
            .try_extract("1750133523.62,4529,52,50,102,23.60,1023.6", None)
            .unwrap();
        assert_eq!(record.layout, Layout::Columnar);
        assert_eq!(record.id, 4529);
        assert_eq!(record.radio_latency_raw, 52);
        assert_eq!(record.station_receive_time, Some(1_750_133_523_620));
        assert!(record.approximate);
        // Explicit receive time takes precedence over the column
        let record = extractor.try_extract("1750133523.62,4529,52", Some(99)).unwrap();
        assert_eq!(record.station_receive_time, Some(99));
    }

    #[test]
    fn test_columnar_header_is_miss() {
        let result = Extractor::new()
            .try_extract("timestamp,id,radio_latency,mqtt_latency,total_latency", None);
        assert!(result.is_err());
    }

    #[test]
    fn test_relay_summary() {
        let record = Extractor::new()
            .try_extract("Radio Latency: 48ms, MQTT Latency: 15ms, Total: 63ms", None)
            .unwrap();
        assert_eq!(record.layout, Layout::RelaySummary);
        assert_eq!(record.radio_latency_raw, 48);
        assert!(record.approximate);
    }

    #[test]
    fn test_radio_latency_too_large_for_u32() {
        assert!(Extractor::new()
            .try_extract("RadioLatency: 4294967296 ms", None)
            .is_err());
    }

    #[test]
    fn test_miss() {
        let extractor = Extractor::new();
        assert!(extractor.try_extract("", None).is_err());
        assert!(extractor.try_extract("garbage line", None).is_err());
        assert!(extractor.try_extract("RadioLatency: ms", None).is_err());
        let err = extractor.try_extract("hello", None).unwrap_err();
        assert!(err.to_string().contains("hello"));
    }

    #[test]
    fn test_cascade_order() {
        assert_eq!(CASCADE[0], Layout::SensorPayload);
        assert_eq!(CASCADE[CASCADE.len() - 1], Layout::LatencyOnly);
    }
}
