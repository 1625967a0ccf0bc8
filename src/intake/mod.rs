// Line intake
// Sources that deliver raw telemetry lines stamped with station receive time

pub mod reader;
pub mod tcp;
pub mod mqtt;

pub use reader::read_lines;
pub use tcp::TcpIntake;
pub use mqtt::MqttIntake;

/// A raw telemetry line as obtained by a collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub text: String,
    /// Station wall clock (ms) when the line was obtained
    pub received_at_ms: Option<i64>,
}

impl RawLine {
    /// Stamp a line with the current station time
    pub fn stamped_now(text: String) -> Self {
        RawLine {
            text,
            received_at_ms: Some(now_ms()),
        }
    }
}

/// Station wall clock in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Split a replay row `<unix_secs>,<payload>` as written by the radio logger.
///
/// The payload may be wrapped in double quotes with `""` escapes.
pub fn split_stamped(line: &str) -> Option<(i64, String)> {
    let (secs, payload) = line.split_once(',')?;
    let secs: f64 = secs.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }

    let payload = payload.trim();
    let payload = match payload.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => payload.to_string(),
    };

    Some(((secs * 1000.0).round() as i64, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_stamped_plain() {
        let (ms, payload) =
            split_stamped("1750133523.62,ID: 1 | Timestamp: 5 | RadioLatency: 40 ms").unwrap();
        assert_eq!(ms, 1_750_133_523_620);
        assert_eq!(payload, "ID: 1 | Timestamp: 5 | RadioLatency: 40 ms");
    }

    #[test]
    fn test_split_stamped_quoted() {
        let (ms, payload) = split_stamped("12.5,\"Accel [X,Y,Z]: 1, 2, 3 | say \"\"hi\"\"\"").unwrap();
        assert_eq!(ms, 12_500);
        assert_eq!(payload, "Accel [X,Y,Z]: 1, 2, 3 | say \"hi\"");
    }

    #[test]
    fn test_split_stamped_header() {
        assert!(split_stamped("timestamp,valor").is_none());
        assert!(split_stamped("no comma").is_none());
    }

    #[test]
    fn test_now_ms_positive() {
        assert!(now_ms() > 1_600_000_000_000);
        assert!(RawLine::stamped_now("x".into()).received_at_ms.is_some());
    }
}
