use clap::Parser;

use crate::constants::{CALIBRATION_WINDOW, RADIO_CAP, RELAY_CAP};
use crate::reconcile::Limits;

/// Radio/MQTT relay latency reconciler
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Read telemetry lines from this file instead of stdin
    #[arg(long, value_name = "FILE")]
    pub input: Option<String>,

    /// Input lines are replay rows `<unix_secs>,<payload>` carrying their own receive time
    #[arg(long, default_value_t = false)]
    pub stamped: bool,

    /// Listen on host:port for line-oriented telemetry over TCP
    #[arg(long, value_name = "ADDR")]
    pub listen: Vec<String>,

    /// Subscribe to raw telemetry on this MQTT broker (mqtt://host[:port])
    #[arg(long, value_name = "URL")]
    pub mqtt_broker: Option<String>,

    /// MQTT topic carrying raw telemetry lines
    #[arg(long, default_value = "cansat/estacao/teste1/raw")]
    pub mqtt_topic: String,

    /// MQTT client identifier
    #[arg(long, default_value = "relay-latency")]
    pub client_id: String,

    /// Append reconciled samples in CSV format to a local file
    #[arg(long, value_name = "FILE")]
    pub write_csv: Vec<String>,

    /// Write reconciled samples as JSON lines to stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Number of skew samples used to fix the clock offset
    #[arg(long, default_value_t = CALIBRATION_WINDOW)]
    pub calibration_window: usize,

    /// Relay latencies above this (ms) are replaced by the typical value
    #[arg(long, default_value_t = RELAY_CAP)]
    pub relay_cap: u32,

    /// Radio latencies above this (ms) are replaced by the typical value
    #[arg(long, default_value_t = RADIO_CAP)]
    pub radio_cap: u32,

    /// Log a latency summary every N samples, 0 to disable
    #[arg(long, default_value_t = 5)]
    pub summary_every: usize,

    /// Write N synthetic (labeled) samples as CSV to stdout and exit
    #[arg(long, value_name = "N")]
    pub synthetic: Option<usize>,

    /// Seed for synthetic mode
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Plausibility limits for the reconciler
    pub fn limits(&self) -> Limits {
        Limits {
            relay_cap: self.relay_cap,
            radio_cap: self.radio_cap,
            ..Limits::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.calibration_window == 0 {
            anyhow::bail!("calibration_window must be greater than 0");
        }

        if let Some(url) = &self.mqtt_broker {
            if !url.starts_with("mqtt://") && !url.starts_with("mqtts://") {
                anyhow::bail!("Invalid MQTT broker URL: {} (must start with mqtt:// or mqtts://)", url);
            }
        }

        if self.input.is_some() && (self.mqtt_broker.is_some() || !self.listen.is_empty()) {
            anyhow::bail!("--input cannot be combined with --mqtt-broker or --listen");
        }

        if self.stamped && (self.mqtt_broker.is_some() || !self.listen.is_empty()) {
            anyhow::bail!("--stamped only applies to file or stdin input");
        }

        for addr in &self.listen {
            if addr.parse::<std::net::SocketAddr>().is_err() {
                anyhow::bail!("Invalid listen address: {} (expected host:port)", addr);
            }
        }

        Ok(())
    }
}
