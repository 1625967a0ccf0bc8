//! MQTT subscriber intake
//!
//! Subscribes to the relay topic carrying raw telemetry lines and forwards
//! each payload, stamped with the moment it was received, to the pipeline.

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::RawLine;

/// MQTT subscriber feeding raw lines
pub struct MqttIntake {
    client: AsyncClient,
    event_loop_handle: JoinHandle<()>,
}

impl MqttIntake {
    /// Connect to the broker and subscribe to `topic`
    ///
    /// # Arguments
    /// * `broker_url` - URL like "mqtt://localhost:1883"
    /// * `client_id` - Unique client identifier
    /// * `topic` - Topic carrying raw telemetry lines (e.g. "cansat/estacao/teste1/raw")
    /// * `tx` - Channel into the pipeline
    pub async fn start(
        broker_url: &str,
        client_id: &str,
        topic: &str,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<Self> {
        info!(broker = broker_url, client_id = client_id, topic = topic, "Connecting to MQTT broker");

        let (host, port) = parse_broker_url(broker_url)?;

        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(Duration::from_secs(30));

        let (client, mut event_loop) = AsyncClient::new(mqttoptions, 10);

        let sub_client = client.clone();
        let topic = topic.to_string();

        let event_loop_handle = tokio::spawn(async move {
            info!("MQTT event loop started");
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Subscribe on every (re)connect
                        if let Err(e) = sub_client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                            error!("MQTT subscribe to {} failed: {}", topic, e);
                        } else {
                            info!(topic = %topic, "Subscribed");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic != topic {
                            continue;
                        }
                        let text = String::from_utf8_lossy(&publish.payload).into_owned();
                        debug!(topic = %publish.topic, payload_len = text.len(), "MQTT line received");
                        if tx.send(RawLine::stamped_now(text)).await.is_err() {
                            warn!("Line consumer closed, stopping MQTT intake");
                            break;
                        }
                    }
                    Ok(notification) => {
                        debug!("MQTT notification: {:?}", notification);
                    }
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            event_loop_handle,
        })
    }

    /// Disconnect from the broker and stop the event loop
    pub async fn shutdown(self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect: {}", e);
        }
        self.event_loop_handle.abort();
    }
}

/// Parse MQTT broker URL into host and port
///
/// Supports:
/// - mqtt://localhost:1883
/// - mqtt://192.168.1.100:1883
/// - mqtts://broker.example.com:8883
pub fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let url_without_protocol = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("mqtts://"))
        .context("Invalid MQTT URL: must start with mqtt:// or mqtts://")?;

    if let Some((host, port_str)) = url_without_protocol.split_once(':') {
        let port = port_str
            .parse::<u16>()
            .context("Invalid port number in MQTT URL")?;
        Ok((host.to_string(), port))
    } else {
        Ok((url_without_protocol.to_string(), 1883))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);

        let (host, port) = parse_broker_url("mqtts://broker.hivemq.com:8883").unwrap();
        assert_eq!(host, "broker.hivemq.com");
        assert_eq!(port, 8883);

        // Default port
        let (host, port) = parse_broker_url("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);

        assert!(parse_broker_url("http://localhost:1883").is_err());
        assert!(parse_broker_url("mqtt://localhost:notaport").is_err());
    }
}
