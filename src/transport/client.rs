//! MQTT listener — subscribes to the broker and forwards decoded
//! messages to the alert engine over an mpsc channel.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::TransportError;
use crate::transport::TopicMessage;

/// MQTT connection configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Subscription filters (comma-separated in `MQTT_TOPICS`).
    pub topics: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    /// Build config from environment variables.
    /// Returns `None` if `MQTT_HOST` is not set (transport disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("MQTT_HOST").ok()?;

        let port: u16 = std::env::var("MQTT_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1883);

        let client_id =
            std::env::var("MQTT_CLIENT_ID").unwrap_or_else(|_| "mqtt-alert".to_string());

        let topics: Vec<String> = std::env::var("MQTT_TOPICS")
            .unwrap_or_else(|_| "device/#".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let username = std::env::var("MQTT_USERNAME").ok();
        let password = std::env::var("MQTT_PASSWORD").ok();

        let keep_alive_secs: u64 = std::env::var("MQTT_KEEP_ALIVE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Some(Self {
            host,
            port,
            client_id,
            topics,
            username,
            password,
            keep_alive_secs,
        })
    }
}

/// Handle to the background MQTT poll task.
pub struct MqttListener {
    client: AsyncClient,
}

impl MqttListener {
    /// Connect, subscribe, and spawn the poll loop.
    ///
    /// Decoded messages arrive on the returned receiver one at a time;
    /// undecodable payloads are logged and dropped. Connection errors
    /// are logged and the client reconnects on the next poll.
    pub async fn start(
        config: MqttConfig,
    ) -> Result<(Self, mpsc::Receiver<TopicMessage>), TransportError> {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);
        for topic in &config.topics {
            client
                .subscribe(topic.clone(), QoS::AtMostOnce)
                .await
                .map_err(|e| {
                    TransportError::Connection(format!("subscribe to {topic} failed: {e}"))
                })?;
        }
        info!(
            host = %config.host,
            port = config.port,
            topics = ?config.topics,
            "MQTT listener started"
        );

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match TopicMessage::decode(&publish.topic, &publish.payload) {
                            Ok(message) => {
                                if tx.send(message).await.is_err() {
                                    info!("message consumer dropped, stopping MQTT poll loop");
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(topic = %publish.topic, error = %e, "dropping undecodable payload");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT connection error");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Ok((Self { client }, rx))
    }

    /// Disconnect; the poll loop ends once the broker closes the session.
    pub async fn stop(&self) {
        let _ = self.client.disconnect().await;
    }
}
