//! MQTT-backed bus
//!
//! Each node subscribes to `<base_topic>/<device_id>` at QoS 1 and posts to
//! the topic of the message's target. The broker gives per-topic ordering and
//! at-least-once delivery; the poll loop resubscribes on every (re)connect.

use std::time::Duration;

use async_trait::async_trait;
use hub_core::Message;
use rumqttc::{AsyncClient, Event as MqttEvent, EventLoop, MqttOptions, Packet, QoS};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{dispatch_payload, Bus, BusError, BusResult, LoopId, MessageHandler};

/// Broker connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname or IP address
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Prefix of every device topic
    pub base_topic: String,
    pub keep_alive_secs: u64,
    /// Delay before reconnecting after a connection error
    pub reconnect_backoff_ms: u64,
    /// Capacity of the client request queue
    pub capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "hubd".to_string(),
            base_topic: "hub".to_string(),
            keep_alive_secs: 30,
            reconnect_backoff_ms: 1000,
            capacity: 64,
        }
    }
}

impl MqttConfig {
    /// Topic a device listens on
    pub fn device_topic(&self, device_id: &str) -> String {
        format!("{}/{}", self.base_topic.trim_end_matches('/'), device_id)
    }
}

/// Bus on top of an MQTT broker
pub struct MqttBus {
    device_id: String,
    config: MqttConfig,
    client: AsyncClient,
    eventloop: Mutex<EventLoop>,
}

impl MqttBus {
    /// Create the client; nothing connects until the bus is polled
    pub fn new(device_id: impl Into<String>, config: MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        let (client, eventloop) = AsyncClient::new(options, config.capacity.max(2));
        let device_id = device_id.into();

        // queued ahead of any post so messages to ourselves are not missed
        if let Err(err) = client.try_subscribe(config.device_topic(&device_id), QoS::AtLeastOnce) {
            debug!(error = %err, "Initial subscription not queued");
        }

        Self {
            device_id,
            config,
            client,
            eventloop: Mutex::new(eventloop),
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }
}

#[async_trait]
impl Bus for MqttBus {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn post(&self, msg: Message) -> BusResult<()> {
        let msg = msg.with_defaults(&self.device_id);
        let topic = self
            .config
            .device_topic(msg.target().unwrap_or(self.device_id.as_str()));
        let payload = msg.encode()?;

        debug!(topic = %topic, kind = msg.kind(), "Publishing message");
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|err| BusError::Transport(err.to_string()))
    }

    async fn poll(&self, loop_id: &LoopId, handler: &dyn MessageHandler) -> BusResult<()> {
        let mut eventloop = self
            .eventloop
            .try_lock()
            .map_err(|_| BusError::AlreadyPolling)?;
        let topic = self.config.device_topic(&self.device_id);
        let backoff = Duration::from_millis(self.config.reconnect_backoff_ms);
        let mut connected = false;
        // set on every ConnAck until the subscribe request fits in the queue
        let mut subscribe_pending = false;
        let mut subscribe_warned = false;

        info!(
            loop_id = %loop_id,
            broker = %format!("{}:{}", self.config.host, self.config.port),
            topic = %topic,
            "Starting MQTT poll loop"
        );

        loop {
            match eventloop.poll().await {
                Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                    info!(topic = %topic, "Connected to broker, subscribing");
                    connected = true;
                    subscribe_pending = true;
                }
                Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                    if dispatch_payload(&publish.payload, &self.device_id, loop_id, handler).await
                    {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    if connected {
                        warn!(error = %err, "Broker connection lost, reconnecting");
                    } else {
                        debug!(error = %err, "Broker still unreachable");
                    }
                    connected = false;
                    eventloop.clean();
                    tokio::time::sleep(backoff).await;
                }
            }

            if subscribe_pending {
                match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                    Ok(()) => {
                        subscribe_pending = false;
                        subscribe_warned = false;
                    }
                    Err(err) if !subscribe_warned => {
                        warn!(topic = %topic, error = %err, "Subscription not queued, will retry");
                        subscribe_warned = true;
                    }
                    Err(_) => {}
                }
            }
        }
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("device_id", &self.device_id)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MqttConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.reconnect_backoff_ms, 1000);
    }

    #[test]
    fn test_device_topic() {
        let config = MqttConfig {
            base_topic: "home/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.device_topic("kitchen"), "home/kitchen");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MqttConfig =
            serde_json::from_value(serde_json::json!({"host": "10.0.0.2", "port": 8883})).unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 8883);
        assert_eq!(config.base_topic, "hub");
    }

    #[tokio::test]
    async fn test_post_enqueues_without_broker() {
        let bus = MqttBus::new("hub", MqttConfig::default());
        assert!(bus.post(hub_core::Event::ping("x").into()).is_ok());
    }
}
