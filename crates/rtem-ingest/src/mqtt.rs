use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rtem_domain::{parse_broker_url, DomainResult, InboundMessage, InboundSource};

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub broker_url: String,
    pub client_id: String,
    /// Subscription filter; the default matches every `{sensor_type}/{device_id}` topic.
    pub topic_filter: String,
    pub channel_capacity: usize,
}

impl MqttSourceConfig {
    pub fn new(broker_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: client_id.into(),
            topic_filter: "+/+".to_string(),
            channel_capacity: 1024,
        }
    }
}

/// MQTT implementation of the inbound source.
///
/// A background task drives the rumqttc event loop, re-subscribing after
/// each ConnAck so reconnects pick the filter back up, and stamps every
/// delivered message with the ingest-side receive time. Connection errors
/// are retried indefinitely; the broker being down shows up as silence, not
/// worker shutdown.
pub struct MqttSource {
    rx: mpsc::Receiver<InboundMessage>,
    eventloop_task: JoinHandle<()>,
}

impl MqttSource {
    pub fn connect(config: MqttSourceConfig) -> DomainResult<Self> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        let mut options = MqttOptions::new(&config.client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity);
        let (tx, rx) = mpsc::channel(config.channel_capacity);

        let filter = config.topic_filter.clone();
        let broker_url = config.broker_url.clone();
        let eventloop_task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code != ConnectReturnCode::Success {
                            warn!(broker_url = %broker_url, code = ?ack.code, "Broker refused connection");
                            tokio::time::sleep(RETRY_DELAY).await;
                            continue;
                        }
                        info!(broker_url = %broker_url, filter = %filter, "Connected, subscribing");
                        if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
                            warn!(error = %e, "Subscribe failed");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload,
                            received_at: Utc::now(),
                        };
                        if tx.send(message).await.is_err() {
                            debug!("Inbound channel closed, stopping MQTT source");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(broker_url = %broker_url, error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        });

        Ok(Self { rx, eventloop_task })
    }
}

#[async_trait]
impl InboundSource for MqttSource {
    async fn next(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

impl Drop for MqttSource {
    fn drop(&mut self) {
        self.eventloop_task.abort();
    }
}
