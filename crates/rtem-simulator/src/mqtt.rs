use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration,
    Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rtem_domain::{parse_broker_url, Credential, DomainError, DomainResult, TelemetryTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    /// `mqtt://host:port`, `mqtts://host:port`, or bare `host:port`.
    pub broker_url: String,
    pub client_id: String,
    /// Broker CA certificate; TLS with mutual auth is used when set.
    pub ca_certificate_pem: Option<String>,
}

struct Connection {
    client: AsyncClient,
    poller: JoinHandle<()>,
    healthy: Arc<AtomicBool>,
}

/// MQTT implementation of the device-side transport over rumqttc.
///
/// `connect` blocks until the broker's ConnAck and maps an authorization
/// rejection to `DomainError::AuthenticationFailure`; afterwards a background
/// task drives the event loop and flags the connection unhealthy when it
/// drops, which surfaces as a publish failure on the next tick.
pub struct MqttTransport {
    config: MqttTransportConfig,
    connection: Mutex<Option<Connection>>,
}

impl MqttTransport {
    pub fn new(config: MqttTransportConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    fn options(&self, credential: &Credential) -> DomainResult<MqttOptions> {
        let (host, port) = parse_broker_url(&self.config.broker_url)?;

        let mut options = MqttOptions::new(&self.config.client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        if let Some(ca) = &self.config.ca_certificate_pem {
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca: ca.clone().into_bytes(),
                alpn: None,
                client_auth: Some((
                    credential.certificate_pem.clone().into_bytes(),
                    credential.private_key_pem.clone().into_bytes(),
                )),
            }));
        }

        Ok(options)
    }

    async fn wait_for_conn_ack(eventloop: &mut EventLoop) -> DomainResult<()> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        ConnectReturnCode::NotAuthorized
                        | ConnectReturnCode::BadUserNamePassword => {
                            Err(DomainError::AuthenticationFailure)
                        }
                        code => Err(DomainError::TransportFailure(format!(
                            "Broker refused connection: {code:?}"
                        ))),
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DomainError::TransportFailure(format!(
                        "Connection failed: {e}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl TelemetryTransport for MqttTransport {
    async fn connect(&self, credential: &Credential) -> DomainResult<()> {
        let mut connection = self.connection.lock().await;
        if let Some(previous) = connection.take() {
            let _ = previous.client.disconnect().await;
            previous.poller.abort();
        }

        let options = self.options(credential)?;
        let (client, mut eventloop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, Self::wait_for_conn_ack(&mut eventloop))
            .await
            .map_err(|_| {
                DomainError::TransportFailure(format!(
                    "Broker did not acknowledge within {CONNECT_TIMEOUT:?}"
                ))
            })??;

        info!(
            client_id = %self.config.client_id,
            broker_url = %self.config.broker_url,
            "Connected to MQTT broker"
        );

        let healthy = Arc::new(AtomicBool::new(true));
        let poller = {
            let healthy = Arc::clone(&healthy);
            let client_id = self.config.client_id.clone();
            tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(_) => {}
                        Err(e) => {
                            healthy.store(false, Ordering::SeqCst);
                            debug!(client_id = %client_id, error = %e, "MQTT event loop stopped");
                            break;
                        }
                    }
                }
            })
        };

        *connection = Some(Connection {
            client,
            poller,
            healthy,
        });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> DomainResult<()> {
        let connection = self.connection.lock().await;
        let connection = connection
            .as_ref()
            .ok_or_else(|| DomainError::TransportFailure("Not connected".to_string()))?;

        if !connection.healthy.load(Ordering::SeqCst) {
            return Err(DomainError::TransportFailure(
                "Connection to broker lost".to_string(),
            ));
        }

        connection
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| DomainError::TransportFailure(format!("Publish failed: {e}")))
    }

    async fn disconnect(&self) -> DomainResult<()> {
        if let Some(connection) = self.connection.lock().await.take() {
            if let Err(e) = connection.client.disconnect().await {
                warn!(error = %e, "MQTT disconnect failed");
            }
            connection.poller.abort();
        }
        Ok(())
    }
}
