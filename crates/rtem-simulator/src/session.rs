use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rtem_domain::{
    format_topic, CredentialResolver, Device, DomainError, ReadingGenerator, TelemetryTransport,
};

use crate::backoff::{Backoff, BackoffConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Cadence between readings for this device.
    pub interval: Duration,
    pub backoff: BackoffConfig,
}

/// Publisher session for one simulated device.
///
/// Owns the device's generator and transport connection and drives the
/// connect/publish lifecycle:
/// 1. On each cadence tick, connect first if disconnected (resolving the
///    credential, backing off on failure).
/// 2. Generate the next reading and publish it.
/// 3. On publish failure, drop the reading, disconnect, and reconnect on a
///    later tick; the reading is never retried.
///
/// An authentication rejection from the transport invalidates the shared
/// credential cache so the next connect re-resolves.
pub struct PublisherSession {
    device: Device,
    config: SessionConfig,
    transport: Arc<dyn TelemetryTransport>,
    resolver: Arc<CredentialResolver>,
    generator: ReadingGenerator,
    backoff: Backoff,
    state: SessionState,
}

impl PublisherSession {
    pub fn new(
        device: Device,
        config: SessionConfig,
        transport: Arc<dyn TelemetryTransport>,
        resolver: Arc<CredentialResolver>,
        generator: ReadingGenerator,
    ) -> Self {
        let backoff = Backoff::new(config.backoff);
        Self {
            device,
            config,
            transport,
            resolver,
            generator,
            backoff,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session until the token is cancelled, then disconnect.
    pub async fn run(mut self, token: CancellationToken) {
        info!(
            device_id = %self.device.device_id,
            sensor_type = %self.device.sensor_type,
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting publisher session"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        // A slow tick is skipped, not bunched; readings stay on cadence.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if self.state != SessionState::Connected && !self.try_connect(&token).await {
                        if token.is_cancelled() {
                            break;
                        }
                        continue;
                    }
                    self.publish_tick().await;
                }
            }
        }

        self.close().await;
    }

    async fn try_connect(&mut self, token: &CancellationToken) -> bool {
        self.state = SessionState::Connecting;

        let credential = match self.resolver.resolve().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    device_id = %self.device.device_id,
                    error = %e,
                    "Credential resolution failed"
                );
                self.state = SessionState::Disconnected;
                self.wait_backoff(token).await;
                return false;
            }
        };

        match self.transport.connect(&credential).await {
            Ok(()) => {
                info!(device_id = %self.device.device_id, "Connected to broker");
                self.state = SessionState::Connected;
                true
            }
            Err(e) => {
                if matches!(e, DomainError::AuthenticationFailure) {
                    self.resolver.invalidate().await;
                }
                warn!(
                    device_id = %self.device.device_id,
                    error = %e,
                    "Broker connection failed"
                );
                self.state = SessionState::Disconnected;
                self.wait_backoff(token).await;
                false
            }
        }
    }

    async fn publish_tick(&mut self) {
        let reading = self.generator.next(&self.device);
        let topic = format_topic(self.device.sensor_type, &self.device.device_id);

        let payload = match serde_json::to_vec(&reading) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    device_id = %self.device.device_id,
                    error = %e,
                    "Failed to serialize reading"
                );
                return;
            }
        };

        match self.transport.publish(&topic, Bytes::from(payload)).await {
            Ok(()) => {
                self.backoff.reset();
                debug!(
                    device_id = %self.device.device_id,
                    topic = %topic,
                    "Published reading"
                );
            }
            Err(e) => {
                // The reading is dropped; the next cadence tick generates a
                // fresh one rather than replaying a stale sample.
                warn!(
                    device_id = %self.device.device_id,
                    error = %e,
                    "Publish failed, dropping reading and reconnecting"
                );
                if matches!(e, DomainError::AuthenticationFailure) {
                    self.resolver.invalidate().await;
                }
                let _ = self.transport.disconnect().await;
                self.state = SessionState::Disconnected;
            }
        }
    }

    async fn wait_backoff(&mut self, token: &CancellationToken) {
        let delay = self.backoff.next_delay();
        debug!(
            device_id = %self.device.device_id,
            attempt = self.backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Backing off before reconnect"
        );
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn close(&mut self) {
        if self.state == SessionState::Connected {
            if let Err(e) = self.transport.disconnect().await {
                warn!(
                    device_id = %self.device.device_id,
                    error = %e,
                    "Disconnect on shutdown failed"
                );
            }
        }
        self.state = SessionState::Closed;
        info!(device_id = %self.device.device_id, "Publisher session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use rtem_domain::{
        CredentialConfig, MockSecretStore, MockTelemetryTransport, SecretMaterial, SensorType,
    };

    fn device() -> Device {
        Device::new("unit_1_hvac", SensorType::Hvac)
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            interval: Duration::from_secs(60),
            backoff: BackoffConfig {
                min: Duration::from_millis(10),
                max: Duration::from_millis(100),
            },
        }
    }

    fn inline_resolver() -> Arc<CredentialResolver> {
        let config = CredentialConfig {
            inline_certificate_pem: Some("inline-cert".to_string()),
            inline_private_key_pem: Some("inline-key".to_string()),
            ..Default::default()
        };
        Arc::new(CredentialResolver::new(
            config,
            Arc::new(MockSecretStore::new()),
        ))
    }

    fn secret_resolver(expected_fetches: usize) -> Arc<CredentialResolver> {
        let mut secret_store = MockSecretStore::new();
        secret_store
            .expect_get()
            .times(expected_fetches)
            .returning(|_| {
                Ok(SecretMaterial {
                    certificate_pem: "cert".to_string(),
                    private_key_pem: "key".to_string(),
                })
            });
        let config = CredentialConfig {
            secret_name: Some("rtem/iot_device_credentials".to_string()),
            ..Default::default()
        };
        Arc::new(CredentialResolver::new(config, Arc::new(secret_store)))
    }

    fn session(transport: MockTelemetryTransport, resolver: Arc<CredentialResolver>) -> PublisherSession {
        PublisherSession::new(
            device(),
            session_config(),
            Arc::new(transport),
            resolver,
            ReadingGenerator::new(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn connects_then_publishes_on_the_cadence() {
        let mut transport = MockTelemetryTransport::new();
        transport.expect_connect().times(1).returning(|_| Ok(()));
        transport
            .expect_publish()
            .withf(|topic: &str, payload: &Bytes| {
                topic == "hvac/unit_1_hvac" && !payload.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut session = session(transport, inline_resolver());
        let token = CancellationToken::new();

        assert!(session.try_connect(&token).await);
        assert_eq!(session.state(), SessionState::Connected);

        session.publish_tick().await;
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_rejection_on_connect_invalidates_the_credential_cache() {
        let mut transport = MockTelemetryTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::AuthenticationFailure));
        transport
            .expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        // Two secret fetches prove the rejection dropped the cached credential.
        let mut session = session(transport, secret_resolver(2));
        let token = CancellationToken::new();

        assert!(!session.try_connect(&token).await);
        assert_eq!(session.state(), SessionState::Disconnected);

        assert!(session.try_connect(&token).await);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_on_connect_keeps_the_cached_credential() {
        let mut transport = MockTelemetryTransport::new();
        transport
            .expect_connect()
            .times(2)
            .returning(|_| Err(DomainError::TransportFailure("broker down".to_string())));

        // A single fetch serves both attempts.
        let mut session = session(transport, secret_resolver(1));
        let token = CancellationToken::new();

        assert!(!session.try_connect(&token).await);
        assert!(!session.try_connect(&token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_drops_the_reading_and_disconnects() {
        let mut transport = MockTelemetryTransport::new();
        transport.expect_connect().times(1).returning(|_| Ok(()));
        transport
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(DomainError::TransportFailure("lost".to_string())));
        transport.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session = session(transport, inline_resolver());
        let token = CancellationToken::new();

        assert!(session.try_connect(&token).await);
        session.publish_tick().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_session_promptly() {
        let mut transport = MockTelemetryTransport::new();
        transport.expect_connect().returning(|_| Ok(()));
        transport.expect_publish().returning(|_, _| Ok(()));
        transport.expect_disconnect().returning(|| Ok(()));

        let session = session(transport, inline_resolver());
        let token = CancellationToken::new();

        let handle = tokio::spawn(session.run(token.clone()));
        tokio::task::yield_now().await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("session did not stop after cancellation")
            .unwrap();
    }
}
