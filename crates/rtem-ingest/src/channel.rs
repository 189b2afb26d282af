use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use rtem_domain::{
    Credential, DomainError, DomainResult, InboundMessage, InboundSource, TelemetryTransport,
};

/// In-process broker: a bounded channel standing in for an external MQTT
/// hop. Every publisher session holds a `ChannelTransport` clone; the ingest
/// worker drains the single `ChannelSource`.
pub fn channel_broker(capacity: usize) -> (ChannelTransport, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelTransport { tx }, ChannelSource { rx })
}

/// Device-side half. Accepts any credential; authentication is exercised
/// against a real broker, not the in-process channel.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<InboundMessage>,
}

#[async_trait]
impl TelemetryTransport for ChannelTransport {
    async fn connect(&self, _credential: &Credential) -> DomainResult<()> {
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> DomainResult<()> {
        // Stamped here, on the ingest side of the hop, so the sort key never
        // depends on the device clock.
        let message = InboundMessage {
            topic: topic.to_string(),
            payload,
            received_at: Utc::now(),
        };
        self.tx
            .send(message)
            .await
            .map_err(|_| DomainError::TransportFailure("Ingest channel closed".to_string()))
    }

    async fn disconnect(&self) -> DomainResult<()> {
        Ok(())
    }
}

/// Ingest-side half. Yields `None` once every transport clone is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<InboundMessage>,
}

#[async_trait]
impl InboundSource for ChannelSource {
    async fn next(&mut self) -> Option<InboundMessage> {
        let message = self.rx.recv().await;
        if message.is_none() {
            debug!("Ingest channel drained and closed");
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtem_domain::CredentialOrigin;

    fn credential() -> Credential {
        Credential {
            certificate_pem: "cert".to_string(),
            private_key_pem: "key".to_string(),
            origin: CredentialOrigin::Inline,
        }
    }

    #[tokio::test]
    async fn published_messages_arrive_in_order_with_receive_stamps() {
        let (transport, mut source) = channel_broker(8);
        transport.connect(&credential()).await.unwrap();

        let before = Utc::now();
        transport
            .publish("hvac/unit_1_hvac", Bytes::from_static(b"one"))
            .await
            .unwrap();
        transport
            .publish("hvac/unit_1_hvac", Bytes::from_static(b"two"))
            .await
            .unwrap();

        let first = source.next().await.unwrap();
        let second = source.next().await.unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"one"));
        assert_eq!(second.payload, Bytes::from_static(b"two"));
        assert!(first.received_at >= before);
        assert!(second.received_at >= first.received_at);
    }

    #[tokio::test]
    async fn source_closes_when_all_transports_drop() {
        let (transport, mut source) = channel_broker(1);
        let clone = transport.clone();
        drop(transport);
        drop(clone);

        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_source_drop_is_a_transport_failure() {
        let (transport, source) = channel_broker(1);
        drop(source);

        let result = transport
            .publish("hvac/unit_1_hvac", Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(DomainError::TransportFailure(_))));
    }
}
