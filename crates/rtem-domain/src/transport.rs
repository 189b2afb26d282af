use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::credential::Credential;
use crate::error::{DomainError, DomainResult};

/// A message as delivered to the ingestion side of the transport.
///
/// Delivery is at-least-once, possibly duplicated, possibly out of order;
/// `received_at` is stamped by the ingest side, not the device clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

/// Device-side transport boundary. One instance per publisher session;
/// sessions do not share transport state.
///
/// `connect` and `publish` report an authentication rejection as
/// `DomainError::AuthenticationFailure` so the session can invalidate the
/// credential cache; every other transport-level problem is
/// `DomainError::TransportFailure`.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn connect(&self, credential: &Credential) -> DomainResult<()>;

    async fn publish(&self, topic: &str, payload: Bytes) -> DomainResult<()>;

    async fn disconnect(&self) -> DomainResult<()>;
}

/// Ingest-side message source drained by the ingest worker. Returns `None`
/// when the transport has shut down.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait InboundSource: Send {
    async fn next(&mut self) -> Option<InboundMessage>;
}

/// Parse a broker URL in the format `mqtt://host:port`, `mqtts://host:port`,
/// `tcp://host:port`, or bare `host:port`. The port defaults to 1883.
pub fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let url = url
        .trim_start_matches("mqtts://")
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.len() {
        1 => Ok((parts[0], 1883)),
        2 => {
            let port = parts[1].parse::<u16>().map_err(|_| {
                DomainError::ValidationFailure(format!("Invalid port in broker URL: {}", parts[1]))
            })?;
            Ok((parts[0], port))
        }
        _ => Err(DomainError::ValidationFailure(format!(
            "Invalid broker URL format: {url}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_tls_scheme() {
        let (host, port) = parse_broker_url("mqtts://iot.example.com:8883").unwrap();
        assert_eq!(host, "iot.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_broker_url_without_scheme() {
        let (host, port) = parse_broker_url("broker.local:8883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_broker_url_rejects_garbage() {
        assert!(parse_broker_url("mqtt://host:not-a-port").is_err());
        assert!(parse_broker_url("host:1883:extra").is_err());
    }
}
