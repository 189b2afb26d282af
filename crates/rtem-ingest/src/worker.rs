use tokio_util::sync::CancellationToken;
use tracing::info;

use rtem_domain::{InboundSource, IngestionRouter};

/// Drains the inbound source into the router until cancellation or source
/// shutdown.
///
/// Messages are routed one at a time; readings for the same partition land
/// in arrival order, and a slow store write backpressures the channel rather
/// than reordering writes.
pub struct IngestWorker {
    source: Box<dyn InboundSource>,
    router: IngestionRouter,
}

impl IngestWorker {
    pub fn new(source: Box<dyn InboundSource>, router: IngestionRouter) -> Self {
        Self { source, router }
    }

    pub async fn run(mut self, token: CancellationToken) {
        info!("Starting ingest worker");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Ingest worker cancelled");
                    break;
                }
                message = self.source.next() => {
                    match message {
                        Some(message) => self.router.route(message).await,
                        None => {
                            info!("Inbound source closed, stopping ingest worker");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use mockall::Sequence;
    use rtem_domain::{
        InboundMessage, MockInboundSource, MockRecordStore, Reading, SensorType, StorageRecord,
        SCHEMA_VERSION,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn reading_message(device_id: &str, temp: f64) -> InboundMessage {
        let reading = Reading {
            device_id: device_id.to_string(),
            sensor_type: SensorType::Hvac,
            timestamp: Utc::now(),
            values: BTreeMap::from([("hvac_power_kw".to_string(), temp)]),
            schema_version: SCHEMA_VERSION,
        };
        InboundMessage {
            topic: format!("hvac/{device_id}"),
            payload: Bytes::from(serde_json::to_vec(&reading).unwrap()),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drains_messages_into_the_store_until_the_source_closes() {
        let mut source = MockInboundSource::new();
        let mut seq = Sequence::new();
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Some(reading_message("unit_1_hvac", 1.2)));
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Some(reading_message("unit_2_hvac", 1.4)));
        source
            .expect_next()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| None);

        let mut store = MockRecordStore::new();
        store
            .expect_put()
            .withf(|record: &StorageRecord| record.partition_key == "hvac")
            .times(2)
            .returning(|_| Ok(()));

        let router = IngestionRouter::new(Arc::new(store), 3600);
        let worker = IngestWorker::new(Box::new(source), router);

        worker.run(CancellationToken::new()).await;
    }

    /// A source that never yields a message; only cancellation can stop the
    /// worker draining it.
    struct PendingSource;

    #[async_trait::async_trait]
    impl rtem_domain::InboundSource for PendingSource {
        async fn next(&mut self) -> Option<InboundMessage> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let store = MockRecordStore::new();
        let router = IngestionRouter::new(Arc::new(store), 3600);
        let worker = IngestWorker::new(Box::new(PendingSource), router);

        let token = CancellationToken::new();
        let handle = tokio::spawn(worker.run(token.clone()));
        tokio::task::yield_now().await;
        token.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop after cancellation")
            .unwrap();
    }
}
