use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{DomainError, DomainResult};
use crate::store::RecordStore;
use crate::topic::parse_topic;
use crate::transport::InboundMessage;
use crate::types::{format_sort_key, Reading, StorageRecord, ERROR_PARTITION, SCHEMA_VERSION};

/// Routes inbound transport messages into storage records.
///
/// Flow:
/// 1. Parse the topic; the sensor-type segment becomes the partition key
/// 2. Decode and validate the JSON reading
/// 3. Build a StorageRecord keyed by the ingest-side receive timestamp
/// 4. Write it; on any failure divert to an ErrorRecord instead
///
/// Failures are never raised back to the transport layer: the message is
/// consumed either way and no redelivery happens. Duplicate deliveries
/// produce identical `(partition_key, sort_key)` pairs which overwrite,
/// last write wins.
pub struct IngestionRouter {
    store: Arc<dyn RecordStore>,
    retention_secs: i64,
}

impl IngestionRouter {
    pub fn new(store: Arc<dyn RecordStore>, retention_secs: i64) -> Self {
        Self {
            store,
            retention_secs,
        }
    }

    pub async fn route(&self, message: InboundMessage) {
        match self.build_record(&message) {
            Ok(record) => match self.store.put(record).await {
                Ok(()) => {
                    debug!(topic = %message.topic, "Stored inbound reading");
                }
                Err(e) => {
                    warn!(topic = %message.topic, error = %e, "Record write failed, diverting to error path");
                    self.write_error_record(&message, &e).await;
                }
            },
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Inbound message rejected, diverting to error path");
                self.write_error_record(&message, &e).await;
            }
        }
    }

    fn build_record(&self, message: &InboundMessage) -> DomainResult<StorageRecord> {
        let parsed = parse_topic(&message.topic)?;

        let reading: Reading = serde_json::from_slice(&message.payload)
            .map_err(|e| DomainError::ValidationFailure(format!("Malformed payload: {e}")))?;

        if reading.schema_version != SCHEMA_VERSION {
            return Err(DomainError::ValidationFailure(format!(
                "Unsupported schema version {}",
                reading.schema_version
            )));
        }
        if reading.sensor_type != parsed.sensor_type {
            return Err(DomainError::ValidationFailure(format!(
                "Payload sensor type {} does not match topic segment {}",
                reading.sensor_type, parsed.sensor_type
            )));
        }
        if reading.device_id != parsed.device_id {
            return Err(DomainError::ValidationFailure(format!(
                "Payload device {} does not match topic device {}",
                reading.device_id, parsed.device_id
            )));
        }

        let payload = reading
            .values
            .into_iter()
            .filter_map(|(field, value)| {
                serde_json::Number::from_f64(value).map(|n| (field, serde_json::Value::Number(n)))
            })
            .collect();

        // Sort key comes from the ingest-side clock so a skewed device clock
        // cannot scatter records across the partition.
        Ok(StorageRecord {
            partition_key: parsed.sensor_type.as_str().to_string(),
            sort_key: format_sort_key(message.received_at),
            device_id: parsed.device_id,
            payload,
            ttl: message.received_at.timestamp() + self.retention_secs,
        })
    }

    async fn write_error_record(&self, message: &InboundMessage, reason: &DomainError) {
        let device_id = parse_topic(&message.topic)
            .map(|parsed| parsed.device_id)
            .unwrap_or_else(|_| "unknown".to_string());

        let mut payload = serde_json::Map::new();
        payload.insert(
            "reason".to_string(),
            serde_json::Value::String(reason.to_string()),
        );
        payload.insert(
            "topic".to_string(),
            serde_json::Value::String(message.topic.clone()),
        );
        payload.insert(
            "raw_payload".to_string(),
            serde_json::Value::String(String::from_utf8_lossy(&message.payload).into_owned()),
        );

        let record = StorageRecord {
            partition_key: ERROR_PARTITION.to_string(),
            sort_key: format_sort_key(message.received_at),
            device_id,
            payload,
            ttl: message.received_at.timestamp() + self.retention_secs,
        };

        if let Err(e) = self.store.put(record).await {
            error!(topic = %message.topic, error = %e, "Error record write failed, dropping message");
        }
    }
}
