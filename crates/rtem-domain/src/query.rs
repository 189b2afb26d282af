use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::access::AccessGate;
use crate::error::{DomainError, DomainResult};
use crate::store::{DeviceQueryInput, PartitionQueryInput, RecordStore};
use crate::types::{parse_sort_key, Reading, SensorType, StorageRecord, SCHEMA_VERSION};

/// What to reconstruct a series for: every device of a sensor type (primary
/// partition) or a single device (secondary index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesSelector {
    SensorType(SensorType),
    Device(String),
}

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesResult {
    /// Readings in ascending timestamp order.
    pub readings: Vec<Reading>,
    /// Records excluded because their TTL had elapsed.
    pub expired: u64,
}

#[derive(Debug, Clone)]
pub struct QueryEngineConfig {
    pub page_size: usize,
    pub timeout: Duration,
}

impl Default for QueryEngineConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Reconstructs time-ordered series from the partitioned store.
///
/// Pages through the matching store query one page at a time (bounded
/// working set), decodes payloads, sorts within a page when the store cannot
/// guarantee order, and stitches pages until the window is exhausted.
pub struct QueryEngine {
    store: Arc<dyn RecordStore>,
    config: QueryEngineConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: QueryEngineConfig) -> Self {
        Self { store, config }
    }

    /// Reconstruct the series for the selector over the window, under the
    /// engine's default timeout.
    pub async fn series(
        &self,
        selector: SeriesSelector,
        window: SeriesWindow,
    ) -> DomainResult<SeriesResult> {
        self.series_with_timeout(selector, window, self.config.timeout)
            .await
    }

    /// As `series`, with a caller-supplied timeout. Fails with `QueryTimeout`
    /// rather than hang.
    pub async fn series_with_timeout(
        &self,
        selector: SeriesSelector,
        window: SeriesWindow,
        timeout: Duration,
    ) -> DomainResult<SeriesResult> {
        if window.from > window.to {
            return Err(DomainError::InvalidWindow {
                from: window.from,
                to: window.to,
            });
        }

        match tokio::time::timeout(timeout, self.collect(selector, window)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::QueryTimeout(timeout)),
        }
    }

    async fn collect(
        &self,
        selector: SeriesSelector,
        window: SeriesWindow,
    ) -> DomainResult<SeriesResult> {
        let mut readings = Vec::new();
        let mut expired = 0u64;
        let mut exclusive_start: Option<String> = None;

        loop {
            let page = match &selector {
                SeriesSelector::SensorType(sensor_type) => {
                    self.store
                        .query_by_partition(PartitionQueryInput {
                            partition_key: sensor_type.as_str().to_string(),
                            from: window.from,
                            to: window.to,
                            page_size: self.config.page_size,
                            exclusive_start: exclusive_start.take(),
                        })
                        .await?
                }
                SeriesSelector::Device(device_id) => {
                    self.store
                        .query_by_device(DeviceQueryInput {
                            device_id: device_id.clone(),
                            from: window.from,
                            to: window.to,
                            page_size: self.config.page_size,
                            exclusive_start: exclusive_start.take(),
                        })
                        .await?
                }
            };

            expired += page.expired;

            let mut decoded = page
                .records
                .iter()
                .map(decode_record)
                .collect::<DomainResult<Vec<_>>>()?;
            decoded.sort_by_key(|reading| reading.timestamp);
            readings.extend(decoded);

            match page.last_key {
                Some(key) => exclusive_start = Some(key),
                None => break,
            }
        }

        // Pages cover ascending key ranges, so stitching preserves order;
        // re-sort only if a store breaks that contract.
        if !readings
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        {
            readings.sort_by_key(|reading| reading.timestamp);
        }

        debug!(
            count = readings.len(),
            expired, "Reconstructed series for window"
        );

        Ok(SeriesResult { readings, expired })
    }
}

fn decode_record(record: &StorageRecord) -> DomainResult<Reading> {
    let sensor_type = SensorType::from_str(&record.partition_key)?;
    let timestamp = parse_sort_key(&record.sort_key)?;

    let values: BTreeMap<String, f64> = record
        .payload
        .iter()
        .filter_map(|(field, value)| value.as_f64().map(|v| (field.clone(), v)))
        .collect();

    Ok(Reading {
        device_id: record.device_id.clone(),
        sensor_type,
        timestamp,
        values,
        schema_version: SCHEMA_VERSION,
    })
}

/// Caller-facing query surface: validates the caller's credential before any
/// query is served, so an empty chart is distinguishable from a rejected or
/// failed query.
pub struct QueryService {
    gate: AccessGate,
    engine: Arc<QueryEngine>,
}

impl QueryService {
    pub fn new(gate: AccessGate, engine: Arc<QueryEngine>) -> Self {
        Self { gate, engine }
    }

    pub async fn query(
        &self,
        username: &str,
        password: &str,
        selector: SeriesSelector,
        window: SeriesWindow,
    ) -> DomainResult<SeriesResult> {
        if !self.gate.authenticate(username, password) {
            return Err(DomainError::AuthenticationFailure);
        }
        self.engine.series(selector, window).await
    }
}
