use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;
use tracing::debug;

use rtem_domain::{
    format_sort_key, DeviceQueryInput, DomainResult, PartitionQueryInput, RecordPage, RecordStore,
    StorageRecord, ERROR_PARTITION,
};

#[derive(Default)]
struct Tables {
    /// Primary table: partition key -> sort key -> record.
    partitions: BTreeMap<String, BTreeMap<String, StorageRecord>>,
    /// Secondary index re-keyed by device, projecting the whole record.
    by_device: BTreeMap<String, BTreeMap<String, StorageRecord>>,
}

/// In-memory implementation of the record store contract.
///
/// Mirrors the access pattern of a partitioned key-value table with a
/// device-keyed secondary index and TTL-based retention: overwrites on
/// identical `(partition_key, sort_key)` replace the record and its index
/// projection (last write wins), expired records are logically absent from
/// query results and reclaimed by `sweep_expired`.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physically remove records whose TTL has elapsed. Query results never
    /// include them either way; this reclaims the memory.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut tables = self.tables.write().await;

        let mut removed = 0;
        for partition in tables.partitions.values_mut() {
            let before = partition.len();
            partition.retain(|_, record| record.ttl > now);
            removed += before - partition.len();
        }
        tables.partitions.retain(|_, partition| !partition.is_empty());

        for index in tables.by_device.values_mut() {
            index.retain(|_, record| record.ttl > now);
        }
        tables.by_device.retain(|_, index| !index.is_empty());

        if removed > 0 {
            debug!(removed, "Swept expired records");
        }
        removed
    }

    /// Total live records in the primary table, for operational logging.
    pub async fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        self.tables
            .read()
            .await
            .partitions
            .values()
            .flat_map(|partition| partition.values())
            .filter(|record| record.ttl > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn scan_page(
    records: Option<&BTreeMap<String, StorageRecord>>,
    from_key: String,
    to_key: String,
    page_size: usize,
    exclusive_start: Option<String>,
) -> RecordPage {
    let Some(records) = records else {
        return RecordPage::default();
    };

    let page_size = page_size.max(1);
    let lower = match exclusive_start {
        Some(start) => Bound::Excluded(start),
        None => Bound::Included(from_key),
    };

    let now = Utc::now().timestamp();
    let mut page = RecordPage::default();

    for record in records
        .range((lower, Bound::Included(to_key)))
        .map(|(_, record)| record)
    {
        // Stop before classifying anything past a full page; the record is
        // left for the next page so its expiry is counted exactly once.
        if page.records.len() == page_size {
            page.last_key = page.records.last().map(|r| r.sort_key.clone());
            break;
        }
        if record.ttl <= now {
            page.expired += 1;
            continue;
        }
        page.records.push(record.clone());
    }

    page
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, record: StorageRecord) -> DomainResult<()> {
        let mut tables = self.tables.write().await;

        let displaced = tables
            .partitions
            .entry(record.partition_key.clone())
            .or_default()
            .insert(record.sort_key.clone(), record.clone());

        // Keep the index consistent with the overwrite: the displaced
        // device's projection must disappear along with its record.
        if let Some(previous) = displaced {
            if previous.device_id != record.device_id {
                if let Some(index) = tables.by_device.get_mut(&previous.device_id) {
                    index.remove(&previous.sort_key);
                }
            }
        }

        // The error partition is a write-only diagnostics sink; it does not
        // participate in device-scoped queries.
        if record.partition_key != ERROR_PARTITION {
            tables
                .by_device
                .entry(record.device_id.clone())
                .or_default()
                .insert(record.sort_key.clone(), record);
        }

        Ok(())
    }

    async fn query_by_partition(&self, input: PartitionQueryInput) -> DomainResult<RecordPage> {
        let tables = self.tables.read().await;
        Ok(scan_page(
            tables.partitions.get(&input.partition_key),
            format_sort_key(input.from),
            format_sort_key(input.to),
            input.page_size,
            input.exclusive_start,
        ))
    }

    async fn query_by_device(&self, input: DeviceQueryInput) -> DomainResult<RecordPage> {
        let tables = self.tables.read().await;
        Ok(scan_page(
            tables.by_device.get(&input.device_id),
            format_sort_key(input.from),
            format_sort_key(input.to),
            input.page_size,
            input.exclusive_start,
        ))
    }
}
