use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainResult;
use crate::types::StorageRecord;

/// Query over a primary partition (sensor type, or the error partition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionQueryInput {
    pub partition_key: String,
    /// Inclusive window bounds.
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page_size: usize,
    /// Sort key of the last record of the previous page.
    pub exclusive_start: Option<String>,
}

/// Query over the device-keyed secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceQueryInput {
    pub device_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub page_size: usize,
    pub exclusive_start: Option<String>,
}

/// One page of records in ascending sort-key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<StorageRecord>,
    /// Resume key for the next page; `None` when the window is exhausted.
    pub last_key: Option<String>,
    /// Records in the scanned range whose TTL had elapsed. Logically absent,
    /// not an error.
    pub expired: u64,
}

/// Storage boundary: partitioned, range-queryable, TTL-bounded record table
/// with a device-keyed secondary index. Infrastructure (or a test double)
/// implements this trait; each `put` is independently committed.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, record: StorageRecord) -> DomainResult<()>;

    async fn query_by_partition(&self, input: PartitionQueryInput) -> DomainResult<RecordPage>;

    async fn query_by_device(&self, input: DeviceQueryInput) -> DomainResult<RecordPage>;
}
