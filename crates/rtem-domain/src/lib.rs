//! Domain core of the RTEM telemetry pipeline: types, error taxonomy,
//! capability traits for the external boundaries (secret store, record
//! store, transport) and the services that run against them.

pub mod access;
pub mod credential;
pub mod error;
pub mod generator;
pub mod query;
pub mod router;
pub mod store;
pub mod topic;
pub mod transport;
pub mod types;

pub use access::AccessGate;
pub use credential::{
    Credential, CredentialConfig, CredentialOrigin, CredentialResolver, InMemorySecretStore,
    SecretMaterial, SecretStore,
};
pub use error::{DomainError, DomainResult};
pub use generator::ReadingGenerator;
pub use query::{
    QueryEngine, QueryEngineConfig, QueryService, SeriesResult, SeriesSelector, SeriesWindow,
};
pub use router::IngestionRouter;
pub use store::{DeviceQueryInput, PartitionQueryInput, RecordPage, RecordStore};
pub use topic::{format_topic, parse_topic, ParsedTopic};
pub use transport::{parse_broker_url, InboundMessage, InboundSource, TelemetryTransport};
pub use types::{
    format_sort_key, parse_sort_key, truncate_to_second, Device, FieldSpec, Reading, SensorType,
    StorageRecord, ERROR_PARTITION, SCHEMA_VERSION,
};

#[cfg(any(test, feature = "mocks"))]
pub use credential::MockSecretStore;
#[cfg(any(test, feature = "mocks"))]
pub use store::MockRecordStore;
#[cfg(any(test, feature = "mocks"))]
pub use transport::{MockInboundSource, MockTelemetryTransport};
