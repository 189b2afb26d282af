use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DomainError, DomainResult};

/// Wire schema version stamped on every reading.
pub const SCHEMA_VERSION: u16 = 1;

/// Partition reserved for records diverted by the ingestion failure path.
/// Never read by the query engine.
pub const ERROR_PARTITION: &str = "error";

/// Monitoring point categories taken from the RTEM design criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Building,
    UnitPanel,
    Network,
    Hvac,
    Dhw,
    Appliance,
    SpaceTemperature,
    Lighting,
    Environment,
}

/// Bounds for one simulated field: plausible range plus the largest step the
/// random walk may take between consecutive readings.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub max_delta: f64,
}

impl SensorType {
    pub fn all() -> [SensorType; 9] {
        [
            SensorType::Building,
            SensorType::UnitPanel,
            SensorType::Network,
            SensorType::Hvac,
            SensorType::Dhw,
            SensorType::Appliance,
            SensorType::SpaceTemperature,
            SensorType::Lighting,
            SensorType::Environment,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Building => "building",
            SensorType::UnitPanel => "unit_panel",
            SensorType::Network => "network",
            SensorType::Hvac => "hvac",
            SensorType::Dhw => "dhw",
            SensorType::Appliance => "appliance",
            SensorType::SpaceTemperature => "space_temperature",
            SensorType::Lighting => "lighting",
            SensorType::Environment => "environment",
        }
    }

    /// Reporting cadence for this monitoring point.
    pub fn cadence(&self) -> Duration {
        match self {
            SensorType::Building => Duration::from_secs(60),
            SensorType::UnitPanel => Duration::from_secs(60),
            SensorType::Network => Duration::from_secs(60),
            SensorType::Hvac => Duration::from_secs(60),
            SensorType::Dhw => Duration::from_secs(300),
            SensorType::Appliance => Duration::from_secs(60),
            SensorType::SpaceTemperature => Duration::from_secs(300),
            SensorType::Lighting => Duration::from_secs(60),
            SensorType::Environment => Duration::from_secs(300),
        }
    }

    /// Fields reported by this monitoring point.
    pub fn field_specs(&self) -> &'static [FieldSpec] {
        match self {
            SensorType::Building => &[
                FieldSpec {
                    name: "building_total_energy_kwh",
                    min: 1000.0,
                    max: 2000.0,
                    max_delta: 25.0,
                },
                FieldSpec {
                    name: "building_demand_kw",
                    min: 50.0,
                    max: 150.0,
                    max_delta: 5.0,
                },
            ],
            SensorType::UnitPanel => &[
                FieldSpec {
                    name: "sub_meter_energy_kwh",
                    min: 100.0,
                    max: 200.0,
                    max_delta: 5.0,
                },
                FieldSpec {
                    name: "demand_kw",
                    min: 10.0,
                    max: 50.0,
                    max_delta: 2.0,
                },
            ],
            SensorType::Network => &[
                FieldSpec {
                    name: "latency_ms",
                    min: 10.0,
                    max: 100.0,
                    max_delta: 8.0,
                },
                FieldSpec {
                    name: "packet_loss_percent",
                    min: 0.0,
                    max: 5.0,
                    max_delta: 0.5,
                },
            ],
            SensorType::Hvac => &[
                FieldSpec {
                    name: "hvac_runtime_minutes",
                    min: 0.0,
                    max: 60.0,
                    max_delta: 5.0,
                },
                FieldSpec {
                    name: "hvac_power_kw",
                    min: 0.5,
                    max: 3.0,
                    max_delta: 0.25,
                },
            ],
            SensorType::Dhw => &[
                FieldSpec {
                    name: "energy_consumption_kwh",
                    min: 10.0,
                    max: 50.0,
                    max_delta: 2.0,
                },
                FieldSpec {
                    name: "cycle_duration_minutes",
                    min: 5.0,
                    max: 30.0,
                    max_delta: 3.0,
                },
            ],
            SensorType::Appliance => &[FieldSpec {
                name: "appliance_energy_kwh",
                min: 1.0,
                max: 5.0,
                max_delta: 0.5,
            }],
            SensorType::SpaceTemperature => &[FieldSpec {
                name: "temperature_f",
                min: 65.0,
                max: 75.0,
                max_delta: 0.8,
            }],
            SensorType::Lighting => &[FieldSpec {
                name: "lighting_energy_kwh",
                min: 1.0,
                max: 5.0,
                max_delta: 0.5,
            }],
            SensorType::Environment => &[
                FieldSpec {
                    name: "ambient_temp",
                    min: 65.0,
                    max: 80.0,
                    max_delta: 1.0,
                },
                FieldSpec {
                    name: "humidity",
                    min: 30.0,
                    max: 60.0,
                    max_delta: 2.0,
                },
            ],
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "building" => Ok(SensorType::Building),
            "unit_panel" => Ok(SensorType::UnitPanel),
            "network" => Ok(SensorType::Network),
            "hvac" => Ok(SensorType::Hvac),
            "dhw" => Ok(SensorType::Dhw),
            "appliance" => Ok(SensorType::Appliance),
            "space_temperature" => Ok(SensorType::SpaceTemperature),
            "lighting" => Ok(SensorType::Lighting),
            "environment" => Ok(SensorType::Environment),
            other => Err(DomainError::ValidationFailure(format!(
                "Unknown sensor type: {other}"
            ))),
        }
    }
}

/// Immutable device identity, created from static fleet configuration at
/// process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_id: String,
    pub sensor_type: SensorType,
}

impl Device {
    pub fn new(device_id: impl Into<String>, sensor_type: SensorType) -> Self {
        Self {
            device_id: device_id.into(),
            sensor_type,
        }
    }
}

/// One telemetry sample, immutable once created and transmitted exactly once
/// per cadence tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub sensor_type: SensorType,
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
    pub schema_version: u16,
}

/// Persisted form of a reading.
///
/// `(partition_key, sort_key)` pairs are not unique across devices sharing a
/// sensor type and the same second; collisions overwrite, last write wins.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageRecord {
    pub partition_key: String,
    pub sort_key: String,
    pub device_id: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Epoch seconds after which the record is logically absent.
    pub ttl: i64,
}

/// Drop a timestamp to whole-second precision, matching the sort key format.
pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

/// Sort key encoding: RFC 3339 at second precision in UTC. Lexicographic
/// order on these keys equals chronological order.
pub fn format_sort_key(ts: DateTime<Utc>) -> String {
    truncate_to_second(ts).to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_sort_key(key: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(key)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::ValidationFailure(format!("Invalid sort key '{key}': {e}")))
}
