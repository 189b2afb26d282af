use crate::error::{DomainError, DomainResult};
use crate::types::SensorType;
use std::str::FromStr;

/// Parsed transport topic carrying the routing attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub sensor_type: SensorType,
    pub device_id: String,
}

/// Format a transport topic as `{sensor_type}/{device_id}`.
///
/// The first segment is the partition key source for the ingestion router.
pub fn format_topic(sensor_type: SensorType, device_id: &str) -> String {
    format!("{}/{}", sensor_type.as_str(), device_id)
}

/// Parse a transport topic in the format `{sensor_type}/{device_id}`.
pub fn parse_topic(topic: &str) -> DomainResult<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();

    if parts.len() != 2 {
        return Err(DomainError::ValidationFailure(format!(
            "Invalid topic format '{topic}': expected '{{sensor_type}}/{{device_id}}'"
        )));
    }

    let sensor_type = SensorType::from_str(parts[0].trim())?;
    let device_id = parts[1].trim();

    if device_id.is_empty() {
        return Err(DomainError::ValidationFailure(
            "Device ID cannot be empty in topic".to_string(),
        ));
    }

    Ok(ParsedTopic {
        sensor_type,
        device_id: device_id.to_string(),
    })
}
