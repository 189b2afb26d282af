use std::time::Duration;

use rtem_domain::{Device, ReadingGenerator, SensorType};

#[derive(Debug, Clone, Copy)]
pub struct FleetConfig {
    /// Number of residential units; each unit carries seven monitoring points.
    pub unit_count: usize,
    /// Base seed; each device derives its own generator seed from it.
    pub seed: u64,
    /// Overrides every device's cadence when set, for demos and tests.
    pub interval_override: Option<Duration>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            unit_count: 4,
            seed: 0,
            interval_override: None,
        }
    }
}

pub struct FleetMember {
    pub device: Device,
    pub generator: ReadingGenerator,
    pub interval: Duration,
}

/// Build the simulated building fleet: one building panel, one network
/// monitor, seven monitoring points per unit, common-area lighting, and an
/// environment sensor.
pub fn build_fleet(config: &FleetConfig) -> Vec<FleetMember> {
    let mut devices = vec![
        Device::new("building_main_panel", SensorType::Building),
        Device::new("network_monitor", SensorType::Network),
    ];

    for unit in 1..=config.unit_count {
        devices.push(Device::new(
            format!("unit_{unit}_panel"),
            SensorType::UnitPanel,
        ));
        devices.push(Device::new(format!("unit_{unit}_hvac"), SensorType::Hvac));
        devices.push(Device::new(format!("unit_{unit}_dhw"), SensorType::Dhw));
        devices.push(Device::new(
            format!("unit_{unit}_appliance"),
            SensorType::Appliance,
        ));
        for room in ["bedroom", "living_room", "kitchen"] {
            devices.push(Device::new(
                format!("unit_{unit}_space_temp_{room}"),
                SensorType::SpaceTemperature,
            ));
        }
    }

    devices.push(Device::new("common_lighting", SensorType::Lighting));
    devices.push(Device::new("environment_sensor", SensorType::Environment));

    devices
        .into_iter()
        .enumerate()
        .map(|(index, device)| {
            let interval = config
                .interval_override
                .unwrap_or_else(|| device.sensor_type.cadence());
            FleetMember {
                generator: ReadingGenerator::new(config.seed + index as u64),
                device,
                interval,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fleet_size_follows_the_unit_count() {
        let fleet = build_fleet(&FleetConfig {
            unit_count: 4,
            ..Default::default()
        });
        // 2 building-wide + 7 per unit + lighting + environment.
        assert_eq!(fleet.len(), 2 + 7 * 4 + 2);
    }

    #[test]
    fn each_unit_carries_a_distribution_panel_sub_meter() {
        let fleet = build_fleet(&FleetConfig {
            unit_count: 3,
            ..Default::default()
        });
        let panels: Vec<_> = fleet
            .iter()
            .filter(|m| m.device.sensor_type == SensorType::UnitPanel)
            .collect();
        assert_eq!(panels.len(), 3);
        assert!(panels.iter().any(|m| m.device.device_id == "unit_2_panel"));
    }

    #[test]
    fn device_ids_are_unique() {
        let fleet = build_fleet(&FleetConfig {
            unit_count: 8,
            ..Default::default()
        });
        let ids: HashSet<_> = fleet.iter().map(|m| m.device.device_id.as_str()).collect();
        assert_eq!(ids.len(), fleet.len());
    }

    #[test]
    fn members_use_the_sensor_cadence_by_default() {
        let fleet = build_fleet(&FleetConfig::default());
        for member in &fleet {
            assert_eq!(member.interval, member.device.sensor_type.cadence());
        }
    }

    #[test]
    fn interval_override_applies_to_every_member() {
        let fleet = build_fleet(&FleetConfig {
            interval_override: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        assert!(fleet
            .iter()
            .all(|m| m.interval == Duration::from_millis(50)));
    }

    #[test]
    fn generators_are_seeded_per_device() {
        let mut fleet = build_fleet(&FleetConfig {
            unit_count: 1,
            seed: 9,
            interval_override: None,
        });
        // Two space-temperature sensors share field specs; distinct seeds
        // keep their walks from moving in lockstep.
        let mut temps: Vec<FleetMember> = fleet
            .drain(..)
            .filter(|m| m.device.sensor_type == SensorType::SpaceTemperature)
            .collect();
        assert!(temps.len() >= 2);

        let (first, rest) = temps.split_at_mut(1);
        let a = first[0].generator.next(&first[0].device);
        let b = rest[0].generator.next(&rest[0].device);
        assert_ne!(a.values, b.values);
    }
}
