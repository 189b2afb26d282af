use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::types::{truncate_to_second, Device, Reading, SCHEMA_VERSION};

/// Produces plausible sensor values for one device on its cadence.
///
/// Each field follows a bounded random walk: the previous value plus a step
/// drawn from `[-max_delta, max_delta]`, clamped to the field's plausible
/// range. Successive readings are temporally coherent rather than
/// independent noise. Generation never fails; the same seed replays the
/// same sequence.
pub struct ReadingGenerator {
    rng: StdRng,
    previous: BTreeMap<&'static str, f64>,
}

impl ReadingGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            previous: BTreeMap::new(),
        }
    }

    /// Produce the next reading for the device, stamped at the current
    /// wall-clock second.
    pub fn next(&mut self, device: &Device) -> Reading {
        let mut values = BTreeMap::new();

        for spec in device.sensor_type.field_specs() {
            let value = match self.previous.get(spec.name) {
                Some(&prev) => {
                    let step = self.rng.gen_range(-spec.max_delta..=spec.max_delta);
                    (prev + step).clamp(spec.min, spec.max)
                }
                None => self.rng.gen_range(spec.min..=spec.max),
            };
            self.previous.insert(spec.name, value);
            values.insert(spec.name.to_string(), value);
        }

        Reading {
            device_id: device.device_id.clone(),
            sensor_type: device.sensor_type,
            timestamp: truncate_to_second(Utc::now()),
            values,
            schema_version: SCHEMA_VERSION,
        }
    }
}
