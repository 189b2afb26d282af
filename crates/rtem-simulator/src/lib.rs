mod backoff;
mod fleet;
mod mqtt;
mod session;

pub use backoff::{Backoff, BackoffConfig};
pub use fleet::{build_fleet, FleetConfig, FleetMember};
pub use mqtt::{MqttTransport, MqttTransportConfig};
pub use session::{PublisherSession, SessionConfig, SessionState};
