mod channel;
mod mqtt;
mod worker;

pub use channel::{channel_broker, ChannelSource, ChannelTransport};
pub use mqtt::{MqttSource, MqttSourceConfig};
pub use worker::IngestWorker;
