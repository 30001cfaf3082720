// vegebridge-api: the bridge's edges. An axum gateway that hubs POST
// readings and configuration to, and an rumqttc client that publishes
// to and takes commands from the MQTT bus.

pub mod bus;
pub mod error;
pub mod server;

pub use bus::{BusConfig, BusEventLoop, MqttBus, MqttPublisher};
pub use error::Error;
pub use server::{ApiError, router, serve};
