// vegebridge-core: settings reconciliation and sensor decoding between
// Vegehub field hubs and an MQTT bus. Transport-free; the api crate wires
// it to HTTP and MQTT.

pub mod bus;
pub mod command;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod flatten;
pub mod identity;
pub mod model;
pub mod patch;
pub mod store;
pub mod value;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{NullPublisher, Publisher, RecordingPublisher};
pub use command::{BusCommand, CommandOutcome};
pub use config::BridgeConfig;
pub use controller::Controller;
pub use decoder::{
    DecoderConfig, GateFields, ProcessorKind, Publication, SensorProcessor, build_processor,
};
pub use error::CoreError;
pub use flatten::flatten;
pub use identity::{resolve_channel, resolve_mac};
pub use patch::{PatchError, apply_patch};
pub use store::SettingsStore;
pub use value::coerce;

pub use model::{
    DeviceRecord, IngestPayload, Scalar, SettingsNode, UpdateElement, WhoUpdated,
};
