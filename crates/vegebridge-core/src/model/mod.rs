// ── Domain model ──
//
// Settings documents, device records and ingest payloads.

pub mod device;
pub mod settings;
pub mod update;

pub use device::{DeviceRecord, UPDATED_KEY, WHO_UPDATED_KEY, WhoUpdated, utc_timestamp};
pub use settings::{SLOT_KEYS, Scalar, SettingsNode};
pub use update::{IngestPayload, UpdateElement};
