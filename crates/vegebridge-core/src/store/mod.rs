// ── Settings storage ──
//
// The in-memory document set and its durable JSON copy.

pub(crate) mod persist;
mod settings_store;

pub use settings_store::SettingsStore;
