// ── Settings store ──
//
// mac -> DeviceRecord, loaded once at startup and written back after
// every mutation. The file is pretty-printed with sorted keys so it
// diffs cleanly by hand.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::persist::write_atomic;
use crate::error::CoreError;
use crate::model::DeviceRecord;

/// All known hubs, keyed by mac.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsStore {
    devices: IndexMap<String, DeviceRecord>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Read the store from disk.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::StoreLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|e| CoreError::StoreLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(value).map_err(|reason| CoreError::StoreLoad {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Read the store, starting empty if the file is missing or corrupt.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => {
                debug!(devices = store.len(), path = %path.display(), "settings store loaded");
                store
            }
            Err(e) => {
                warn!(error = %e, "could not load settings, starting with an empty store");
                Self::default()
            }
        }
    }

    /// Write the store to disk, replacing the previous copy atomically.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        write_atomic(path, &self.to_pretty_string())
    }

    /// Build a store from its JSON form. Entries that are not objects are
    /// skipped with a warning rather than failing the whole load.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("top level is not a JSON object".into());
        };

        let mut devices = IndexMap::with_capacity(map.len());
        for (mac, entry) in map {
            match entry {
                Value::Object(fields) => {
                    devices.insert(mac, DeviceRecord::from_json(fields));
                }
                other => warn!(%mac, kind = json_kind(&other), "skipping non-object store entry"),
            }
        }
        Ok(Self { devices })
    }

    /// JSON form of the whole store, macs and fields sorted.
    pub fn to_json(&self) -> Value {
        let mut macs: Vec<&String> = self.devices.keys().collect();
        macs.sort();
        let map: Map<String, Value> = macs
            .into_iter()
            .filter_map(|mac| {
                self.devices
                    .get(mac)
                    .map(|record| (mac.clone(), Value::Object(record.to_json())))
            })
            .collect();
        Value::Object(map)
    }

    /// Pretty-printed (two-space indent) JSON, as written to disk.
    pub fn to_pretty_string(&self) -> String {
        // Serializing a `Value` cannot fail.
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| "{}".into())
    }

    // ── Access ───────────────────────────────────────────────────────

    pub fn get(&self, mac: &str) -> Option<&DeviceRecord> {
        self.devices.get(mac)
    }

    pub fn get_mut(&mut self, mac: &str) -> Option<&mut DeviceRecord> {
        self.devices.get_mut(mac)
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.devices.contains_key(mac)
    }

    /// Insert or replace a record, returning the previous one.
    pub fn insert(&mut self, mac: String, record: DeviceRecord) -> Option<DeviceRecord> {
        self.devices.insert(mac, record)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeviceRecord)> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
