// ── Device record types ──

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use strum::Display;

use super::settings::{Scalar, SettingsNode, object_from_json, sorted_object};

/// Engine-managed field holding the reconciliation state.
pub const WHO_UPDATED_KEY: &str = "who_updated";
/// Engine-managed field holding the last mutation time.
pub const UPDATED_KEY: &str = "updated";

/// Which side last changed a hub's settings.
///
/// Serialized as the integer code the hub firmware understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum WhoUpdated {
    /// Hub and bridge agree; nothing to deliver.
    #[default]
    Synced,
    /// The hub most recently pushed its full configuration.
    HubPushed,
    /// An external command changed the settings; deliver on next contact.
    Pending,
}

impl WhoUpdated {
    pub fn code(self) -> u8 {
        match self {
            Self::Synced => 0,
            Self::HubPushed => 1,
            Self::Pending => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Synced),
            1 => Some(Self::HubPushed),
            2 => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Current UTC time in the `2021-05-26T20:05:35.392Z` form hubs expect.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Everything the bridge knows about one hub, keyed by its mac in the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceRecord {
    /// The hub's settings object, passed through untouched apart from patches.
    pub settings: IndexMap<String, SettingsNode>,
    pub who_updated: WhoUpdated,
    pub updated: Option<String>,
}

impl DeviceRecord {
    pub fn new(settings: IndexMap<String, SettingsNode>, who_updated: WhoUpdated) -> Self {
        Self {
            settings,
            who_updated,
            updated: Some(utc_timestamp()),
        }
    }

    /// Build a record from its stored JSON form, lifting out the
    /// engine-managed fields. An unrecognised `who_updated` reads as synced.
    pub fn from_json(mut map: Map<String, Value>) -> Self {
        let who_updated = map
            .remove(WHO_UPDATED_KEY)
            .and_then(|v| v.as_u64())
            .and_then(WhoUpdated::from_code)
            .unwrap_or_default();
        let updated = map
            .remove(UPDATED_KEY)
            .and_then(|v| v.as_str().map(str::to_owned));

        Self {
            settings: object_from_json(map),
            who_updated,
            updated,
        }
    }

    /// Stored / wire JSON form: settings plus `who_updated` and `updated`,
    /// keys sorted.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = sorted_object(&self.settings);
        map.insert(WHO_UPDATED_KEY.into(), Value::from(self.who_updated.code()));
        if let Some(ref updated) = self.updated {
            map.insert(UPDATED_KEY.into(), Value::String(updated.clone()));
        }
        // Re-sort: the engine keys were appended after the settings keys.
        let mut entries: Vec<(String, Value)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().collect()
    }

    /// The record as a settings tree, engine fields included, for flattening.
    pub fn to_node(&self) -> SettingsNode {
        let mut map = self.settings.clone();
        map.insert(
            WHO_UPDATED_KEY.into(),
            SettingsNode::Leaf(Scalar::Int(i64::from(self.who_updated.code()))),
        );
        if let Some(ref updated) = self.updated {
            map.insert(
                UPDATED_KEY.into(),
                SettingsNode::Leaf(Scalar::Str(updated.clone())),
            );
        }
        SettingsNode::Object(map)
    }

    /// Move to `state` and stamp the mutation time.
    pub fn mark(&mut self, state: WhoUpdated) {
        self.who_updated = state;
        self.updated = Some(utc_timestamp());
    }

    /// Look up a string field of the `hub` section, e.g. `name`.
    pub fn hub_field(&self, field: &str) -> Option<&str> {
        self.settings
            .get("hub")
            .and_then(|hub| hub.get(field))
            .and_then(SettingsNode::as_str)
    }

    /// Look up a top-level string field, e.g. `api_key`.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.settings.get(field).and_then(SettingsNode::as_str)
    }
}
