// ── Settings patch engine ──
//
// Applies one `mac/field/.../leaf` update from the command bus to the
// store. Array segments are followed by a slot identifier:
// `mac/channels/2/name` patches `name` in the channel whose slot is 2.

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{Scalar, SettingsNode};
use crate::store::SettingsStore;
use crate::value::coerce;

/// Why a patch could not be applied. The document is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("no settings for device '{mac}'")]
    UnknownDevice { mac: String },

    #[error("'{key}' not found (path {})", path.join("/"))]
    MissingKey { path: Vec<String>, key: String },

    #[error("no slot '{slot}' (path {})", path.join("/"))]
    UnmatchedSlot { path: Vec<String>, slot: String },

    #[error("path {} does not end on a value", path.join("/"))]
    NotALeaf { path: Vec<String> },
}

impl PatchError {
    /// The full command path that failed.
    pub fn path(&self) -> Vec<String> {
        match self {
            Self::UnknownDevice { mac } => vec![mac.clone()],
            Self::MissingKey { path, .. }
            | Self::UnmatchedSlot { path, .. }
            | Self::NotALeaf { path } => path.clone(),
        }
    }
}

/// Set the leaf addressed by `path` to `raw`, coerced.
///
/// `path[0]` is the device mac, the rest walks the device's settings.
pub fn apply_patch(
    store: &mut SettingsStore,
    path: &[String],
    raw: &str,
) -> Result<(), PatchError> {
    let Some((mac, rest)) = path.split_first() else {
        return Err(PatchError::UnknownDevice { mac: String::new() });
    };
    let record = store
        .get_mut(mac)
        .ok_or_else(|| PatchError::UnknownDevice { mac: mac.clone() })?;

    patch_object(&mut record.settings, rest, coerce(raw), path)
}

fn patch_object(
    map: &mut IndexMap<String, SettingsNode>,
    rest: &[String],
    value: Scalar,
    full: &[String],
) -> Result<(), PatchError> {
    let Some((key, tail)) = rest.split_first() else {
        return Err(PatchError::NotALeaf { path: full.to_vec() });
    };
    let node = map.get_mut(key).ok_or_else(|| PatchError::MissingKey {
        path: full.to_vec(),
        key: key.clone(),
    })?;

    match node {
        SettingsNode::Leaf(scalar) => {
            *scalar = value;
            Ok(())
        }
        SettingsNode::Object(child) => patch_object(child, tail, value, full),
        SettingsNode::Array(items) => {
            let Some((slot_raw, tail)) = tail.split_first() else {
                return Err(PatchError::NotALeaf { path: full.to_vec() });
            };
            let slot = coerce(slot_raw);
            let unmatched = || PatchError::UnmatchedSlot {
                path: full.to_vec(),
                slot: slot_raw.clone(),
            };

            let element = items
                .iter_mut()
                .find(|item| item.slot_id().is_some_and(|id| id.loosely_eq(&slot)))
                .ok_or_else(unmatched)?;
            match element {
                SettingsNode::Object(child) => patch_object(child, tail, value, full),
                _ => Err(unmatched()),
            }
        }
    }
}
