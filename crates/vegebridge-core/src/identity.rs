// ── Hub identity resolution ──
//
// Hubs identify themselves inconsistently: older firmware sends a
// `channel_id`, newer firmware only its api key, and some send neither.
// These helpers map whatever arrived back to a mac or a hub id for topics.

use crate::model::{DeviceRecord, IngestPayload};
use crate::store::SettingsStore;

/// Find the mac of the device whose `api_key`, `id`, `hub.current_ip_addr`
/// or `hub.name` equals `identifier`. The first device in store order wins.
///
/// With no match, falls back to `remote` (the address the request came
/// from).
pub fn resolve_mac(store: &SettingsStore, identifier: &str, remote: Option<&str>) -> Option<String> {
    store
        .iter()
        .find(|(_, record)| identifies(record, identifier))
        .map(|(mac, _)| mac.clone())
        .or_else(|| remote.map(str::to_owned))
}

/// The hub id used for sensor topics of an ingest request.
///
/// `channel_id` if present, else `key`. Without either, the request's
/// remote address is looked up as a device IP: a known device answers with
/// its hub name (or mac when unnamed), an unknown one with the raw address.
pub fn resolve_channel(
    store: &SettingsStore,
    payload: &IngestPayload,
    remote: Option<&str>,
) -> Option<String> {
    if let Some(id) = payload.channel_id().or_else(|| payload.key()) {
        return Some(id);
    }

    let remote = remote?;
    let known = store
        .iter()
        .find(|(_, record)| identifies(record, remote))
        .map(|(mac, record)| match record.hub_field("name") {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => mac.clone(),
        });
    Some(known.unwrap_or_else(|| remote.to_owned()))
}

fn identifies(record: &DeviceRecord, identifier: &str) -> bool {
    record.field("api_key") == Some(identifier)
        || record.field("id") == Some(identifier)
        || record.hub_field("current_ip_addr") == Some(identifier)
        || record.hub_field("name") == Some(identifier)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SettingsStore {
        SettingsStore::from_json(json!({
            "AA01": {"api_key": "k1", "hub": {"name": "gate", "current_ip_addr": "10.0.0.5"}},
            "BB02": {"id": "dev2", "hub": {"name": "", "current_ip_addr": "10.0.0.6"}},
            "CC03": {"api_key": "gate", "hub": {"name": "other"}}
        }))
        .unwrap()
    }

    fn payload(value: serde_json::Value) -> IngestPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn resolves_by_each_identifier_kind() {
        let s = store();
        assert_eq!(resolve_mac(&s, "k1", None).as_deref(), Some("AA01"));
        assert_eq!(resolve_mac(&s, "dev2", None).as_deref(), Some("BB02"));
        assert_eq!(resolve_mac(&s, "10.0.0.6", None).as_deref(), Some("BB02"));
        assert_eq!(resolve_mac(&s, "other", None).as_deref(), Some("CC03"));
    }

    #[test]
    fn first_match_in_store_order_wins() {
        // "gate" is AA01's hub name and CC03's api key.
        assert_eq!(resolve_mac(&store(), "gate", None).as_deref(), Some("AA01"));
    }

    #[test]
    fn unknown_identifier_falls_back_to_remote() {
        let s = store();
        assert_eq!(
            resolve_mac(&s, "nope", Some("192.168.1.9")).as_deref(),
            Some("192.168.1.9")
        );
        assert_eq!(resolve_mac(&s, "nope", None), None);
    }

    #[test]
    fn channel_prefers_channel_id_then_key() {
        let s = store();
        let p = payload(json!({"channel_id": "chan", "key": "k1"}));
        assert_eq!(resolve_channel(&s, &p, None).as_deref(), Some("chan"));

        let p = payload(json!({"channel_id": "", "key": "k1"}));
        assert_eq!(resolve_channel(&s, &p, None).as_deref(), Some("k1"));
    }

    #[test]
    fn channel_from_remote_uses_hub_name_or_mac() {
        let s = store();
        let p = payload(json!({"updates": []}));
        assert_eq!(resolve_channel(&s, &p, Some("10.0.0.5")).as_deref(), Some("gate"));
        assert_eq!(resolve_channel(&s, &p, Some("10.0.0.6")).as_deref(), Some("BB02"));
        assert_eq!(
            resolve_channel(&s, &p, Some("10.9.9.9")).as_deref(),
            Some("10.9.9.9")
        );
        assert_eq!(resolve_channel(&s, &p, None), None);
    }
}
