// ── Reconciliation controller ──
//
// Owns the settings store and decides, per hub, which side has the
// authoritative configuration. Bus commands patch the store and mark the
// hub pending; the next data POST from that hub gets the pending document
// in its response; the hub applies it and pushes its full configuration
// back, which marks it hub-pushed.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{self, Publisher};
use crate::command::{BusCommand, CommandOutcome};
use crate::config::BridgeConfig;
use crate::decoder::{SensorProcessor, build_processor};
use crate::error::CoreError;
use crate::flatten::flatten;
use crate::identity::{resolve_channel, resolve_mac};
use crate::model::{DeviceRecord, IngestPayload, WHO_UPDATED_KEY, WhoUpdated};
use crate::patch::apply_patch;
use crate::store::SettingsStore;
use crate::store::persist::{SnapshotSender, persister_task, write_atomic};

/// Field of a config push that names the hub.
pub const MAC_KEY: &str = "mac";

// ── Controller ───────────────────────────────────────────────────

/// Shared handle to the bridge state.
///
/// Cheaply cloneable via `Arc<ControllerInner>`; the HTTP handlers and the
/// bus event loop each hold one.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: BridgeConfig,
    store: Mutex<SettingsStore>,
    publisher: Arc<dyn Publisher>,
    processor: Box<dyn SensorProcessor>,
    snapshots: SnapshotSender,
    snapshot_rx: Mutex<Option<watch::Receiver<Option<Arc<String>>>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller over an already-loaded store. Does not start
    /// persistence; call [`start()`](Self::start).
    pub fn new(config: BridgeConfig, store: SettingsStore, publisher: Arc<dyn Publisher>) -> Self {
        let processor = build_processor(&config.decoder);
        let (snapshots, snapshot_rx) = watch::channel(None);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store: Mutex::new(store),
                publisher,
                processor,
                snapshots,
                snapshot_rx: Mutex::new(Some(snapshot_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the background persister. Calling it twice is harmless.
    pub async fn start(&self) {
        let Some(rx) = self.inner.snapshot_rx.lock().await.take() else {
            return;
        };
        let task = persister_task(
            self.inner.config.store_path.clone(),
            rx,
            self.inner.config.persist_debounce,
            self.inner.cancel.clone(),
        );
        self.inner.task_handles.lock().await.push(tokio::spawn(task));
        debug!(
            path = %self.inner.config.store_path.display(),
            processor = self.inner.processor.name(),
            "controller started"
        );
    }

    /// Stop background tasks. The persister flushes any pending write
    /// before it exits.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task failed during shutdown");
            }
        }
        debug!("controller stopped");
    }

    /// Write the store now, bypassing the debounce.
    pub async fn persist_now(&self) -> Result<(), CoreError> {
        let snapshot = self.inner.store.lock().await.to_pretty_string();
        let path = self.inner.config.store_path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &snapshot))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Copy of one hub's record.
    pub async fn record(&self, mac: &str) -> Option<DeviceRecord> {
        self.inner.store.lock().await.get(mac).cloned()
    }

    pub async fn device_count(&self) -> usize {
        self.inner.store.lock().await.len()
    }

    // ── Data ingest ──────────────────────────────────────────────

    /// Handle a data POST: publish the decoded readings and build the
    /// response. A hub with pending settings gets its full record back.
    ///
    /// `remote` is the address the request came from.
    pub async fn ingest(&self, payload: &IngestPayload, remote: Option<&str>) -> Value {
        let hub = {
            let store = self.inner.store.lock().await;
            resolve_channel(&store, payload, remote)
        };
        let hub = hub.as_deref();

        self.publish(hub, "status", "online");
        match payload.updates.as_deref() {
            Some(updates) if !updates.is_empty() => {
                for publication in self.inner.processor.process(updates) {
                    self.publish(hub, &publication.topic, &publication.payload);
                }
            }
            _ => warn!(hub = hub.unwrap_or("?"), "no updates in POST"),
        }

        let store = self.inner.store.lock().await;
        // An identifier the store no longer knows (a renamed api_key) still
        // leaves the request's address to match against `current_ip_addr`.
        let mac = payload
            .key()
            .or_else(|| payload.channel_id())
            .and_then(|id| resolve_mac(&store, &id, None))
            .or_else(|| remote.and_then(|addr| resolve_mac(&store, addr, None)))
            .or_else(|| remote.map(str::to_owned));
        let record = mac.as_deref().and_then(|m| store.get(m));

        let mut response = Map::new();
        let state = record.map(|r| r.who_updated).unwrap_or_default();
        response.insert(WHO_UPDATED_KEY.into(), Value::from(state.code()));
        if let Some(record) = record.filter(|r| r.who_updated.is_pending()) {
            info!(mac = mac.as_deref().unwrap_or("?"), "sending pending settings");
            response.extend(record.to_json());
        }
        Value::Object(response)
    }

    // ── Config push ──────────────────────────────────────────────

    /// Replace a hub's record with the configuration it pushed.
    pub async fn config_push(&self, body: Map<String, Value>) -> Result<WhoUpdated, CoreError> {
        let mac = body
            .get(MAC_KEY)
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CoreError::MalformedRequest {
                reason: format!("configuration has no '{MAC_KEY}'"),
            })?
            .to_owned();

        let mut record = DeviceRecord::from_json(body);
        record.mark(WhoUpdated::HubPushed);

        let mut store = self.inner.store.lock().await;
        match store.get(&mac) {
            None => info!(%mac, "new hub found"),
            Some(existing) if existing.settings == record.settings => {
                info!(%mac, "settings are up to date");
            }
            Some(_) => info!(%mac, "settings updated"),
        }
        store.insert(mac.clone(), record);

        self.publish_device(&store, &mac);
        self.schedule_persist(&store);
        Ok(WhoUpdated::HubPushed)
    }

    // ── Bus commands ─────────────────────────────────────────────

    /// Execute one command from the bus.
    pub async fn execute(&self, command: BusCommand) -> Result<CommandOutcome, CoreError> {
        match command {
            BusCommand::GetConfig => {
                let topics = self.publish_settings().await;
                Ok(CommandOutcome::Republished { topics })
            }
            BusCommand::RefreshConfig { mac } => {
                let mut store = self.inner.store.lock().await;
                let record = store
                    .get_mut(&mac)
                    .ok_or_else(|| CoreError::UnknownDevice { mac: mac.clone() })?;
                record.settings.clear();
                self.schedule_persist(&store);
                Ok(CommandOutcome::Reset { mac })
            }
            BusCommand::Set { path, value } => {
                let mut store = self.inner.store.lock().await;
                apply_patch(&mut store, &path, &value)?;

                let mac = path.first().cloned().unwrap_or_default();
                if let Some(record) = store.get_mut(&mac) {
                    if record.who_updated.is_pending() {
                        debug!(%mac, "replacing settings still pending delivery");
                    }
                    record.mark(WhoUpdated::Pending);
                }
                self.schedule_persist(&store);
                Ok(CommandOutcome::Applied { mac })
            }
        }
    }

    /// Parse and execute a raw bus message, logging the result. Messages
    /// outside the command prefix are ignored.
    pub async fn handle_bus_message(&self, topic: &str, payload: &str) {
        let Some(command) = BusCommand::parse(&self.inner.config.command_prefix, topic, payload)
        else {
            debug!(topic, "ignoring message outside command topics");
            return;
        };

        match self.execute(command).await {
            Ok(CommandOutcome::Applied { mac }) => {
                info!(%mac, topic, value = payload, "settings pending update");
            }
            Ok(CommandOutcome::Republished { topics }) => {
                info!(topics, "settings republished");
            }
            Ok(CommandOutcome::Reset { mac }) => {
                info!(%mac, "erased settings, waiting for update");
            }
            Err(CoreError::UnknownDevice { mac }) => {
                warn!(%mac, "no settings for hub");
            }
            Err(e) => warn!(topic, error = %e, "settings not updated"),
        }
    }

    // ── Publishing ───────────────────────────────────────────────

    /// Publish every settings topic of every hub. Returns the number of
    /// topics published.
    pub async fn publish_settings(&self) -> usize {
        let store = self.inner.store.lock().await;
        store
            .iter()
            .map(|(mac, _)| self.publish_device(&store, mac))
            .sum()
    }

    fn publish_device(&self, store: &SettingsStore, mac: &str) -> usize {
        let Some(record) = store.get(mac) else {
            return 0;
        };
        let node = record.to_node();
        let mut count = 0;
        for (path, payload) in flatten(&node) {
            self.publish(Some(mac), &path, &payload);
            count += 1;
        }
        count
    }

    fn publish(&self, hub: Option<&str>, path: &str, payload: &str) {
        let prefix = &self.inner.config.feedback_prefix;
        let topic = match hub {
            Some(hub) => bus::topic(prefix, hub, path),
            None => format!("{prefix}{path}"),
        };
        self.inner.publisher.publish(&topic, payload);
    }

    fn schedule_persist(&self, store: &SettingsStore) {
        self.inner
            .snapshots
            .send_replace(Some(Arc::new(store.to_pretty_string())));
    }
}
