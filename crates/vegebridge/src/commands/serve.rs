//! `serve`: run the bridge until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vegebridge_api::{BusConfig, BusEventLoop, MqttBus};
use vegebridge_config::Config;
use vegebridge_core::{Controller, NullPublisher, Publisher, SettingsStore};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::error::CliError;

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = vegebridge_config::load_config(global.config.as_deref())?;
    apply_overrides(&mut config, args);
    config.validate()?;

    info!(version = env!("CARGO_PKG_VERSION"), "vegebridge starting");

    let bridge = config.to_bridge_config()?;
    let store = SettingsStore::load_or_default(&bridge.store_path);
    info!(devices = store.len(), path = %bridge.store_path.display(), "settings loaded");

    let (publisher, bus_loop) = connect_bus(&config).await;

    let controller = Controller::new(bridge, store, publisher);
    controller.start().await;

    let shutdown = CancellationToken::new();
    let bus_task = bus_loop.map(|event_loop| {
        tokio::spawn(event_loop.run(controller.clone(), shutdown.clone()))
    });
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let published = controller.publish_settings().await;
    info!(topics = published, "published stored settings");

    let served = vegebridge_api::serve(
        controller.clone(),
        config.server.bind,
        &config.server.ports,
        shutdown.clone(),
    )
    .await;

    // Listener failure also has to stop the bus.
    shutdown.cancel();
    if let Some(task) = bus_task {
        if let Err(e) = task.await {
            warn!(error = %e, "MQTT task failed during shutdown");
        }
    }
    controller.shutdown().await;
    info!("vegebridge stopped");

    served.map_err(CliError::from)
}

/// Fold command-line flags over the loaded configuration.
fn apply_overrides(config: &mut Config, args: ServeArgs) {
    if !args.ports.is_empty() {
        config.server.ports = args.ports;
    }
    if let Some(path) = args.config_file {
        config.store.path = path;
    }
    if let Some(broker) = args.broker {
        config.mqtt.broker = Some(broker);
    }
    if let Some(port) = args.mqtt_port {
        config.mqtt.port = port;
    }
    if let Some(user) = args.user {
        config.mqtt.user = Some(user);
    }
    if let Some(password) = args.password {
        config.mqtt.password = Some(password);
    }
    if let Some(topic) = args.pub_topic {
        config.mqtt.pub_topic = topic;
    }
    if let Some(topic) = args.sub_topic {
        config.mqtt.sub_topic = topic;
    }
    if let Some(kind) = args.processor {
        config.decoder.processor = kind;
    }
}

/// Connect to the broker, or fall back to publishing nowhere.
async fn connect_bus(config: &Config) -> (Arc<dyn Publisher>, Option<BusEventLoop>) {
    let Some(bus) = bus_config(config) else {
        warn!("no MQTT broker configured; readings will not be published");
        return (Arc::new(NullPublisher), None);
    };
    match MqttBus::connect(&bus).await {
        Ok((publisher, event_loop)) => (Arc::new(publisher), Some(event_loop)),
        Err(e) => {
            warn!(error = %e, "continuing without MQTT; readings will not be published");
            (Arc::new(NullPublisher), None)
        }
    }
}

fn bus_config(config: &Config) -> Option<BusConfig> {
    let mqtt = &config.mqtt;
    let broker = mqtt.broker.as_deref()?;
    let mut bus = BusConfig::new(broker, mqtt.port, mqtt.sub_topic.clone());
    if let Some(ref id) = mqtt.client_id {
        bus.client_id.clone_from(id);
    }
    bus.user.clone_from(&mqtt.user);
    bus.password = mqtt.password.clone().map(SecretString::from);
    bus.keep_alive = Duration::from_secs(mqtt.keep_alive_secs);
    Some(bus)
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let reason = tokio::select! {
        () = shutdown.cancelled() => return,
        r = ctrl_c() => r,
        r = terminate() => r,
    };
    info!(signal = reason, "shutting down");
    shutdown.cancel();
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
    "SIGTERM"
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    std::future::pending::<&'static str>().await
}
