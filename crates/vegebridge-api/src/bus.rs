// ── MQTT bus bridge ──
//
// Publishes hub readings and settings, and feeds command topics back to
// the controller. rumqttc owns reconnection: the event loop reconnects on
// the next poll after an error, and we resubscribe on every ConnAck.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vegebridge_core::{Controller, Publisher};

use crate::error::Error;

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Depth of the client's request queue. Publications wait in an unbounded
/// channel in front of it, so a full queue delays them instead of
/// dropping them.
const REQUEST_CAPACITY: usize = 1024;

// ── Configuration ────────────────────────────────────────────────

/// How to reach the broker.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    /// Command topics are `<command_prefix><mac>/...`.
    pub command_prefix: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl BusConfig {
    pub fn new(broker: impl Into<String>, port: u16, command_prefix: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            port,
            client_id: default_client_id(),
            user: None,
            password: None,
            command_prefix: command_prefix.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Wildcard filter covering every command topic.
    pub fn subscription(&self) -> String {
        format!("{}#", self.command_prefix)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker, self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some(ref user) = self.user {
            let password = self
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned())
                .unwrap_or_default();
            options.set_credentials(user, password);
        }
        options
    }
}

/// Unique per process so two bridges on one broker do not kick each other.
pub fn default_client_id() -> String {
    format!("vegebridge-{}", std::process::id())
}

// ── Connection ───────────────────────────────────────────────────

/// Connected broker session, split into its publishing and polling halves.
pub struct MqttBus;

impl MqttBus {
    /// Connect and subscribe to the command topics.
    ///
    /// Waits for the broker's ConnAck (bounded by `connect_timeout`), so an
    /// unreachable broker is reported here rather than on first publish.
    pub async fn connect(config: &BusConfig) -> Result<(MqttPublisher, BusEventLoop), Error> {
        let unavailable = |reason: String| Error::BusUnavailable {
            broker: format!("{}:{}", config.broker, config.port),
            reason,
        };

        let (client, mut eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);

        let connack = tokio::time::timeout(config.connect_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        })
        .await
        .map_err(|_| unavailable("timed out waiting for the broker".into()))?
        .map_err(unavailable)?;
        debug!(code = ?connack.code, "MQTT broker connected");

        let subscription = config.subscription();
        client.subscribe(&subscription, QoS::AtMostOnce).await?;
        info!(broker = %config.broker, port = config.port, %subscription, "connected to MQTT broker");

        let (outgoing, queued) = mpsc::unbounded_channel();
        Ok((
            MqttPublisher { outgoing },
            BusEventLoop {
                client,
                eventloop,
                subscription,
                queued,
            },
        ))
    }
}

/// One publication waiting for the client's request queue.
#[derive(Debug)]
struct Outgoing {
    topic: String,
    payload: String,
}

/// Outbound half: queues publications for the event loop to send.
///
/// Publishing never blocks the caller. Nothing is sent until
/// [`BusEventLoop::run`] is driving the connection.
#[derive(Clone)]
pub struct MqttPublisher {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) {
        let message = Outgoing {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
        };
        if self.outgoing.send(message).is_err() {
            warn!(topic, "MQTT bus stopped, publish dropped");
        }
    }
}

/// Inbound half: drives the connection and dispatches commands.
pub struct BusEventLoop {
    client: AsyncClient,
    eventloop: EventLoop,
    subscription: String,
    queued: mpsc::UnboundedReceiver<Outgoing>,
}

impl BusEventLoop {
    /// Poll until `cancel` fires, passing every received publish to the
    /// controller and forwarding queued publications to the broker.
    /// Disconnects cleanly on the way out.
    pub async fn run(self, controller: Controller, cancel: CancellationToken) {
        let Self {
            client,
            mut eventloop,
            subscription,
            queued,
        } = self;
        let forwarder = tokio::spawn(forward(client.clone(), queued));

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let payload = String::from_utf8_lossy(&publish.payload);
                        debug!(topic = %publish.topic, %payload, "command received");
                        controller.handle_bus_message(&publish.topic, &payload).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT broker reconnected");
                        if let Err(e) = client.try_subscribe(&subscription, QoS::AtMostOnce) {
                            warn!(error = %e, "resubscribe failed");
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => warn!("MQTT broker disconnected"),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, retrying");
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        forwarder.abort();
        disconnect(&client, &mut eventloop).await;
    }
}

/// Move queued publications into the client's request queue, waiting
/// whenever it is full.
async fn forward(client: AsyncClient, mut queued: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(Outgoing { topic, payload }) = queued.recv().await {
        if let Err(e) = client
            .publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            .await
        {
            warn!(error = %e, "MQTT client closed, stopping publications");
            break;
        }
    }
}

async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "MQTT disconnect request failed");
        return;
    }
    // Poll until the Disconnect packet is out or the grace period ends.
    let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;
    debug!("MQTT disconnected");
}
