use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type for the `vegebridge-api` crate.
#[derive(Debug, Error)]
pub enum Error {
    // ── HTTP ────────────────────────────────────────────────────────
    /// A listen address could not be bound (in use, no permission).
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    /// No listen ports were configured.
    #[error("No HTTP ports configured")]
    NoPorts,

    // ── MQTT ────────────────────────────────────────────────────────
    /// The broker could not be reached or refused the connection.
    #[error("MQTT broker {broker} unavailable: {reason}")]
    BusUnavailable { broker: String, reason: String },

    /// The client's request queue is closed or full.
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}
