// ── Ingest gateway ──
//
// Hubs POST their readings to `/` and their full configuration to
// `/configin`. Every listen port serves the same router; different hub
// firmware versions are usually pointed at different ports.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vegebridge_core::{Controller, CoreError, IngestPayload};

use crate::error::Error;

// ── Errors ───────────────────────────────────────────────────────

/// A request the gateway could not serve, rendered as plain text.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            Self::Internal(reason) => (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedRequest { reason } => {
                Self::BadRequest(format!("bad api call: {reason}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

// ── Router ───────────────────────────────────────────────────────

/// Routes for the hub-facing API.
///
/// Handlers need the peer address, so serve with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(controller: Controller) -> Router {
    Router::new()
        .route("/", post(ingest))
        .route("/configin", post(config_in))
        .with_state(controller)
}

/// POST / -- sensor readings.
async fn ingest(
    State(controller): State<Controller>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: IngestPayload = parse_body(&body)?;
    info!(peer = %peer.ip(), "received update");
    debug!(body = %String::from_utf8_lossy(&body), "update body");

    let remote = peer.ip().to_string();
    let response = controller.ingest(&payload, Some(&remote)).await;
    debug!(%response, "sending response");
    Ok(Json(response))
}

/// POST /configin -- the hub's full configuration.
async fn config_in(
    State(controller): State<Controller>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let value: Value = parse_body(&body)?;
    let Value::Object(config) = value else {
        return Err(ApiError::BadRequest(
            "bad api call: configuration is not a JSON object".into(),
        ));
    };
    info!("received configuration update");

    let state = controller.config_push(config).await?;
    Ok(Json(json!({ "who_updated": state.code() })))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("bad api call: empty body".into()));
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "unreadable request body");
        ApiError::from(CoreError::from(e))
    })
}

// ── Listeners ────────────────────────────────────────────────────

/// Serve the router on every port until `shutdown` is cancelled.
///
/// All ports are bound before any starts serving, so a port conflict
/// fails startup instead of leaving a partial server running.
pub async fn serve(
    controller: Controller,
    bind: IpAddr,
    ports: &[u16],
    shutdown: CancellationToken,
) -> Result<(), Error> {
    if ports.is_empty() {
        return Err(Error::NoPorts);
    }

    let mut listeners = Vec::with_capacity(ports.len());
    for &port in ports {
        let addr = SocketAddr::new(bind, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        listeners.push((addr, listener));
    }

    let app = router(controller);
    let mut servers = JoinSet::new();
    for (addr, listener) in listeners {
        info!(%addr, version = env!("CARGO_PKG_VERSION"), "starting hub API server");
        let app = app.clone();
        let token = shutdown.clone();
        servers.spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
        });
    }

    let mut result = Ok(());
    while let Some(joined) = servers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "HTTP listener failed");
                shutdown.cancel();
                result = Err(Error::Serve(e));
            }
            Err(e) => warn!(error = %e, "HTTP listener task panicked"),
        }
    }
    debug!("HTTP listeners stopped");
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tower::ServiceExt;
    use vegebridge_core::{BridgeConfig, RecordingPublisher, SettingsStore, WhoUpdated};

    const MAC: &str = "30AEA4E1B2C3";

    fn app(dir: &std::path::Path) -> (Router, Controller, Arc<RecordingPublisher>) {
        let rec = Arc::new(RecordingPublisher::new());
        let config = BridgeConfig {
            store_path: dir.join("config.json"),
            ..BridgeConfig::default()
        };
        let controller = Controller::new(config, SettingsStore::new(), rec.clone());
        let router = router(controller.clone())
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 5], 40_000))));
        (router, controller, rec)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn ingest_returns_state_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _ctrl, rec) = app(dir.path());

        let response = app
            .oneshot(post("/", r#"{"key":"gate","updates":[{"field2":3.3}]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({"who_updated": 0}));
        assert_eq!(
            rec.last("/vegehub_status/gate/periodic/gate").as_deref(),
            Some("CLOSED")
        );
    }

    #[tokio::test]
    async fn non_json_body_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _ctrl, _rec) = app(dir.path());

        let response = app.oneshot(post("/", "not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("bad api call"));
    }

    #[tokio::test]
    async fn empty_body_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _ctrl, _rec) = app(dir.path());

        let response = app.clone().oneshot(post("/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = app.oneshot(post("/configin", "  ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_in_stores_record() {
        let dir = tempfile::tempdir().unwrap();
        let (app, ctrl, _rec) = app(dir.path());

        let body = json!({"mac": MAC, "api_key": "gate", "hub": {"name": "gate"}}).to_string();
        let response = app.oneshot(post("/configin", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({"who_updated": 1}));
        assert_eq!(
            ctrl.record(MAC).await.unwrap().who_updated,
            WhoUpdated::HubPushed
        );
    }

    #[tokio::test]
    async fn config_in_without_mac_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (app, ctrl, _rec) = app(dir.path());

        let response = app
            .clone()
            .oneshot(post("/configin", r#"{"hub": {"name": "gate"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(post("/configin", "[1, 2]")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ctrl.device_count().await, 0);
    }

    #[tokio::test]
    async fn pending_settings_ride_on_the_ingest_response() {
        let dir = tempfile::tempdir().unwrap();
        let (app, ctrl, _rec) = app(dir.path());

        let body = json!({
            "mac": MAC,
            "api_key": "gate",
            "hub": {"name": "gate", "current_ip_addr": "10.0.0.5", "sample_period": 60}
        })
        .to_string();
        app.clone().oneshot(post("/configin", &body)).await.unwrap();
        ctrl.handle_bus_message(&format!("/vegehub_config/{MAC}/hub/sample_period"), "300")
            .await;

        // No identifier in the body: resolved through the peer address.
        let response = app.oneshot(post("/", r#"{"updates": []}"#)).await.unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["who_updated"], json!(2));
        assert_eq!(body["hub"]["sample_period"], json!(300));
        assert_eq!(body["mac"], json!(MAC));
    }

    #[tokio::test]
    async fn serve_rejects_empty_port_list() {
        let dir = tempfile::tempdir().unwrap();
        let (_app, ctrl, _rec) = app(dir.path());
        let err = serve(ctrl, IpAddr::from([127, 0, 0, 1]), &[], CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoPorts));
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (_app, ctrl, _rec) = app(dir.path());
        let token = CancellationToken::new();
        token.cancel();
        // Port 0 picks a free port; an already-cancelled token stops at once.
        serve(ctrl, IpAddr::from([127, 0, 0, 1]), &[0, 0], token)
            .await
            .unwrap();
    }
}
