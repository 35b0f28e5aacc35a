//! HTTP edge: webhook intake for both backends, health checks and the
//! WebSocket event stream.

use axum::{
    body::Bytes,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::echo::is_echo_event;
use crate::error::ProviderError;
use crate::providers::cloudapi::{
    handle_verification_challenge, verify_webhook_signature, SIGNATURE_HEADER,
};
use crate::types::BrokerType;
use crate::ws::{self, WsEvent};
use crate::AppState;

pub const TOKEN_HEADER: &str = "X-Orchestrator-Token";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Meta's subscription handshake parameters.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let authed_routes = Router::new()
        .route("/v1/providers/health", get(providers_health))
        .route("/v1/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public_routes = Router::new()
        .route("/v1/health", get(health))
        .route(
            "/v1/webhooks/:broker",
            get(verify_subscription).post(receive_webhook),
        )
        .route(
            "/v1/webhooks/:broker/:instance_id",
            get(verify_instance_subscription).post(receive_instance_webhook),
        );

    Router::new()
        .merge(authed_routes)
        .merge(public_routes)
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Response {
    if let Some(token) = state.config.auth.token.as_ref() {
        let header = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if header != Some(token.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    next.run(req).await
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"success": false, "error": message.into()}))).into_response()
}

fn provider_error_response(err: &ProviderError) -> Response {
    let status = match err {
        ProviderError::ProviderUnavailable { .. } | ProviderError::CircuitOpen { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ProviderError::InvalidPhoneNumber { .. } | ProviderError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"success": false, "error": err.to_string(), "kind": err.kind()})),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn providers_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.health_check_all().await)
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rx = state.events.subscribe();
    let token = state.config.auth.token.clone();
    ws.on_upgrade(move |socket| ws::handle_ws(socket, rx, token))
}

async fn verify_subscription(
    State(state): State<AppState>,
    Path(broker): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    challenge_response(&state, &broker, &query)
}

async fn verify_instance_subscription(
    State(state): State<AppState>,
    Path((broker, _instance_id)): Path<(String, String)>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    challenge_response(&state, &broker, &query)
}

fn challenge_response(state: &AppState, broker: &str, query: &VerifyQuery) -> Response {
    if broker.parse::<BrokerType>().ok() != Some(BrokerType::Cloudapi) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let verify_token = state.config.cloudapi.verify_token.as_deref().unwrap_or_default();
    match handle_verification_challenge(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        verify_token,
    ) {
        Some(challenge) => {
            info!("cloud api webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = ?query.mode, "cloud api webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

async fn receive_webhook(
    State(state): State<AppState>,
    Path(broker): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ingest(&state, &broker, None, &headers, &body)
}

async fn receive_instance_webhook(
    State(state): State<AppState>,
    Path((broker, instance_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ingest(&state, &broker, Some(instance_id), &headers, &body)
}

/// Verifies, normalizes and publishes one inbound payload.
fn ingest(
    state: &AppState,
    broker: &str,
    instance_id: Option<String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let Ok(broker) = broker.parse::<BrokerType>() else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown broker `{broker}`"));
    };

    if broker == BrokerType::Cloudapi {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        let secret = state.config.cloudapi.app_secret.as_deref();
        if !verify_webhook_signature(body, signature, secret) {
            warn!(broker = %broker, "webhook signature rejected");
            return error_response(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let raw: Value = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(broker = %broker, error = %err, "webhook body is not JSON");
            return error_response(StatusCode::BAD_REQUEST, "invalid JSON body");
        }
    };

    let mut hook = match state.orchestrator.normalize_webhook(broker, &raw) {
        Ok(hook) => hook,
        Err(err) => {
            warn!(broker = %broker, error = %err, "webhook for unregistered broker");
            return provider_error_response(&err);
        }
    };
    if let Some(instance_id) = instance_id {
        hook.instance_id = instance_id;
    }

    if is_echo_event(&hook) {
        debug!(broker = %broker, instance_id = %hook.instance_id, "dropping bot echo");
        return Json(json!({"success": true, "ignored": "echo"})).into_response();
    }

    debug!(
        broker = %broker,
        instance_id = %hook.instance_id,
        event = %hook.event,
        "webhook normalized"
    );
    // no subscribers is fine
    let _ = state.events.send(WsEvent::from(&hook));
    Json(json!({"success": true, "event": hook.event.as_str()})).into_response()
}
