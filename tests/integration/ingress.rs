use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wa_orchestrator::credentials::InMemoryCredentialStore;
use wa_orchestrator::echo::BOT_SIGNATURE;
use wa_orchestrator::ingress::{self, TOKEN_HEADER};
use wa_orchestrator::providers::cloudapi::{sign_payload, CloudApiClientConfig, SIGNATURE_HEADER};
use wa_orchestrator::providers::uazapi::{UazapiClient, UazapiClientConfig};
use wa_orchestrator::providers::{CloudApiAdapter, UazapiAdapter};
use wa_orchestrator::retry::RetryPolicy;
use wa_orchestrator::types::BrokerType;
use wa_orchestrator::{AppState, Config, Orchestrator};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_SECRET: &str = "meta-app-secret";

fn create_test_config() -> Config {
    let mut config = Config::default();
    config.auth.token = Some("test_token_123".to_string());
    config.cloudapi.app_secret = Some(APP_SECRET.to_string());
    config.cloudapi.verify_token = Some("verify-me".to_string());
    config
}

fn create_state(uazapi_url: &str) -> AppState {
    let store = Arc::new(InMemoryCredentialStore::new());
    let orchestrator = Orchestrator::new();
    let client = UazapiClient::new(UazapiClientConfig {
        base_url: uazapi_url.to_string(),
        admin_token: Some("admin".into()),
        timeout: Duration::from_secs(2),
        retry: RetryPolicy::none(),
        circuit_breaker: true,
    });
    orchestrator.register_provider(
        BrokerType::Uazapi,
        Arc::new(UazapiAdapter::new(client, store.clone())),
    );
    orchestrator.register_provider(
        BrokerType::Cloudapi,
        Arc::new(CloudApiAdapter::new(CloudApiClientConfig::default(), store)),
    );
    AppState::new(create_test_config(), Arc::new(orchestrator))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn signed_post(uri: &str, payload: &Value) -> Request<Body> {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(&body, APP_SECRET);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap()
}

fn app(state: &AppState) -> Router {
    ingress::router(state.clone())
}

fn cloud_status_payload() -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": "1099"},
                    "statuses": [{
                        "id": "wamid.OUT1",
                        "status": "read",
                        "timestamp": "1700000000",
                        "recipient_id": "5511999887766"
                    }]
                }
            }]
        }]
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let state = create_state("http://127.0.0.1:9");
    let response = app(&state)
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_providers_health_requires_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let state = create_state(&server.uri());

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/providers/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/providers/health")
                .header(TOKEN_HEADER, "test_token_123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"uazapi": false, "cloudapi": true})
    );
}

#[tokio::test]
async fn test_unknown_broker_is_not_found() {
    let state = create_state("http://127.0.0.1:9");
    let response = app(&state)
        .oneshot(post("/v1/webhooks/telegram", b"{}".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_uazapi_webhook_is_published() {
    let state = create_state("http://127.0.0.1:9");
    let mut rx = state.events.subscribe();
    let payload = json!({
        "EventType": "messages",
        "owner": "inst-1",
        "chat": {"wa_chatid": "551199@s.whatsapp.net"},
        "message": {"text": "hi", "messageid": "M1"}
    });

    let response = app(&state)
        .oneshot(post("/v1/webhooks/uazapi", serde_json::to_vec(&payload).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "event": "message.received"})
    );

    let event = rx.try_recv().unwrap();
    assert_eq!(event.event, "message.received");
    assert_eq!(event.instance_id.as_deref(), Some("inst-1"));
    assert_eq!(event.payload["data"]["message"]["content"], "hi");
    assert!(event.payload.get("rawPayload").is_none());
}

#[tokio::test]
async fn test_path_instance_overrides_payload() {
    let state = create_state("http://127.0.0.1:9");
    let mut rx = state.events.subscribe();
    let payload = json!({
        "EventType": "messages",
        "owner": "from-payload",
        "message": {"chatid": "551199@s.whatsapp.net", "text": "hi", "messageid": "M2"}
    });

    let response = app(&state)
        .oneshot(post(
            "/v1/webhooks/uazapi/from-path",
            serde_json::to_vec(&payload).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.instance_id.as_deref(), Some("from-path"));
}

#[tokio::test]
async fn test_bot_echo_is_dropped() {
    let state = create_state("http://127.0.0.1:9");
    let mut rx = state.events.subscribe();
    let payload = json!({
        "EventType": "messages",
        "owner": "inst-1",
        "message": {
            "chatid": "551199@s.whatsapp.net",
            "text": format!("{BOT_SIGNATURE}sent by us"),
            "messageid": "M3",
            "fromMe": true
        }
    });

    let response = app(&state)
        .oneshot(post("/v1/webhooks/uazapi", serde_json::to_vec(&payload).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "ignored": "echo"})
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let state = create_state("http://127.0.0.1:9");
    let response = app(&state)
        .oneshot(post("/v1/webhooks/uazapi", b"not json".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cloudapi_requires_valid_signature() {
    let state = create_state("http://127.0.0.1:9");
    let mut rx = state.events.subscribe();
    let body = serde_json::to_vec(&cloud_status_payload()).unwrap();

    let response = app(&state)
        .oneshot(post("/v1/webhooks/cloudapi", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/cloudapi")
        .header(SIGNATURE_HEADER, sign_payload(&body, "someone-else"))
        .body(Body::from(body))
        .unwrap();
    let response = app(&state).oneshot(forged).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_signed_cloudapi_status_is_published() {
    let state = create_state("http://127.0.0.1:9");
    let mut rx = state.events.subscribe();

    let response = app(&state)
        .oneshot(signed_post("/v1/webhooks/cloudapi", &cloud_status_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "event": "message.updated"})
    );

    let event = rx.try_recv().unwrap();
    assert_eq!(event.instance_id.as_deref(), Some("1099"));
    assert_eq!(event.payload["data"]["status"], "read");
}

#[tokio::test]
async fn test_cloudapi_fails_closed_without_secret() {
    let mut state = create_state("http://127.0.0.1:9");
    state.config.cloudapi.app_secret = None;

    let response = app(&state)
        .oneshot(signed_post("/v1/webhooks/cloudapi", &cloud_status_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unregistered_broker_is_unavailable() {
    let state = AppState::new(create_test_config(), Arc::new(Orchestrator::new()));
    let response = app(&state)
        .oneshot(post("/v1/webhooks/uazapi", b"{}".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "provider_unavailable");
}

#[tokio::test]
async fn test_verification_challenge() {
    let state = create_state("http://127.0.0.1:9");

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/webhooks/cloudapi?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"1158201444");

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/webhooks/cloudapi/inst-1?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/webhooks/uazapi?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
