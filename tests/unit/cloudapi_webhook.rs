use serde_json::{json, Value};
use wa_orchestrator::providers::cloudapi::{
    handle_verification_challenge, normalize_cloudapi_webhook, sign_payload,
    verify_webhook_signature,
};
use wa_orchestrator::types::{DeliveryStatus, MessageType, WebhookData, WebhookEvent};

fn envelope(value: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-1",
            "changes": [{"field": "messages", "value": value}]
        }]
    })
}

fn metadata() -> Value {
    json!({"display_phone_number": "15550001111", "phone_number_id": "1099"})
}

#[test]
fn test_empty_entry_is_canonical_empty_event() {
    let hook = normalize_cloudapi_webhook(&json!({"object": "whatsapp_business_account", "entry": []}));
    assert_eq!(hook.event, WebhookEvent::MessageReceived);
    assert!(hook.data.is_empty());
    assert_eq!(hook.instance_id, "unknown");
}

#[test]
fn test_garbage_never_panics() {
    for raw in [json!(null), json!(42), json!({"entry": [{"changes": [{"value": "nope"}]}]})] {
        let hook = normalize_cloudapi_webhook(&raw);
        assert!(hook.data.is_empty());
    }
}

#[test]
fn test_numeric_timestamps_decode() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": {"phone_number_id": "PN"},
        "messages": [{
            "id": "wamid.1",
            "from": "5511",
            "timestamp": 1700000000,
            "type": "text",
            "text": {"body": "hello"}
        }]
    })));
    assert_eq!(hook.event, WebhookEvent::MessageReceived);
    assert_eq!(hook.instance_id, "PN");
    assert_eq!(hook.timestamp.timestamp(), 1_700_000_000);
    match &hook.data {
        WebhookData::Message(data) => assert_eq!(data.message.content, "hello"),
        other => panic!("expected message, got {other:?}"),
    }

    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": metadata(),
        "statuses": [{"id": "wamid.OUT3", "status": "read", "timestamp": 1700000050}]
    })));
    assert_eq!(hook.event, WebhookEvent::MessageUpdated);
    assert_eq!(hook.timestamp.timestamp(), 1_700_000_050);
}

#[test]
fn test_undecodable_payload_keeps_phone_number_id() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": {"phone_number_id": "PN"},
        "messages": [{"id": "wamid.2", "timestamp": {"seconds": 1}, "type": "text"}]
    })));
    assert!(hook.data.is_empty());
    assert_eq!(hook.instance_id, "PN");
}

#[test]
fn test_delivered_status() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": metadata(),
        "statuses": [{
            "id": "wamid.OUT1",
            "status": "delivered",
            "timestamp": "1700000000",
            "recipient_id": "5511999887766"
        }]
    })));
    assert_eq!(hook.event, WebhookEvent::MessageUpdated);
    assert_eq!(hook.instance_id, "1099");
    assert_eq!(hook.timestamp.timestamp(), 1_700_000_000);
    match &hook.data {
        WebhookData::Status(status) => {
            assert_eq!(status.status, DeliveryStatus::Delivered);
            assert_eq!(status.message_id, "wamid.OUT1");
            assert_eq!(status.chat_id.as_deref(), Some("5511999887766"));
            assert!(status.errors.is_empty());
        }
        other => panic!("expected status, got {other:?}"),
    }
    assert!(hook.raw_payload.is_some());
}

#[test]
fn test_failed_status_keeps_errors() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": metadata(),
        "statuses": [{
            "id": "wamid.OUT2",
            "status": "failed",
            "timestamp": "1700000000",
            "recipient_id": "5511999887766",
            "errors": [{"code": 131047, "title": "Re-engagement message"}]
        }]
    })));
    match &hook.data {
        WebhookData::Status(status) => {
            assert_eq!(status.status, DeliveryStatus::Failed);
            assert_eq!(status.errors, vec!["Re-engagement message (131047)".to_string()]);
        }
        other => panic!("expected status, got {other:?}"),
    }
}

#[test]
fn test_text_message_with_contact_and_context() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": metadata(),
        "contacts": [{"profile": {"name": "Ana"}, "wa_id": "5511999887766"}],
        "messages": [{
            "id": "wamid.IN1",
            "from": "5511999887766",
            "timestamp": "1700000100",
            "type": "text",
            "text": {"body": "hello"},
            "context": {"from": "15550001111", "id": "wamid.OUT1"}
        }]
    })));
    assert_eq!(hook.event, WebhookEvent::MessageReceived);
    match &hook.data {
        WebhookData::Message(data) => {
            assert_eq!(data.chat_id.as_deref(), Some("5511999887766"));
            assert_eq!(data.to.as_deref(), Some("15550001111"));
            assert_eq!(data.message.content, "hello");
            assert_eq!(data.message.kind, MessageType::Text);
            assert!(!data.message.from_me);
            let contact = data.contact.as_ref().unwrap();
            assert_eq!(contact.name, "Ana");
            let quoted = data.quoted.as_ref().unwrap();
            assert_eq!(quoted.id, "wamid.OUT1");
        }
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn test_image_media_has_id_but_no_url() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": metadata(),
        "messages": [{
            "id": "wamid.IMG",
            "from": "5511999887766",
            "timestamp": "1700000100",
            "type": "image",
            "image": {"id": "MEDIA-1", "mime_type": "image/jpeg", "caption": "receipt"}
        }]
    })));
    let message = hook.data.message().unwrap();
    assert_eq!(message.kind, MessageType::Image);
    assert_eq!(message.content, "receipt");
    let media = message.media.as_ref().unwrap();
    assert_eq!(media.id, "MEDIA-1");
    assert!(media.media_url.is_empty());
}

#[test]
fn test_location_fields_surface() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": metadata(),
        "messages": [{
            "id": "wamid.LOC",
            "from": "5511999887766",
            "timestamp": "1700000100",
            "type": "location",
            "location": {"latitude": -23.55, "longitude": -46.63, "name": "Office"}
        }]
    })));
    let message = hook.data.message().unwrap();
    assert_eq!(message.kind, MessageType::Location);
    assert_eq!(message.latitude, Some(-23.55));
    assert_eq!(message.location_name.as_deref(), Some("Office"));
    let content: Value = serde_json::from_str(&message.content).unwrap();
    assert_eq!(content["longitude"], json!(-46.63));
}

#[test]
fn test_interactive_reply_uses_title() {
    let hook = normalize_cloudapi_webhook(&envelope(json!({
        "metadata": metadata(),
        "messages": [{
            "id": "wamid.BTN",
            "from": "5511999887766",
            "timestamp": "1700000100",
            "type": "interactive",
            "interactive": {"type": "button_reply", "button_reply": {"id": "yes", "title": "Yes"}}
        }]
    })));
    assert_eq!(hook.data.message().unwrap().content, "Yes");
}

#[test]
fn test_signature_verification() {
    let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
    let header = sign_payload(body, "app-secret");

    assert!(verify_webhook_signature(body, Some(&header), Some("app-secret")));
    assert!(verify_webhook_signature(body, Some(&header.to_uppercase().replace("SHA256=", "sha256=")), Some("app-secret")));
    assert!(!verify_webhook_signature(body, Some(&header), Some("wrong")));
    assert!(!verify_webhook_signature(b"tampered", Some(&header), Some("app-secret")));
    assert!(!verify_webhook_signature(body, None, Some("app-secret")));
    assert!(!verify_webhook_signature(body, Some(&header), None));
    assert!(!verify_webhook_signature(body, Some("sha256=abc"), Some("app-secret")));
}

#[test]
fn test_verification_challenge() {
    assert_eq!(
        handle_verification_challenge(Some("subscribe"), Some("vt"), Some("1158201444"), "vt"),
        Some("1158201444".to_string())
    );
    assert_eq!(handle_verification_challenge(Some("subscribe"), Some("bad"), Some("1"), "vt"), None);
    assert_eq!(handle_verification_challenge(Some("unsubscribe"), Some("vt"), Some("1"), "vt"), None);
    assert_eq!(handle_verification_challenge(Some("subscribe"), Some("vt"), None, "vt"), None);
}
