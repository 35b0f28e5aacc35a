use serde_json::json;
use wa_orchestrator::providers::uazapi::{
    map_delivery_status, map_instance_status, normalize_uazapi_webhook,
};
use wa_orchestrator::types::{
    DeliveryStatus, InstanceStatus, MessageType, WebhookData, WebhookEvent,
};

#[test]
fn test_text_message_normalizes() {
    let raw = json!({
        "EventType": "messages",
        "chat": {"wa_chatid": "551199@s.whatsapp.net"},
        "message": {
            "chatid": "551199@s.whatsapp.net",
            "content": {"text": "hi", "key": {"ID": "ABC123"}}
        }
    });
    let hook = normalize_uazapi_webhook(&raw);
    assert_eq!(hook.event, WebhookEvent::MessageReceived);
    assert_eq!(hook.data.chat_id(), Some("551199@s.whatsapp.net"));
    let message = hook.data.message().unwrap();
    assert_eq!(message.id, "ABC123");
    assert_eq!(message.content, "hi");
    assert_eq!(message.kind, MessageType::Text);
    assert!(message.media.is_none());
    assert_eq!(hook.raw_payload.as_ref(), Some(&raw));
}

#[test]
fn test_chat_id_falls_back_to_message_chatid() {
    let hook = normalize_uazapi_webhook(&json!({
        "EventType": "messages",
        "owner": "inst-9",
        "message": {"chatid": "5511@s.whatsapp.net", "text": "plain", "messageid": "M9", "fromMe": true}
    }));
    assert_eq!(hook.instance_id, "inst-9");
    assert_eq!(hook.data.chat_id(), Some("5511@s.whatsapp.net"));
    let message = hook.data.message().unwrap();
    assert_eq!(message.id, "M9");
    assert_eq!(message.content, "plain");
    assert!(message.from_me);
}

#[test]
fn test_media_message_carries_url() {
    let hook = normalize_uazapi_webhook(&json!({
        "EventType": "messages",
        "instanceId": "inst-1",
        "message": {
            "messageType": "imageMessage",
            "content": {
                "mediaUrl": "https://cdn/pic.jpg",
                "caption": "look",
                "mimetype": "image/jpeg",
                "key": {"ID": "IMG1"}
            }
        }
    }));
    let message = hook.data.message().unwrap();
    assert_eq!(message.kind, MessageType::Image);
    assert_eq!(message.content, "look");
    let media = message.media.as_ref().unwrap();
    assert_eq!(media.media_url, "https://cdn/pic.jpg");
    assert_eq!(media.mime_type.as_deref(), Some("image/jpeg"));
}

#[test]
fn test_untyped_media_becomes_document() {
    let hook = normalize_uazapi_webhook(&json!({
        "EventType": "messages",
        "message": {"id": "D1", "url": "https://cdn/file.bin", "fileName": "file.bin"}
    }));
    let message = hook.data.message().unwrap();
    assert_eq!(message.kind, MessageType::Document);
    assert_eq!(
        message.media.as_ref().unwrap().file_name.as_deref(),
        Some("file.bin")
    );
}

#[test]
fn test_messages_update_becomes_status() {
    let hook = normalize_uazapi_webhook(&json!({
        "EventType": "messages_update",
        "chat": {"wa_chatid": "551199@s.whatsapp.net"},
        "message": {"id": "M1", "status": "DeliveryAck"}
    }));
    assert_eq!(hook.event, WebhookEvent::MessageUpdated);
    match &hook.data {
        WebhookData::Status(status) => {
            assert_eq!(status.message_id, "M1");
            assert_eq!(status.status, DeliveryStatus::Delivered);
        }
        other => panic!("expected status data, got {other:?}"),
    }
}

#[test]
fn test_qr_event_carries_code() {
    let hook = normalize_uazapi_webhook(&json!({
        "type": "qr",
        "instance": {"qrcode": "data:image/png;base64,AAA", "status": "connecting"}
    }));
    assert_eq!(hook.event, WebhookEvent::InstanceQr);
    match &hook.data {
        WebhookData::Connection(conn) => {
            assert_eq!(conn.qr_code.as_deref(), Some("data:image/png;base64,AAA"));
            assert_eq!(conn.status, Some(InstanceStatus::Connecting));
        }
        other => panic!("expected connection data, got {other:?}"),
    }
}

#[test]
fn test_malformed_payloads_degrade_to_empty() {
    for raw in [json!(null), json!("text"), json!([1, 2]), json!({}), json!({"EventType": "messages", "message": "x"})] {
        let hook = normalize_uazapi_webhook(&raw);
        assert_eq!(hook.event, WebhookEvent::MessageReceived);
        assert!(hook.data.is_empty(), "{raw}");
    }
}

#[test]
fn test_status_table() {
    let table = [
        ("open", InstanceStatus::Connected),
        ("close", InstanceStatus::Disconnected),
        ("connecting", InstanceStatus::Connecting),
        ("qrReadSuccess", InstanceStatus::Connected),
        ("qrReadError", InstanceStatus::Error),
        ("connected", InstanceStatus::Connected),
        ("disconnected", InstanceStatus::Disconnected),
    ];
    for (raw, expected) in table {
        assert_eq!(map_instance_status(raw), expected, "{raw}");
    }
    assert_eq!(map_instance_status("paused"), InstanceStatus::Disconnected);
}

#[test]
fn test_delivery_status_is_case_insensitive() {
    assert_eq!(map_delivery_status("READ"), DeliveryStatus::Read);
    assert_eq!(map_delivery_status("ServerAck"), DeliveryStatus::Sent);
    assert_eq!(map_delivery_status("Played"), DeliveryStatus::Read);
    assert_eq!(map_delivery_status("whatever"), DeliveryStatus::Pending);
}
