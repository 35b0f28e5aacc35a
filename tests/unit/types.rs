use serde_json::json;
use wa_orchestrator::types::{
    BrokerType, ChatFilters, CreateInstanceInput, DeliveryStatus, MediaType, MessageResult,
    MessageType, SendMediaInput, SendTextInput, WebhookConfig, WebhookData, WebhookEvent,
};

#[test]
fn test_broker_type_parse_aliases() {
    assert_eq!("UAZAPI".parse::<BrokerType>().unwrap(), BrokerType::Uazapi);
    assert_eq!(" cloud_api ".parse::<BrokerType>().unwrap(), BrokerType::Cloudapi);
    assert_eq!(BrokerType::Cloudapi.to_string(), "cloudapi");
    assert!("evolution".parse::<BrokerType>().is_err());
}

#[test]
fn test_broker_type_serde_lowercase() {
    assert_eq!(serde_json::to_value(BrokerType::Uazapi).unwrap(), json!("uazapi"));
    let parsed: BrokerType = serde_json::from_value(json!("cloudapi")).unwrap();
    assert_eq!(parsed, BrokerType::Cloudapi);
}

#[test]
fn test_send_text_input_camel_case() {
    let input: SendTextInput = serde_json::from_value(json!({
        "to": "5511999887766",
        "text": "hi",
        "quotedMessageId": "Q1",
        "delay": 2
    }))
    .unwrap();
    assert_eq!(input.quoted_message_id.as_deref(), Some("Q1"));
    assert_eq!(input.delay, Some(2));
}

#[test]
fn test_send_media_input_builder() {
    let input = SendMediaInput::new("5511999887766", MediaType::Voice, "https://cdn/a.ogg");
    assert_eq!(input.media_url.as_deref(), Some("https://cdn/a.ogg"));
    assert!(input.delay.is_none());
    assert_eq!(MessageType::from(MediaType::Voice), MessageType::Voice);
    assert_eq!(MediaType::Document.as_str(), "document");
}

#[test]
fn test_create_instance_input_defaults_events() {
    let input: CreateInstanceInput = serde_json::from_value(json!({"name": "sales"})).unwrap();
    assert_eq!(input.name, "sales");
    assert!(input.webhook_events.is_empty());
    assert!(input.phone_number.is_none());
}

#[test]
fn test_webhook_config_enabled_by_default() {
    let config: WebhookConfig = serde_json::from_value(json!({"url": "https://hooks/x"})).unwrap();
    assert!(config.enabled);
    assert!(config.events.is_empty());
}

#[test]
fn test_chat_filters_default() {
    let filters = ChatFilters::default();
    assert!(!filters.unread_only);
    assert!(filters.limit.is_none());
}

#[test]
fn test_message_result_sent() {
    let result = MessageResult::sent("wamid.1");
    assert_eq!(result.message_id, "wamid.1");
    assert_eq!(result.status, DeliveryStatus::Sent);
}

#[test]
fn test_webhook_data_accessors() {
    let data: WebhookData = serde_json::from_value(json!({
        "kind": "status",
        "messageId": "M1",
        "chatId": "5511999887766",
        "status": "read"
    }))
    .unwrap();
    assert_eq!(data.delivery_status(), Some(DeliveryStatus::Read));
    assert_eq!(data.chat_id(), Some("5511999887766"));
    assert!(data.message().is_none());
    assert!(data.instance_status().is_none());
    assert_eq!(WebhookEvent::InstanceQr.as_str(), "instance.qr");
}
