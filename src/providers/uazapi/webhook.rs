use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{
    ConnectionData, DeliveryStatus, InstanceStatus, MediaMessage, MessageData, MessageType,
    NormalizedWebhook, StatusData, WebhookData, WebhookEvent, WebhookMessage,
};

/// Unknown states are treated as not usable.
pub fn map_instance_status(status: &str) -> InstanceStatus {
    match status {
        "open" | "connected" | "qrReadSuccess" => InstanceStatus::Connected,
        "close" | "disconnected" => InstanceStatus::Disconnected,
        "connecting" => InstanceStatus::Connecting,
        "qrReadError" => InstanceStatus::Error,
        _ => InstanceStatus::Disconnected,
    }
}

pub fn map_event(event: &str) -> WebhookEvent {
    match event {
        "messages" | "message" => WebhookEvent::MessageReceived,
        "message.send" => WebhookEvent::MessageSent,
        "messages_update" => WebhookEvent::MessageUpdated,
        "connection" | "connection.update" => WebhookEvent::InstanceConnected,
        "qr" => WebhookEvent::InstanceQr,
        "chats" => WebhookEvent::ChatCreated,
        "contacts" => WebhookEvent::ContactUpdated,
        _ => WebhookEvent::MessageReceived,
    }
}

pub fn map_message_type(kind: &str) -> MessageType {
    match kind {
        "conversation" | "extendedTextMessage" => MessageType::Text,
        "imageMessage" => MessageType::Image,
        "videoMessage" => MessageType::Video,
        "audioMessage" => MessageType::Audio,
        "ptt" => MessageType::Voice,
        "documentMessage" => MessageType::Document,
        "locationMessage" => MessageType::Location,
        "contactMessage" => MessageType::Contact,
        _ => MessageType::Text,
    }
}

pub fn map_delivery_status(status: &str) -> DeliveryStatus {
    match status.to_lowercase().as_str() {
        "sent" | "serverack" => DeliveryStatus::Sent,
        "delivered" | "deliveryack" => DeliveryStatus::Delivered,
        "read" | "played" => DeliveryStatus::Read,
        "failed" | "error" => DeliveryStatus::Failed,
        _ => DeliveryStatus::Pending,
    }
}

fn str_at<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn first_str<'a>(objects: &[&'a Value], keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| objects.iter().find_map(|obj| str_at(*obj, key)))
}

fn u64_at(obj: &Value, key: &str) -> Option<u64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The broker reports milliseconds; older payloads carry seconds.
fn parse_timestamp(value: Option<u64>) -> DateTime<Utc> {
    let Some(raw) = value else {
        return Utc::now();
    };
    let millis = if raw < 100_000_000_000 {
        raw.saturating_mul(1000)
    } else {
        raw
    };
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

fn instance_id(root: &Map<String, Value>) -> String {
    ["instanceId", "instance_id", "instanceName", "owner"]
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Normalizes the broker's global webhook shape (`EventType`, nested `chat`
/// and `message`). Never fails: unusable payloads become the empty event.
pub fn normalize_uazapi_webhook(raw: &Value) -> NormalizedWebhook {
    let Some(root) = raw.as_object() else {
        debug!("uazapi webhook is not an object; emitting empty event");
        return NormalizedWebhook::empty("");
    };

    let event = str_at(raw, "EventType")
        .or_else(|| str_at(raw, "type"))
        .map(map_event)
        .unwrap_or(WebhookEvent::MessageReceived);
    let instance_id = instance_id(root);
    let message = raw.get("message").filter(|m| m.is_object());

    let data = match event {
        WebhookEvent::InstanceConnected | WebhookEvent::InstanceQr => {
            WebhookData::Connection(connection_data(raw))
        }
        WebhookEvent::MessageUpdated => match message {
            Some(m) => WebhookData::Status(status_data(raw, m)),
            None => WebhookData::Empty,
        },
        _ => match message {
            Some(m) => WebhookData::Message(message_data(raw, m)),
            None => WebhookData::Empty,
        },
    };

    let timestamp = match &data {
        WebhookData::Message(d) => d.message.timestamp,
        _ => parse_timestamp(u64_at(raw, "timestamp")),
    };

    NormalizedWebhook {
        event,
        instance_id,
        timestamp,
        data,
        raw_payload: Some(raw.clone()),
    }
}

fn chat_id(raw: &Value, message: Option<&Value>) -> Option<String> {
    raw.get("chat")
        .and_then(|chat| str_at(chat, "wa_chatid"))
        .or_else(|| str_at(raw, "from"))
        .or_else(|| message.and_then(|m| str_at(m, "chatid")))
        .map(str::to_string)
}

fn message_id(m: &Value, content: &Value) -> String {
    [content, m]
        .iter()
        .find_map(|obj| obj.get("key").and_then(|key| str_at(key, "ID")))
        .or_else(|| str_at(m, "id"))
        .or_else(|| str_at(m, "messageid"))
        .unwrap_or_default()
        .to_string()
}

fn message_data(raw: &Value, m: &Value) -> MessageData {
    let content = m.get("content").filter(|c| c.is_object()).unwrap_or(m);
    let id = message_id(m, content);

    let text = first_str(&[content, m], &["text", "body", "caption"])
        .or_else(|| m.get("content").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let wire_type = first_str(&[m, content], &["messageType", "type"]).unwrap_or_default();
    let media_url = first_str(&[content, m], &["mediaUrl", "url"]);

    let (kind, media) = match media_url {
        Some(url) => {
            let kind = match map_message_type(wire_type) {
                MessageType::Text => MessageType::Document,
                other => other,
            };
            let media = MediaMessage {
                id: id.clone(),
                kind,
                media_url: url.to_string(),
                caption: str_at(content, "caption").map(str::to_string),
                file_name: first_str(&[content, m], &["fileName", "filename"]).map(str::to_string),
                mime_type: first_str(&[content, m], &["mimetype", "mimeType"]).map(str::to_string),
                size: u64_at(content, "fileLength").or_else(|| u64_at(content, "fileSize")),
                duration: u64_at(content, "seconds"),
            };
            (kind, Some(media))
        }
        None => (MessageType::Text, None),
    };

    let timestamp = parse_timestamp(
        u64_at(m, "messageTimestamp")
            .or_else(|| u64_at(m, "timestamp"))
            .or_else(|| u64_at(raw, "timestamp")),
    );

    MessageData {
        chat_id: chat_id(raw, Some(m)),
        from: str_at(m, "sender")
            .or_else(|| str_at(raw, "from"))
            .map(str::to_string),
        to: None,
        message: WebhookMessage {
            id,
            kind,
            content: text,
            media,
            timestamp,
            from_me: m.get("fromMe").and_then(Value::as_bool).unwrap_or(false),
            latitude: None,
            longitude: None,
            location_name: None,
            location_address: None,
        },
        contact: None,
        quoted: None,
    }
}

fn status_data(raw: &Value, m: &Value) -> StatusData {
    let content = m.get("content").filter(|c| c.is_object()).unwrap_or(m);
    let status = first_str(&[m, raw], &["status", "state"])
        .map(map_delivery_status)
        .unwrap_or(DeliveryStatus::Pending);
    StatusData {
        message_id: message_id(m, content),
        chat_id: chat_id(raw, Some(m)),
        status,
        errors: Vec::new(),
    }
}

fn connection_data(raw: &Value) -> ConnectionData {
    let instance = raw.get("instance").filter(|i| i.is_object());
    let mut scopes: Vec<&Value> = Vec::with_capacity(2);
    if let Some(instance) = instance {
        scopes.push(instance);
    }
    scopes.push(raw);

    ConnectionData {
        status: first_str(&scopes, &["status", "state"]).map(map_instance_status),
        qr_code: first_str(&scopes, &["qrcode", "qr"]).map(str::to_string),
        pairing_code: first_str(&scopes, &["paircode", "pairingCode"]).map(str::to_string),
    }
}
