use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::types::{IncomingMessage, MediaObject, MessageStatus, WebhookPayload, WebhookValue};
use crate::types::{
    ContactRef, DeliveryStatus, MediaMessage, MessageData, MessageType, NormalizedWebhook,
    QuotedRef, StatusData, WebhookData, WebhookEvent, WebhookMessage,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

pub fn map_delivery_status(status: &str) -> DeliveryStatus {
    match status {
        "sent" => DeliveryStatus::Sent,
        "delivered" => DeliveryStatus::Delivered,
        "read" => DeliveryStatus::Read,
        "failed" => DeliveryStatus::Failed,
        _ => DeliveryStatus::Pending,
    }
}

pub fn map_message_type(kind: &str) -> MessageType {
    match kind {
        "image" | "sticker" => MessageType::Image,
        "video" => MessageType::Video,
        "audio" => MessageType::Audio,
        "voice" => MessageType::Voice,
        "document" => MessageType::Document,
        "location" => MessageType::Location,
        "contacts" => MessageType::Contact,
        _ => MessageType::Text,
    }
}

fn parse_seconds(raw: &str) -> DateTime<Utc> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

/// Normalizes a `whatsapp_business_account` webhook. Only the first entry
/// and change are read. Malformed payloads become the empty event.
pub fn normalize_cloudapi_webhook(raw: &Value) -> NormalizedWebhook {
    let payload: WebhookPayload = match serde_json::from_value(raw.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "cloud api webhook did not decode; emitting empty event");
            let phone_number_id = raw
                .pointer("/entry/0/changes/0/value/metadata/phone_number_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .unwrap_or("unknown");
            return NormalizedWebhook::empty(phone_number_id);
        }
    };
    let Some(entry) = payload.entry.first() else {
        return NormalizedWebhook::empty("unknown");
    };
    let Some(value) = entry.changes.first().and_then(|change| change.value.as_ref()) else {
        let id = if entry.id.is_empty() { "unknown" } else { entry.id.as_str() };
        return NormalizedWebhook::empty(id);
    };

    let phone_number_id = value.metadata.phone_number_id.clone();

    if let Some(status) = value.statuses.first() {
        return with_raw(normalize_status(status, phone_number_id), raw);
    }
    if let Some(message) = value.messages.first() {
        return with_raw(normalize_message(message, value, phone_number_id), raw);
    }
    if !value.errors.is_empty() {
        let errors: Vec<String> = value.errors.iter().map(|e| e.describe()).collect();
        warn!(phone_number_id = %phone_number_id, ?errors, "cloud api webhook reported errors");
    }
    NormalizedWebhook::empty(phone_number_id)
}

fn with_raw(mut hook: NormalizedWebhook, raw: &Value) -> NormalizedWebhook {
    hook.raw_payload = Some(raw.clone());
    hook
}

fn normalize_status(status: &MessageStatus, phone_number_id: String) -> NormalizedWebhook {
    NormalizedWebhook {
        event: WebhookEvent::MessageUpdated,
        instance_id: phone_number_id,
        timestamp: parse_seconds(&status.timestamp),
        data: WebhookData::Status(StatusData {
            message_id: status.id.clone(),
            chat_id: Some(status.recipient_id.clone()).filter(|id| !id.is_empty()),
            status: map_delivery_status(&status.status),
            errors: status.errors.iter().map(|e| e.describe()).collect(),
        }),
        raw_payload: None,
    }
}

fn normalize_message(
    message: &IncomingMessage,
    value: &WebhookValue,
    phone_number_id: String,
) -> NormalizedWebhook {
    let timestamp = parse_seconds(&message.timestamp);
    let kind = map_message_type(&message.kind);
    let extracted = extract_content(message);

    let contact = value.contacts.first().map(|c| ContactRef {
        name: c.profile.name.clone(),
        phone: c.wa_id.clone(),
    });
    let quoted = message.context.as_ref().map(|ctx| QuotedRef {
        id: ctx.id.clone(),
        from: ctx.from.clone(),
    });
    let location = message.location.as_ref().filter(|_| message.kind == "location");
    let from = Some(message.from.clone()).filter(|f| !f.is_empty());

    NormalizedWebhook {
        event: WebhookEvent::MessageReceived,
        instance_id: phone_number_id,
        timestamp,
        data: WebhookData::Message(MessageData {
            // chats are keyed by the sender's number
            chat_id: from.clone(),
            from,
            to: Some(value.metadata.display_phone_number.clone()).filter(|n| !n.is_empty()),
            message: WebhookMessage {
                id: message.id.clone(),
                kind,
                content: extracted.content,
                media: extracted.media,
                timestamp,
                from_me: false,
                latitude: location.map(|l| l.latitude),
                longitude: location.map(|l| l.longitude),
                location_name: location.and_then(|l| l.name.clone()),
                location_address: location.and_then(|l| l.address.clone()),
            },
            contact,
            quoted,
        }),
        raw_payload: None,
    }
}

struct Extracted {
    content: String,
    media: Option<MediaMessage>,
}

impl Extracted {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media: None,
        }
    }
}

/// Media URLs stay empty: the Graph API only delivers an id, resolved later
/// through `download_media`.
fn media(object: Option<&MediaObject>, kind: MessageType, with_caption: bool) -> Extracted {
    let object = object.cloned().unwrap_or_default();
    let caption = object.caption.filter(|_| with_caption);
    Extracted {
        content: caption.clone().unwrap_or_default(),
        media: Some(MediaMessage {
            id: object.id,
            kind,
            media_url: String::new(),
            caption,
            file_name: object.filename,
            mime_type: object.mime_type,
            size: None,
            duration: None,
        }),
    }
}

fn extract_content(message: &IncomingMessage) -> Extracted {
    match message.kind.as_str() {
        "text" => Extracted::text(
            message
                .text
                .as_ref()
                .map(|t| t.body.clone())
                .unwrap_or_default(),
        ),
        "image" => media(message.image.as_ref(), MessageType::Image, true),
        "video" => media(message.video.as_ref(), MessageType::Video, true),
        "audio" => media(message.audio.as_ref(), MessageType::Audio, false),
        "voice" => media(message.voice.as_ref(), MessageType::Voice, false),
        "document" => media(message.document.as_ref(), MessageType::Document, true),
        "sticker" => media(message.sticker.as_ref(), MessageType::Image, false),
        "location" => {
            let content = message
                .location
                .as_ref()
                .and_then(|l| serde_json::to_string(l).ok())
                .unwrap_or_default();
            Extracted::text(content)
        }
        "contacts" => {
            let contact = message.contacts.first();
            let content = json!({
                "name": contact.map(|c| c.name.formatted_name.as_str()).unwrap_or_default(),
                "phone": contact
                    .and_then(|c| c.phones.first())
                    .map(|p| p.phone.as_str())
                    .unwrap_or_default(),
            });
            Extracted::text(content.to_string())
        }
        "button" => Extracted::text(
            message
                .button
                .as_ref()
                .map(|b| {
                    if b.text.is_empty() {
                        b.payload.clone()
                    } else {
                        b.text.clone()
                    }
                })
                .unwrap_or_default(),
        ),
        "interactive" => Extracted::text(
            message
                .interactive
                .as_ref()
                .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()))
                .map(|reply| reply.title.clone())
                .unwrap_or_default(),
        ),
        _ => Extracted::text(""),
    }
}

/// Checks `X-Hub-Signature-256` (`sha256=<hex>`) against an HMAC-SHA256 of
/// the raw body. A missing signature or secret is a failed check.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature: Option<&str>,
    app_secret: Option<&str>,
) -> bool {
    let (Some(signature), Some(secret)) = (signature, app_secret) else {
        return false;
    };
    if signature.is_empty() || secret.is_empty() {
        return false;
    }
    let received = signature.trim().strip_prefix("sha256=").unwrap_or(signature.trim());

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let received = received.to_ascii_lowercase();
    if expected.len() != received.len() {
        return false;
    }
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

/// Meta's GET subscription handshake. Returns the challenge to echo back
/// when the mode and token match.
pub fn handle_verification_challenge(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    verify_token: &str,
) -> Option<String> {
    if verify_token.is_empty() {
        return None;
    }
    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge))
            if token == verify_token && !challenge.is_empty() =>
        {
            Some(challenge.to_string())
        }
        _ => None,
    }
}

/// Hex signature in header form, for senders and tests.
pub fn sign_payload(payload: &[u8], app_secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(app_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
