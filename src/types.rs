use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Backend a messaging instance is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerType {
    Uazapi,
    Cloudapi,
}

impl BrokerType {
    pub const ALL: [BrokerType; 2] = [BrokerType::Uazapi, BrokerType::Cloudapi];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerType::Uazapi => "uazapi",
            BrokerType::Cloudapi => "cloudapi",
        }
    }
}

impl fmt::Display for BrokerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uazapi" => Ok(BrokerType::Uazapi),
            "cloudapi" | "cloud_api" | "whatsapp_cloud_api" => Ok(BrokerType::Cloudapi),
            other => Err(format!("unknown broker type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Connected,
    Disconnected,
    Connecting,
    Error,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Connected => "connected",
            InstanceStatus::Disconnected => "disconnected",
            InstanceStatus::Connecting => "connecting",
            InstanceStatus::Error => "error",
        }
    }
}

/// Delivery state of an outbound message, reported later through webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Location,
    Contact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Voice,
    Document,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Voice => "voice",
            MediaType::Document => "document",
        }
    }
}

impl From<MediaType> for MessageType {
    fn from(value: MediaType) -> Self {
        match value {
            MediaType::Image => MessageType::Image,
            MediaType::Video => MessageType::Video,
            MediaType::Audio => MessageType::Audio,
            MediaType::Voice => MessageType::Voice,
            MediaType::Document => MessageType::Document,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceType {
    Composing,
    Recording,
    Paused,
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceInput {
    pub name: String,
    pub phone_number: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResult {
    pub instance_id: String,
    /// Backend-specific credential, opaque to the orchestrator.
    pub token: String,
    pub status: InstanceStatus,
    pub qr_code: Option<String>,
    pub pairing_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResult {
    pub qr_code: String,
    pub pairing_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCodeResult {
    pub pairing_code: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextInput {
    pub to: String,
    pub text: String,
    pub quoted_message_id: Option<String>,
    /// Seconds to wait before dispatch.
    pub delay: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaInput {
    pub to: String,
    pub media_type: MediaType,
    /// URL or base64 payload.
    pub media_url: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub quoted_message_id: Option<String>,
    pub delay: Option<u64>,
}

impl SendMediaInput {
    pub fn new(to: impl Into<String>, media_type: MediaType, media_url: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            media_type,
            media_url: Some(media_url.into()),
            caption: None,
            file_name: None,
            mime_type: None,
            quoted_message_id: None,
            delay: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendImageInput {
    pub to: String,
    pub image_url: String,
    pub caption: Option<String>,
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVideoInput {
    pub to: String,
    pub video_url: String,
    pub caption: Option<String>,
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAudioInput {
    pub to: String,
    pub audio_url: String,
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDocumentInput {
    pub to: String,
    pub document_url: String,
    pub file_name: String,
    pub caption: Option<String>,
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLocationInput {
    pub to: String,
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactCard {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendContactInput {
    pub to: String,
    pub contact: ContactCard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendInteractiveListInput {
    pub to: String,
    pub title: String,
    pub description: String,
    pub button_text: String,
    pub sections: Vec<ListSection>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderKind {
    Text,
    Image,
    Video,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveHeader {
    #[serde(rename = "type")]
    pub kind: HeaderKind,
    pub text: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendInteractiveButtonsInput {
    pub to: String,
    pub text: String,
    pub buttons: Vec<ReplyButton>,
    pub footer: Option<String>,
    pub header: Option<InteractiveHeader>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTemplateInput {
    pub to: String,
    pub template_name: String,
    pub language_code: String,
    #[serde(default)]
    pub components: Vec<Value>,
}

/// Acknowledgement of an accepted outbound message. Delivery and read
/// receipts arrive later as `message.updated` webhooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResult {
    pub message_id: String,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl MessageResult {
    pub fn sent(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: DeliveryStatus::Sent,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDownloadResult {
    /// Base64 encoded file body.
    pub data: String,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub unread_count: u32,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
    pub phone: String,
    pub profile_pic_url: Option<String>,
    pub is_business: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFilters {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "message.received")]
    MessageReceived,
    #[serde(rename = "message.sent")]
    MessageSent,
    #[serde(rename = "message.updated")]
    MessageUpdated,
    #[serde(rename = "instance.connected")]
    InstanceConnected,
    #[serde(rename = "instance.qr")]
    InstanceQr,
    #[serde(rename = "chat.created")]
    ChatCreated,
    #[serde(rename = "contact.updated")]
    ContactUpdated,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::MessageReceived => "message.received",
            WebhookEvent::MessageSent => "message.sent",
            WebhookEvent::MessageUpdated => "message.updated",
            WebhookEvent::InstanceConnected => "instance.connected",
            WebhookEvent::InstanceQr => "instance.qr",
            WebhookEvent::ChatCreated => "chat.created",
            WebhookEvent::ContactUpdated => "contact.updated",
        }
    }
}

impl fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Empty until the media has been downloaded for backends that only
    /// deliver a media id.
    pub media_url: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub media: Option<MediaMessage>,
    pub timestamp: DateTime<Utc>,
    pub from_me: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub location_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRef {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedRef {
    pub id: String,
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub chat_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub message: WebhookMessage,
    pub contact: Option<ContactRef>,
    pub quoted: Option<QuotedRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub message_id: String,
    pub chat_id: Option<String>,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    pub status: Option<InstanceStatus>,
    pub qr_code: Option<String>,
    pub pairing_code: Option<String>,
}

/// Event payload, discriminated by what the backend reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookData {
    Empty,
    Message(MessageData),
    Status(StatusData),
    Connection(ConnectionData),
}

impl WebhookData {
    pub fn is_empty(&self) -> bool {
        matches!(self, WebhookData::Empty)
    }

    pub fn message(&self) -> Option<&WebhookMessage> {
        match self {
            WebhookData::Message(data) => Some(&data.message),
            _ => None,
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        match self {
            WebhookData::Message(data) => data.chat_id.as_deref(),
            WebhookData::Status(data) => data.chat_id.as_deref(),
            _ => None,
        }
    }

    pub fn delivery_status(&self) -> Option<DeliveryStatus> {
        match self {
            WebhookData::Status(data) => Some(data.status),
            _ => None,
        }
    }

    pub fn instance_status(&self) -> Option<InstanceStatus> {
        match self {
            WebhookData::Connection(data) => data.status,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedWebhook {
    pub event: WebhookEvent,
    pub instance_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: WebhookData,
    /// Kept for audit and debugging only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
}

impl NormalizedWebhook {
    /// Canonical event for payloads that carry nothing usable.
    pub fn empty(instance_id: impl Into<String>) -> Self {
        Self {
            event: WebhookEvent::MessageReceived,
            instance_id: instance_id.into(),
            timestamp: Utc::now(),
            data: WebhookData::Empty,
            raw_payload: None,
        }
    }
}
