//! Graph API wire shapes. Inbound structs default every field so partial
//! payloads still decode.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Unix seconds arrive as a string from Meta, as a number from some relays.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected a string or number timestamp, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    pub object: String,
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookEntry {
    pub id: String,
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookChange {
    pub field: String,
    pub value: Option<WebhookValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookValue {
    pub messaging_product: String,
    pub metadata: Metadata,
    pub contacts: Vec<ContactProfile>,
    pub messages: Vec<IncomingMessage>,
    pub statuses: Vec<MessageStatus>,
    pub errors: Vec<GraphError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactProfile {
    pub profile: Profile,
    pub wa_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncomingMessage {
    pub id: String,
    pub from: String,
    /// Unix seconds.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextBody>,
    pub image: Option<MediaObject>,
    pub video: Option<MediaObject>,
    pub audio: Option<MediaObject>,
    pub voice: Option<MediaObject>,
    pub document: Option<MediaObject>,
    pub sticker: Option<MediaObject>,
    pub location: Option<Location>,
    pub contacts: Vec<SharedContact>,
    pub button: Option<ButtonReply>,
    pub interactive: Option<InteractiveReply>,
    pub context: Option<MessageContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaObject {
    pub id: String,
    pub mime_type: Option<String>,
    pub sha256: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SharedContact {
    pub name: SharedContactName,
    pub phones: Vec<SharedContactPhone>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SharedContactName {
    pub formatted_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SharedContactPhone {
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub wa_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ButtonReply {
    pub text: String,
    pub payload: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InteractiveReply {
    #[serde(rename = "type")]
    pub kind: String,
    pub button_reply: Option<ReplySelection>,
    pub list_reply: Option<ReplySelection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplySelection {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageContext {
    pub from: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageStatus {
    pub id: String,
    pub status: String,
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    pub recipient_id: String,
    pub errors: Vec<GraphError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphError {
    pub code: i64,
    pub title: String,
    pub message: Option<String>,
}

impl GraphError {
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) if !message.is_empty() => format!("{} ({}): {}", self.title, self.code, message),
            _ => format!("{} ({})", self.title, self.code),
        }
    }
}

/// `{"error": {...}}` body of a failed Graph call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphErrorResponse {
    pub error: Option<GraphErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<i64>,
    pub fbtrace_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageResponse {
    pub messaging_product: String,
    pub contacts: Vec<ResponseContact>,
    pub messages: Vec<ResponseMessage>,
}

impl MessageResponse {
    pub fn message_id(&self) -> Option<&str> {
        self.messages
            .first()
            .map(|m| m.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseContact {
    pub input: String,
    pub wa_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseMessage {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneInfo {
    pub id: String,
    pub verified_name: String,
    pub display_phone_number: String,
    pub quality_rating: Option<String>,
    pub code_verification_status: Option<String>,
    pub platform_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaUrlResponse {
    pub url: String,
    pub mime_type: Option<String>,
    pub sha256: Option<String>,
    pub file_size: Option<u64>,
    pub file_name: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaUploadResponse {
    pub id: String,
}
