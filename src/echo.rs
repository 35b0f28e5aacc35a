//! Invisible marker prepended to bot-sent text so the copy that comes back
//! through the backend's webhook can be recognised and dropped.

use crate::types::{NormalizedWebhook, WebhookData, WebhookEvent};

/// Zero-width space, non-joiner and joiner.
pub const BOT_SIGNATURE: &str = "\u{200B}\u{200C}\u{200D}";

pub fn is_bot_echo(content: &str) -> bool {
    content.starts_with(BOT_SIGNATURE)
}

pub fn add_bot_signature(content: &str) -> String {
    if is_bot_echo(content) {
        return content.to_string();
    }
    format!("{BOT_SIGNATURE}{content}")
}

pub fn strip_bot_signature(content: &str) -> &str {
    content.strip_prefix(BOT_SIGNATURE).unwrap_or(content)
}

/// True when an inbound message event carries our own signature.
pub fn is_echo_event(hook: &NormalizedWebhook) -> bool {
    if !matches!(
        hook.event,
        WebhookEvent::MessageReceived | WebhookEvent::MessageSent
    ) {
        return false;
    }
    match &hook.data {
        WebhookData::Message(data) => is_bot_echo(&data.message.content),
        _ => false,
    }
}
