use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::client::{
    envelope, ButtonPayload, ButtonsPayload, ContactCardPayload, ContactPayload, ListPayload,
    ListRowPayload, ListSectionPayload, LocationPayload, MediaPayload, UazapiClient,
};
use super::webhook::{map_instance_status, normalize_uazapi_webhook};
use crate::credentials::{CredentialStore, UazapiCredentials};
use crate::error::{ProviderError, ProviderResult};
use crate::phone::{jid_user, strip_non_digits};
use crate::provider::WhatsAppProvider;
use crate::types::{
    Chat, ChatFilters, Contact, CreateInstanceInput, InstanceResult, InstanceStatus, LastMessage,
    MediaType, MessageResult, NormalizedWebhook, PairingCodeResult, PresenceType, QrCodeResult,
    SendContactInput, SendInteractiveButtonsInput, SendInteractiveListInput, SendLocationInput,
    SendMediaInput, SendTextInput, WebhookConfig,
};

pub struct UazapiAdapter {
    client: UazapiClient,
    credentials: Arc<dyn CredentialStore>,
}

impl UazapiAdapter {
    pub fn new(client: UazapiClient, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Admin surface (instance listing, global webhook).
    pub fn client(&self) -> &UazapiClient {
        &self.client
    }

    async fn credentials_for(&self, instance_id: &str) -> ProviderResult<UazapiCredentials> {
        self.credentials
            .uazapi_credentials(instance_id)
            .await?
            .ok_or_else(|| {
                ProviderError::credentials_missing(instance_id, "instance not found or has no UAZapi token")
            })
    }

    async fn token_for(&self, instance_id: &str) -> ProviderResult<String> {
        Ok(self.credentials_for(instance_id).await?.token)
    }
}

fn wire_media_type(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Image => "image",
        MediaType::Video => "video",
        MediaType::Audio => "audio",
        MediaType::Voice => "myaudio",
        MediaType::Document => "document",
    }
}

fn wire_presence(presence: PresenceType) -> &'static str {
    match presence {
        PresenceType::Composing => "composing",
        PresenceType::Recording => "recording",
        PresenceType::Paused => "paused",
        PresenceType::Available => "available",
        PresenceType::Unavailable => "unavailable",
    }
}

fn vcard(name: &str, phone: &str) -> String {
    format!("BEGIN:VCARD\nVERSION:3.0\nFN:{name}\nTEL;TYPE=CELL:{phone}\nEND:VCARD")
}

/// Looks up `key` on the payload, then on its nested `instance` object.
fn instance_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("instance")
                .and_then(|instance| instance.get(key))
                .and_then(Value::as_str)
        })
        .filter(|s| !s.is_empty())
}

fn first_field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| instance_field(payload, key))
}

/// `status` is a string on older brokers and `{connected, loggedIn}` on newer
/// ones.
fn status_of(payload: &Value) -> InstanceStatus {
    if let Some(status) = instance_field(payload, "status") {
        return map_instance_status(status);
    }
    match payload
        .get("status")
        .and_then(|s| s.get("connected"))
        .and_then(Value::as_bool)
    {
        Some(true) => InstanceStatus::Connected,
        _ => InstanceStatus::Disconnected,
    }
}

fn message_result(value: &Value) -> MessageResult {
    let payload = envelope(value);
    let id = first_field(payload, &["messageid", "messageId", "id"])
        .map(str::to_string)
        .or_else(|| {
            payload
                .get("key")
                .and_then(|key| key.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
    match id {
        Some(id) => MessageResult::sent(id),
        None => {
            warn!("uazapi send response carried no message id");
            MessageResult::sent(uuid::Uuid::new_v4().to_string())
        }
    }
}

fn list_of(value: &Value, key: &str) -> Vec<Value> {
    let payload = envelope(value);
    payload
        .as_array()
        .or_else(|| payload.get(key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

fn parse_chat(raw: &Value) -> Option<Chat> {
    let id = first_field(raw, &["id", "wa_chatid"])?.to_string();
    let name = first_field(raw, &["name", "wa_name", "wa_contactName"])
        .unwrap_or_default()
        .to_string();
    let last_message = raw
        .get("wa_lastMessage")
        .filter(|m| m.is_object())
        .map(|m| LastMessage {
            content: m
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp: m
                .get("timestamp")
                .and_then(Value::as_i64)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or_else(Utc::now),
        });
    Some(Chat {
        id,
        name,
        is_group: raw.get("wa_isGroup").and_then(Value::as_bool).unwrap_or(false),
        unread_count: raw
            .get("wa_unreadCount")
            .and_then(Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0),
        last_message,
    })
}

fn parse_contact(raw: &Value) -> Option<Contact> {
    let id = raw.get("id").and_then(Value::as_str)?.to_string();
    Some(Contact {
        phone: jid_user(&id).to_string(),
        name: first_field(raw, &["name", "pushname"]).map(str::to_string),
        profile_pic_url: first_field(raw, &["profilePicUrl"]).map(str::to_string),
        is_business: raw.get("isBusiness").and_then(Value::as_bool),
        id,
    })
}

#[async_trait]
impl WhatsAppProvider for UazapiAdapter {
    fn name(&self) -> &'static str {
        "UAZapi"
    }

    fn version(&self) -> &'static str {
        "2.0"
    }

    async fn create_instance(&self, input: CreateInstanceInput) -> ProviderResult<InstanceResult> {
        let value = self
            .client
            .create_instance(&input.name, input.webhook_url.as_deref(), &input.webhook_events)
            .await?;
        let payload = envelope(&value);
        let instance_id = first_field(payload, &["instanceId", "id"])
            .ok_or_else(|| ProviderError::Decode("create instance response has no id".into()))?;
        let token = first_field(payload, &["token"])
            .ok_or_else(|| ProviderError::Decode("create instance response has no token".into()))?;
        info!(instance_id, name = %input.name, "uazapi instance created");
        Ok(InstanceResult {
            instance_id: instance_id.to_string(),
            token: token.to_string(),
            status: status_of(payload),
            qr_code: first_field(payload, &["qrcode"]).map(str::to_string),
            pairing_code: first_field(payload, &["paircode"]).map(str::to_string),
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.delete_instance(&token).await?;
        info!(instance_id, "uazapi instance deleted");
        Ok(())
    }

    async fn get_instance_status(&self, instance_id: &str) -> ProviderResult<InstanceStatus> {
        let token = self.token_for(instance_id).await?;
        let value = self.client.instance_status(&token).await?;
        Ok(status_of(envelope(&value)))
    }

    async fn generate_qr_code(&self, instance_id: &str) -> ProviderResult<QrCodeResult> {
        let token = self.token_for(instance_id).await?;
        let value = self.client.connect(&token, None).await?;
        let payload = envelope(&value);
        let qr_code = first_field(payload, &["qrcode", "qr"]).ok_or_else(|| {
            ProviderError::Decode("connect response has no QR code; the instance may already be connected".into())
        })?;
        Ok(QrCodeResult {
            qr_code: qr_code.to_string(),
            pairing_code: first_field(payload, &["paircode"]).map(str::to_string),
            expires_at: None,
        })
    }

    async fn get_pairing_code(&self, instance_id: &str) -> ProviderResult<PairingCodeResult> {
        let creds = self.credentials_for(instance_id).await?;
        let phone = creds
            .phone_number
            .as_deref()
            .map(strip_non_digits)
            .filter(|digits| !digits.is_empty())
            .ok_or_else(|| {
                ProviderError::credentials_missing(instance_id, "a phone number is required for pairing")
            })?;
        let value = self.client.connect(&creds.token, Some(&phone)).await?;
        let pairing_code = first_field(envelope(&value), &["paircode", "code"])
            .ok_or_else(|| ProviderError::Decode("connect response has no pairing code".into()))?;
        Ok(PairingCodeResult {
            pairing_code: pairing_code.to_string(),
            expires_at: None,
        })
    }

    async fn disconnect(&self, instance_id: &str) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.disconnect(&token).await?;
        info!(instance_id, "uazapi instance disconnected");
        Ok(())
    }

    async fn restart(&self, instance_id: &str) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.restart(&token).await?;
        info!(instance_id, "uazapi instance restarted");
        Ok(())
    }

    async fn send_text(
        &self,
        instance_id: &str,
        input: SendTextInput,
    ) -> ProviderResult<MessageResult> {
        let token = self.token_for(instance_id).await?;
        let value = self
            .client
            .send_text(
                &token,
                &input.to,
                &input.text,
                input.quoted_message_id.as_deref(),
                input.delay.map(|secs| secs * 1000),
            )
            .await?;
        Ok(message_result(&value))
    }

    async fn send_media(
        &self,
        instance_id: &str,
        input: SendMediaInput,
    ) -> ProviderResult<MessageResult> {
        let media = input
            .media_url
            .ok_or_else(|| ProviderError::InvalidInput("media_url is required".into()))?;
        let token = self.token_for(instance_id).await?;
        let payload = MediaPayload {
            number: input.to,
            mediatype: wire_media_type(input.media_type),
            media,
            caption: input.caption,
            filename: input.file_name,
            mimetype: input.mime_type,
            replyid: input.quoted_message_id,
            delay: input.delay.map(|secs| secs * 1000),
        };
        let value = self.client.send_media(&token, &payload).await?;
        Ok(message_result(&value))
    }

    async fn send_location(
        &self,
        instance_id: &str,
        input: SendLocationInput,
    ) -> ProviderResult<MessageResult> {
        let token = self.token_for(instance_id).await?;
        let payload = LocationPayload {
            number: input.to,
            latitude: input.latitude,
            longitude: input.longitude,
            name: input.name,
            address: input.address,
        };
        let value = self.client.send_location(&token, &payload).await?;
        Ok(message_result(&value))
    }

    async fn send_contact(
        &self,
        instance_id: &str,
        input: SendContactInput,
    ) -> ProviderResult<MessageResult> {
        let token = self.token_for(instance_id).await?;
        let card = input.contact;
        let payload = ContactPayload {
            number: input.to,
            contact: ContactCardPayload {
                vcard: vcard(&card.name, &card.phone),
                display_name: card.name,
            },
        };
        let value = self.client.send_contact(&token, &payload).await?;
        Ok(message_result(&value))
    }

    async fn send_interactive_list(
        &self,
        instance_id: &str,
        input: SendInteractiveListInput,
    ) -> ProviderResult<MessageResult> {
        if input.sections.is_empty() {
            return Err(ProviderError::InvalidInput("a list needs at least one section".into()));
        }
        let token = self.token_for(instance_id).await?;
        let payload = ListPayload {
            number: input.to,
            title: input.title,
            description: Some(input.description).filter(|d| !d.is_empty()),
            button_text: input.button_text,
            footer_text: input.footer,
            sections: input
                .sections
                .into_iter()
                .map(|section| ListSectionPayload {
                    title: section.title,
                    rows: section
                        .rows
                        .into_iter()
                        .map(|row| ListRowPayload {
                            id: row.id,
                            title: row.title,
                            description: row.description,
                        })
                        .collect(),
                })
                .collect(),
        };
        let value = self.client.send_list(&token, &payload).await?;
        Ok(message_result(&value))
    }

    /// Headers have no UAZapi equivalent and are dropped.
    async fn send_interactive_buttons(
        &self,
        instance_id: &str,
        input: SendInteractiveButtonsInput,
    ) -> ProviderResult<MessageResult> {
        if input.buttons.is_empty() {
            return Err(ProviderError::InvalidInput("at least one button is required".into()));
        }
        let token = self.token_for(instance_id).await?;
        let payload = ButtonsPayload {
            number: input.to,
            text: input.text,
            buttons: input
                .buttons
                .into_iter()
                .map(|button| ButtonPayload {
                    id: button.id,
                    text: button.text,
                })
                .collect(),
            footer_text: input.footer,
        };
        let value = self.client.send_buttons(&token, &payload).await?;
        Ok(message_result(&value))
    }

    async fn mark_as_read(&self, instance_id: &str, message_id: &str) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.mark_read(&token, message_id).await?;
        Ok(())
    }

    async fn react_to_message(
        &self,
        instance_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.react(&token, message_id, emoji).await?;
        Ok(())
    }

    async fn delete_message(&self, instance_id: &str, message_id: &str) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.delete_message(&token, message_id).await?;
        info!(instance_id, message_id, "uazapi message deleted");
        Ok(())
    }

    async fn send_presence(
        &self,
        instance_id: &str,
        to: &str,
        presence: PresenceType,
    ) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client
            .send_presence(&token, to, wire_presence(presence))
            .await?;
        Ok(())
    }

    async fn get_chats(&self, instance_id: &str, filters: ChatFilters) -> ProviderResult<Vec<Chat>> {
        let token = self.token_for(instance_id).await?;
        let value = self.client.chats(&token).await?;
        let mut chats: Vec<Chat> = list_of(&value, "chats").iter().filter_map(parse_chat).collect();
        if filters.unread_only {
            chats.retain(|chat| chat.unread_count > 0);
        }
        if let Some(limit) = filters.limit {
            chats.truncate(limit);
        }
        Ok(chats)
    }

    async fn get_contacts(&self, instance_id: &str) -> ProviderResult<Vec<Contact>> {
        let token = self.token_for(instance_id).await?;
        let value = self.client.contacts(&token).await?;
        Ok(list_of(&value, "contacts")
            .iter()
            .filter_map(parse_contact)
            .collect())
    }

    async fn configure_webhook(&self, instance_id: &str, config: WebhookConfig) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client
            .set_webhook(&token, &config.url, &config.events, config.enabled)
            .await?;
        info!(instance_id, url = %config.url, "uazapi webhook configured");
        Ok(())
    }

    fn normalize_webhook(&self, raw: &Value) -> NormalizedWebhook {
        normalize_uazapi_webhook(raw)
    }

    async fn get_profile_picture(
        &self,
        instance_id: &str,
        number: &str,
    ) -> ProviderResult<Option<String>> {
        let token = self.token_for(instance_id).await?;
        match self.client.profile_image(&token, number).await {
            Ok(value) => Ok(first_field(envelope(&value), &["profilePicUrl", "url", "image"])
                .map(str::to_string)),
            Err(err) => {
                warn!(instance_id, error = %err, "uazapi profile picture lookup failed");
                Ok(None)
            }
        }
    }

    async fn update_profile_picture(&self, instance_id: &str, image_url: &str) -> ProviderResult<()> {
        let token = self.token_for(instance_id).await?;
        self.client.update_profile_image(&token, image_url).await?;
        Ok(())
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        self.client.ping().await?;
        Ok(true)
    }
}
