use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn};

use super::client::{
    authorized, execute, message_envelope, CloudApiClient, CloudApiClientConfig, GraphMediaKind,
};
use super::types::{Location, MessageResponse};
use super::webhook::normalize_cloudapi_webhook;
use crate::credentials::{CloudApiCredentials, CredentialStore};
use crate::error::{ProviderError, ProviderResult};
use crate::providers::cache::ClientCache;
use crate::provider::WhatsAppProvider;
use crate::types::{
    Chat, ChatFilters, Contact, CreateInstanceInput, HeaderKind, InstanceResult, InstanceStatus,
    MediaDownloadResult, MediaType, MessageResult, NormalizedWebhook, PairingCodeResult,
    PresenceType, QrCodeResult, SendContactInput, SendInteractiveButtonsInput,
    SendInteractiveListInput, SendLocationInput, SendMediaInput, SendTemplateInput, SendTextInput,
    WebhookConfig,
};

const PROVIDER: &str = "WhatsApp Cloud API";

/// Adapter for Meta's official Cloud API. Numbers are provisioned in the
/// Meta Business Dashboard, so there is no session lifecycle: an instance is
/// healthy while its access token validates.
pub struct CloudApiAdapter {
    http: Client,
    config: CloudApiClientConfig,
    credentials: Arc<dyn CredentialStore>,
    clients: ClientCache<CloudApiClient>,
}

fn message_result(response: &MessageResponse, fallback_prefix: &str) -> MessageResult {
    match response.message_id() {
        Some(id) => MessageResult::sent(id),
        None => MessageResult::sent(format!(
            "{fallback_prefix}_{}",
            chrono::Utc::now().timestamp_millis()
        )),
    }
}

fn require_message_id(response: &MessageResponse) -> ProviderResult<MessageResult> {
    response
        .message_id()
        .map(MessageResult::sent)
        .ok_or_else(|| ProviderError::Decode("send response has no message id".into()))
}

fn graph_media_kind(media_type: MediaType) -> GraphMediaKind {
    match media_type {
        MediaType::Image => GraphMediaKind::Image,
        MediaType::Video => GraphMediaKind::Video,
        // voice notes are plain audio on the Graph API
        MediaType::Audio | MediaType::Voice => GraphMediaKind::Audio,
        MediaType::Document => GraphMediaKind::Document,
    }
}

fn list_interactive(input: &SendInteractiveListInput) -> Value {
    let mut interactive = json!({
        "type": "list",
        "body": { "text": input.description },
        "action": {
            "button": input.button_text,
            "sections": input.sections.iter().map(|section| json!({
                "title": section.title,
                "rows": section.rows.iter().map(|row| {
                    let mut value = json!({ "id": row.id, "title": row.title });
                    if let Some(description) = &row.description {
                        value["description"] = json!(description);
                    }
                    value
                }).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        },
    });
    if !input.title.is_empty() {
        interactive["header"] = json!({ "type": "text", "text": input.title });
    }
    if let Some(footer) = &input.footer {
        interactive["footer"] = json!({ "text": footer });
    }
    interactive
}

fn buttons_interactive(input: &SendInteractiveButtonsInput) -> Value {
    let mut interactive = json!({
        "type": "button",
        "body": { "text": input.text },
        "action": {
            "buttons": input.buttons.iter().map(|button| json!({
                "type": "reply",
                "reply": { "id": button.id, "title": button.text },
            })).collect::<Vec<_>>(),
        },
    });
    if let Some(header) = &input.header {
        let media = json!({ "link": header.media_url.clone().unwrap_or_default() });
        interactive["header"] = match header.kind {
            HeaderKind::Text => json!({ "type": "text", "text": header.text.clone().unwrap_or_default() }),
            HeaderKind::Image => json!({ "type": "image", "image": media }),
            HeaderKind::Video => json!({ "type": "video", "video": media }),
            HeaderKind::Document => json!({ "type": "document", "document": media }),
        };
    }
    if let Some(footer) = &input.footer {
        interactive["footer"] = json!({ "text": footer });
    }
    interactive
}

fn dashboard_only(operation: &'static str, remediation: &str) -> ProviderError {
    ProviderError::unsupported(PROVIDER, operation, remediation)
}

impl CloudApiAdapter {
    pub fn new(config: CloudApiClientConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            http: Client::new(),
            config,
            credentials,
            clients: ClientCache::new(),
        }
    }

    /// Drops every cached client so the next call re-reads credentials.
    pub fn clear_cache(&self) {
        self.clients.clear();
        info!("cloud api client cache cleared");
    }

    pub fn clear_instance_cache(&self, instance_id: &str) {
        if self.clients.invalidate(instance_id) {
            info!(instance_id, "cloud api client invalidated");
        }
    }

    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    async fn client_for(&self, instance_id: &str) -> ProviderResult<Arc<CloudApiClient>> {
        if let Some(client) = self.clients.get(instance_id) {
            return Ok(client);
        }
        let stored = self
            .credentials
            .cloudapi_credentials(instance_id)
            .await?
            .ok_or_else(|| ProviderError::credentials_missing(instance_id, "instance not found"))?;
        let missing = |field: &str| {
            ProviderError::credentials_missing(instance_id, format!("missing Cloud API {field}"))
        };
        let credentials = CloudApiCredentials {
            access_token: stored.access_token.filter(|v| !v.is_empty()).ok_or_else(|| missing("access token"))?,
            phone_number_id: stored
                .phone_number_id
                .filter(|v| !v.is_empty())
                .ok_or_else(|| missing("phone number id"))?,
            waba_id: stored.waba_id.filter(|v| !v.is_empty()).ok_or_else(|| missing("WABA id"))?,
        };
        let client = CloudApiClient::new(self.http.clone(), &self.config, credentials);
        Ok(self.clients.insert(instance_id, client))
    }

    /// Checks the instance token without raising; missing credentials read
    /// as unhealthy.
    pub async fn health_check_instance(&self, instance_id: &str) -> bool {
        match self.client_for(instance_id).await {
            Ok(client) => client.health_check().await,
            Err(err) => {
                warn!(instance_id, error = %err, "cloud api instance health check failed");
                false
            }
        }
    }

    /// Interactive payloads go out on a raw request authorized by the token
    /// registered for the client's phone number id.
    async fn send_interactive(
        &self,
        instance_id: &str,
        to: &str,
        interactive: Value,
    ) -> ProviderResult<MessageResponse> {
        let client = self.client_for(instance_id).await?;
        let phone_number_id = client.phone_number_id();
        let token = self
            .credentials
            .cloudapi_token_by_phone_number_id(phone_number_id)
            .await?
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProviderError::credentials_missing(
                    instance_id,
                    format!("no access token registered for phone number id {phone_number_id}"),
                )
            })?;
        let url = format!("{}/{}/messages", client.base_url(), phone_number_id);
        let payload = message_envelope(to, "interactive", interactive);
        let builder =
            authorized(&self.http, Method::POST, &url, &token, self.config.timeout).json(&payload);
        execute(builder, &url, self.config.timeout).await
    }
}

#[async_trait]
impl WhatsAppProvider for CloudApiAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    async fn create_instance(&self, _input: CreateInstanceInput) -> ProviderResult<InstanceResult> {
        Err(dashboard_only(
            "dynamic instance creation",
            "Configure your WhatsApp Business Account in the Meta Business Dashboard.",
        ))
    }

    /// Local only: the number stays provisioned on Meta's side.
    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.clear_instance_cache(instance_id);
        info!(instance_id, "cloud api instance released locally");
        Ok(())
    }

    async fn get_instance_status(&self, instance_id: &str) -> ProviderResult<InstanceStatus> {
        let client = self.client_for(instance_id).await?;
        match client.get_phone_info().await {
            Ok(_) => Ok(InstanceStatus::Connected),
            Err(err) => {
                warn!(instance_id, error = %err, "cloud api status check failed");
                Ok(InstanceStatus::Error)
            }
        }
    }

    async fn generate_qr_code(&self, _instance_id: &str) -> ProviderResult<QrCodeResult> {
        Err(dashboard_only(
            "QR code connection",
            "Connection uses the access token issued in the Meta Business Dashboard.",
        ))
    }

    async fn get_pairing_code(&self, _instance_id: &str) -> ProviderResult<PairingCodeResult> {
        Err(dashboard_only(
            "pairing codes",
            "Connection uses the access token issued in the Meta Business Dashboard.",
        ))
    }

    /// The token stays valid until revoked in the dashboard; only the cached
    /// client is dropped.
    async fn disconnect(&self, instance_id: &str) -> ProviderResult<()> {
        self.clear_instance_cache(instance_id);
        Ok(())
    }

    async fn restart(&self, instance_id: &str) -> ProviderResult<()> {
        self.clear_instance_cache(instance_id);
        let client = self.client_for(instance_id).await?;
        if !client.health_check().await {
            return Err(ProviderError::CredentialsInvalid {
                instance_id: instance_id.to_string(),
                reason: "Cloud API token is invalid or expired. Update the access token.".into(),
            });
        }
        info!(instance_id, "cloud api token revalidated");
        Ok(())
    }

    async fn send_text(
        &self,
        instance_id: &str,
        input: SendTextInput,
    ) -> ProviderResult<MessageResult> {
        let client = self.client_for(instance_id).await?;
        if let Some(secs) = input.delay.filter(|s| *s > 0) {
            sleep(Duration::from_secs(secs)).await;
        }
        let response = client.send_text(&input.to, &input.text, false).await?;
        require_message_id(&response)
    }

    async fn send_media(
        &self,
        instance_id: &str,
        input: SendMediaInput,
    ) -> ProviderResult<MessageResult> {
        let link = input
            .media_url
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidInput("media_url is required".into()))?;
        let client = self.client_for(instance_id).await?;
        if let Some(secs) = input.delay.filter(|s| *s > 0) {
            sleep(Duration::from_secs(secs)).await;
        }
        let kind = graph_media_kind(input.media_type);
        let filename = match kind {
            GraphMediaKind::Document => Some(input.file_name.as_deref().unwrap_or("document")),
            _ => None,
        };
        let response = client
            .send_media_link(&input.to, kind, link, input.caption.as_deref(), filename)
            .await?;
        require_message_id(&response)
    }

    async fn send_location(
        &self,
        instance_id: &str,
        input: SendLocationInput,
    ) -> ProviderResult<MessageResult> {
        let client = self.client_for(instance_id).await?;
        let location = Location {
            latitude: input.latitude,
            longitude: input.longitude,
            name: input.name,
            address: input.address,
        };
        let response = client.send_location(&input.to, &location).await?;
        require_message_id(&response)
    }

    async fn send_contact(
        &self,
        instance_id: &str,
        input: SendContactInput,
    ) -> ProviderResult<MessageResult> {
        let client = self.client_for(instance_id).await?;
        let response = client.send_contact(&input.to, &input.contact).await?;
        Ok(message_result(&response, "contact"))
    }

    async fn send_interactive_list(
        &self,
        instance_id: &str,
        input: SendInteractiveListInput,
    ) -> ProviderResult<MessageResult> {
        let response = self
            .send_interactive(instance_id, &input.to, list_interactive(&input))
            .await?;
        Ok(message_result(&response, "list"))
    }

    async fn send_interactive_buttons(
        &self,
        instance_id: &str,
        input: SendInteractiveButtonsInput,
    ) -> ProviderResult<MessageResult> {
        let response = self
            .send_interactive(instance_id, &input.to, buttons_interactive(&input))
            .await?;
        Ok(message_result(&response, "btn"))
    }

    async fn send_template(
        &self,
        instance_id: &str,
        input: SendTemplateInput,
    ) -> ProviderResult<MessageResult> {
        let client = self.client_for(instance_id).await?;
        let response = client
            .send_template(
                &input.to,
                &input.template_name,
                &input.language_code,
                &input.components,
            )
            .await?;
        require_message_id(&response)
    }

    async fn mark_as_read(&self, instance_id: &str, message_id: &str) -> ProviderResult<()> {
        let client = self.client_for(instance_id).await?;
        client.mark_as_read(message_id).await
    }

    async fn react_to_message(
        &self,
        instance_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> ProviderResult<()> {
        let client = self.client_for(instance_id).await?;
        client.react_to_message(message_id, emoji).await?;
        Ok(())
    }

    async fn delete_message(&self, _instance_id: &str, _message_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported(
            PROVIDER,
            "message deletion",
            "Sent messages remain visible to the recipient.",
        ))
    }

    async fn send_presence(
        &self,
        _instance_id: &str,
        _to: &str,
        _presence: PresenceType,
    ) -> ProviderResult<()> {
        Err(ProviderError::unsupported(
            PROVIDER,
            "presence updates",
            "Typing indicators are handled by the platform.",
        ))
    }

    async fn download_media(
        &self,
        instance_id: &str,
        media_id: &str,
    ) -> ProviderResult<MediaDownloadResult> {
        let client = self.client_for(instance_id).await?;
        let info = client.get_media_url(media_id).await?;
        if info.url.is_empty() {
            return Err(ProviderError::Decode(format!("media {media_id} has no download url")));
        }
        let body = client.download_media(&info.url).await?;
        Ok(MediaDownloadResult {
            data: base64::engine::general_purpose::STANDARD.encode(&body),
            mime_type: info
                .mime_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            file_name: info.file_name,
            size: body.len(),
        })
    }

    /// Conversations live in local storage, fed by webhooks.
    async fn get_chats(&self, _instance_id: &str, _filters: ChatFilters) -> ProviderResult<Vec<Chat>> {
        Ok(Vec::new())
    }

    async fn get_contacts(&self, _instance_id: &str) -> ProviderResult<Vec<Contact>> {
        Ok(Vec::new())
    }

    async fn configure_webhook(&self, _instance_id: &str, _config: WebhookConfig) -> ProviderResult<()> {
        Err(dashboard_only(
            "webhook configuration",
            "Set the callback URL in the Meta Business Dashboard under WhatsApp > Configuration.",
        ))
    }

    fn normalize_webhook(&self, raw: &Value) -> NormalizedWebhook {
        normalize_cloudapi_webhook(raw)
    }

    async fn get_profile_picture(
        &self,
        _instance_id: &str,
        _number: &str,
    ) -> ProviderResult<Option<String>> {
        Ok(None)
    }

    async fn update_profile_picture(&self, _instance_id: &str, _image_url: &str) -> ProviderResult<()> {
        Err(dashboard_only(
            "profile picture updates",
            "Change the business profile photo in the Meta Business Dashboard.",
        ))
    }

    /// Health is per instance; see [`CloudApiAdapter::health_check_instance`].
    async fn health_check(&self) -> ProviderResult<bool> {
        Ok(true)
    }
}
