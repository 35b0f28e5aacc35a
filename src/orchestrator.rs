use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::echo::add_bot_signature;
use crate::error::{ProviderError, ProviderResult};
use crate::phone::normalize_phone_number;
use crate::provider::WhatsAppProvider;
use crate::types::{
    BrokerType, Chat, ChatFilters, Contact, CreateInstanceInput, InstanceResult, InstanceStatus,
    MediaDownloadResult, MessageResult, NormalizedWebhook, PairingCodeResult, PresenceType,
    QrCodeResult, SendAudioInput, SendContactInput, SendDocumentInput, SendImageInput,
    SendInteractiveButtonsInput, SendInteractiveListInput, SendLocationInput, SendMediaInput,
    SendTemplateInput, SendTextInput, SendVideoInput, WebhookConfig,
};

/// Routes every operation to the adapter registered for a broker type.
///
/// Destination numbers are validated here, once, before any adapter sees
/// them, and send pacing (`delay`) is applied here so adapters never sleep a
/// second time.
#[derive(Default)]
pub struct Orchestrator {
    providers: DashMap<BrokerType, Arc<dyn WhatsAppProvider>>,
    bot_signature: bool,
}

/// Sleeps for the requested pacing and hands back `None` for the adapter.
async fn pace(delay: Option<u64>) -> Option<u64> {
    if let Some(secs) = delay.filter(|s| *s > 0) {
        debug!(delay_secs = secs, "pacing send");
        sleep(Duration::from_secs(secs)).await;
    }
    None
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix outbound text with the invisible bot marker so webhook echoes
    /// of our own sends can be dropped at ingress.
    pub fn with_bot_signature(mut self, enabled: bool) -> Self {
        self.bot_signature = enabled;
        self
    }

    /// Upsert; registering a broker twice replaces the earlier adapter.
    pub fn register_provider(&self, broker: BrokerType, provider: Arc<dyn WhatsAppProvider>) {
        info!(
            broker = %broker,
            provider = provider.name(),
            version = provider.version(),
            "provider registered"
        );
        self.providers.insert(broker, provider);
    }

    pub fn available_providers(&self) -> Vec<BrokerType> {
        let mut brokers: Vec<BrokerType> = self.providers.iter().map(|entry| *entry.key()).collect();
        brokers.sort();
        brokers
    }

    pub fn provider(&self, broker: BrokerType) -> ProviderResult<Arc<dyn WhatsAppProvider>> {
        self.providers
            .get(&broker)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ProviderError::ProviderUnavailable {
                requested: broker,
                available: self.available_providers(),
            })
    }

    pub async fn create_instance(
        &self,
        broker: BrokerType,
        input: CreateInstanceInput,
    ) -> ProviderResult<InstanceResult> {
        let provider = self.provider(broker)?;
        info!(broker = %broker, name = %input.name, "creating instance");
        provider.create_instance(input).await
    }

    pub async fn delete_instance(&self, instance_id: &str, broker: BrokerType) -> ProviderResult<()> {
        let provider = self.provider(broker)?;
        info!(broker = %broker, instance_id, "deleting instance");
        provider.delete_instance(instance_id).await
    }

    pub async fn get_instance_status(
        &self,
        instance_id: &str,
        broker: BrokerType,
    ) -> ProviderResult<InstanceStatus> {
        self.provider(broker)?.get_instance_status(instance_id).await
    }

    pub async fn generate_qr_code(
        &self,
        instance_id: &str,
        broker: BrokerType,
    ) -> ProviderResult<QrCodeResult> {
        self.provider(broker)?.generate_qr_code(instance_id).await
    }

    pub async fn get_pairing_code(
        &self,
        instance_id: &str,
        broker: BrokerType,
    ) -> ProviderResult<PairingCodeResult> {
        self.provider(broker)?.get_pairing_code(instance_id).await
    }

    pub async fn disconnect(&self, instance_id: &str, broker: BrokerType) -> ProviderResult<()> {
        let provider = self.provider(broker)?;
        info!(broker = %broker, instance_id, "disconnecting instance");
        provider.disconnect(instance_id).await
    }

    pub async fn restart(&self, instance_id: &str, broker: BrokerType) -> ProviderResult<()> {
        let provider = self.provider(broker)?;
        info!(broker = %broker, instance_id, "restarting instance");
        provider.restart(instance_id).await
    }

    pub async fn send_text(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendTextInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        input.delay = pace(input.delay).await;
        if self.bot_signature {
            input.text = add_bot_signature(&input.text);
        }
        debug!(broker = %broker, instance_id, to = %input.to, "sending text");
        provider.send_text(instance_id, input).await
    }

    pub async fn send_media(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendMediaInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        input.delay = pace(input.delay).await;
        debug!(
            broker = %broker,
            instance_id,
            to = %input.to,
            media_type = input.media_type.as_str(),
            "sending media"
        );
        provider.send_media(instance_id, input).await
    }

    pub async fn send_image(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendImageInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_image(instance_id, input).await
    }

    pub async fn send_video(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendVideoInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_video(instance_id, input).await
    }

    pub async fn send_audio(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendAudioInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_audio(instance_id, input).await
    }

    pub async fn send_document(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendDocumentInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_document(instance_id, input).await
    }

    pub async fn send_location(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendLocationInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_location(instance_id, input).await
    }

    pub async fn send_contact(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendContactInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_contact(instance_id, input).await
    }

    pub async fn send_interactive_list(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendInteractiveListInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_interactive_list(instance_id, input).await
    }

    pub async fn send_interactive_buttons(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendInteractiveButtonsInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_interactive_buttons(instance_id, input).await
    }

    pub async fn send_template(
        &self,
        instance_id: &str,
        broker: BrokerType,
        mut input: SendTemplateInput,
    ) -> ProviderResult<MessageResult> {
        let provider = self.provider(broker)?;
        input.to = normalize_phone_number(&input.to)?;
        provider.send_template(instance_id, input).await
    }

    pub async fn mark_as_read(
        &self,
        instance_id: &str,
        broker: BrokerType,
        message_id: &str,
    ) -> ProviderResult<()> {
        self.provider(broker)?.mark_as_read(instance_id, message_id).await
    }

    pub async fn react_to_message(
        &self,
        instance_id: &str,
        broker: BrokerType,
        message_id: &str,
        emoji: &str,
    ) -> ProviderResult<()> {
        self.provider(broker)?
            .react_to_message(instance_id, message_id, emoji)
            .await
    }

    pub async fn delete_message(
        &self,
        instance_id: &str,
        broker: BrokerType,
        message_id: &str,
    ) -> ProviderResult<()> {
        self.provider(broker)?.delete_message(instance_id, message_id).await
    }

    pub async fn send_presence(
        &self,
        instance_id: &str,
        broker: BrokerType,
        to: &str,
        presence: PresenceType,
    ) -> ProviderResult<()> {
        let provider = self.provider(broker)?;
        let to = normalize_phone_number(to)?;
        provider.send_presence(instance_id, &to, presence).await
    }

    pub async fn download_media(
        &self,
        instance_id: &str,
        broker: BrokerType,
        media_id: &str,
    ) -> ProviderResult<MediaDownloadResult> {
        self.provider(broker)?.download_media(instance_id, media_id).await
    }

    pub async fn get_chats(
        &self,
        instance_id: &str,
        broker: BrokerType,
        filters: ChatFilters,
    ) -> ProviderResult<Vec<Chat>> {
        self.provider(broker)?.get_chats(instance_id, filters).await
    }

    pub async fn get_contacts(
        &self,
        instance_id: &str,
        broker: BrokerType,
    ) -> ProviderResult<Vec<Contact>> {
        self.provider(broker)?.get_contacts(instance_id).await
    }

    pub async fn configure_webhook(
        &self,
        instance_id: &str,
        broker: BrokerType,
        config: WebhookConfig,
    ) -> ProviderResult<()> {
        let provider = self.provider(broker)?;
        info!(broker = %broker, instance_id, url = %config.url, "configuring webhook");
        provider.configure_webhook(instance_id, config).await
    }

    /// Only an unregistered broker fails; payload problems degrade to the
    /// empty event inside the adapter.
    pub fn normalize_webhook(
        &self,
        broker: BrokerType,
        raw: &Value,
    ) -> ProviderResult<NormalizedWebhook> {
        Ok(self.provider(broker)?.normalize_webhook(raw))
    }

    pub async fn get_profile_picture(
        &self,
        instance_id: &str,
        broker: BrokerType,
        number: &str,
    ) -> ProviderResult<Option<String>> {
        self.provider(broker)?
            .get_profile_picture(instance_id, number)
            .await
    }

    pub async fn update_profile_picture(
        &self,
        instance_id: &str,
        broker: BrokerType,
        image_url: &str,
    ) -> ProviderResult<()> {
        self.provider(broker)?
            .update_profile_picture(instance_id, image_url)
            .await
    }

    /// Never fails for a registered broker: check errors read as `false`.
    pub async fn health_check(&self, broker: BrokerType) -> ProviderResult<bool> {
        let provider = self.provider(broker)?;
        Ok(check_health(broker, provider).await)
    }

    /// Checks every registered adapter concurrently. A failing or panicking
    /// check records `false` without affecting the others.
    pub async fn health_check_all(&self) -> BTreeMap<BrokerType, bool> {
        let providers: Vec<(BrokerType, Arc<dyn WhatsAppProvider>)> = self
            .providers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let brokers: Vec<BrokerType> = providers.iter().map(|(broker, _)| *broker).collect();
        let handles = providers
            .into_iter()
            .map(|(broker, provider)| tokio::spawn(check_health(broker, provider)));
        let outcomes = join_all(handles).await;

        brokers
            .into_iter()
            .zip(outcomes)
            .map(|(broker, outcome)| {
                let healthy = outcome.unwrap_or_else(|err| {
                    warn!(broker = %broker, error = %err, "health check task failed");
                    false
                });
                (broker, healthy)
            })
            .collect()
    }
}

async fn check_health(broker: BrokerType, provider: Arc<dyn WhatsAppProvider>) -> bool {
    match provider.health_check().await {
        Ok(healthy) => healthy,
        Err(err) => {
            warn!(broker = %broker, error = %err, "health check failed");
            false
        }
    }
}
