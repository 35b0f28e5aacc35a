use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProviderError, ProviderResult};
use crate::types::{
    Chat, ChatFilters, Contact, CreateInstanceInput, InstanceResult, InstanceStatus,
    MediaDownloadResult, MediaType, MessageResult, NormalizedWebhook, PairingCodeResult,
    PresenceType, QrCodeResult, SendAudioInput, SendContactInput, SendDocumentInput,
    SendImageInput, SendInteractiveButtonsInput, SendInteractiveListInput, SendLocationInput,
    SendMediaInput, SendTemplateInput, SendTextInput, SendVideoInput, WebhookConfig,
};

/// Capability contract shared by every WhatsApp backend.
///
/// Operations a backend has no concept of must return
/// [`ProviderError::Unsupported`]; the optional capabilities below default to
/// exactly that so a backend opts in by overriding them.
#[async_trait]
pub trait WhatsAppProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    // instance lifecycle
    async fn create_instance(&self, input: CreateInstanceInput) -> ProviderResult<InstanceResult>;
    async fn delete_instance(&self, instance_id: &str) -> ProviderResult<()>;
    async fn get_instance_status(&self, instance_id: &str) -> ProviderResult<InstanceStatus>;

    // connection
    async fn generate_qr_code(&self, instance_id: &str) -> ProviderResult<QrCodeResult>;
    async fn get_pairing_code(&self, instance_id: &str) -> ProviderResult<PairingCodeResult>;
    async fn disconnect(&self, instance_id: &str) -> ProviderResult<()>;
    async fn restart(&self, instance_id: &str) -> ProviderResult<()>;

    // messaging
    async fn send_text(&self, instance_id: &str, input: SendTextInput)
        -> ProviderResult<MessageResult>;
    async fn send_media(
        &self,
        instance_id: &str,
        input: SendMediaInput,
    ) -> ProviderResult<MessageResult>;

    async fn send_image(
        &self,
        instance_id: &str,
        input: SendImageInput,
    ) -> ProviderResult<MessageResult> {
        let mut media = SendMediaInput::new(input.to, MediaType::Image, input.image_url);
        media.caption = input.caption;
        media.quoted_message_id = input.quoted_message_id;
        self.send_media(instance_id, media).await
    }

    async fn send_video(
        &self,
        instance_id: &str,
        input: SendVideoInput,
    ) -> ProviderResult<MessageResult> {
        let mut media = SendMediaInput::new(input.to, MediaType::Video, input.video_url);
        media.caption = input.caption;
        media.quoted_message_id = input.quoted_message_id;
        self.send_media(instance_id, media).await
    }

    async fn send_audio(
        &self,
        instance_id: &str,
        input: SendAudioInput,
    ) -> ProviderResult<MessageResult> {
        let mut media = SendMediaInput::new(input.to, MediaType::Audio, input.audio_url);
        media.quoted_message_id = input.quoted_message_id;
        self.send_media(instance_id, media).await
    }

    async fn send_document(
        &self,
        instance_id: &str,
        input: SendDocumentInput,
    ) -> ProviderResult<MessageResult> {
        let mut media = SendMediaInput::new(input.to, MediaType::Document, input.document_url);
        media.file_name = Some(input.file_name);
        media.caption = input.caption;
        media.quoted_message_id = input.quoted_message_id;
        self.send_media(instance_id, media).await
    }

    async fn send_location(
        &self,
        _instance_id: &str,
        _input: SendLocationInput,
    ) -> ProviderResult<MessageResult> {
        Err(ProviderError::unsupported(
            self.name(),
            "location messages",
            "Send the address as a text message instead.",
        ))
    }

    async fn send_contact(
        &self,
        _instance_id: &str,
        _input: SendContactInput,
    ) -> ProviderResult<MessageResult> {
        Err(ProviderError::unsupported(
            self.name(),
            "contact messages",
            "Send the contact details as a text message instead.",
        ))
    }

    async fn send_interactive_list(
        &self,
        _instance_id: &str,
        _input: SendInteractiveListInput,
    ) -> ProviderResult<MessageResult> {
        Err(ProviderError::unsupported(
            self.name(),
            "interactive list messages",
            "Use a numbered text menu for this backend.",
        ))
    }

    async fn send_interactive_buttons(
        &self,
        _instance_id: &str,
        _input: SendInteractiveButtonsInput,
    ) -> ProviderResult<MessageResult> {
        Err(ProviderError::unsupported(
            self.name(),
            "interactive button messages",
            "Use a numbered text menu for this backend.",
        ))
    }

    async fn send_template(
        &self,
        _instance_id: &str,
        _input: SendTemplateInput,
    ) -> ProviderResult<MessageResult> {
        Err(ProviderError::unsupported(
            self.name(),
            "template messages",
            "Templates only exist on the official Cloud API.",
        ))
    }

    async fn mark_as_read(&self, _instance_id: &str, _message_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported(self.name(), "read receipts", "Read state is managed by the device."))
    }

    async fn react_to_message(
        &self,
        _instance_id: &str,
        _message_id: &str,
        _emoji: &str,
    ) -> ProviderResult<()> {
        Err(ProviderError::unsupported(self.name(), "reactions", "Reply with a text message instead."))
    }

    async fn delete_message(&self, _instance_id: &str, _message_id: &str) -> ProviderResult<()> {
        Err(ProviderError::unsupported(self.name(), "message deletion", "Delete the message from the device."))
    }

    async fn send_presence(
        &self,
        _instance_id: &str,
        _to: &str,
        _presence: PresenceType,
    ) -> ProviderResult<()> {
        Err(ProviderError::unsupported(self.name(), "presence updates", "Presence is managed by the backend."))
    }

    async fn download_media(
        &self,
        _instance_id: &str,
        _media_id: &str,
    ) -> ProviderResult<MediaDownloadResult> {
        Err(ProviderError::unsupported(self.name(), "media download", "Use the media URL carried by the webhook."))
    }

    // chats and contacts; an empty list is a valid answer
    async fn get_chats(&self, instance_id: &str, filters: ChatFilters) -> ProviderResult<Vec<Chat>>;
    async fn get_contacts(&self, instance_id: &str) -> ProviderResult<Vec<Contact>>;

    // webhooks
    async fn configure_webhook(&self, instance_id: &str, config: WebhookConfig)
        -> ProviderResult<()>;

    /// Pure and infallible: unknown shapes degrade to [`NormalizedWebhook::empty`].
    fn normalize_webhook(&self, raw: &Value) -> NormalizedWebhook;

    // profile
    async fn get_profile_picture(
        &self,
        instance_id: &str,
        number: &str,
    ) -> ProviderResult<Option<String>>;
    async fn update_profile_picture(&self, instance_id: &str, image_url: &str)
        -> ProviderResult<()>;

    async fn health_check(&self) -> ProviderResult<bool>;
}
