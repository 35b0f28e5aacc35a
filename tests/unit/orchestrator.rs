use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wa_orchestrator::echo::is_bot_echo;
use wa_orchestrator::types::{
    BrokerType, Chat, ChatFilters, Contact, CreateInstanceInput, InstanceResult, InstanceStatus,
    MediaType, MessageResult, NormalizedWebhook, PairingCodeResult, QrCodeResult, SendMediaInput,
    SendTextInput, WebhookConfig,
};
use wa_orchestrator::{Orchestrator, ProviderError, ProviderResult, WhatsAppProvider};

enum Health {
    Up,
    Fails,
    Panics,
}

/// Records every send so tests can assert what reached the adapter.
struct RecordingProvider {
    label: &'static str,
    health: Health,
    sends: AtomicUsize,
    last_text: Mutex<Option<SendTextInput>>,
}

impl RecordingProvider {
    fn new(label: &'static str) -> Arc<Self> {
        Self::with_health(label, Health::Up)
    }

    fn with_health(label: &'static str, health: Health) -> Arc<Self> {
        Arc::new(Self {
            label,
            health,
            sends: AtomicUsize::new(0),
            last_text: Mutex::new(None),
        })
    }

    fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WhatsAppProvider for RecordingProvider {
    fn name(&self) -> &'static str {
        self.label
    }

    fn version(&self) -> &'static str {
        "test"
    }

    async fn create_instance(&self, input: CreateInstanceInput) -> ProviderResult<InstanceResult> {
        Ok(InstanceResult {
            instance_id: format!("{}-{}", self.label, input.name),
            token: "tok".into(),
            status: InstanceStatus::Disconnected,
            qr_code: None,
            pairing_code: None,
        })
    }

    async fn delete_instance(&self, _instance_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn get_instance_status(&self, _instance_id: &str) -> ProviderResult<InstanceStatus> {
        Ok(InstanceStatus::Connected)
    }

    async fn generate_qr_code(&self, _instance_id: &str) -> ProviderResult<QrCodeResult> {
        Err(ProviderError::unsupported(self.label, "QR code connection", "n/a"))
    }

    async fn get_pairing_code(&self, _instance_id: &str) -> ProviderResult<PairingCodeResult> {
        Err(ProviderError::unsupported(self.label, "pairing codes", "n/a"))
    }

    async fn disconnect(&self, _instance_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn restart(&self, _instance_id: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn send_text(&self, _instance_id: &str, input: SendTextInput) -> ProviderResult<MessageResult> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = Some(input);
        Ok(MessageResult::sent(format!("{}-msg", self.label)))
    }

    async fn send_media(&self, _instance_id: &str, input: SendMediaInput) -> ProviderResult<MessageResult> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        assert!(input.delay.is_none());
        Ok(MessageResult::sent(format!("{}-media", self.label)))
    }

    async fn get_chats(&self, _instance_id: &str, _filters: ChatFilters) -> ProviderResult<Vec<Chat>> {
        Ok(Vec::new())
    }

    async fn get_contacts(&self, _instance_id: &str) -> ProviderResult<Vec<Contact>> {
        Ok(Vec::new())
    }

    async fn configure_webhook(&self, _instance_id: &str, _config: WebhookConfig) -> ProviderResult<()> {
        Ok(())
    }

    fn normalize_webhook(&self, _raw: &Value) -> NormalizedWebhook {
        NormalizedWebhook::empty(self.label)
    }

    async fn get_profile_picture(&self, _instance_id: &str, _number: &str) -> ProviderResult<Option<String>> {
        Ok(None)
    }

    async fn update_profile_picture(&self, _instance_id: &str, _image_url: &str) -> ProviderResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        match self.health {
            Health::Up => Ok(true),
            Health::Fails => Err(ProviderError::Http {
                status: 503,
                code: None,
                message: "down".into(),
            }),
            Health::Panics => panic!("health check exploded"),
        }
    }
}

fn text(to: &str) -> SendTextInput {
    SendTextInput {
        to: to.into(),
        text: "hello".into(),
        ..SendTextInput::default()
    }
}

#[tokio::test]
async fn test_short_numbers_rejected_before_dispatch() {
    let uaz = RecordingProvider::new("uaz");
    let cloud = RecordingProvider::new("cloud");
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, uaz.clone());
    orchestrator.register_provider(BrokerType::Cloudapi, cloud.clone());

    for broker in BrokerType::ALL {
        for to in ["", "12345", "+55 (11) 9998", "abc@s.whatsapp.net"] {
            let err = orchestrator.send_text("inst1", broker, text(to)).await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidPhoneNumber { .. }), "{to}: {err}");
            let media = SendMediaInput::new(to, MediaType::Image, "https://cdn/x.png");
            let err = orchestrator.send_media("inst1", broker, media).await.unwrap_err();
            assert_eq!(err.kind(), "validation_error");
        }
    }
    assert_eq!(uaz.sends(), 0);
    assert_eq!(cloud.sends(), 0);
}

#[tokio::test]
async fn test_destination_is_normalized_before_dispatch() {
    let uaz = RecordingProvider::new("uaz");
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, uaz.clone());

    orchestrator
        .send_text("inst1", BrokerType::Uazapi, text("+55 (11) 99988-7766"))
        .await
        .unwrap();
    let sent = uaz.last_text.lock().unwrap().clone().unwrap();
    assert_eq!(sent.to, "5511999887766");
    assert_eq!(sent.text, "hello");
}

#[tokio::test]
async fn test_second_registration_wins() {
    let first = RecordingProvider::new("first");
    let second = RecordingProvider::new("second");
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, first.clone());
    orchestrator.register_provider(BrokerType::Uazapi, second.clone());

    let result = orchestrator
        .send_text("inst1", BrokerType::Uazapi, text("5511999887766"))
        .await
        .unwrap();
    assert_eq!(result.message_id, "second-msg");
    assert_eq!(first.sends(), 0);
    assert_eq!(second.sends(), 1);
    assert_eq!(orchestrator.available_providers(), vec![BrokerType::Uazapi]);
}

#[tokio::test]
async fn test_unregistered_broker_lists_available() {
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, RecordingProvider::new("uaz"));

    let media = SendMediaInput::new("5511999887766", MediaType::Image, "https://cdn/x.png");
    match orchestrator.send_media("inst1", BrokerType::Cloudapi, media).await {
        Err(ProviderError::ProviderUnavailable { requested, available }) => {
            assert_eq!(requested, BrokerType::Cloudapi);
            assert_eq!(available, vec![BrokerType::Uazapi]);
        }
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
    let err = orchestrator
        .normalize_webhook(BrokerType::Cloudapi, &json!({}))
        .unwrap_err();
    assert!(err.to_string().contains("uazapi"));
}

#[tokio::test]
async fn test_unavailable_checked_before_phone_validation() {
    let orchestrator = Orchestrator::new();
    let err = orchestrator
        .send_text("inst1", BrokerType::Cloudapi, text("1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider_unavailable");
}

#[tokio::test(start_paused = true)]
async fn test_delay_is_applied_once_by_the_orchestrator() {
    let uaz = RecordingProvider::new("uaz");
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, uaz.clone());

    let start = tokio::time::Instant::now();
    let mut input = text("5511999887766");
    input.delay = Some(5);
    orchestrator.send_text("inst1", BrokerType::Uazapi, input).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    let sent = uaz.last_text.lock().unwrap().clone().unwrap();
    assert_eq!(sent.delay, None);
}

#[tokio::test]
async fn test_bot_signature_marks_outbound_text() {
    let uaz = RecordingProvider::new("uaz");
    let orchestrator = Orchestrator::new().with_bot_signature(true);
    orchestrator.register_provider(BrokerType::Uazapi, uaz.clone());

    orchestrator
        .send_text("inst1", BrokerType::Uazapi, text("5511999887766"))
        .await
        .unwrap();
    let sent = uaz.last_text.lock().unwrap().clone().unwrap();
    assert!(is_bot_echo(&sent.text));
}

#[tokio::test]
async fn test_health_check_all_isolates_failures() {
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, RecordingProvider::with_health("uaz", Health::Fails));
    orchestrator.register_provider(BrokerType::Cloudapi, RecordingProvider::new("cloud"));

    let results = orchestrator.health_check_all().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[&BrokerType::Uazapi], false);
    assert_eq!(results[&BrokerType::Cloudapi], true);
    assert!(!orchestrator.health_check(BrokerType::Uazapi).await.unwrap());
}

#[tokio::test]
async fn test_health_check_all_survives_panicking_check() {
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Uazapi, RecordingProvider::with_health("uaz", Health::Panics));
    orchestrator.register_provider(BrokerType::Cloudapi, RecordingProvider::new("cloud"));

    let results = orchestrator.health_check_all().await;
    assert_eq!(results[&BrokerType::Uazapi], false);
    assert_eq!(results[&BrokerType::Cloudapi], true);
}

#[tokio::test]
async fn test_dispatch_reaches_lifecycle_and_unsupported_paths() {
    let orchestrator = Orchestrator::new();
    orchestrator.register_provider(BrokerType::Cloudapi, RecordingProvider::new("cloud"));

    let created = orchestrator
        .create_instance(
            BrokerType::Cloudapi,
            CreateInstanceInput {
                name: "sales".into(),
                ..CreateInstanceInput::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(created.instance_id, "cloud-sales");

    let err = orchestrator
        .generate_qr_code("inst1", BrokerType::Cloudapi)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unsupported_capability");

    // default trait body for an operation the provider never overrides
    let err = orchestrator
        .mark_as_read("inst1", BrokerType::Cloudapi, "wamid.1")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unsupported { operation: "read receipts", .. }));
}
