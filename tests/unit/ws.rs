use serde_json::json;
use wa_orchestrator::types::{NormalizedWebhook, WebhookEvent};
use wa_orchestrator::ws::{Subscription, WsCommand, WsEvent};

#[test]
fn test_ws_event_from_normalized_webhook() {
    let mut hook = NormalizedWebhook::empty("inst-1");
    hook.raw_payload = Some(json!({"secret": "raw"}));
    let event = WsEvent::from(&hook);

    assert_eq!(event.event, "message.received");
    assert_eq!(event.instance_id.as_deref(), Some("inst-1"));
    assert_eq!(event.payload["instanceId"], "inst-1");
    assert_eq!(event.payload["data"], json!({"kind": "empty"}));
    assert!(event.payload.get("rawPayload").is_none());
}

#[test]
fn test_ws_event_serde() {
    let event = WsEvent::new("health", json!({"status": "ok"}));
    let text = serde_json::to_string(&event).unwrap();
    let parsed: WsEvent = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.event, "health");
    assert!(parsed.instance_id.is_none());
    assert_eq!(parsed.payload["status"], "ok");
}

#[test]
fn test_ws_command_variants() {
    let cmd: WsCommand = serde_json::from_value(json!({"type": "connect", "token": "t"})).unwrap();
    assert!(matches!(cmd, WsCommand::Connect { token: Some(ref t) } if t == "t"));

    let cmd: WsCommand = serde_json::from_value(json!({"type": "ping"})).unwrap();
    assert!(matches!(cmd, WsCommand::Ping));

    let cmd: WsCommand = serde_json::from_value(json!({
        "type": "subscribe",
        "events": ["message.updated"],
        "instances": ["inst-1"]
    }))
    .unwrap();
    match cmd {
        WsCommand::Subscribe { events, instances } => {
            assert_eq!(events.unwrap(), vec!["message.updated".to_string()]);
            assert_eq!(instances.unwrap(), vec!["inst-1".to_string()]);
        }
        _ => panic!("wrong variant"),
    }

    assert!(serde_json::from_value::<WsCommand>(json!({"type": "shout"})).is_err());
}

#[test]
fn test_subscription_open_without_token() {
    let sub = Subscription::new(None);
    assert!(sub.authorized);
    assert!(sub.wants(&WsEvent::new("anything", json!(null))));
}

#[test]
fn test_subscription_filters_by_event_and_instance() {
    let mut sub = Subscription::new(Some("secret"));
    sub.authorized = true;
    sub.events = Some(["message.updated".to_string()].into_iter().collect());
    sub.instances = Some(["inst-1".to_string()].into_iter().collect());

    let mut hook = NormalizedWebhook::empty("inst-1");
    hook.event = WebhookEvent::MessageUpdated;
    assert!(sub.wants(&WsEvent::from(&hook)));

    hook.instance_id = "inst-2".into();
    assert!(!sub.wants(&WsEvent::from(&hook)));

    hook.instance_id = "inst-1".into();
    hook.event = WebhookEvent::MessageReceived;
    assert!(!sub.wants(&WsEvent::from(&hook)));

    // instance filter excludes events with no instance
    assert!(!sub.wants(&WsEvent::new("message.updated", json!({}))));
}
