use axum::extract::ws::{Message, WebSocket};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::types::NormalizedWebhook;

/// Frame pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub payload: serde_json::Value,
}

impl WsEvent {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            instance_id: None,
            payload,
        }
    }
}

impl From<&NormalizedWebhook> for WsEvent {
    fn from(hook: &NormalizedWebhook) -> Self {
        let mut payload = serde_json::to_value(hook).unwrap_or(serde_json::Value::Null);
        // raw bodies stay server-side
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("rawPayload");
        }
        Self {
            event: hook.event.as_str().to_string(),
            instance_id: Some(hook.instance_id.clone()),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsCommand {
    #[serde(rename = "connect")]
    Connect { token: Option<String> },
    /// `None` for either list means "everything".
    #[serde(rename = "subscribe")]
    Subscribe {
        events: Option<Vec<String>>,
        #[serde(default)]
        instances: Option<Vec<String>>,
    },
    #[serde(rename = "ping")]
    Ping,
}

/// Per-connection delivery state.
#[derive(Debug, Default)]
pub struct Subscription {
    pub authorized: bool,
    pub events: Option<HashSet<String>>,
    pub instances: Option<HashSet<String>>,
}

impl Subscription {
    pub fn new(auth_token: Option<&str>) -> Self {
        Self {
            authorized: auth_token.is_none(),
            ..Self::default()
        }
    }

    pub fn wants(&self, evt: &WsEvent) -> bool {
        if !self.authorized {
            return false;
        }
        if let Some(events) = self.events.as_ref() {
            if !events.contains(&evt.event) {
                return false;
            }
        }
        match (self.instances.as_ref(), evt.instance_id.as_ref()) {
            (Some(instances), Some(id)) => instances.contains(id),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

fn frame(evt: &WsEvent) -> Message {
    Message::Text(serde_json::to_string(evt).unwrap_or_default())
}

pub async fn handle_ws(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<WsEvent>,
    auth_token: Option<String>,
) {
    let mut sub = Subscription::new(auth_token.as_deref());

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };
                let Ok(cmd) = serde_json::from_str::<WsCommand>(&text) else {
                    debug!("ignoring unparseable ws command");
                    continue;
                };
                match cmd {
                    WsCommand::Connect { token } => {
                        if let Some(expected) = auth_token.as_ref() {
                            if token.as_deref() != Some(expected.as_str()) {
                                let _ = socket.send(Message::Close(None)).await;
                                break;
                            }
                        }
                        sub.authorized = true;
                        let ack = WsEvent::new("presence", serde_json::json!({"status": "connected"}));
                        let _ = socket.send(frame(&ack)).await;
                    }
                    WsCommand::Subscribe { events, instances } => {
                        sub.events = events.map(|items| items.into_iter().collect());
                        sub.instances = instances.map(|items| items.into_iter().collect());
                    }
                    WsCommand::Ping => {
                        let health = WsEvent::new("health", serde_json::json!({"status": "ok"}));
                        let _ = socket.send(frame(&health)).await;
                    }
                }
            }
            evt = rx.recv() => {
                match evt {
                    Ok(evt) => {
                        if !sub.wants(&evt) {
                            continue;
                        }
                        if socket.send(frame(&evt)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ws subscriber lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
