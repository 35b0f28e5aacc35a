use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::retry::{CircuitBreakers, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://free.uazapi.com";

#[derive(Debug, Clone)]
pub struct UazapiClientConfig {
    pub base_url: String,
    pub admin_token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Per-category circuit breakers around every request.
    pub circuit_breaker: bool,
}

impl Default for UazapiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            admin_token: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            circuit_breaker: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Auth<'a> {
    Admin,
    Instance(&'a str),
    AdminAndInstance(&'a str),
}

/// Body of `POST /send/media`. `mediatype` is the wire vocabulary
/// (`myaudio` for voice notes), not the normalized media type.
#[derive(Debug, Clone, Serialize)]
pub struct MediaPayload {
    pub number: String,
    pub mediatype: &'static str,
    pub media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replyid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationPayload {
    pub number: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCardPayload {
    pub display_name: String,
    pub vcard: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactPayload {
    pub number: String,
    pub contact: ContactCardPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRowPayload {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListSectionPayload {
    pub title: String,
    pub rows: Vec<ListRowPayload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPayload {
    pub number: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub button_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    pub sections: Vec<ListSectionPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ButtonPayload {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsPayload {
    pub number: String,
    pub text: String,
    pub buttons: Vec<ButtonPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalWebhook {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub exclude_messages: Vec<String>,
}

/// Thin HTTP wrapper around the UAZapi REST surface. Instance-scoped calls
/// send a `token` header, admin calls send `admintoken`.
#[derive(Clone)]
pub struct UazapiClient {
    http: Client,
    base_url: String,
    admin_token: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    breakers: Option<CircuitBreakers>,
}

/// Unwraps `{success, data}` envelopes; flat responses are returned as is.
pub fn envelope(value: &Value) -> &Value {
    match value.get("data") {
        Some(data) if data.is_object() || data.is_array() => data,
        _ => value,
    }
}

impl UazapiClient {
    pub fn new(config: UazapiClientConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_token: config.admin_token,
            timeout: config.timeout,
            retry: config.retry,
            breakers: config.circuit_breaker.then(CircuitBreakers::default),
        }
    }

    /// Replaces the default breaker thresholds.
    pub fn with_breakers(mut self, breakers: CircuitBreakers) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn breakers(&self) -> Option<&CircuitBreakers> {
        self.breakers.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        auth: Auth<'_>,
        body: Option<&Value>,
    ) -> ProviderResult<Value> {
        match &self.breakers {
            Some(breakers) => {
                breakers
                    .for_path(path)
                    .call(self.execute(method, path, auth, body))
                    .await
            }
            None => self.execute(method, path, auth, body).await,
        }
    }

    fn admin_token(&self) -> ProviderResult<&str> {
        self.admin_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ProviderError::credentials_missing("admin", "UAZapi admin token is not configured")
            })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        auth: Auth<'_>,
        body: Option<&Value>,
    ) -> ProviderResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let timeout_ms = self.timeout.as_millis() as u64;
        debug!(method = %method, path, "uazapi request");

        let mut builder = self.http.request(method, &url).timeout(self.timeout);
        builder = match auth {
            Auth::Admin => builder.header("admintoken", self.admin_token()?),
            Auth::Instance(token) => builder.header("token", token),
            Auth::AdminAndInstance(token) => builder
                .header("admintoken", self.admin_token()?)
                .header("token", token),
        };
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &url, timeout_ms))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, &url, timeout_ms))?;
        let data: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            return Err(http_error(status.as_u16(), &data));
        }
        Ok(data)
    }

    pub async fn create_instance(
        &self,
        name: &str,
        webhook: Option<&str>,
        webhook_events: &[String],
    ) -> ProviderResult<Value> {
        let mut body = json!({ "name": name });
        if let Some(url) = webhook {
            body["webhook"] = json!(url);
        }
        if !webhook_events.is_empty() {
            body["webhookEvents"] = json!(webhook_events);
        }
        self.request(Method::POST, "/instance/init", Auth::Admin, Some(&body))
            .await
    }

    /// Deletion is an admin operation addressed by the instance token.
    pub async fn delete_instance(&self, token: &str) -> ProviderResult<Value> {
        self.request(
            Method::DELETE,
            "/instance/delete",
            Auth::AdminAndInstance(token),
            None,
        )
        .await
    }

    pub async fn instance_status(&self, token: &str) -> ProviderResult<Value> {
        self.request(Method::GET, "/instance/status", Auth::Instance(token), None)
            .await
    }

    /// Without a phone the backend answers with a QR code, with one it
    /// answers with a pairing code.
    pub async fn connect(&self, token: &str, phone: Option<&str>) -> ProviderResult<Value> {
        let body = phone.map(|phone| json!({ "phone": phone }));
        self.request(
            Method::POST,
            "/instance/connect",
            Auth::Instance(token),
            body.as_ref(),
        )
        .await
    }

    pub async fn disconnect(&self, token: &str) -> ProviderResult<Value> {
        self.request(Method::POST, "/instance/disconnect", Auth::Instance(token), None)
            .await
    }

    pub async fn restart(&self, token: &str) -> ProviderResult<Value> {
        self.request(Method::POST, "/instance/restart", Auth::Instance(token), None)
            .await
    }

    pub async fn list_all_instances(&self) -> ProviderResult<Vec<Value>> {
        let value = self
            .request(Method::GET, "/instance/all", Auth::Admin, None)
            .await?;
        Ok(envelope(&value).as_array().cloned().unwrap_or_default())
    }

    pub async fn get_global_webhook(&self) -> ProviderResult<Option<GlobalWebhook>> {
        let value = self
            .request(Method::GET, "/globalwebhook", Auth::Admin, None)
            .await?;
        let inner = envelope(&value);
        if inner.get("url").and_then(Value::as_str).is_none() {
            return Ok(None);
        }
        serde_json::from_value(inner.clone())
            .map(Some)
            .map_err(|e| ProviderError::Decode(format!("global webhook: {e}")))
    }

    pub async fn set_global_webhook(&self, webhook: &GlobalWebhook) -> ProviderResult<Value> {
        let body = to_body(webhook)?;
        self.request(Method::POST, "/globalwebhook", Auth::Admin, Some(&body))
            .await
    }

    pub async fn send_text(
        &self,
        token: &str,
        number: &str,
        text: &str,
        reply_id: Option<&str>,
        delay_ms: Option<u64>,
    ) -> ProviderResult<Value> {
        let mut body = json!({ "number": number, "text": text });
        if let Some(id) = reply_id {
            body["replyid"] = json!(id);
        }
        if let Some(delay) = delay_ms {
            body["delay"] = json!(delay);
        }
        self.send_message("uazapi.send_text", "/send/text", token, &body)
            .await
    }

    /// Every `/send/*` call shares the retry policy.
    async fn send_message(
        &self,
        label: &str,
        path: &str,
        token: &str,
        body: &Value,
    ) -> ProviderResult<Value> {
        self.retry
            .run(label, || {
                self.request(Method::POST, path, Auth::Instance(token), Some(body))
            })
            .await
    }

    pub async fn send_media(&self, token: &str, payload: &MediaPayload) -> ProviderResult<Value> {
        let body = to_body(payload)?;
        self.send_message("uazapi.send_media", "/send/media", token, &body)
            .await
    }

    pub async fn send_location(
        &self,
        token: &str,
        payload: &LocationPayload,
    ) -> ProviderResult<Value> {
        let body = to_body(payload)?;
        self.send_message("uazapi.send_location", "/send/location", token, &body)
            .await
    }

    pub async fn send_contact(&self, token: &str, payload: &ContactPayload) -> ProviderResult<Value> {
        let body = to_body(payload)?;
        self.send_message("uazapi.send_contact", "/send/contact", token, &body)
            .await
    }

    pub async fn send_list(&self, token: &str, payload: &ListPayload) -> ProviderResult<Value> {
        let body = to_body(payload)?;
        self.send_message("uazapi.send_list", "/send/list", token, &body)
            .await
    }

    pub async fn send_buttons(&self, token: &str, payload: &ButtonsPayload) -> ProviderResult<Value> {
        let body = to_body(payload)?;
        self.send_message("uazapi.send_buttons", "/send/buttons", token, &body)
            .await
    }

    pub async fn send_presence(&self, token: &str, number: &str, status: &str) -> ProviderResult<Value> {
        let body = json!({ "number": number, "status": status });
        self.request(
            Method::POST,
            "/chat/sendPresence",
            Auth::Instance(token),
            Some(&body),
        )
        .await
    }

    pub async fn mark_read(&self, token: &str, message_id: &str) -> ProviderResult<Value> {
        let body = json!({ "id": message_id });
        self.request(Method::PUT, "/message/markread", Auth::Instance(token), Some(&body))
            .await
    }

    pub async fn react(&self, token: &str, message_id: &str, emoji: &str) -> ProviderResult<Value> {
        let body = json!({ "id": message_id, "emoji": emoji });
        self.request(Method::POST, "/message/react", Auth::Instance(token), Some(&body))
            .await
    }

    pub async fn delete_message(&self, token: &str, message_id: &str) -> ProviderResult<Value> {
        let body = json!({ "id": message_id });
        self.request(Method::DELETE, "/message/delete", Auth::Instance(token), Some(&body))
            .await
    }

    /// Loop prevention: messages the API itself sent are never echoed back.
    pub async fn set_webhook(
        &self,
        token: &str,
        url: &str,
        events: &[String],
        enabled: bool,
    ) -> ProviderResult<Value> {
        let body = json!({
            "url": url,
            "events": events,
            "enabled": enabled,
            "excludeMessages": ["wasSentByApi"],
        });
        self.request(Method::POST, "/webhook", Auth::Instance(token), Some(&body))
            .await
    }

    pub async fn profile_image(&self, token: &str, number: &str) -> ProviderResult<Value> {
        let path = format!(
            "/profile/image/{}",
            utf8_percent_encode(number, NON_ALPHANUMERIC)
        );
        self.request(Method::GET, &path, Auth::Instance(token), None)
            .await
    }

    pub async fn update_profile_image(&self, token: &str, image: &str) -> ProviderResult<Value> {
        let body = json!({ "image": image });
        self.request(Method::POST, "/profile/image", Auth::Instance(token), Some(&body))
            .await
    }

    pub async fn chats(&self, token: &str) -> ProviderResult<Value> {
        self.request(Method::GET, "/chats/all", Auth::Instance(token), None)
            .await
    }

    pub async fn contacts(&self, token: &str) -> ProviderResult<Value> {
        self.request(Method::GET, "/contacts/all", Auth::Instance(token), None)
            .await
    }

    pub async fn ping(&self) -> ProviderResult<()> {
        self.request(Method::GET, "/ping", Auth::Admin, None).await?;
        Ok(())
    }
}

fn to_body<T: Serialize>(payload: &T) -> ProviderResult<Value> {
    serde_json::to_value(payload).map_err(|e| ProviderError::InvalidInput(e.to_string()))
}

fn http_error(status: u16, data: &Value) -> ProviderError {
    let message = data
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| data.get("message").and_then(Value::as_str))
        .or_else(|| data.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"));
    let code = data.get("code").and_then(|code| match code {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    ProviderError::Http {
        status,
        code,
        message,
    }
}
