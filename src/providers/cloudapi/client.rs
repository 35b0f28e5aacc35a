use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::types::{
    GraphErrorResponse, Location, MediaUploadResponse, MediaUrlResponse, MessageResponse,
    PhoneInfo,
};
use crate::credentials::CloudApiCredentials;
use crate::error::{ProviderError, ProviderResult};
use crate::phone::format_cloud_recipient;
use crate::types::ContactCard;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v20.0";

const PHONE_INFO_FIELDS: &str =
    "verified_name,display_phone_number,id,quality_rating,code_verification_status,platform_type,throughput";

#[derive(Debug, Clone)]
pub struct CloudApiClientConfig {
    pub graph_base_url: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl Default for CloudApiClientConfig {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CloudApiClientConfig {
    /// `https://graph.facebook.com/v20.0`
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.graph_base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }
}

/// Outbound media kinds the Graph API accepts by link or id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl GraphMediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphMediaKind::Image => "image",
            GraphMediaKind::Video => "video",
            GraphMediaKind::Audio => "audio",
            GraphMediaKind::Document => "document",
        }
    }
}

/// Graph API client bound to one phone number.
pub struct CloudApiClient {
    http: Client,
    base_url: String,
    access_token: String,
    phone_number_id: String,
    waba_id: String,
    timeout: Duration,
}

/// Bearer-authenticated request with a per-request timeout.
pub(crate) fn authorized(
    http: &Client,
    method: Method,
    url: &str,
    token: &str,
    timeout: Duration,
) -> RequestBuilder {
    http.request(method, url).bearer_auth(token).timeout(timeout)
}

/// Sends `builder` and decodes a JSON body, mapping Graph error envelopes.
pub(crate) async fn execute<T: DeserializeOwned>(
    builder: RequestBuilder,
    url: &str,
    timeout: Duration,
) -> ProviderResult<T> {
    let timeout_ms = timeout.as_millis() as u64;
    let resp = builder
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, url, timeout_ms))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(e, url, timeout_ms))?;
    if !status.is_success() {
        return Err(graph_error(status.as_u16(), &text));
    }
    let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
    serde_json::from_str(body).map_err(|e| ProviderError::Decode(format!("{url}: {e}")))
}

pub(crate) fn graph_error(status: u16, body: &str) -> ProviderError {
    let parsed: GraphErrorResponse = serde_json::from_str(body).unwrap_or_default();
    match parsed.error {
        Some(detail) if !detail.message.is_empty() => ProviderError::Http {
            status,
            code: detail.code.map(|c| c.to_string()),
            message: detail.message,
        },
        _ => ProviderError::Http {
            status,
            code: None,
            message: format!("HTTP {status}"),
        },
    }
}

pub(crate) fn message_envelope(to: &str, kind: &str, body: Value) -> Value {
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": format_cloud_recipient(to),
        "type": kind,
    });
    payload[kind] = body;
    payload
}

impl CloudApiClient {
    pub fn new(http: Client, config: &CloudApiClientConfig, credentials: CloudApiCredentials) -> Self {
        Self {
            http,
            base_url: config.base_url(),
            access_token: credentials.access_token,
            phone_number_id: credentials.phone_number_id,
            waba_id: credentials.waba_id,
            timeout: config.timeout,
        }
    }

    pub fn phone_number_id(&self) -> &str {
        &self.phone_number_id
    }

    pub fn waba_id(&self) -> &str {
        &self.waba_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, "graph request");
        let mut builder = authorized(&self.http, method, &url, &self.access_token, self.timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        execute(builder, &url, self.timeout).await
    }

    async fn post_message(&self, payload: &Value) -> ProviderResult<MessageResponse> {
        let path = format!("/{}/messages", self.phone_number_id);
        self.request(Method::POST, &path, Some(payload)).await
    }

    pub async fn get_phone_info(&self) -> ProviderResult<PhoneInfo> {
        let path = format!("/{}?fields={}", self.phone_number_id, PHONE_INFO_FIELDS);
        self.request(Method::GET, &path, None).await
    }

    /// Live credential check; any failure reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        match self.get_phone_info().await {
            Ok(_) => true,
            Err(err) => {
                warn!(phone_number_id = %self.phone_number_id, error = %err, "graph health check failed");
                false
            }
        }
    }

    pub async fn send_text(
        &self,
        to: &str,
        text: &str,
        preview_url: bool,
    ) -> ProviderResult<MessageResponse> {
        let payload = message_envelope(
            to,
            "text",
            json!({ "preview_url": preview_url, "body": text }),
        );
        self.post_message(&payload).await
    }

    pub async fn send_media_link(
        &self,
        to: &str,
        kind: GraphMediaKind,
        link: &str,
        caption: Option<&str>,
        filename: Option<&str>,
    ) -> ProviderResult<MessageResponse> {
        let payload = message_envelope(to, kind.as_str(), media_body("link", link, kind, caption, filename));
        self.post_message(&payload).await
    }

    /// Sends media previously stored with [`CloudApiClient::upload_media`].
    pub async fn send_media_by_id(
        &self,
        to: &str,
        kind: GraphMediaKind,
        media_id: &str,
        caption: Option<&str>,
        filename: Option<&str>,
    ) -> ProviderResult<MessageResponse> {
        let payload = message_envelope(to, kind.as_str(), media_body("id", media_id, kind, caption, filename));
        self.post_message(&payload).await
    }

    pub async fn send_location(&self, to: &str, location: &Location) -> ProviderResult<MessageResponse> {
        let body = serde_json::to_value(location)
            .map_err(|e| ProviderError::InvalidInput(e.to_string()))?;
        let payload = message_envelope(to, "location", body);
        self.post_message(&payload).await
    }

    pub async fn send_contact(&self, to: &str, contact: &ContactCard) -> ProviderResult<MessageResponse> {
        let mut payload = message_envelope(to, "contacts", Value::Null);
        payload["contacts"] = json!([{
            "name": {
                "formatted_name": contact.name,
                "first_name": contact.name,
            },
            "phones": [{ "phone": contact.phone, "type": "CELL" }],
        }]);
        self.post_message(&payload).await
    }

    pub async fn send_template(
        &self,
        to: &str,
        template_name: &str,
        language_code: &str,
        components: &[Value],
    ) -> ProviderResult<MessageResponse> {
        let mut template = json!({
            "name": template_name,
            "language": { "code": language_code },
        });
        if !components.is_empty() {
            template["components"] = json!(components);
        }
        let payload = message_envelope(to, "template", template);
        self.post_message(&payload).await
    }

    pub async fn mark_as_read(&self, message_id: &str) -> ProviderResult<()> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });
        let path = format!("/{}/messages", self.phone_number_id);
        let _: Value = self.request(Method::POST, &path, Some(&payload)).await?;
        Ok(())
    }

    pub async fn react_to_message(&self, message_id: &str, emoji: &str) -> ProviderResult<MessageResponse> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "type": "reaction",
            "reaction": { "message_id": message_id, "emoji": emoji },
        });
        self.post_message(&payload).await
    }

    /// Resolves a media id to a short-lived download URL.
    pub async fn get_media_url(&self, media_id: &str) -> ProviderResult<MediaUrlResponse> {
        let path = format!("/{media_id}");
        self.request(Method::GET, &path, None).await
    }

    pub async fn download_media(&self, url: &str) -> ProviderResult<Bytes> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let resp = authorized(&self.http, Method::GET, url, &self.access_token, self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, url, timeout_ms))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                code: None,
                message: format!("failed to download media: HTTP {}", status.as_u16()),
            });
        }
        resp.bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, url, timeout_ms))
    }

    /// Multipart upload; gets twice the JSON timeout.
    pub async fn upload_media(
        &self,
        data: Bytes,
        filename: &str,
        mime_type: &str,
    ) -> ProviderResult<MediaUploadResponse> {
        let url = format!("{}/{}/media", self.base_url, self.phone_number_id);
        let timeout = self.timeout * 2;
        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| ProviderError::InvalidInput(format!("mime type `{mime_type}`: {e}")))?;
        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime_type.to_string())
            .part("file", part);
        let builder = authorized(&self.http, Method::POST, &url, &self.access_token, timeout)
            .multipart(form);
        execute(builder, &url, timeout).await
    }
}

fn media_body(
    source_key: &str,
    source: &str,
    kind: GraphMediaKind,
    caption: Option<&str>,
    filename: Option<&str>,
) -> Value {
    let mut body = json!({});
    body[source_key] = json!(source);
    // audio carries neither caption nor filename
    if kind != GraphMediaKind::Audio {
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
        }
    }
    if kind == GraphMediaKind::Document {
        if let Some(filename) = filename {
            body["filename"] = json!(filename);
        }
    }
    body
}
