//! Meta's official WhatsApp Cloud API (Graph API). Numbers and webhooks are
//! managed in the Meta Business Dashboard; this backend only sends, reads
//! media and normalizes inbound notifications.

mod adapter;
mod client;
pub mod types;
mod webhook;

pub use adapter::CloudApiAdapter;
pub use client::{
    CloudApiClient, CloudApiClientConfig, GraphMediaKind, DEFAULT_API_VERSION, DEFAULT_GRAPH_URL,
};
pub use webhook::{
    handle_verification_challenge, map_delivery_status, map_message_type,
    normalize_cloudapi_webhook, sign_payload, verify_webhook_signature, SIGNATURE_HEADER,
};
