//! Session-based UAZapi backend: a device is linked by QR code or pairing
//! code and the broker relays its traffic over HTTP.

mod adapter;
mod client;
mod webhook;

pub use adapter::UazapiAdapter;
pub use client::{
    envelope, ButtonPayload, ButtonsPayload, ContactCardPayload, ContactPayload, GlobalWebhook,
    ListPayload, ListRowPayload, ListSectionPayload, LocationPayload, MediaPayload, UazapiClient,
    UazapiClientConfig, DEFAULT_BASE_URL,
};
pub use webhook::{
    map_delivery_status, map_event, map_instance_status, map_message_type,
    normalize_uazapi_webhook,
};
