use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ProviderResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UazapiCredentials {
    pub token: String,
    /// Needed to request a pairing code.
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudApiCredentials {
    pub access_token: String,
    pub phone_number_id: String,
    pub waba_id: String,
}

/// Read-only view over the instance credentials owned by the persistence
/// layer. Adapters call it lazily per operation; nothing here writes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn uazapi_credentials(&self, instance_id: &str)
        -> ProviderResult<Option<UazapiCredentials>>;

    /// Fields may be missing individually; the adapter reports which one.
    async fn cloudapi_credentials(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Option<PartialCloudApiCredentials>>;

    async fn cloudapi_token_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> ProviderResult<Option<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialCloudApiCredentials {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub waba_id: Option<String>,
}

impl From<CloudApiCredentials> for PartialCloudApiCredentials {
    fn from(value: CloudApiCredentials) -> Self {
        Self {
            access_token: Some(value.access_token),
            phone_number_id: Some(value.phone_number_id),
            waba_id: Some(value.waba_id),
        }
    }
}

/// Map-backed store for tests and single-process setups.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    uazapi: DashMap<String, UazapiCredentials>,
    cloudapi: DashMap<String, PartialCloudApiCredentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_uazapi(&self, instance_id: &str, creds: UazapiCredentials) {
        self.uazapi.insert(instance_id.to_string(), creds);
    }

    pub fn insert_cloudapi(&self, instance_id: &str, creds: impl Into<PartialCloudApiCredentials>) {
        self.cloudapi.insert(instance_id.to_string(), creds.into());
    }

    pub fn remove(&self, instance_id: &str) {
        self.uazapi.remove(instance_id);
        self.cloudapi.remove(instance_id);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn uazapi_credentials(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Option<UazapiCredentials>> {
        Ok(self.uazapi.get(instance_id).map(|entry| entry.clone()))
    }

    async fn cloudapi_credentials(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Option<PartialCloudApiCredentials>> {
        Ok(self.cloudapi.get(instance_id).map(|entry| entry.clone()))
    }

    async fn cloudapi_token_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> ProviderResult<Option<String>> {
        Ok(self.cloudapi.iter().find_map(|entry| {
            if entry.phone_number_id.as_deref() == Some(phone_number_id) {
                entry.access_token.clone()
            } else {
                None
            }
        }))
    }
}
