pub mod config;
pub mod credentials;
pub mod db;
pub mod echo;
pub mod error;
pub mod ingress;
pub mod orchestrator;
pub mod phone;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod types;
pub mod ws;

pub use config::Config;
pub use error::{ProviderError, ProviderResult};
pub use orchestrator::Orchestrator;
pub use provider::WhatsAppProvider;

use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;
use tracing::info;

use self::config::{load_config, resolve_database_url};
use self::credentials::CredentialStore;
use self::db::SqlCredentialStore;
use self::providers::uazapi::UazapiClient;
use self::providers::{CloudApiAdapter, UazapiAdapter};
use self::types::BrokerType;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub events: broadcast::Sender<ws::WsEvent>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<Orchestrator>) -> Self {
        let (events, _) = broadcast::channel(config.events.capacity.max(1));
        Self {
            config,
            orchestrator,
            events,
        }
    }
}

/// Registers one adapter per enabled backend, all reading credentials from
/// `credentials`.
pub fn build_orchestrator(config: &Config, credentials: Arc<dyn CredentialStore>) -> Orchestrator {
    let orchestrator = Orchestrator::new().with_bot_signature(config.orchestrator.bot_signature);

    if config.uazapi.enabled {
        let client = UazapiClient::new(config.uazapi.client_config());
        let adapter = UazapiAdapter::new(client, Arc::clone(&credentials));
        orchestrator.register_provider(BrokerType::Uazapi, Arc::new(adapter));
    }
    if config.cloudapi.enabled {
        let adapter = CloudApiAdapter::new(config.cloudapi.client_config(), Arc::clone(&credentials));
        orchestrator.register_provider(BrokerType::Cloudapi, Arc::new(adapter));
    }

    orchestrator
}

pub async fn create_app() -> anyhow::Result<(AppState, Router)> {
    let config = load_config();
    let db_url = resolve_database_url(&config);
    let db_kind = db::db_kind_from_url(&db_url);
    let pool = db::connect(&db_url, 5).await?;
    info!(?db_kind, "credential store connected");

    let credentials: Arc<dyn CredentialStore> = Arc::new(SqlCredentialStore::new(pool, db_kind));
    let orchestrator = Arc::new(build_orchestrator(&config, credentials));
    let state = AppState::new(config, orchestrator);
    let app = ingress::router(state.clone());

    Ok((state, app))
}
