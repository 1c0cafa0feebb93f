//! Provider registry: `ProviderKind` → client

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::ProviderError;
use super::{
    FiveSimClient, OnlineSimClient, ProviderKind, SmsActivateClient, SmsProvider, SmspvaClient,
};
use crate::config::{ProviderSettings, ProvidersConfig};

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn SmsProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client for every enabled provider section
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::new();

        if let Some(settings) = enabled(&config.sms_activate) {
            registry.register(Arc::new(SmsActivateClient::new(settings)?));
        }
        if let Some(settings) = enabled(&config.five_sim) {
            registry.register(Arc::new(FiveSimClient::new(settings)?));
        }
        if let Some(settings) = enabled(&config.smspva) {
            registry.register(Arc::new(SmspvaClient::new(settings)?));
        }
        if let Some(settings) = enabled(&config.onlinesim) {
            registry.register(Arc::new(OnlineSimClient::new(settings)?));
        }

        if config.sandbox.enabled {
            #[cfg(feature = "sandbox")]
            registry.register(Arc::new(super::SandboxProvider::new(
                std::time::Duration::from_secs(config.sandbox.code_delay_secs),
            )));
            #[cfg(not(feature = "sandbox"))]
            warn!("Sandbox provider requested but the `sandbox` feature is disabled");
        }

        if registry.providers.is_empty() {
            warn!("No SMS providers configured; purchases will be rejected");
        } else {
            info!(providers = ?registry.kinds(), "SMS providers registered");
        }

        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn SmsProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn SmsProvider>, ProviderError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(kind.to_string()))
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Registered kinds, in a stable order
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

fn enabled(settings: &Option<ProviderSettings>) -> Option<&ProviderSettings> {
    settings
        .as_ref()
        .filter(|s| s.enabled && !s.api_key.is_empty())
}
