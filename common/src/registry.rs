use crate::{
    centreon::{CentreonApi, CentreonClient, CentreonSettings, Credentials},
    hasheshandlers::config_hash,
    Error, Result,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::*;

pub static DEFAULT_PLATFORM: &str = "default";

pub type ClientFactory =
    Box<dyn Fn(&CentreonSettings, &Credentials) -> Result<Arc<dyn CentreonApi>> + Send + Sync>;

/// A ready to use platform client
#[derive(Clone)]
pub struct PlatformEntry {
    pub name: String,
    pub settings: CentreonSettings,
    pub client: Arc<dyn CentreonApi>,
    pub hash: String,
}

#[derive(Serialize)]
struct HashedConfig<'a> {
    name: &'a str,
    settings: &'a CentreonSettings,
    credentials: &'a Credentials,
}

/// Platform clients shared by every reconcile, keyed by platform name.
///
/// Entries are handed out as `Arc`, so a replaced client stays usable by
/// the reconciles that already hold it.
pub struct PlatformRegistry {
    entries: RwLock<HashMap<String, Arc<PlatformEntry>>>,
    factory: ClientFactory,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new(Box::new(|settings, credentials| {
            Ok(Arc::new(CentreonClient::new(settings, credentials)?) as Arc<dyn CentreonApi>)
        }))
    }
}

impl PlatformRegistry {
    #[must_use]
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// An empty reference resolves to the default platform
    pub async fn get(&self, platform_ref: &str) -> Result<Arc<PlatformEntry>> {
        let key = if platform_ref.is_empty() {
            DEFAULT_PLATFORM
        } else {
            platform_ref
        };
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::PlatformNotFound(key.to_string()))
    }

    /// Returns true when a new client was built
    pub async fn upsert(
        &self,
        name: &str,
        is_default: bool,
        settings: CentreonSettings,
        credentials: Credentials,
    ) -> Result<bool> {
        let hash = config_hash(&HashedConfig {
            name,
            settings: &settings,
            credentials: &credentials,
        })?;
        let mut entries = self.entries.write().await;
        let current = entries.get(name).filter(|e| e.hash == hash).cloned();
        let (entry, created) = match current {
            Some(entry) => (entry, false),
            None => {
                info!("Building a new client for platform {name}");
                let client = (self.factory)(&settings, &credentials)?;
                let entry = Arc::new(PlatformEntry {
                    name: name.to_string(),
                    settings,
                    client,
                    hash,
                });
                entries.insert(name.to_string(), entry.clone());
                (entry, true)
            }
        };
        if name != DEFAULT_PLATFORM {
            if is_default {
                entries.insert(DEFAULT_PLATFORM.to_string(), entry);
            } else if entries.get(DEFAULT_PLATFORM).is_some_and(|e| e.name == name) {
                entries.remove(DEFAULT_PLATFORM);
            }
        }
        Ok(created)
    }

    pub async fn remove(&self, name: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(name).is_some() {
            info!("Platform {name} removed");
        }
        if entries.get(DEFAULT_PLATFORM).is_some_and(|e| e.name == name) {
            entries.remove(DEFAULT_PLATFORM);
        }
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
