//! Fetchers backed by [`MeridianClient`]

use crate::cache::{FetchOutcome, Fetcher};
use crate::client::MeridianClient;
use crate::error::Result;
use async_trait::async_trait;
use meridian_types::{ConfigDocument, ConfigRequest, RegistrySnapshot, ServiceInstances, ServiceName};
use std::sync::Arc;

/// Fetches the whole registry
pub struct RegistryFetcher {
    client: Arc<MeridianClient>,
}

impl RegistryFetcher {
    pub fn new(client: Arc<MeridianClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher<RegistrySnapshot> for RegistryFetcher {
    async fn fetch(&self, known_version: Option<u64>) -> Result<FetchOutcome<RegistrySnapshot>> {
        Ok(match self.client.instances(known_version).await? {
            Some(snapshot) => {
                let version = snapshot.version;
                FetchOutcome::Updated(snapshot, Some(version))
            }
            None => FetchOutcome::Unchanged,
        })
    }
}

/// Fetches the instances of one service
pub struct ServiceFetcher {
    client: Arc<MeridianClient>,
    service: ServiceName,
}

impl ServiceFetcher {
    pub fn new(client: Arc<MeridianClient>, service: impl Into<ServiceName>) -> Self {
        Self {
            client,
            service: service.into(),
        }
    }
}

#[async_trait]
impl Fetcher<ServiceInstances> for ServiceFetcher {
    async fn fetch(&self, known_version: Option<u64>) -> Result<FetchOutcome<ServiceInstances>> {
        Ok(
            match self
                .client
                .service_instances(&self.service, known_version)
                .await?
            {
                Some(instances) => {
                    let version = instances.version;
                    FetchOutcome::Updated(instances, Some(version))
                }
                None => FetchOutcome::Unchanged,
            },
        )
    }
}

/// Fetches one configuration document.
///
/// Documents carry no server version, so every successful fetch replaces
/// the cached one.
pub struct ConfigFetcher {
    client: Arc<MeridianClient>,
    request: ConfigRequest,
}

impl ConfigFetcher {
    pub fn new(client: Arc<MeridianClient>, request: ConfigRequest) -> Self {
        Self { client, request }
    }
}

#[async_trait]
impl Fetcher<ConfigDocument> for ConfigFetcher {
    async fn fetch(&self, _known_version: Option<u64>) -> Result<FetchOutcome<ConfigDocument>> {
        let document = self.client.config(&self.request).await?;
        Ok(FetchOutcome::Updated(document, None))
    }
}
